use clap::{Parser, Subcommand};

mod commands;

use commands::{list, run, synth, wheels};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(version = VERSION)]
#[command(about = "Build pipeline orchestrator: staged script synthesis and fail-fast execution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered stages
    List(list::ListArgs),
    /// Synthesize all stage scripts without executing them
    Synth(synth::SynthArgs),
    /// Synthesize, then execute the selected stages in order
    Run(run::RunArgs),
    /// Show the winning artifact per package across wheel tiers
    Wheels(wheels::WheelsArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::List(args) => list::run(args),
        Commands::Synth(args) => synth::run(args),
        Commands::Run(args) => run::run(args),
        Commands::Wheels(args) => wheels::run(args),
    };

    if let Err(err) = result {
        eprintln!("Error [{}]: {}", err.code(), err);
        std::process::exit(err.exit_code());
    }
}
