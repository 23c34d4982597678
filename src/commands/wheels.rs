use clap::Args;
use conveyor::config;
use conveyor::stages;
use conveyor::wheelhouse;
use conveyor::Result;

#[derive(Args)]
pub struct WheelsArgs {
    /// Pipeline configuration file
    #[arg(short = 'c', long, default_value = "conveyor.toml")]
    pub config: String,

    /// Emit the resolution table as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show the winning artifact per logical package across the wheel tiers.
pub fn run(args: WheelsArgs) -> Result<()> {
    let config = config::load(&args.config)?;
    let table = wheelhouse::resolve(&stages::wheel_tiers(&config.wheels))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    for artifact in table.values() {
        println!(
            "{:<28} {:<14} {:<6} {}",
            artifact.name,
            artifact.version,
            artifact.tier,
            artifact.path.display()
        );
    }
    Ok(())
}
