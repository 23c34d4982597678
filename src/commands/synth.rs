use clap::Args;
use conveyor::config;
use conveyor::executor::PipelineExecutor;
use conveyor::script::ScriptEmitter;
use conveyor::stage::SynthContext;
use conveyor::stages;
use conveyor::Result;

#[derive(Args)]
pub struct SynthArgs {
    /// Pipeline configuration file
    #[arg(short = 'c', long, default_value = "conveyor.toml")]
    pub config: String,
}

/// Regenerate every stage script without executing anything.
pub fn run(args: SynthArgs) -> Result<()> {
    let config = config::load(&args.config)?;
    let registry = stages::registry()?;
    let emitter = ScriptEmitter::new(config.scripts_dir(), config.env.clone());
    let mut executor = PipelineExecutor::new(registry, emitter);
    executor.synthesize(&SynthContext::new(config))?;
    Ok(())
}
