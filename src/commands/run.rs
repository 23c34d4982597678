use clap::Args;
use conveyor::config;
use conveyor::executor::PipelineExecutor;
use conveyor::log_status;
use conveyor::script::ScriptEmitter;
use conveyor::selection;
use conveyor::stage::SynthContext;
use conveyor::stages;
use conveyor::Result;

use crate::commands::SelectionFlags;

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline configuration file
    #[arg(short = 'c', long, default_value = "conveyor.toml")]
    pub config: String,

    #[command(flatten)]
    pub selection: SelectionFlags,

    /// Resolve the selection and synthesize scripts, but execute nothing
    #[arg(long)]
    pub dry_run: bool,
}

/// Synthesize all stage scripts, then execute the selected ones in order.
///
/// Selection errors (bad range, unknown stage id) surface before a single
/// script is written or run.
pub fn run(args: RunArgs) -> Result<()> {
    let config = config::load(&args.config)?;
    let registry = stages::registry()?;

    let request = args.selection.to_request()?;
    let selection = selection::resolve(&request, &registry)?;

    if request.is_empty() && !args.dry_run {
        log_status!(
            "run",
            "No stages selected; synthesizing scripts only (use --all, --range or --stage)"
        );
    }

    let emitter = ScriptEmitter::new(config.scripts_dir(), config.env.clone());
    let mut executor = PipelineExecutor::new(registry, emitter);
    executor.synthesize(&SynthContext::new(config))?;

    if args.dry_run {
        for stage in executor.registry().stages() {
            let mark = if selection.is_selected(&stage.id) {
                "run "
            } else {
                "skip"
            };
            println!("{}  {:>3}  {}", mark, stage.order, stage.id);
        }
        return Ok(());
    }

    executor.execute(&selection)?;
    Ok(())
}
