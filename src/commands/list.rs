use clap::Args;
use conveyor::stages;
use conveyor::Result;

#[derive(Args)]
pub struct ListArgs {
    /// Emit the stage catalog as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ListArgs) -> Result<()> {
    let registry = stages::registry()?;
    let infos: Vec<_> = registry.stages().iter().map(|s| s.info()).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for info in infos {
        let tags: Vec<String> = info
            .tags
            .iter()
            .map(|t| format!("{:?}", t).to_lowercase())
            .collect();
        println!(
            "{:>3}  {:<22} {:<45} [{}]",
            info.order,
            info.id,
            info.description,
            tags.join(", ")
        );
    }
    Ok(())
}
