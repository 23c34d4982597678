pub mod list;
pub mod run;
pub mod synth;
pub mod wheels;

use conveyor::selection::{self, Composite, SelectionRequest};
use conveyor::Result;

/// Selection flags shared by `run` (and reused by `--dry-run` output).
/// These are the CLI face of the selection algebra: explicit stage ids,
/// a numeric range expression, composite umbrella flags, and skip-words.
#[derive(clap::Args, Debug, Default)]
pub struct SelectionFlags {
    /// Select a stage by id (repeatable)
    #[arg(long = "stage", value_name = "ID")]
    pub stages: Vec<String>,

    /// Select stages by order: comma-separated numbers or from-to intervals,
    /// inclusive both ends (e.g. "1-5,7,10-20")
    #[arg(long, value_name = "EXPR")]
    pub range: Option<String>,

    /// Exclude any stage whose id contains one of these comma-separated words
    #[arg(long, value_name = "WORDS")]
    pub skip: Option<String>,

    /// Select every stage
    #[arg(long)]
    pub all: bool,

    /// Select all buildable stages (everything but download/checkout/audit)
    #[arg(long)]
    pub build: bool,

    /// Fast path after a source-only change: checkout plus wheel/build/pack stages
    #[arg(long)]
    pub rebuild: bool,

    /// Select everything that fetches from the network
    #[arg(long = "download-all")]
    pub download_all: bool,
}

impl SelectionFlags {
    pub fn to_request(&self) -> Result<SelectionRequest> {
        let mut composites = Vec::new();
        if self.all {
            composites.push(Composite::All);
        }
        if self.build {
            composites.push(Composite::Build);
        }
        if self.rebuild {
            composites.push(Composite::Rebuild);
        }
        if self.download_all {
            composites.push(Composite::DownloadAll);
        }

        Ok(SelectionRequest {
            explicit: self.stages.iter().cloned().collect(),
            ranges: match &self.range {
                Some(expr) => selection::parse_ranges(expr)?,
                None => Vec::new(),
            },
            composites,
            skip_words: match &self.skip {
                Some(words) => selection::parse_skip_words(words),
                None => Vec::new(),
            },
        })
    }
}
