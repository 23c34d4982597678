//! Stage records: named, numbered units of pipeline work.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::script::CommandScript;

/// Explicit stage classification, attached at registration time.
/// Composite selection filters match on tags, never on id substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    Download,
    Checkout,
    Install,
    Build,
    /// Wheel-handling stages (download, build or install of wheel files).
    Wheel,
    Pack,
    Audit,
}

/// Everything a stage body may read while composing its command lines.
pub struct SynthContext {
    pub config: PipelineConfig,
}

impl SynthContext {
    pub fn new(config: PipelineConfig) -> Self {
        SynthContext { config }
    }
}

/// A stage body produces zero or more command scripts when synthesized.
/// Bodies never execute anything themselves.
pub type StageBody = Box<dyn Fn(&SynthContext) -> Result<Vec<CommandScript>>>;

pub struct Stage {
    /// Stable name, e.g. `06_checkout`. The numeric prefix is the run order.
    pub id: String,
    pub order: u32,
    pub description: String,
    pub tags: BTreeSet<StageTag>,
    pub body: StageBody,
}

impl Stage {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        tags: impl IntoIterator<Item = StageTag>,
        body: StageBody,
    ) -> Result<Self> {
        let id = id.into();
        let order = parse_order(&id)?;
        Ok(Stage {
            id,
            order,
            description: description.into(),
            tags: tags.into_iter().collect(),
            body,
        })
    }

    pub fn has_tag(&self, tag: StageTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn info(&self) -> StageInfo {
        StageInfo {
            id: self.id.clone(),
            order: self.order,
            description: self.description.clone(),
            tags: self.tags.iter().copied().collect(),
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Serializable stage catalog entry for `conveyor list`.
#[derive(Debug, Clone, Serialize)]
pub struct StageInfo {
    pub id: String,
    pub order: u32,
    pub description: String,
    pub tags: Vec<StageTag>,
}

/// Extract the numeric order prefix from a stage id (`06_checkout` -> 6).
fn parse_order(id: &str) -> Result<u32> {
    let digits: String = id.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(Error::Config(format!(
            "Stage id '{}' must start with a numeric order prefix",
            id
        )));
    }
    digits
        .parse()
        .map_err(|_| Error::Config(format!("Stage id '{}' has an unparseable order prefix", id)))
}
