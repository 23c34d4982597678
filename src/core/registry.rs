//! Immutable, order-sorted catalog of all registered stages.

use crate::error::{Error, Result};
use crate::stage::Stage;

#[derive(Debug)]
pub struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    /// Build a registry from explicitly registered stages.
    ///
    /// The result is sorted ascending by order and immutable afterwards.
    /// Duplicate order values are a configuration error: stages are run in
    /// numeric order and a tie would make that order ambiguous.
    pub fn discover(stages: Vec<Stage>) -> Result<Self> {
        let mut stages = stages;
        stages.sort_by_key(|s| s.order);

        for pair in stages.windows(2) {
            if pair[0].order == pair[1].order {
                return Err(Error::DuplicateStageOrder {
                    order: pair[0].order,
                    first: pair[0].id.clone(),
                    second: pair[1].id.clone(),
                });
            }
        }

        Ok(StageRegistry { stages })
    }

    /// All stages in ascending run order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn lookup(&self, id: &str) -> Result<&Stage> {
        self.stages
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::UnknownStage(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stages.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
