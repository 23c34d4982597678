//! Selection algebra: which stages does this run include.
//!
//! A request combines explicit stage ids, inclusive numeric ranges,
//! composite tag filters, and skip-words. Resolution is a pure function of
//! the request and the registry; skip-words veto every inclusion rule.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::registry::StageRegistry;
use crate::stage::{Stage, StageTag};

/// Named composite filters, the umbrella flags of the CLI.
/// Each is a predicate over the structured stage record (tags), never a
/// substring match on the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Every registered stage.
    All,
    /// Everything buildable locally: excludes download, checkout and audit
    /// stages (their inputs are assumed present).
    Build,
    /// Fast path after a source-only change: checkout plus all wheel,
    /// build and pack stages.
    Rebuild,
    /// Everything that fetches from the network: download and checkout.
    DownloadAll,
}

impl Composite {
    pub fn matches(&self, stage: &Stage) -> bool {
        match self {
            Composite::All => true,
            Composite::Build => {
                !stage.has_tag(StageTag::Download)
                    && !stage.has_tag(StageTag::Checkout)
                    && !stage.has_tag(StageTag::Audit)
            }
            Composite::Rebuild => {
                stage.has_tag(StageTag::Checkout)
                    || stage.has_tag(StageTag::Wheel)
                    || stage.has_tag(StageTag::Build)
                    || stage.has_tag(StageTag::Pack)
            }
            Composite::DownloadAll => {
                stage.has_tag(StageTag::Download) || stage.has_tag(StageTag::Checkout)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    /// Stage ids requested directly.
    pub explicit: BTreeSet<String>,
    /// Closed intervals matched against stage order, inclusive both ends.
    pub ranges: Vec<(u32, u32)>,
    /// Activated composite filters.
    pub composites: Vec<Composite>,
    /// Substrings; any stage whose id contains one is excluded,
    /// overriding all inclusion rules.
    pub skip_words: Vec<String>,
}

impl SelectionRequest {
    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty() && self.ranges.is_empty() && self.composites.is_empty()
    }
}

/// Resolved run/skip decision per stage.
#[derive(Debug, Clone)]
pub struct Selection {
    decisions: BTreeMap<String, bool>,
}

impl Selection {
    pub fn is_selected(&self, stage_id: &str) -> bool {
        self.decisions.get(stage_id).copied().unwrap_or(false)
    }

    pub fn selected_ids(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|(_, on)| **on)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn decisions(&self) -> &BTreeMap<String, bool> {
        &self.decisions
    }
}

/// Parse a range expression: comma-separated single numbers or `from-to`
/// intervals, e.g. `1-5,7,10-20`.
pub fn parse_ranges(expr: &str) -> Result<Vec<(u32, u32)>> {
    let mut ranges = Vec::new();
    for part in expr.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((from, to)) = part.split_once('-') {
            let from: u32 = from
                .trim()
                .parse()
                .map_err(|_| Error::InvalidRange(part.to_string()))?;
            let to: u32 = to
                .trim()
                .parse()
                .map_err(|_| Error::InvalidRange(part.to_string()))?;
            if from > to {
                return Err(Error::InvalidRange(part.to_string()));
            }
            ranges.push((from, to));
        } else {
            let n: u32 = part
                .parse()
                .map_err(|_| Error::InvalidRange(part.to_string()))?;
            ranges.push((n, n));
        }
    }
    Ok(ranges)
}

/// Parse a comma-separated skip-word list.
pub fn parse_skip_words(expr: &str) -> Vec<String> {
    expr.split(',')
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Resolve a request against the registry into a per-stage decision.
///
/// Explicit ids must name registered stages; an unknown id fails before
/// anything runs. Skip-words are applied last and strictly subtract.
pub fn resolve(request: &SelectionRequest, registry: &StageRegistry) -> Result<Selection> {
    for id in &request.explicit {
        registry.lookup(id)?;
    }

    let mut decisions: BTreeMap<String, bool> = BTreeMap::new();
    for stage in registry.stages() {
        let mut selected = request.explicit.contains(&stage.id);

        if !selected {
            selected = request
                .ranges
                .iter()
                .any(|&(from, to)| stage.order >= from && stage.order <= to);
        }

        if !selected {
            selected = request.composites.iter().any(|c| c.matches(stage));
        }

        // Skip-words always win.
        if selected
            && request
                .skip_words
                .iter()
                .any(|word| stage.id.contains(word.as_str()))
        {
            selected = false;
        }

        decisions.insert(stage.id.clone(), selected);
    }

    Ok(Selection { decisions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageBody;

    fn stage(id: &str, tags: &[StageTag]) -> Stage {
        let body: StageBody = Box::new(|_| Ok(Vec::new()));
        Stage::new(id, format!("stage {}", id), tags.iter().copied(), body).unwrap()
    }

    fn registry() -> StageRegistry {
        StageRegistry::discover(vec![
            stage("01_download", &[StageTag::Download]),
            stage("06_checkout", &[StageTag::Checkout]),
            stage("30_build_wheels", &[StageTag::Build, StageTag::Wheel]),
            stage("60_pack", &[StageTag::Pack]),
            stage("70_audit", &[StageTag::Audit]),
        ])
        .unwrap()
    }

    #[test]
    fn parse_ranges_accepts_singles_and_intervals() {
        assert_eq!(parse_ranges("1-5,7,10-20").unwrap(), vec![(1, 5), (7, 7), (10, 20)]);
        assert_eq!(parse_ranges("").unwrap(), vec![]);
    }

    #[test]
    fn parse_ranges_rejects_inverted_and_garbage() {
        assert_eq!(parse_ranges("9-3").unwrap_err().code(), "INVALID_RANGE");
        assert_eq!(parse_ranges("a-b").unwrap_err().code(), "INVALID_RANGE");
        assert_eq!(parse_ranges("1,x").unwrap_err().code(), "INVALID_RANGE");
    }

    #[test]
    fn range_selection_is_inclusive_both_ends() {
        let registry = StageRegistry::discover(vec![stage("10_a", &[])]).unwrap();

        for (expr, expected) in [("10-20", true), ("5-10", true), ("11-20", false)] {
            let request = SelectionRequest {
                ranges: parse_ranges(expr).unwrap(),
                ..Default::default()
            };
            let selection = resolve(&request, &registry).unwrap();
            assert_eq!(selection.is_selected("10_a"), expected, "range {}", expr);
        }
    }

    #[test]
    fn explicit_unknown_stage_fails_before_resolution() {
        let request = SelectionRequest {
            explicit: ["99_missing".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let err = resolve(&request, &registry()).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STAGE");
    }

    #[test]
    fn skip_words_veto_every_inclusion_rule() {
        let request = SelectionRequest {
            explicit: ["06_checkout".to_string()].into_iter().collect(),
            ranges: vec![(1, 70)],
            composites: vec![Composite::All],
            skip_words: vec!["checkout".to_string(), "audit".to_string()],
        };
        let selection = resolve(&request, &registry()).unwrap();
        assert!(selection.is_selected("01_download"));
        assert!(!selection.is_selected("06_checkout"));
        assert!(!selection.is_selected("70_audit"));
    }

    #[test]
    fn composite_build_excludes_download_checkout_audit() {
        let request = SelectionRequest {
            composites: vec![Composite::Build],
            ..Default::default()
        };
        let selection = resolve(&request, &registry()).unwrap();
        assert_eq!(selection.selected_ids(), vec!["30_build_wheels", "60_pack"]);
    }

    #[test]
    fn composite_rebuild_takes_checkout_and_build_stages() {
        let request = SelectionRequest {
            composites: vec![Composite::Rebuild],
            ..Default::default()
        };
        let selection = resolve(&request, &registry()).unwrap();
        assert_eq!(
            selection.selected_ids(),
            vec!["06_checkout", "30_build_wheels", "60_pack"]
        );
    }

    #[test]
    fn end_to_end_range_with_skip_word() {
        let registry = StageRegistry::discover(vec![
            stage("01_a", &[]),
            stage("05_b", &[]),
            stage("10_c", &[]),
        ])
        .unwrap();
        let request = SelectionRequest {
            ranges: parse_ranges("1-5").unwrap(),
            skip_words: vec!["b".to_string()],
            ..Default::default()
        };
        let selection = resolve(&request, &registry).unwrap();
        assert!(selection.is_selected("01_a"));
        assert!(!selection.is_selected("05_b"));
        assert!(!selection.is_selected("10_c"));
    }

    #[test]
    fn resolution_is_repeatable() {
        let request = SelectionRequest {
            composites: vec![Composite::DownloadAll],
            ..Default::default()
        };
        let a = resolve(&request, &registry()).unwrap();
        let b = resolve(&request, &registry()).unwrap();
        assert_eq!(a.decisions(), b.decisions());
    }
}
