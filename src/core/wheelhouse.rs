//! Tiered artifact version resolution.
//!
//! Several directories offer candidate wheel/package files for the same
//! logical name. Within one tier the tier's own tie-break policy picks the
//! best version; across tiers, precedence wins unconditionally — the more
//! authoritative source is trusted regardless of version.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

/// Which version wins among same-name candidates within one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    Newest,
    Oldest,
}

/// A precedence-ordered candidate source of versioned artifacts.
#[derive(Debug, Clone)]
pub struct Tier {
    pub label: String,
    pub dir: PathBuf,
    pub policy: TieBreak,
}

impl Tier {
    pub fn new(label: impl Into<String>, dir: impl Into<PathBuf>, policy: TieBreak) -> Self {
        Tier {
            label: label.into(),
            dir: dir.into(),
            policy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedArtifact {
    /// Package identity independent of version.
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    /// Label of the tier that produced the winner.
    pub tier: String,
}

const ARTIFACT_EXTENSIONS: &[&str] = &[".whl", ".tar.gz", ".tar.bz2", ".zip"];

fn artifact_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // project (lazy, so it stops at the first `-<digit>` boundary),
        // version starting with a digit, optional wheel tags, extension.
        Regex::new(
            r"^(?P<project>[A-Za-z0-9](?:[A-Za-z0-9._-]*?[A-Za-z0-9])?)-(?P<version>[0-9][A-Za-z0-9_.!+]*)(?:-(?P<tags>[A-Za-z0-9_.]+(?:-[A-Za-z0-9_.]+)*))?\.(?:[Ww][Hh][Ll]|tar\.gz|tar\.bz2|zip)$",
        )
        .expect("artifact filename regex is valid")
    })
}

/// Parse an artifact filename into `(logical_name, version)`.
pub fn parse_artifact_name(file_name: &str) -> Result<(String, String)> {
    let caps = artifact_regex()
        .captures(file_name)
        .ok_or_else(|| Error::InvalidArtifactName(file_name.to_string()))?;
    Ok((caps["project"].to_string(), caps["version"].to_string()))
}

fn has_artifact_extension(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    ARTIFACT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Compare two version strings.
///
/// Strict semver when both sides parse as semver; otherwise a lenient
/// dot-segment comparison (numeric segments numerically, mixed segments
/// lexically, missing trailing segments as zero). Wheel versions are
/// PEP 440-flavored and not always semver, so the fallback carries the
/// common cases like `2.0.1.post1`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    if let (Ok(x), Ok(y)) = (semver::Version::parse(a), semver::Version::parse(b)) {
        return x.cmp(&y);
    }

    let xs: Vec<&str> = a.split('.').collect();
    let ys: Vec<&str> = b.split('.').collect();
    // Missing trailing segments count as zero, so `1.0` equals `1.0.0`.
    for i in 0..xs.len().max(ys.len()) {
        let x = xs.get(i).copied().unwrap_or("0");
        let y = ys.get(i).copied().unwrap_or("0");
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(nx), Ok(ny)) => nx.cmp(&ny),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Scan one tier directory into its per-name winner table.
///
/// Unparseable artifact filenames are reported, skipped, and never abort
/// the scan. A missing directory yields an empty table.
fn scan_tier(tier: &Tier) -> Result<BTreeMap<String, ResolvedArtifact>> {
    let mut winners: BTreeMap<String, ResolvedArtifact> = BTreeMap::new();
    if !tier.dir.exists() {
        return Ok(winners);
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(&tier.dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    // Directory iteration order is platform-defined; sort for determinism.
    entries.sort();

    for path in entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !has_artifact_extension(file_name) {
            continue;
        }

        let (name, version) = match parse_artifact_name(file_name) {
            Ok(parsed) => parsed,
            Err(err) => {
                log_status!("wheels", "Skipping {}: {}", file_name, err);
                continue;
            }
        };

        let candidate = ResolvedArtifact {
            name: name.clone(),
            version,
            path: path.clone(),
            tier: tier.label.clone(),
        };

        match winners.get(&name) {
            None => {
                winners.insert(name, candidate);
            }
            Some(current) => {
                let ord = compare_versions(&candidate.version, &current.version);
                let replace = match tier.policy {
                    TieBreak::Newest => ord == Ordering::Greater,
                    TieBreak::Oldest => ord == Ordering::Less,
                };
                if replace {
                    winners.insert(name, candidate);
                }
            }
        }
    }

    Ok(winners)
}

/// Resolve one winning artifact per logical name.
///
/// Tiers are given lowest precedence first; after a tier is scanned its
/// winners unconditionally overwrite entries from all previously merged
/// tiers for any name they share.
pub fn resolve(tiers: &[Tier]) -> Result<BTreeMap<String, ResolvedArtifact>> {
    let mut table: BTreeMap<String, ResolvedArtifact> = BTreeMap::new();
    for tier in tiers {
        let winners = scan_tier(tier)?;
        table.extend(winners);
    }
    Ok(table)
}
