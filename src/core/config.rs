//! Pipeline configuration loaded from a TOML file.
//!
//! The configuration is pure data: directory layout, the environment
//! variable set exported into every generated script, and the inputs the
//! builtin stage bodies assemble their command lines from.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Fixed named variable set exported into every generated script.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub wheels: WheelsConfig,

    #[serde(default)]
    pub python: PythonConfig,

    /// Binary downloads fetched by the download stage.
    #[serde(default)]
    pub downloads: Vec<Download>,

    /// Git sources checked out by the checkout stage.
    #[serde(default)]
    pub sources: Vec<SourceCheckout>,

    /// Entry points compiled to native executables by the build stage.
    #[serde(default)]
    pub projects: Vec<ProjectBuild>,

    /// Output folder layout: destination folder -> source paths/globs.
    #[serde(default)]
    pub pack: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory the generated stage scripts are written to.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    #[serde(default = "default_src_dir")]
    pub src_dir: String,
    #[serde(default = "default_bin_dir")]
    pub bin_dir: String,
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_src_dir() -> String {
    "in/src".to_string()
}

fn default_bin_dir() -> String {
    "in/bin".to_string()
}

fn default_out_dir() -> String {
    "out".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            scripts_dir: default_scripts_dir(),
            src_dir: default_src_dir(),
            bin_dir: default_bin_dir(),
            out_dir: default_out_dir(),
        }
    }
}

/// Candidate wheel directories, lowest precedence first:
/// transitively downloaded deps, forced external wheels, our own builds.
#[derive(Debug, Clone, Deserialize)]
pub struct WheelsConfig {
    #[serde(default = "default_deps_dir")]
    pub deps_dir: String,
    #[serde(default = "default_ext_dir")]
    pub ext_dir: String,
    #[serde(default = "default_our_dir")]
    pub our_dir: String,
}

fn default_deps_dir() -> String {
    "in/bin/depswheel".to_string()
}

fn default_ext_dir() -> String {
    "in/bin/extwheel".to_string()
}

fn default_our_dir() -> String {
    "in/bin/ourwheel".to_string()
}

impl Default for WheelsConfig {
    fn default() -> Self {
        WheelsConfig {
            deps_dir: default_deps_dir(),
            ext_dir: default_ext_dir(),
            our_dir: default_our_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PythonConfig {
    /// Interpreter invoked by the wheel and build stages.
    #[serde(default = "default_python")]
    pub interpreter: String,
    /// Requirements file the dependency-download stage feeds to pip.
    #[serde(default)]
    pub requirements: Option<String>,
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for PythonConfig {
    fn default() -> Self {
        PythonConfig {
            interpreter: default_python(),
            requirements: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Download {
    pub url: String,
    /// Optional explicit target filename (otherwise the URL basename).
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceCheckout {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl SourceCheckout {
    /// Checkout directory name derived from the repository URL.
    pub fn dir_name(&self) -> String {
        let last = self.url.rsplit('/').next().unwrap_or(&self.url);
        last.strip_suffix(".git").unwrap_or(last).to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectBuild {
    /// Entry point relative to the source directory, e.g. `marker/cli.py`.
    pub entry: String,
    /// Extra compiler flags appended verbatim.
    #[serde(default)]
    pub flags: Option<String>,
    /// Packages forced into the compiled distribution.
    #[serde(default)]
    pub include_packages: Vec<String>,
}

impl ProjectBuild {
    /// Project name derived from the entry point file stem.
    pub fn name(&self) -> String {
        let base = self.entry.rsplit('/').next().unwrap_or(&self.entry);
        base.strip_suffix(".py").unwrap_or(base).to_string()
    }
}

/// Load and parse a pipeline configuration file.
/// The path supports `~` expansion.
pub fn load(path: &str) -> Result<PipelineConfig> {
    let expanded = shellexpand::tilde(path).to_string();
    let path = Path::new(&expanded);
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Toml(e.to_string()))
}

impl PipelineConfig {
    pub fn scripts_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.scripts_dir)
    }
}
