//! Command script emission and execution.
//!
//! Every stage body yields `CommandScript`s; the emitter renders them to
//! shell files with an environment preamble and an inline exit-code check
//! after each real command, so fail-fast holds inside a script the same
//! way the executor enforces it across stages.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::utils::shell;

/// Marker on the second line of every generated file. Stale-script cleanup
/// only deletes files carrying it, so hand-written scripts in the same
/// directory survive a synthesize pass.
pub const GENERATED_MARKER: &str = "# generated by conveyor -- do not edit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScript {
    /// Base name; the file name is derived from it deterministically.
    pub name: String,
    /// Owning stage, if any. Scripts without one are ad-hoc utilities and
    /// are never auto-executed.
    pub stage_id: Option<String>,
    /// Ordered command lines, never reordered.
    pub lines: Vec<String>,
}

impl CommandScript {
    pub fn for_stage(stage_id: impl Into<String>, lines: Vec<String>) -> Self {
        let stage_id = stage_id.into();
        CommandScript {
            name: stage_id.clone(),
            stage_id: Some(stage_id),
            lines,
        }
    }

    pub fn utility(name: impl Into<String>, lines: Vec<String>) -> Self {
        CommandScript {
            name: name.into(),
            stage_id: None,
            lines,
        }
    }

    /// Deterministic, collision-free file name (`06_checkout` -> `06-checkout.sh`).
    pub fn file_name(&self) -> String {
        format!("{}.sh", self.name.replace('_', "-"))
    }
}

pub struct ScriptEmitter {
    scripts_dir: PathBuf,
    env: BTreeMap<String, String>,
}

impl ScriptEmitter {
    pub fn new(scripts_dir: impl Into<PathBuf>, env: BTreeMap<String, String>) -> Self {
        ScriptEmitter {
            scripts_dir: scripts_dir.into(),
            env,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn path_for(&self, script: &CommandScript) -> PathBuf {
        self.scripts_dir.join(script.file_name())
    }

    /// Delete previously generated scripts so a synthesize pass always
    /// starts from a clean slate. Only files carrying the generated marker
    /// are touched.
    pub fn clean_generated(&self) -> Result<usize> {
        let pattern = self.scripts_dir.join("*.sh");
        let Some(pattern) = pattern.to_str().map(String::from) else {
            return Ok(0);
        };

        let mut removed = 0;
        for entry in glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("Bad scripts dir pattern: {}", e)))?
            .filter_map(|e| e.ok())
        {
            let is_generated = fs::read_to_string(&entry)
                .map(|content| content.lines().nth(1) == Some(GENERATED_MARKER))
                .unwrap_or(false);
            if is_generated {
                fs::remove_file(&entry)?;
                removed += 1;
            }
        }

        if removed > 0 {
            log_status!("synth", "Removed {} stale generated scripts", removed);
        }
        Ok(removed)
    }

    /// Render and persist a script; returns the written path.
    pub fn emit(&self, script: &CommandScript, description: Option<&str>) -> Result<PathBuf> {
        fs::create_dir_all(&self.scripts_dir)?;
        let path = self.path_for(script);
        fs::write(&path, self.render(script, description))?;
        make_executable(&path)?;
        log_status!("synth", "Wrote {}", path.display());
        Ok(path)
    }

    /// Render the script text. Pure: two renders of the same script and
    /// environment are byte-identical.
    pub fn render(&self, script: &CommandScript, description: Option<&str>) -> String {
        let mut out = String::new();
        out.push_str("#!/bin/sh\n");
        out.push_str(GENERATED_MARKER);
        out.push('\n');

        match (&script.stage_id, description) {
            (Some(stage_id), Some(desc)) => {
                out.push_str(&format!("# stage {} -- {}\n", stage_id, desc));
            }
            (Some(stage_id), None) => {
                out.push_str(&format!("# stage {}\n", stage_id));
            }
            (None, _) => {
                out.push_str(&format!("# utility script {}\n", script.name));
            }
        }
        out.push('\n');

        // BTreeMap iteration keeps the export block stably sorted.
        // Values are always quoted so the export line survives any value.
        for (name, value) in &self.env {
            out.push_str(&format!(
                "export {}='{}'\n",
                name,
                shell::escape_single_quote_content(value)
            ));
        }
        if !self.env.is_empty() {
            out.push('\n');
        }

        for line in &script.lines {
            out.push_str(line);
            out.push('\n');
            if needs_exit_check(line) {
                out.push_str("rc=$?; if [ $rc -ne 0 ]; then exit $rc; fi\n");
            }
        }
        out
    }

    /// Execute a persisted script with inherited stdio and return its exit
    /// status unmodified. A termination without a code (signal) maps to -1.
    pub fn run(&self, path: &Path) -> Result<i32> {
        let status = Command::new("sh")
            .arg(path)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Does this line represent a real command (as opposed to a comment,
/// variable assignment or shell control construct)?
fn needs_exit_check(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    if is_assignment(trimmed) {
        return false;
    }

    const CONTROL: &[&str] = &[
        "if", "then", "else", "elif", "fi", "for", "while", "until", "do", "done", "case", "esac",
        "{", "}",
    ];
    let first = trimmed.split_whitespace().next().unwrap_or("");
    if CONTROL.contains(&first) {
        return false;
    }
    // `cmd; then` style openers are control lines too.
    if trimmed.ends_with("then") || trimmed.ends_with("do") {
        return false;
    }
    true
}

/// `NAME=value` or `export NAME=value` with a valid identifier. Every word
/// on the line must be an assignment: `CC=gcc make` is a command invocation
/// with a per-command environment, not an assignment.
fn is_assignment(line: &str) -> bool {
    let rest = line.strip_prefix("export ").unwrap_or(line).trim_start();
    let mut words = rest.split_whitespace();
    match words.next() {
        Some(first) if is_assignment_word(first) => words.all(is_assignment_word),
        _ => false,
    }
}

fn is_assignment_word(word: &str) -> bool {
    let Some(eq) = word.find('=') else {
        return false;
    };
    let name = &word[..eq];
    !name.is_empty()
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
