//! Two-phase pipeline engine: synthesize all scripts, execute selected ones.
//!
//! The phases are distinct operations, never a shared method branching on a
//! mode flag. Synthesize is selection-independent so every stage script
//! exists on disk for inspection and manual reruns; execute is fail-fast
//! across stages.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::registry::StageRegistry;
use crate::script::ScriptEmitter;
use crate::selection::Selection;
use crate::stage::SynthContext;

pub struct PipelineExecutor {
    registry: StageRegistry,
    emitter: ScriptEmitter,
    /// Stage id -> persisted script path, rebuilt by every synthesize pass.
    stage_scripts: BTreeMap<String, PathBuf>,
}

impl PipelineExecutor {
    pub fn new(registry: StageRegistry, emitter: ScriptEmitter) -> Self {
        PipelineExecutor {
            registry,
            emitter,
            stage_scripts: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn script_for(&self, stage_id: &str) -> Option<&Path> {
        self.stage_scripts.get(stage_id).map(PathBuf::as_path)
    }

    /// Call every stage body in ascending order and persist the scripts it
    /// emits. Nothing is executed. Stale generated scripts are deleted
    /// first, so two passes over an unchanged configuration produce
    /// byte-identical files.
    pub fn synthesize(&mut self, ctx: &SynthContext) -> Result<()> {
        self.stage_scripts.clear();
        self.emitter.clean_generated()?;

        // Stage bodies are free to chdir while composing commands; the
        // working directory is restored after every body.
        let original_dir = env::current_dir()?;

        for stage in self.registry.stages() {
            let produced = (stage.body)(ctx);
            env::set_current_dir(&original_dir)?;
            let produced = produced?;

            for script in produced {
                let path = self.emitter.emit(&script, Some(&stage.description))?;
                if script.stage_id.as_deref() == Some(stage.id.as_str()) {
                    self.stage_scripts.insert(stage.id.clone(), path);
                }
            }
        }

        log_status!(
            "synth",
            "Synthesized {} stage scripts in {}",
            self.stage_scripts.len(),
            self.emitter.scripts_dir().display()
        );
        Ok(())
    }

    /// Run the scripts of the selected stages in ascending registry order.
    /// The first non-zero exit aborts the whole run; stages with no emitted
    /// script are skipped silently.
    pub fn execute(&self, selection: &Selection) -> Result<()> {
        for stage in self.registry.stages() {
            if !selection.is_selected(&stage.id) {
                continue;
            }
            let Some(path) = self.stage_scripts.get(&stage.id) else {
                continue;
            };

            log_status!("run", "Stage {} -- {}", stage.id, stage.description);
            let code = self.emitter.run(path)?;
            if code != 0 {
                return Err(Error::StageExecutionFailed {
                    stage: stage.id.clone(),
                    code,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::CommandScript;
    use crate::selection::{self, SelectionRequest};
    use crate::stage::{Stage, StageBody};
    use std::fs;
    use tempfile::TempDir;

    fn stage_with_lines(id: &str, lines: Vec<String>) -> Stage {
        let owned = id.to_string();
        let body: StageBody =
            Box::new(move |_| Ok(vec![CommandScript::for_stage(owned.clone(), lines.clone())]));
        Stage::new(id, format!("stage {}", id), [], body).unwrap()
    }

    fn silent_stage(id: &str) -> Stage {
        let body: StageBody = Box::new(|_| Ok(Vec::new()));
        Stage::new(id, format!("stage {}", id), [], body).unwrap()
    }

    fn ctx() -> SynthContext {
        SynthContext::new(Default::default())
    }

    fn select_all(registry: &StageRegistry) -> Selection {
        let request = SelectionRequest {
            composites: vec![crate::selection::Composite::All],
            ..Default::default()
        };
        selection::resolve(&request, registry).unwrap()
    }

    #[test]
    fn synthesize_materializes_every_stage_script() {
        let dir = TempDir::new().unwrap();
        let registry = StageRegistry::discover(vec![
            stage_with_lines("01_a", vec!["true".to_string()]),
            stage_with_lines("05_b", vec!["true".to_string()]),
        ])
        .unwrap();
        let emitter = ScriptEmitter::new(dir.path(), Default::default());
        let mut executor = PipelineExecutor::new(registry, emitter);

        executor.synthesize(&ctx()).unwrap();
        assert!(dir.path().join("01-a.sh").exists());
        assert!(dir.path().join("05-b.sh").exists());
        assert!(executor.script_for("01_a").is_some());
    }

    #[test]
    #[cfg(unix)]
    fn execute_runs_only_selected_stages_in_order() {
        let dir = TempDir::new().unwrap();
        let trace = dir.path().join("trace.txt");
        let trace_str = trace.display().to_string();

        let registry = StageRegistry::discover(vec![
            stage_with_lines("01_a", vec![format!("echo a >> {}", trace_str)]),
            stage_with_lines("05_b", vec![format!("echo b >> {}", trace_str)]),
            stage_with_lines("10_c", vec![format!("echo c >> {}", trace_str)]),
        ])
        .unwrap();
        let emitter = ScriptEmitter::new(dir.path(), Default::default());
        let mut executor = PipelineExecutor::new(registry, emitter);
        executor.synthesize(&ctx()).unwrap();

        // Request stages out of order; run order is still the registry's.
        let request = SelectionRequest {
            explicit: ["10_c".to_string(), "01_a".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let selection = selection::resolve(&request, executor.registry()).unwrap();
        executor.execute(&selection).unwrap();

        assert_eq!(fs::read_to_string(&trace).unwrap(), "a\nc\n");
    }

    #[test]
    #[cfg(unix)]
    fn failing_stage_halts_all_later_stages() {
        let dir = TempDir::new().unwrap();
        let witness = dir.path().join("witness.txt");

        let registry = StageRegistry::discover(vec![
            stage_with_lines("05_b", vec!["exit 3".to_string()]),
            stage_with_lines("10_c", vec![format!("touch {}", witness.display())]),
        ])
        .unwrap();
        let emitter = ScriptEmitter::new(dir.path(), Default::default());
        let mut executor = PipelineExecutor::new(registry, emitter);
        executor.synthesize(&ctx()).unwrap();

        let selection = select_all(executor.registry());
        let err = executor.execute(&selection).unwrap_err();
        match err {
            Error::StageExecutionFailed { stage, code } => {
                assert_eq!(stage, "05_b");
                assert_eq!(code, 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!witness.exists(), "stage after the failure must not run");
    }

    #[test]
    fn stage_without_script_is_skipped_silently() {
        let dir = TempDir::new().unwrap();
        let registry = StageRegistry::discover(vec![silent_stage("01_a")]).unwrap();
        let emitter = ScriptEmitter::new(dir.path(), Default::default());
        let mut executor = PipelineExecutor::new(registry, emitter);
        executor.synthesize(&ctx()).unwrap();

        let selection = select_all(executor.registry());
        executor.execute(&selection).unwrap();
    }

    #[test]
    fn synthesize_restores_working_directory_after_each_body() {
        let dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let elsewhere_path = elsewhere.path().to_path_buf();

        let body: StageBody = Box::new(move |_| {
            env::set_current_dir(&elsewhere_path).unwrap();
            Ok(Vec::new())
        });
        let registry =
            StageRegistry::discover(vec![Stage::new("01_a", "chdir body", [], body).unwrap()])
                .unwrap();
        let emitter = ScriptEmitter::new(dir.path(), Default::default());
        let mut executor = PipelineExecutor::new(registry, emitter);

        let before = env::current_dir().unwrap();
        executor.synthesize(&ctx()).unwrap();
        assert_eq!(env::current_dir().unwrap(), before);
    }

    #[test]
    fn synthesize_twice_produces_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let registry = StageRegistry::discover(vec![stage_with_lines(
            "01_a",
            vec!["wget -c https://example.com/f".to_string()],
        )])
        .unwrap();
        let emitter = ScriptEmitter::new(dir.path(), Default::default());
        let mut executor = PipelineExecutor::new(registry, emitter);

        executor.synthesize(&ctx()).unwrap();
        let first = fs::read(dir.path().join("01-a.sh")).unwrap();
        executor.synthesize(&ctx()).unwrap();
        let second = fs::read(dir.path().join("01-a.sh")).unwrap();
        assert_eq!(first, second);
    }
}
