//! The builtin stage table.
//!
//! Explicit registration, one place: every stage the pipeline offers is
//! listed here with its order prefix, description, tags and body. Bodies
//! only assemble command lines from the loaded configuration; the command
//! text itself is opaque to the engine.

use std::collections::BTreeSet;

use crate::config::WheelsConfig;
use crate::error::{Error, Result};
use crate::registry::StageRegistry;
use crate::script::CommandScript;
use crate::stage::{Stage, StageTag, SynthContext};
use crate::utils::shell::quote_arg;
use crate::wheelhouse::{self, TieBreak, Tier};

/// Build the full stage registry.
pub fn registry() -> Result<StageRegistry> {
    use StageTag::*;
    StageRegistry::discover(vec![
        Stage::new(
            "01_download",
            "download binary inputs",
            [Download],
            Box::new(download_body),
        )?,
        Stage::new(
            "06_checkout",
            "checkout sources",
            [Checkout],
            Box::new(checkout_body),
        )?,
        Stage::new(
            "10_install",
            "bootstrap the build interpreter",
            [Install],
            Box::new(install_body),
        )?,
        Stage::new(
            "20_download_wheels",
            "download dependency wheels",
            [Download, Wheel],
            Box::new(download_wheels_body),
        )?,
        Stage::new(
            "30_build_wheels",
            "build wheels from checked-out sources",
            [Build, Wheel],
            Box::new(build_wheels_body),
        )?,
        Stage::new(
            "40_install_wheels",
            "install the winning wheel per package",
            [Install, Build, Wheel],
            Box::new(install_wheels_body),
        )?,
        Stage::new(
            "50_build_projects",
            "compile project entry points to executables",
            [Build],
            Box::new(build_projects_body),
        )?,
        Stage::new(
            "60_pack",
            "assemble the output folder layout",
            [Pack],
            Box::new(pack_body),
        )?,
        Stage::new(
            "70_audit",
            "write the installed package inventory",
            [Audit],
            Box::new(audit_body),
        )?,
    ])
}

/// Wheel tier stack, lowest precedence first: transitively downloaded
/// dependencies (oldest wins inside the tier), forced external wheels,
/// then our own builds.
pub fn wheel_tiers(wheels: &WheelsConfig) -> Vec<Tier> {
    vec![
        Tier::new("deps", &wheels.deps_dir, TieBreak::Oldest),
        Tier::new("ext", &wheels.ext_dir, TieBreak::Newest),
        Tier::new("ours", &wheels.our_dir, TieBreak::Newest),
    ]
}

fn download_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    if cfg.downloads.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for dl in &cfg.downloads {
        let line = match &dl.filename {
            Some(name) => format!(
                "wget --no-check-certificate -c -O {}/{} {}",
                cfg.paths.bin_dir,
                name,
                quote_arg(&dl.url)
            ),
            None => format!(
                "wget --no-check-certificate -c -P {} {}",
                cfg.paths.bin_dir,
                quote_arg(&dl.url)
            ),
        };
        lines.push(line);
    }
    Ok(vec![CommandScript::for_stage("01_download", lines)])
}

fn checkout_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    if cfg.sources.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for source in &cfg.sources {
        let dest = format!("{}/{}", cfg.paths.src_dir, source.dir_name());
        let branch = source.branch.as_deref().unwrap_or("master");
        lines.push(format!("if [ -d {} ]; then", dest));
        lines.push(format!("  git -C {} fetch origin {}", dest, branch));
        lines.push(format!("  git -C {} checkout {}", dest, branch));
        lines.push("else".to_string());
        lines.push(format!(
            "  git clone --branch {} {} {}",
            branch,
            quote_arg(&source.url),
            dest
        ));
        lines.push("fi".to_string());
    }
    Ok(vec![CommandScript::for_stage("06_checkout", lines)])
}

fn install_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let python = &ctx.config.python.interpreter;
    let lines = vec![
        format!("{} -m ensurepip --upgrade", python),
        format!("{} -m pip install --upgrade pip wheel", python),
    ];
    Ok(vec![CommandScript::for_stage("10_install", lines)])
}

fn download_wheels_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    let Some(requirements) = &cfg.python.requirements else {
        return Ok(Vec::new());
    };

    let lines = vec![format!(
        "{} -m pip download -r {} -d {}",
        cfg.python.interpreter, requirements, cfg.wheels.deps_dir
    )];
    Ok(vec![CommandScript::for_stage("20_download_wheels", lines)])
}

fn build_wheels_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    if cfg.sources.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for source in &cfg.sources {
        lines.push(format!(
            "{} -m pip wheel --no-deps -w {} {}/{}",
            cfg.python.interpreter,
            cfg.wheels.our_dir,
            cfg.paths.src_dir,
            source.dir_name()
        ));
    }
    Ok(vec![CommandScript::for_stage("30_build_wheels", lines)])
}

/// Installs exactly one wheel per logical package, chosen by the tiered
/// version resolver.
fn install_wheels_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    let winners = wheelhouse::resolve(&wheel_tiers(&cfg.wheels))?;
    if winners.is_empty() {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for artifact in winners.values() {
        lines.push(format!(
            "{} -m pip install --no-deps --force-reinstall --ignore-installed {}",
            cfg.python.interpreter,
            artifact.path.display()
        ));
    }
    Ok(vec![CommandScript::for_stage("40_install_wheels", lines)])
}

fn build_projects_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    if cfg.projects.is_empty() {
        return Ok(Vec::new());
    }

    // Script names derive from the entry point stem; a duplicate stem
    // would silently overwrite the earlier project's script.
    let mut seen = BTreeSet::new();
    for project in &cfg.projects {
        if !seen.insert(project.name()) {
            return Err(Error::Config(format!(
                "Duplicate project name '{}': entry point file stems must be unique",
                project.name()
            )));
        }
    }

    let mut scripts = Vec::new();
    let mut stage_lines = Vec::new();

    for project in &cfg.projects {
        let mut lines = Vec::new();
        let mut cmd = format!(
            "{} -m nuitka --standalone --output-dir={}/build",
            cfg.python.interpreter, cfg.paths.out_dir
        );
        for pkg in &project.include_packages {
            cmd.push_str(&format!(" --include-package={}", pkg));
        }
        if let Some(flags) = &project.flags {
            cmd.push(' ');
            cmd.push_str(flags);
        }
        cmd.push_str(&format!(" {}/{}", cfg.paths.src_dir, project.entry));
        lines.push(cmd);

        // One standalone script per project, callable by hand; the stage
        // script just chains them.
        let util = CommandScript::utility(format!("build_{}", project.name()), lines);
        stage_lines.push(format!(
            "sh {}/{}",
            cfg.paths.scripts_dir,
            util.file_name()
        ));
        scripts.push(util);
    }

    scripts.push(CommandScript::for_stage("50_build_projects", stage_lines));
    Ok(scripts)
}

fn pack_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    if cfg.pack.is_empty() {
        return Ok(Vec::new());
    }

    let dist = format!("{}/dist", cfg.paths.out_dir);
    let mut lines = vec![format!("rm -rf {}", dist), format!("mkdir -p {}", dist)];
    for (folder, sources) in &cfg.pack {
        let dest = format!("{}/{}", dist, folder);
        lines.push(format!("mkdir -p {}", dest));
        for source in sources {
            lines.push(format!("cp -r {} {}/", quote_arg(source), dest));
        }
    }
    Ok(vec![CommandScript::for_stage("60_pack", lines)])
}

fn audit_body(ctx: &SynthContext) -> Result<Vec<CommandScript>> {
    let cfg = &ctx.config;
    let lines = vec![
        format!("mkdir -p {}", cfg.paths.out_dir),
        format!(
            "{} -m pip list --format=freeze > {}/package-inventory.txt",
            cfg.python.interpreter, cfg.paths.out_dir
        ),
    ];
    Ok(vec![CommandScript::for_stage("70_audit", lines)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use std::fs::File;
    use tempfile::TempDir;

    fn ctx_from(toml_src: &str) -> SynthContext {
        let config: PipelineConfig = toml::from_str(toml_src).unwrap();
        SynthContext::new(config)
    }

    #[test]
    fn builtin_registry_is_valid_and_ordered() {
        let registry = registry().unwrap();
        assert_eq!(registry.len(), 9);
        let orders: Vec<u32> = registry.stages().iter().map(|s| s.order).collect();
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
        assert!(registry.lookup("40_install_wheels").is_ok());
    }

    #[test]
    fn empty_config_stages_emit_no_scripts() {
        let ctx = ctx_from("");
        assert!(download_body(&ctx).unwrap().is_empty());
        assert!(checkout_body(&ctx).unwrap().is_empty());
        assert!(download_wheels_body(&ctx).unwrap().is_empty());
        assert!(build_projects_body(&ctx).unwrap().is_empty());
        assert!(pack_body(&ctx).unwrap().is_empty());
    }

    #[test]
    fn checkout_body_emits_clone_or_fetch_per_source() {
        let ctx = ctx_from(
            r#"
            [[sources]]
            url = "https://example.com/repos/marker.git"
            branch = "main"
            "#,
        );
        let scripts = checkout_body(&ctx).unwrap();
        assert_eq!(scripts.len(), 1);
        let lines = &scripts[0].lines;
        assert!(lines.iter().any(|l| l.contains("git clone --branch main")));
        assert!(lines.iter().any(|l| l.contains("in/src/marker")));
    }

    #[test]
    fn install_wheels_body_uses_tier_winners() {
        let dir = TempDir::new().unwrap();
        let ours = dir.path().join("ourwheel");
        std::fs::create_dir_all(&ours).unwrap();
        File::create(ours.join("pkg-1.2.0-py3-none-any.whl")).unwrap();

        let ctx = ctx_from(&format!(
            r#"
            [wheels]
            deps_dir = "{0}/depswheel"
            ext_dir = "{0}/extwheel"
            our_dir = "{0}/ourwheel"
            "#,
            dir.path().display()
        ));
        let scripts = install_wheels_body(&ctx).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].lines.len(), 1);
        assert!(scripts[0].lines[0].contains("pkg-1.2.0-py3-none-any.whl"));
        assert!(scripts[0].lines[0].contains("pip install --no-deps"));
    }

    #[test]
    fn build_projects_emits_utility_script_per_project() {
        let ctx = ctx_from(
            r#"
            [[projects]]
            entry = "marker/cli.py"
            include_packages = ["marker"]
            "#,
        );
        let scripts = build_projects_body(&ctx).unwrap();
        assert_eq!(scripts.len(), 2);

        let util = &scripts[0];
        assert!(util.stage_id.is_none());
        assert_eq!(util.file_name(), "build-cli.sh");
        assert!(util.lines[0].contains("--include-package=marker"));

        let stage = &scripts[1];
        assert_eq!(stage.stage_id.as_deref(), Some("50_build_projects"));
        assert!(stage.lines[0].contains("scripts/build-cli.sh"));
    }

    #[test]
    fn duplicate_project_stems_are_rejected() {
        let ctx = ctx_from(
            r#"
            [[projects]]
            entry = "a/cli.py"

            [[projects]]
            entry = "b/cli.py"
            "#,
        );
        let err = build_projects_body(&ctx).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn wheel_tiers_order_and_policies() {
        let tiers = wheel_tiers(&Default::default());
        let labels: Vec<&str> = tiers.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["deps", "ext", "ours"]);
        assert_eq!(tiers[0].policy, TieBreak::Oldest);
        assert_eq!(tiers[1].policy, TieBreak::Newest);
        assert_eq!(tiers[2].policy, TieBreak::Newest);
    }
}
