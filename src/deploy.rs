use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DeployConfig;
use crate::fs_util::{clear_folder, link_path, remove_path};
use crate::manifest::{ManifestError, ModuleSpec, Modules, validate_module_name};
use crate::planner::{ModuleAction, Strategy, resolve_action};
use crate::runner::CommandRunner;

#[derive(Debug, Serialize)]
pub struct DeployReport {
    pub strategy: Strategy,
    pub target_dir: PathBuf,
    pub cloned: Vec<String>,
    pub linked: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiera: Option<PathBuf>,
}

impl DeployReport {
    fn new(strategy: Strategy, target_dir: &Path) -> Self {
        Self {
            strategy,
            target_dir: target_dir.to_path_buf(),
            cloned: Vec::new(),
            linked: Vec::new(),
            hiera: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("cloning module '{module}' failed with {status}: {stderr}")]
    Clone {
        module: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("cloning module '{module}'")]
    Spawn {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    InvalidModule(#[from] ManifestError),
    #[error("clone destination {} is not valid UTF-8", path.display())]
    NonUtf8Path { path: PathBuf },
    #[error("{action} {}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn fs_error<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> DeployError + 'a {
    move |source| DeployError::Filesystem {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Run `<vcs> clone <url> -b <ref> <target_base_dir>/<name>`.
///
/// Output is captured only to keep it off the console; a non-zero exit is
/// reported with whatever the tool wrote to stderr.
pub fn clone_module(
    runner: &dyn CommandRunner,
    vcs_program: &str,
    (name, spec): (&str, &ModuleSpec),
    target_base_dir: &Path,
) -> Result<PathBuf, DeployError> {
    validate_module_name(name)?;
    let destination = target_base_dir.join(name);
    let Some(destination_arg) = destination.to_str() else {
        return Err(DeployError::NonUtf8Path {
            path: destination.clone(),
        });
    };
    debug!(module = name, url = %spec.url, git_ref = %spec.git_ref, "cloning");

    let output = runner
        .run(
            vcs_program,
            &[
                "clone",
                spec.url.as_str(),
                "-b",
                spec.git_ref.as_str(),
                destination_arg,
            ],
        )
        .map_err(|source| DeployError::Spawn {
            module: name.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(DeployError::Clone {
            module: name.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    info!(module = name, git_ref = %spec.git_ref, "cloned");
    Ok(destination)
}

/// Wipe `target_base_dir` and clone every module into it.
///
/// Stops at the first failure; modules already cloned are left in place.
pub fn deploy_modules(
    runner: &dyn CommandRunner,
    vcs_program: &str,
    target_base_dir: &Path,
    modules: &Modules,
) -> Result<DeployReport, DeployError> {
    for name in modules.keys() {
        validate_module_name(name)?;
    }
    clear_folder(target_base_dir).map_err(fs_error("clearing", target_base_dir))?;

    let mut report = DeployReport::new(Strategy::Standard, target_base_dir);
    for (name, spec) in modules {
        clone_module(runner, vcs_program, (name.as_str(), spec), target_base_dir)?;
        report.cloned.push(name.clone());
    }

    Ok(report)
}

/// Link each module from the optional cache when present, clone it otherwise,
/// then point the hiera directory at the configured hiera source.
pub fn deploy_modules_vagrant(
    runner: &dyn CommandRunner,
    config: &DeployConfig,
    target_base_dir: &Path,
    modules: &Modules,
) -> Result<DeployReport, DeployError> {
    std::fs::create_dir_all(target_base_dir).map_err(fs_error("creating", target_base_dir))?;

    let mut report = DeployReport::new(Strategy::Vagrant, target_base_dir);
    for (name, spec) in modules {
        validate_module_name(name)?;
        let destination = target_base_dir.join(name);
        remove_path(&destination).map_err(fs_error("removing", &destination))?;

        match resolve_action(&config.opt_modules_dir, name, spec) {
            ModuleAction::Link { source } => {
                link_path(&source, &destination).map_err(fs_error("linking", &destination))?;
                info!(module = %name, source = %source.display(), "linked from cache");
                report.linked.push(name.clone());
            }
            ModuleAction::Clone { .. } => {
                clone_module(
                    runner,
                    &config.vcs_program,
                    (name.as_str(), spec),
                    target_base_dir,
                )?;
                report.cloned.push(name.clone());
            }
        }
    }

    let hiera_dir = config.hiera_dir();
    deploy_hiera(&hiera_dir, &config.hiera_source)?;
    report.hiera = Some(hiera_dir);

    Ok(report)
}

/// Replace whatever is at `hiera_dir` with a symlink to `hiera_source`.
pub fn deploy_hiera(hiera_dir: &Path, hiera_source: &Path) -> Result<(), DeployError> {
    remove_path(hiera_dir).map_err(fs_error("removing", hiera_dir))?;
    link_path(hiera_source, hiera_dir).map_err(fs_error("linking", hiera_dir))?;
    info!(
        hiera_dir = %hiera_dir.display(),
        source = %hiera_source.display(),
        "linked hiera data"
    );
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::{DeployError, clone_module, deploy_hiera, deploy_modules, deploy_modules_vagrant};
    use crate::config::DeployConfig;
    use crate::manifest::{ModuleSpec, Modules};
    use crate::runner::testing::RecordingRunner;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn modules() -> Modules {
        [
            (
                "roles".to_string(),
                ModuleSpec::new("https://github.com/vision-it/puppet-roles.git", "production"),
            ),
            (
                "other_mod".to_string(),
                ModuleSpec::new("https://github.com/vision-it/puppet-other.git", "master"),
            ),
        ]
        .into()
    }

    struct Sandbox {
        _root: TempDir,
        config: DeployConfig,
        target: PathBuf,
    }

    fn sandbox() -> Sandbox {
        let root = tempfile::tempdir().unwrap();
        let config = DeployConfig {
            code_dir: root.path().join("code"),
            opt_modules_dir: root.path().join("opt/modules"),
            hiera_source: root.path().join("opt/hiera"),
            ..DeployConfig::default()
        };
        fs::create_dir_all(&config.opt_modules_dir).unwrap();
        fs::create_dir_all(&config.hiera_source).unwrap();
        fs::create_dir_all(config.hiera_dir().parent().unwrap()).unwrap();
        let target = config.modules_dir();
        Sandbox {
            _root: root,
            config,
            target,
        }
    }

    fn is_link_to(link: &Path, source: &Path) -> bool {
        fs::symlink_metadata(link)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
            && fs::read_link(link).unwrap() == source
    }

    #[test]
    fn clone_module_issues_single_clone() {
        let runner = RecordingRunner::new();
        let spec = ModuleSpec::new("https://example.com/r.git", "production");

        let destination = clone_module(&runner, "git", ("roles", &spec), Path::new("/base")).unwrap();

        assert_eq!(destination, Path::new("/base/roles"));
        assert_eq!(
            runner.calls(),
            vec![vec![
                "git".to_string(),
                "clone".to_string(),
                "https://example.com/r.git".to_string(),
                "-b".to_string(),
                "production".to_string(),
                "/base/roles".to_string(),
            ]]
        );
    }

    #[test]
    fn clone_failure_carries_stderr() {
        let runner = RecordingRunner::failing_on("r.git");
        let spec = ModuleSpec::new("https://example.com/r.git", "production");

        let err = clone_module(&runner, "git", ("roles", &spec), Path::new("/base"))
            .expect_err("clone should fail");

        match err {
            DeployError::Clone { module, stderr, .. } => {
                assert_eq!(module, "roles");
                assert!(stderr.contains("repository not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn deploy_modules_clears_then_clones_each() {
        let sandbox = sandbox();
        fs::create_dir_all(sandbox.target.join("stale/manifests")).unwrap();
        let runner = RecordingRunner::new();

        let report = deploy_modules(&runner, "git", &sandbox.target, &modules()).unwrap();

        assert_eq!(runner.call_count(), 2);
        assert!(sandbox.target.is_dir());
        assert!(!sandbox.target.join("stale").exists());
        assert_eq!(report.cloned, vec!["other_mod", "roles"]);
        assert!(report.linked.is_empty());
    }

    #[test]
    fn deploy_modules_stops_at_first_failure() {
        let sandbox = sandbox();
        let runner = RecordingRunner::failing_on("puppet-other");

        let err = deploy_modules(&runner, "git", &sandbox.target, &modules())
            .expect_err("first clone fails");

        assert!(matches!(err, DeployError::Clone { ref module, .. } if module == "other_mod"));
        assert_eq!(runner.call_count(), 1);
    }

    #[test]
    fn vagrant_clones_when_cache_is_empty() {
        let sandbox = sandbox();
        let runner = RecordingRunner::new();

        let report =
            deploy_modules_vagrant(&runner, &sandbox.config, &sandbox.target, &modules()).unwrap();

        assert_eq!(runner.call_count(), 2);
        assert!(report.linked.is_empty());
        assert_eq!(report.hiera.as_deref(), Some(sandbox.config.hiera_dir().as_path()));
        assert!(is_link_to(&sandbox.config.hiera_dir(), &sandbox.config.hiera_source));
    }

    #[test]
    fn vagrant_links_cached_modules() {
        let sandbox = sandbox();
        for name in ["roles", "other_mod"] {
            fs::create_dir(sandbox.config.opt_modules_dir.join(name)).unwrap();
        }
        let runner = RecordingRunner::new();

        let report =
            deploy_modules_vagrant(&runner, &sandbox.config, &sandbox.target, &modules()).unwrap();

        assert_eq!(runner.call_count(), 0);
        assert_eq!(report.linked.len(), 2);
        for name in ["roles", "other_mod"] {
            assert!(is_link_to(
                &sandbox.target.join(name),
                &sandbox.config.opt_modules_dir.join(name)
            ));
        }
        assert!(is_link_to(&sandbox.config.hiera_dir(), &sandbox.config.hiera_source));
    }

    #[test]
    fn vagrant_replaces_previous_run() {
        let sandbox = sandbox();
        fs::create_dir(sandbox.config.opt_modules_dir.join("roles")).unwrap();
        let runner = RecordingRunner::new();

        deploy_modules_vagrant(&runner, &sandbox.config, &sandbox.target, &modules()).unwrap();
        fs::create_dir_all(sandbox.target.join("other_mod")).unwrap();
        let report =
            deploy_modules_vagrant(&runner, &sandbox.config, &sandbox.target, &modules()).unwrap();

        assert_eq!(report.linked, vec!["roles"]);
        assert_eq!(report.cloned, vec!["other_mod"]);
        assert!(!sandbox.target.join("other_mod").exists());
        assert!(sandbox.config.opt_modules_dir.join("roles").is_dir());
    }

    #[test]
    fn deploy_hiera_replaces_directory_with_link() {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("opt/puppet/hiera");
        fs::create_dir_all(&source).unwrap();
        let hiera_dir = root.path().join("hiera/foobar");
        fs::create_dir_all(hiera_dir.join("nodes")).unwrap();

        deploy_hiera(&hiera_dir, &source).unwrap();

        assert!(is_link_to(&hiera_dir, &source));
    }

    #[test]
    fn deploy_hiera_fails_without_parent() {
        let root = tempfile::tempdir().unwrap();
        let hiera_dir = root.path().join("missing/parent/production");

        let err = deploy_hiera(&hiera_dir, Path::new("/opt/puppet/hiera"))
            .expect_err("parent does not exist");

        assert!(matches!(err, DeployError::Filesystem { action: "linking", .. }));
    }

    #[test]
    fn escaping_module_name_is_refused_before_touching_disk() {
        let sandbox = sandbox();
        let manifest = sandbox.config.environment_dir().join("modules.yaml");
        fs::create_dir_all(&sandbox.target).unwrap();
        fs::write(&manifest, "default: {}\n").unwrap();
        let modules: Modules = [(
            "..".to_string(),
            ModuleSpec::new("https://example.com/r.git", "production"),
        )]
        .into();
        let runner = RecordingRunner::new();

        let err = deploy_modules_vagrant(&runner, &sandbox.config, &sandbox.target, &modules)
            .expect_err("'..' must be refused");
        assert!(matches!(err, DeployError::InvalidModule(_)));
        let err = deploy_modules(&runner, "git", &sandbox.target, &modules)
            .expect_err("'..' must be refused");
        assert!(matches!(err, DeployError::InvalidModule(_)));

        assert!(manifest.is_file());
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn non_utf8_destination_is_an_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let runner = RecordingRunner::new();
        let base = Path::new(OsStr::from_bytes(b"/base/\xff"));
        let spec = ModuleSpec::new("https://example.com/r.git", "production");

        let err = clone_module(&runner, "git", ("roles", &spec), base)
            .expect_err("destination is not UTF-8");

        assert!(matches!(err, DeployError::NonUtf8Path { .. }));
        assert_eq!(runner.call_count(), 0);
    }
}
