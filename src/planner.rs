use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::DeployConfig;
use crate::env_detect::is_vagrant;
use crate::fs_util::has_opt_module;
use crate::manifest::{ModuleSpec, Modules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Wipe the target directory and clone every module.
    Standard,
    /// Link modules from the optional cache where possible, then link hiera.
    Vagrant,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Standard => f.write_str("standard"),
            Strategy::Vagrant => f.write_str("vagrant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ModuleAction {
    Clone {
        url: String,
        #[serde(rename = "ref")]
        git_ref: String,
    },
    Link {
        source: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct PlannedModule {
    pub name: String,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub action: ModuleAction,
}

#[derive(Debug, Serialize)]
pub struct HieraLink {
    pub link: PathBuf,
    pub source: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct DeployPlan {
    pub strategy: Strategy,
    pub location: String,
    pub target_dir: PathBuf,
    pub clears_target: bool,
    pub modules: Vec<PlannedModule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiera: Option<HieraLink>,
}

/// Use `requested` when given, otherwise pick vagrant only inside a guest.
pub fn choose_strategy(requested: Option<Strategy>, config: &DeployConfig) -> Strategy {
    let strategy = requested.unwrap_or_else(|| {
        if is_vagrant(&config.vagrant_indicator) {
            Strategy::Vagrant
        } else {
            Strategy::Standard
        }
    });
    debug!(%strategy, explicit = requested.is_some(), "chose deploy strategy");
    strategy
}

/// Link from the optional cache when it holds `name`, clone otherwise.
pub fn resolve_action(opt_modules_dir: &Path, name: &str, spec: &ModuleSpec) -> ModuleAction {
    if has_opt_module(opt_modules_dir, Some(name)) {
        ModuleAction::Link {
            source: opt_modules_dir.join(name),
        }
    } else {
        ModuleAction::Clone {
            url: spec.url.clone(),
            git_ref: spec.git_ref.clone(),
        }
    }
}

/// Describe what a deploy would do without touching the filesystem.
pub fn plan_deploy(
    modules: &Modules,
    strategy: Strategy,
    location: &str,
    config: &DeployConfig,
) -> DeployPlan {
    let target_dir = config.modules_dir();

    let planned = modules
        .iter()
        .map(|(name, spec)| {
            let action = match strategy {
                Strategy::Standard => ModuleAction::Clone {
                    url: spec.url.clone(),
                    git_ref: spec.git_ref.clone(),
                },
                Strategy::Vagrant => resolve_action(&config.opt_modules_dir, name, spec),
            };
            PlannedModule {
                name: name.clone(),
                destination: target_dir.join(name),
                action,
            }
        })
        .collect();

    let hiera = (strategy == Strategy::Vagrant).then(|| HieraLink {
        link: config.hiera_dir(),
        source: config.hiera_source.clone(),
    });

    DeployPlan {
        strategy,
        location: location.to_string(),
        clears_target: strategy == Strategy::Standard,
        target_dir,
        modules: planned,
        hiera,
    }
}
