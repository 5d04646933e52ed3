use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MANIFEST_FILE: &str = "modules.yaml";
pub const DEFAULT_SECTION: &str = "default";

/// Where to fetch a module from and which branch, tag or commit to check out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl ModuleSpec {
    pub fn new(url: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            git_ref: git_ref.into(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ManifestError> {
        if self.url.trim().is_empty() {
            return Err(ManifestError::InvalidModule {
                module: name.to_string(),
                reason: "url cannot be empty".to_string(),
            });
        }
        if self.git_ref.trim().is_empty() {
            return Err(ManifestError::InvalidModule {
                module: name.to_string(),
                reason: "ref cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Reject names that would not land exactly one level below the target
/// directory once joined onto it.
pub fn validate_module_name(name: &str) -> Result<(), ManifestError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(ManifestError::InvalidModule {
            module: name.to_string(),
            reason: "name must be a single path component".to_string(),
        }),
    }
}

/// Module name to its source, after location overrides have been applied.
pub type Modules = BTreeMap<String, ModuleSpec>;

type Sections = BTreeMap<String, Option<Modules>>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading manifest at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing manifest at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("module '{module}' is invalid: {reason}")]
    InvalidModule { module: String, reason: String },
}

pub fn load_yaml(path: &Path) -> Result<Value, ManifestError> {
    let data = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `modules.yaml` from `directory` and resolve it for `location`.
///
/// The file name is always [`DEFAULT_MANIFEST_FILE`]; use
/// [`load_modules_from`] to honour a configured name.
/// A missing directory or file yields an empty mapping.
pub fn load_modules(directory: &Path, location: &str) -> Result<Modules, ManifestError> {
    load_modules_from(&directory.join(DEFAULT_MANIFEST_FILE), location)
}

pub fn load_modules_from(path: &Path, location: &str) -> Result<Modules, ManifestError> {
    if !path.is_file() {
        warn!(path = %path.display(), "no module manifest found, deploying nothing");
        return Ok(Modules::new());
    }

    let document = load_yaml(path)?;
    let sections = sections_of(document, path)?;
    let modules = merge_sections(sections, location);

    for (name, spec) in &modules {
        validate_module_name(name)?;
        spec.validate(name)?;
    }

    debug!(
        path = %path.display(),
        location,
        count = modules.len(),
        "resolved module manifest"
    );
    Ok(modules)
}

// Sections may be nested under a top-level `modules:` key or sit at the root.
fn sections_of(document: Value, path: &Path) -> Result<Sections, ManifestError> {
    let body = match document {
        Value::Null => return Ok(Sections::new()),
        Value::Mapping(mut map) => match map.remove("modules") {
            Some(inner) => inner,
            None => Value::Mapping(map),
        },
        other => other,
    };

    serde_yaml::from_value::<Option<Sections>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn merge_sections(mut sections: Sections, location: &str) -> Modules {
    let mut modules = sections
        .remove(DEFAULT_SECTION)
        .flatten()
        .unwrap_or_default();

    if let Some(overrides) = sections.remove(location).flatten() {
        debug!(location, count = overrides.len(), "applying location overrides");
        modules.extend(overrides);
    }

    modules
}
