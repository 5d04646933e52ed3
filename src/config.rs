use std::path::PathBuf;

/// Paths and programs used by a deployment run.
///
/// Nothing in the deployers reaches for a hard-coded location; every path
/// they touch is derived from one of these fields.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub vcs_program: String,
    pub fact_command: String,
    pub code_dir: PathBuf,
    pub environment: String,
    pub opt_modules_dir: PathBuf,
    pub hiera_source: PathBuf,
    pub vagrant_indicator: PathBuf,
    pub manifest_file: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            vcs_program: "git".to_string(),
            fact_command: "facter location".to_string(),
            code_dir: PathBuf::from("/etc/puppetlabs/code"),
            environment: "production".to_string(),
            opt_modules_dir: PathBuf::from("/opt/puppet/modules"),
            hiera_source: PathBuf::from("/opt/puppet/hiera"),
            vagrant_indicator: PathBuf::from("/vagrant"),
            manifest_file: "modules.yaml".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn environments_dir(&self) -> PathBuf {
        self.code_dir.join("environments")
    }

    /// Directory holding the module manifest for the configured environment.
    pub fn environment_dir(&self) -> PathBuf {
        self.environments_dir().join(&self.environment)
    }

    /// Target directory that receives one subdirectory per module.
    pub fn modules_dir(&self) -> PathBuf {
        self.environment_dir().join("modules")
    }

    pub fn hiera_dir(&self) -> PathBuf {
        self.code_dir.join("hieradata").join(&self.environment)
    }
}
