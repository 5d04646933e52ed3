use std::path::Path;
use std::process::ExitStatus;

use thiserror::Error;
use tracing::debug;

use crate::runner::CommandRunner;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("running `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Ask the fact provider for the deployment location.
///
/// Only trailing whitespace is stripped; an empty answer is a valid location
/// that simply matches no manifest section.
pub fn get_location(
    runner: &dyn CommandRunner,
    fact_command: &str,
) -> Result<String, LocationError> {
    let output = runner
        .run_shell(fact_command)
        .map_err(|source| LocationError::Spawn {
            command: fact_command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(LocationError::Failed {
            command: fact_command.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let location = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    debug!(%location, "resolved location");
    Ok(location)
}

/// Whether we are running inside a Vagrant box, judged by the shared folder
/// Vagrant mounts into every guest.
pub fn is_vagrant(indicator: &Path) -> bool {
    let found = indicator.is_dir();
    debug!(indicator = %indicator.display(), found, "checked for vagrant guest");
    found
}
