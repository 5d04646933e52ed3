use std::process::{Command, Output, Stdio};

use anyhow::Context;
use tracing::trace;
use which::which;

/// Abstracts process execution so the deployers can be exercised without
/// spawning real `git` or `facter` processes.
pub trait CommandRunner {
    /// Run `program` with `args`, capturing stdout and stderr.
    ///
    /// A non-zero exit is not an error here; callers inspect `Output::status`.
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<Output>;

    /// Run a command line through `/bin/sh -c`.
    fn run_shell(&self, command: &str) -> anyhow::Result<Output> {
        self.run("/bin/sh", &["-c", command])
    }
}

/// Blocking runner backed by `std::process::Command`. No timeout is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<Output> {
        let resolved = which(program).with_context(|| format!("{program} not found on PATH"))?;
        trace!(program = %resolved.display(), ?args, "spawning");

        Command::new(&resolved)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("running {program}"))
    }
}
