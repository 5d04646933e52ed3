pub mod cli;
pub mod config;
pub mod deploy;
pub mod env_detect;
pub mod fs_util;
pub mod manifest;
pub mod planner;
pub mod runner;

/// Run the command line interface and return an exit code.
pub fn run_cli() -> i32 {
    cli::run()
}
