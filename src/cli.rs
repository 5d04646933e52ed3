use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::config::DeployConfig;
use crate::deploy::{DeployReport, deploy_modules, deploy_modules_vagrant};
use crate::env_detect::get_location;
use crate::fs_util::has_opt_module;
use crate::manifest::{Modules, load_modules_from};
use crate::planner::{Strategy, choose_strategy, plan_deploy};
use crate::runner::{CommandRunner, SystemCommandRunner};

#[derive(Debug, Parser)]
#[command(
    name = "puppet-postrun",
    version,
    about = "Deploy puppet modules and hiera data after a provisioning run"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Version control program used to clone modules
    #[arg(long, env = "POSTRUN_VCS", global = true)]
    vcs: Option<String>,
    /// Shell command printing the deployment location
    #[arg(long, env = "POSTRUN_FACT_COMMAND", global = true)]
    fact_command: Option<String>,
    /// Puppet code directory holding environments and hieradata
    #[arg(long, env = "POSTRUN_CODE_DIR", global = true)]
    code_dir: Option<PathBuf>,
    /// Puppet environment to deploy into
    #[arg(long, env = "POSTRUN_ENVIRONMENT", global = true)]
    environment: Option<String>,
    /// Directory of pre-fetched modules linked instead of cloned on vagrant boxes
    #[arg(long, env = "POSTRUN_OPT_MODULES_DIR", global = true)]
    opt_modules_dir: Option<PathBuf>,
    /// Hiera data the hiera directory is linked to on vagrant boxes
    #[arg(long, env = "POSTRUN_HIERA_SOURCE", global = true)]
    hiera_source: Option<PathBuf>,
    /// Directory whose presence marks a vagrant guest
    #[arg(long, env = "POSTRUN_VAGRANT_INDICATOR", global = true)]
    vagrant_indicator: Option<PathBuf>,
    /// Manifest file name inside the environment directory
    #[arg(long, env = "POSTRUN_MANIFEST_FILE", global = true)]
    manifest_file: Option<String>,
}

impl ConfigArgs {
    fn into_config(self) -> DeployConfig {
        let defaults = DeployConfig::default();
        DeployConfig {
            vcs_program: self.vcs.unwrap_or(defaults.vcs_program),
            fact_command: self.fact_command.unwrap_or(defaults.fact_command),
            code_dir: self.code_dir.unwrap_or(defaults.code_dir),
            environment: self.environment.unwrap_or(defaults.environment),
            opt_modules_dir: self.opt_modules_dir.unwrap_or(defaults.opt_modules_dir),
            hiera_source: self.hiera_source.unwrap_or(defaults.hiera_source),
            vagrant_indicator: self.vagrant_indicator.unwrap_or(defaults.vagrant_indicator),
            manifest_file: self.manifest_file.unwrap_or(defaults.manifest_file),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Vagrant strategy inside a vagrant guest, standard otherwise
    Auto,
    Standard,
    Vagrant,
}

impl Mode {
    fn requested(self) -> Option<Strategy> {
        match self {
            Mode::Auto => None,
            Mode::Standard => Some(Strategy::Standard),
            Mode::Vagrant => Some(Strategy::Vagrant),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve and print the deployment location
    Location,
    /// Print the module manifest resolved for the location as JSON
    Modules {
        /// Use this location instead of asking the fact provider
        #[arg(long)]
        location: Option<String>,
        /// Emit compact JSON instead of pretty output
        #[arg(long)]
        raw: bool,
    },
    /// Show what a deploy would do without touching the filesystem
    Plan {
        #[arg(long, value_enum, default_value_t = Mode::Auto)]
        mode: Mode,
        /// Use this location instead of asking the fact provider
        #[arg(long)]
        location: Option<String>,
        /// Emit compact JSON instead of pretty output
        #[arg(long)]
        raw: bool,
    },
    /// Deploy the modules for the location
    Deploy {
        #[arg(long, value_enum, default_value_t = Mode::Auto)]
        mode: Mode,
        /// Use this location instead of asking the fact provider
        #[arg(long)]
        location: Option<String>,
        /// Emit the deploy report as compact JSON
        #[arg(long)]
        raw: bool,
    },
}

/// Run the command line interface and return an exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli, &SystemCommandRunner) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn execute(cli: Cli, runner: &dyn CommandRunner) -> anyhow::Result<()> {
    let config = cli.config.into_config();
    debug!(?config, "loaded configuration");

    match cli.command {
        Commands::Location => {
            println!("{}", resolve_location(None, runner, &config)?);
        }
        Commands::Modules { location, raw } => {
            let location = resolve_location(location, runner, &config)?;
            let modules = load_for(&location, &config)?;
            print_json(&modules, raw)?;
        }
        Commands::Plan { mode, location, raw } => {
            let location = resolve_location(location, runner, &config)?;
            let modules = load_for(&location, &config)?;
            let strategy = choose_strategy(mode.requested(), &config);
            let plan = plan_deploy(&modules, strategy, &location, &config);
            print_json(&plan, raw)?;
        }
        Commands::Deploy {
            mode,
            location,
            raw,
        } => {
            let location = resolve_location(location, runner, &config)?;
            let modules = load_for(&location, &config)?;
            let strategy = choose_strategy(mode.requested(), &config);
            let target = config.modules_dir();

            if !raw {
                println!(
                    "Deploying {} modules for location '{}' using '{}' strategy into {}",
                    modules.len(),
                    location,
                    strategy,
                    target.display()
                );
            }

            let report = match strategy {
                Strategy::Standard => {
                    deploy_modules(runner, &config.vcs_program, &target, &modules)?
                }
                Strategy::Vagrant => {
                    if !has_opt_module(&config.opt_modules_dir, None) {
                        warn!(
                            cache = %config.opt_modules_dir.display(),
                            "optional module cache missing, every module will be cloned"
                        );
                    }
                    deploy_modules_vagrant(runner, &config, &target, &modules)?
                }
            };

            if raw {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_summary(&report);
            }
        }
    }

    Ok(())
}

fn resolve_location(
    requested: Option<String>,
    runner: &dyn CommandRunner,
    config: &DeployConfig,
) -> anyhow::Result<String> {
    match requested {
        Some(location) => Ok(location),
        None => get_location(runner, &config.fact_command).context("resolving location"),
    }
}

fn load_for(location: &str, config: &DeployConfig) -> anyhow::Result<Modules> {
    let path = config.environment_dir().join(&config.manifest_file);
    load_modules_from(&path, location)
        .with_context(|| format!("loading modules for location '{location}'"))
}

fn print_json<T: serde::Serialize>(value: &T, raw: bool) -> anyhow::Result<()> {
    if raw {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_summary(report: &DeployReport) {
    for name in &report.cloned {
        println!("==> cloned {name}");
    }
    for name in &report.linked {
        println!("==> linked {name}");
    }
    if let Some(hiera) = &report.hiera {
        println!("==> linked hiera data at {}", hiera.display());
    }
}
