use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::cmd;
use crate::config::StageConfig;
use crate::database::DatabaseBackup;
use crate::deploy::{DeployOptions, DeployReport, Orchestrator};
use crate::error::{DeployError, DeployResult};
use crate::hook::{HookContext, Hooks};
use crate::instance::short_id;
use crate::prompt::{Confirm, FixedAnswer, TerminalPrompt};
use crate::redirect::{self, Certificate};
use crate::runner::{LocalRunner, Runner};

/// Command-line entry point. Register hooks in code, then hand
/// control to [`Fdm::run`]:
///
/// ```rust,no_run
/// use fdm::Fdm;
///
/// fn main() -> anyhow::Result<()> {
///     Fdm::new()
///         .hook("announce", |ctx, _runner| {
///             eprintln!("deploying {}", ctx.image);
///             Ok(())
///         })
///         .run()?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct Fdm {
    hooks: Hooks,
}

impl Fdm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a closure available to stage files under `name`.
    #[must_use]
    pub fn hook<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>, &dyn Runner) -> DeployResult<()> + 'static,
    {
        self.hooks = self.hooks.register(name, hook);
        self
    }

    /// Parse CLI arguments and dispatch the appropriate command.
    pub fn run(&self) -> DeployResult<()> {
        let cli = Cli::parse();
        init_logging(cli.verbose);
        self.dispatch(&cli)
    }

    fn dispatch(&self, cli: &Cli) -> DeployResult<()> {
        let config = StageConfig::load(&cli.config_dir, &cli.stage, &self.hooks)?;
        let runner = config.runner();
        let confirm: Box<dyn Confirm> = if cli.yes {
            Box::new(FixedAnswer(true))
        } else {
            Box::new(TerminalPrompt)
        };

        if !matches!(cli.command, Command::Redirects) {
            let required = if config.is_remote() { "ssh" } else { "docker" };
            if !cmd::command_exists(required) {
                return Err(DeployError::CommandNotFound(required.to_string()));
            }
            banner(&config, runner.as_ref());
        }
        let orchestrator = Orchestrator::new(&config, runner.as_ref(), confirm.as_ref());

        match &cli.command {
            Command::Deploy {
                container,
                all,
                image,
                ignore_hooks,
                skip_status,
            } => {
                let options = DeployOptions {
                    image: image.clone(),
                    skip_status: *skip_status,
                    ignore_hooks: *ignore_hooks,
                };
                let reports = match (container, all) {
                    (_, true) => orchestrator.deploy_all(&options)?,
                    (Some(container), false) => vec![orchestrator.deploy(container, &options)?],
                    (None, false) => {
                        return Err(DeployError::Other(
                            "name a container to deploy or pass --all".into(),
                        ));
                    }
                };
                for report in &reports {
                    print_report(report);
                }
                Ok(())
            }
            Command::Build { container } => {
                let tag = orchestrator.build(container)?;
                println!("{tag}");
                Ok(())
            }
            Command::Status => {
                for status in orchestrator.status()? {
                    let ids: Vec<&str> = status.instances.iter().map(|i| short_id(&i.id)).collect();
                    println!(
                        "{}: {} running {}",
                        status.container.bold(),
                        status.instances.len(),
                        ids.join(" ").dimmed()
                    );
                }
                Ok(())
            }
            Command::Shell {
                container,
                rebuild,
                cmd,
            } => orchestrator.shell(container, *rebuild, cmd.as_deref()),
            Command::Database { name } => {
                let db = config.database(name)?;
                let backup =
                    DatabaseBackup::new(runner.as_ref(), config.docker(), confirm.as_ref());
                let report = backup.backup(&config.stage, db)?;
                if let Some(restored) = &report.restored_into {
                    eprintln!("{}", format!("Restored into {restored}").green());
                }
                Ok(())
            }
            Command::Redirects => check_redirects(&config),
        }
    }
}

fn check_redirects(config: &StageConfig) -> DeployResult<()> {
    if config.redirects.is_empty() {
        return Err(DeployError::Config(format!(
            "no redirects configured for stage '{}'",
            config.stage
        )));
    }

    let runner = LocalRunner::new();
    let mut failed = 0;
    for check in &config.redirects {
        let outcome = redirect::check(&runner, check);
        let mark = if outcome.passed() {
            "ok".green()
        } else {
            failed += 1;
            "FAIL".red()
        };
        println!(
            "[{mark}] {} -> {} ({} {})",
            outcome.from, outcome.expected, outcome.status, outcome.location
        );
        if let Some(error) = &outcome.error {
            println!("       {}", error.red());
        }
        match &outcome.certificate {
            Some(Certificate::Valid { days_left }) => {
                println!("       certificate valid for {days_left} days");
            }
            Some(Certificate::ExpiringSoon { days_left }) => println!(
                "       {}",
                format!("certificate expires in {days_left} days").yellow()
            ),
            Some(Certificate::Expired { days_left }) => println!(
                "       {}",
                format!("certificate expired {} days ago", -days_left).red()
            ),
            Some(Certificate::Unavailable(reason)) => {
                let message = format!("certificate unavailable: {reason}");
                println!("       {}", message.red());
            }
            None => {}
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(DeployError::Other(format!("{failed} redirect check(s) failed")))
    }
}

fn banner(config: &StageConfig, runner: &dyn Runner) {
    let rule = "=====================================================".yellow();
    eprintln!();
    eprintln!("{rule}");
    let target = runner.target();
    eprintln!(
        "{}",
        format!("Connecting to {target} - '{}'", config.stage).bold()
    );
    eprintln!("{rule}");
    eprintln!();
}

fn print_report(report: &DeployReport) {
    eprintln!(
        "{}",
        format!(
            "Deployed {} ({}) as {} in {}",
            report.container,
            report.image,
            report.instance_name,
            report.elapsed_human()
        )
        .green()
    );
}

fn init_logging(verbose: bool) {
    let default = if verbose { "fdm=debug" } else { "fdm=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(name = "fdm")]
#[command(about = "Build, ship and restart docker containers")]
struct Cli {
    /// Stage to operate on; selects `<config-dir>/<stage>.toml`
    #[arg(long, global = true, env = "FDM_STAGE", default_value = "staging")]
    stage: String,

    /// Directory holding the stage files
    #[arg(long, global = true, env = "FDM_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Answer yes to every confirmation prompt
    #[arg(long, short, global = true)]
    yes: bool,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or pull a container and restart it
    Deploy {
        /// Container to deploy
        container: Option<String>,

        /// Deploy every container of the stage
        #[arg(long, conflicts_with = "container")]
        all: bool,

        /// Deploy this image instead of building one
        #[arg(long)]
        image: Option<String>,

        /// Do not run the before/after deploy hooks
        #[arg(long)]
        ignore_hooks: bool,

        /// Do not list running containers first
        #[arg(long)]
        skip_status: bool,
    },

    /// Build or pull a container and print its image
    Build {
        /// Container to build
        container: String,
    },

    /// Show running instances of every container
    Status,

    /// Open a shell in a new container
    #[command(alias = "interactive")]
    Shell {
        /// Container whose image to use
        container: String,

        /// Build the image first; otherwise reuse the latest one
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        rebuild: bool,

        /// Run this instead of an interactive shell
        #[arg(long)]
        cmd: Option<String>,
    },

    /// Back up a database, optionally restoring it locally
    Database {
        /// Database entry in the stage file
        name: String,
    },

    /// Check configured redirects and certificates
    Redirects,
}
