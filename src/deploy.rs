//! Deploy orchestration.
//!
//! A deploy walks through the phases of [`DeployPhase`]:
//!
//! 1. snapshot the instances already running,
//! 2. resolve the image (pull, build, or an explicit tag),
//! 3. run the `hook_before_deploy`,
//! 4. start the new container and remove the old ones,
//! 5. run the `hook_after_deploy`.
//!
//! Containers publishing ports have their old instances removed
//! *before* the new one starts, since both cannot bind the same host
//! port. The same holds for containers with a fixed `display_name`,
//! which cannot be taken twice. Other containers start first and the
//! old instances are removed afterwards, so a worker is never absent.
//!
//! A failure stops the sequence where it happened. Nothing is rolled
//! back: a build failure leaves the old instances running, a failed
//! start after the old instances were removed leaves none.
//!
//! Two deploys of the same container in the same stage are not
//! coordinated. Each removes whatever its own snapshot saw, which may
//! include the instance the other one just started.

use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use colored::Colorize;
use tracing::{info, warn};

use crate::command::CommandLine;
use crate::config::{ContainerSpec, StageConfig};
use crate::docker::Docker;
use crate::error::DeployResult;
use crate::hook::{HookContext, HookRef};
use crate::human::humanize;
use crate::image::{ImageProvider, ImageTag};
use crate::instance::{InstanceTracker, RunningInstance, instance_prefix, short_id};
use crate::prompt::Confirm;
use crate::runner::Runner;

/// Environment variable through which a container learns its own
/// image reference.
pub const IMAGE_ENV: &str = "FDM_IMAGE";

/// Steps of a single deploy, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeployPhase {
    Idle,
    StatusChecked,
    ImageResolved,
    PreHookRun,
    Started,
    OldStopped,
    PostHookRun,
    Done,
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::StatusChecked => "status checked",
            Self::ImageResolved => "image resolved",
            Self::PreHookRun => "pre-deploy hook run",
            Self::Started => "started",
            Self::OldStopped => "old instances stopped",
            Self::PostHookRun => "post-deploy hook run",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Knobs of a single deploy.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Deploy this image instead of resolving one.
    pub image: Option<String>,
    pub skip_status: bool,
    pub ignore_hooks: bool,
}

/// Outcome of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub stage: String,
    pub container: String,
    pub image: ImageTag,
    pub instance_name: String,
    pub elapsed: Duration,
}

impl DeployReport {
    #[must_use]
    pub fn elapsed_human(&self) -> String {
        humanize(self.elapsed)
    }
}

/// Running instances of one configured container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub container: String,
    pub instances: Vec<RunningInstance>,
}

/// Drives deploys of the containers of one stage.
pub struct Orchestrator<'a> {
    config: &'a StageConfig,
    runner: &'a dyn Runner,
    confirm: &'a dyn Confirm,
    docker: Docker,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(config: &'a StageConfig, runner: &'a dyn Runner, confirm: &'a dyn Confirm) -> Self {
        Self {
            config,
            runner,
            confirm,
            docker: config.docker(),
        }
    }

    #[must_use]
    pub fn images(&self) -> ImageProvider<'a> {
        ImageProvider::new(self.runner, self.docker, self.confirm)
    }

    #[must_use]
    pub fn instances(&self) -> InstanceTracker<'a> {
        InstanceTracker::new(self.runner, self.docker)
    }

    /// Running instances of every configured container, in config
    /// order.
    pub fn status(&self) -> DeployResult<Vec<ContainerStatus>> {
        let tracker = self.instances();
        self.config
            .containers
            .iter()
            .map(|(key, spec)| {
                Ok(ContainerStatus {
                    container: key.clone(),
                    instances: tracker.list_running(&self.config.stage, &spec.name)?,
                })
            })
            .collect()
    }

    /// Resolve the image of a container without deploying it.
    pub fn build(&self, container: &str) -> DeployResult<ImageTag> {
        let spec = self.config.container_spec(container)?;
        self.images().resolve_image(spec, &self.config.stage)
    }

    /// Deploy every configured container, one after the other. The
    /// first failure aborts the remaining deploys.
    pub fn deploy_all(&self, options: &DeployOptions) -> DeployResult<Vec<DeployReport>> {
        let keys: Vec<&String> = self.config.containers.keys().collect();
        let mut reports = Vec::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            let options = DeployOptions {
                skip_status: options.skip_status || i > 0,
                ..options.clone()
            };
            reports.push(self.deploy(key, &options)?);
        }
        Ok(reports)
    }

    /// Build or pull the image of `container` and replace its
    /// running instances with a new one.
    pub fn deploy(&self, container: &str, options: &DeployOptions) -> DeployResult<DeployReport> {
        let started_at = Instant::now();
        let stage = self.config.stage.as_str();
        let spec = self.config.container_spec(container)?;
        spec.check_display_name(stage)?;
        let mut phase = DeployPhase::Idle;

        if !options.skip_status {
            self.print_status();
            advance(&mut phase, DeployPhase::StatusChecked, spec);
        }

        let tracker = self.instances();
        let running = tracker.list_running(stage, &spec.name)?;

        let image = match &options.image {
            Some(image) => ImageTag::new(image),
            None => self.images().resolve_image(spec, stage)?,
        };
        advance(&mut phase, DeployPhase::ImageResolved, spec);

        let instance_name = spec.display_name.clone().unwrap_or_else(|| {
            format!("{}_{}", instance_prefix(stage, &spec.name), epoch_millis())
        });
        let run_args = spec.run_args();

        if !options.ignore_hooks {
            if let Some(hook) = &spec.hook_before_deploy {
                self.invoke(hook, spec, &image, &run_args)?;
                advance(&mut phase, DeployPhase::PreHookRun, spec);
            }
        }

        let run = self
            .docker
            .run()
            .args(["-d", "--restart=always", "--name", instance_name.as_str()])
            .args(["-e".to_string(), format!("{IMAGE_ENV}={image}")])
            .args(run_args.iter().cloned())
            .arg(image.as_str())
            .args(spec.run_options.iter().cloned());

        if spec.has_ports() || spec.display_name.is_some() {
            tracker.stop_all(&running)?;
            advance(&mut phase, DeployPhase::OldStopped, spec);
            self.start(&instance_name, &run)?;
            advance(&mut phase, DeployPhase::Started, spec);
        } else {
            self.start(&instance_name, &run)?;
            advance(&mut phase, DeployPhase::Started, spec);
            tracker.stop_all(&running)?;
            advance(&mut phase, DeployPhase::OldStopped, spec);
        }

        if !options.ignore_hooks {
            if let Some(hook) = &spec.hook_after_deploy {
                self.invoke(hook, spec, &image, &run_args)?;
                advance(&mut phase, DeployPhase::PostHookRun, spec);
            }
        }

        advance(&mut phase, DeployPhase::Done, spec);
        Ok(DeployReport {
            stage: stage.to_string(),
            container: container.to_string(),
            image,
            instance_name,
            elapsed: started_at.elapsed(),
        })
    }

    /// Open an interactive shell in a throwaway container of
    /// `container`'s image.
    ///
    /// Without `rebuild` the fixed image, or the `latest` alias of
    /// the last build, is used as is.
    pub fn shell(&self, container: &str, rebuild: bool, cmd: Option<&str>) -> DeployResult<()> {
        let stage = self.config.stage.as_str();
        let spec = self.config.container_spec(container)?;

        let image = match (&spec.image, rebuild) {
            (_, true) => self.images().resolve_image(spec, stage)?,
            (Some(image), false) => ImageTag::new(image),
            (None, false) => ImageTag::latest(&spec.name, stage),
        };

        let prefix = instance_prefix(stage, &spec.name);
        let name = format!("run_{prefix}_{}", epoch_millis());
        let mut run = self
            .docker
            .run()
            .args(["--rm", "-it", "--name", name.as_str()])
            .args(["-e".to_string(), format!("{IMAGE_ENV}={image}")])
            .args(spec.run_args())
            .arg(image.as_str());
        run = match cmd {
            Some(cmd) => run.args(["sh", "-c", cmd]),
            None => run.arg("/bin/sh"),
        };

        eprintln!("Starting shell in {image} on {}...", self.runner.target());
        self.runner.run_interactive(&run)
    }

    fn start(&self, name: &str, run: &CommandLine) -> DeployResult<()> {
        eprintln!("Starting {name}...");
        let id = self.runner.run(run)?;
        if !id.is_empty() {
            info!(container = name, id = short_id(&id), "container started");
        }
        Ok(())
    }

    fn invoke(
        &self,
        hook: &HookRef,
        spec: &ContainerSpec,
        image: &ImageTag,
        run_args: &[String],
    ) -> DeployResult<()> {
        let ctx = HookContext {
            stage: &self.config.stage,
            container: &spec.name,
            image: image.as_str(),
            run_args,
        };
        hook.invoke(&ctx, self.runner)
    }

    /// Print running counts for every container. Failures are only
    /// logged.
    fn print_status(&self) {
        match self.status() {
            Ok(statuses) => {
                for status in statuses {
                    eprintln!(
                        "  {}: {} running",
                        status.container.bold(),
                        status.instances.len()
                    );
                }
            }
            Err(e) => warn!(error = %e, "could not list running containers"),
        }
    }
}

fn advance(phase: &mut DeployPhase, next: DeployPhase, spec: &ContainerSpec) {
    info!(container = %spec.name, from = %phase, to = %next, "deploy phase");
    *phase = next;
}

/// Milliseconds since the Unix epoch, used to keep generated names
/// unique.
#[must_use]
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis())
}
