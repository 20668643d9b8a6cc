use serde::Deserialize;
use tracing::{debug, warn};

use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::runner::Runner;

/// A container currently running on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningInstance {
    pub id: String,
    pub name: String,
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
}

/// Name prefix shared by every instance of a container in a stage.
#[must_use]
pub fn instance_prefix(stage: &str, container: &str) -> String {
    format!("{stage}_{container}")
}

/// Finds and removes running instances of a container.
pub struct InstanceTracker<'a> {
    runner: &'a dyn Runner,
    docker: Docker,
}

impl<'a> InstanceTracker<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn Runner, docker: Docker) -> Self {
        Self { runner, docker }
    }

    /// Running containers whose name contains `{stage}_{container}`,
    /// in the order docker reports them.
    pub fn list_running(&self, stage: &str, container: &str) -> DeployResult<Vec<RunningInstance>> {
        let pattern = instance_prefix(stage, container);
        let output = self.runner.run(&self.docker.ps_json())?;

        let mut instances = Vec::new();
        for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let ps: PsLine = serde_json::from_str(line)?;
            if ps.names.contains(&pattern) {
                instances.push(RunningInstance {
                    id: ps.id,
                    name: ps.names,
                });
            }
        }

        debug!(%pattern, count = instances.len(), "running instances");
        Ok(instances)
    }

    /// Force-remove every instance. All removals are attempted; the
    /// ids that could not be removed are reported together.
    pub fn stop_all(&self, instances: &[RunningInstance]) -> DeployResult<()> {
        let mut failed = Vec::new();

        for instance in instances {
            eprintln!("Removing {} ({})...", instance.name, short_id(&instance.id));
            if let Err(e) = self.runner.run(&self.docker.remove_force(&instance.id)) {
                warn!(id = %instance.id, error = %e, "failed to remove container");
                failed.push(instance.id.clone());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(DeployError::StopFailed(failed))
        }
    }
}

/// The 12-character id docker shows by default.
#[must_use]
pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
