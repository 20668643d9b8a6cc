use std::path::Path;

use crate::cmd;
use crate::command::CommandLine;
use crate::error::DeployResult;
use crate::ssh::SshSession;

/// Executes commands on the deployment target, either the local
/// machine or a host reached over SSH.
pub trait Runner {
    /// Run a command and capture its trimmed stdout. A non-zero
    /// exit is an error.
    fn run(&self, command: &CommandLine) -> DeployResult<String>;

    /// Run a command whose failure is expected and tolerated.
    /// Returns `Ok(false)` on a non-zero exit.
    fn succeeds(&self, command: &CommandLine) -> DeployResult<bool>;

    /// Run a command attached to the user's terminal.
    fn run_interactive(&self, command: &CommandLine) -> DeployResult<()>;

    /// Copy a file from the target to the local machine.
    fn fetch(&self, target_path: &str, local_path: &str) -> DeployResult<()>;

    /// Human-readable description of the target.
    fn target(&self) -> String;
}

/// Runs commands on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl LocalRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Runner for LocalRunner {
    fn run(&self, command: &CommandLine) -> DeployResult<String> {
        cmd::run(command)
    }

    fn succeeds(&self, command: &CommandLine) -> DeployResult<bool> {
        cmd::succeeds(command)
    }

    fn run_interactive(&self, command: &CommandLine) -> DeployResult<()> {
        cmd::run_interactive(command)
    }

    fn fetch(&self, target_path: &str, local_path: &str) -> DeployResult<()> {
        if Path::new(target_path) != Path::new(local_path) {
            std::fs::copy(target_path, local_path)?;
        }
        Ok(())
    }

    fn target(&self) -> String {
        "localhost".to_string()
    }
}

/// Runs commands on a remote host over SSH.
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    ssh: SshSession,
}

impl RemoteRunner {
    #[must_use]
    pub const fn new(ssh: SshSession) -> Self {
        Self { ssh }
    }
}

impl Runner for RemoteRunner {
    fn run(&self, command: &CommandLine) -> DeployResult<String> {
        self.ssh.exec(command)
    }

    fn succeeds(&self, command: &CommandLine) -> DeployResult<bool> {
        self.ssh.exec_succeeds(command)
    }

    fn run_interactive(&self, command: &CommandLine) -> DeployResult<()> {
        self.ssh.exec_interactive(command)
    }

    fn fetch(&self, target_path: &str, local_path: &str) -> DeployResult<()> {
        self.ssh.scp_from(target_path, local_path)
    }

    fn target(&self) -> String {
        self.ssh.describe()
    }
}
