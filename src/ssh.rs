use crate::cmd;
use crate::command::CommandLine;
use crate::error::DeployResult;

/// SSH session wrapper for executing commands and transferring
/// files from a remote host.
#[derive(Debug, Clone)]
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    key: Option<String>,
}

impl SshSession {
    #[must_use]
    pub fn new(host: &str, user: &str) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            port: 22,
            key: None,
        }
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_key(mut self, key_path: &str) -> Self {
        self.key = Some(key_path.to_string());
        self
    }

    /// Execute a command on the remote host and capture output.
    pub fn exec(&self, command: &CommandLine) -> DeployResult<String> {
        cmd::run(&self.ssh_command(command, false))
    }

    /// Execute a command remotely, tolerating a non-zero exit.
    pub fn exec_succeeds(&self, command: &CommandLine) -> DeployResult<bool> {
        cmd::succeeds(&self.ssh_command(command, false))
    }

    /// Execute a command on the remote host with a tty attached.
    pub fn exec_interactive(&self, command: &CommandLine) -> DeployResult<()> {
        cmd::run_interactive(&self.ssh_command(command, true))
    }

    /// Copy a remote file to the local machine.
    pub fn scp_from(&self, remote_path: &str, local_path: &str) -> DeployResult<()> {
        let source = format!("{}:{remote_path}", self.destination());
        let scp = CommandLine::new("scp")
            .args(self.scp_base_args())
            .arg(source)
            .arg(local_path);
        cmd::run(&scp).map(|_| ())
    }

    /// `user@host:port`, for display.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}:{}", self.destination(), self.port)
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Build the local `ssh` invocation carrying `command` as a
    /// single quoted remote shell line.
    #[must_use]
    pub fn ssh_command(&self, command: &CommandLine, tty: bool) -> CommandLine {
        let mut ssh = CommandLine::new("ssh").args(self.ssh_base_args());
        if tty {
            ssh = ssh.arg("-t");
        }
        ssh.arg(self.destination()).arg(command.to_shell())
    }

    fn ssh_base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args
    }

    fn scp_base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-P".to_string(),
            self.port.to_string(),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args
    }
}
