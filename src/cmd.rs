use std::process::{Command, ExitStatus, Output, Stdio};

use tracing::debug;

use crate::command::CommandLine;
use crate::error::{DeployError, DeployResult};

/// Run a command and capture its output. Fails if the command
/// returns a non-zero exit code.
pub fn run(line: &CommandLine) -> DeployResult<String> {
    let output = spawn(line)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(failure(line, output.status, &output.stderr))
    }
}

/// Run a command and report whether it exited successfully.
/// A non-zero exit is tolerated; failing to spawn is not.
pub fn succeeds(line: &CommandLine) -> DeployResult<bool> {
    let output = spawn(line)?;
    Ok(output.status.success())
}

/// Run a command with stdin/stdout/stderr inherited (interactive).
pub fn run_interactive(line: &CommandLine) -> DeployResult<()> {
    debug!(command = %line, "running interactively");
    let status = command(line)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_error(line, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(failure(line, status, &[]))
    }
}

/// Check if a command exists on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn command(line: &CommandLine) -> Command {
    let mut cmd = Command::new(&line.program);
    cmd.args(&line.args);
    if let Some(dir) = &line.dir {
        cmd.current_dir(dir);
    }
    cmd
}

fn spawn(line: &CommandLine) -> DeployResult<Output> {
    debug!(command = %line, "running");
    command(line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| spawn_error(line, e))
}

fn spawn_error(line: &CommandLine, e: std::io::Error) -> DeployError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DeployError::CommandNotFound(line.program.clone())
    } else {
        DeployError::Io(e)
    }
}

fn failure(line: &CommandLine, status: ExitStatus, stderr: &[u8]) -> DeployError {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if !stderr.is_empty() {
        eprintln!("stderr: {stderr}");
    }
    DeployError::CommandFailed {
        command: line.to_string(),
        code: status.code(),
        stderr,
    }
}
