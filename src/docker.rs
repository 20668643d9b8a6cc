use crate::command::CommandLine;

/// Builds `docker` invocations, optionally prefixed with `sudo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Docker {
    sudo: bool,
}

impl Docker {
    #[must_use]
    pub const fn new(sudo: bool) -> Self {
        Self { sudo }
    }

    #[must_use]
    pub fn command(&self) -> CommandLine {
        let docker = CommandLine::new("docker");
        if self.sudo {
            docker.wrapped_in("sudo")
        } else {
            docker
        }
    }

    #[must_use]
    pub fn pull(&self, image: &str) -> CommandLine {
        self.command().args(["pull", image])
    }

    /// `docker build` in `dir` with every tag applied and `.` as the
    /// build context.
    #[must_use]
    pub fn build(&self, dir: &str, tags: &[&str], extra_args: &[String]) -> CommandLine {
        let mut cmd = self.command().arg("build");
        for &tag in tags {
            cmd = cmd.args(["--tag", tag]);
        }
        cmd.args(extra_args.iter().cloned())
            .arg(".")
            .current_dir(dir)
    }

    /// Lists ids of local images matching `reference`, one per line.
    #[must_use]
    pub fn image_ids(&self, reference: &str) -> CommandLine {
        self.command().args(["images", "--quiet", reference])
    }

    /// Lists running containers as one JSON object per line.
    #[must_use]
    pub fn ps_json(&self) -> CommandLine {
        self.command()
            .args(["ps", "--no-trunc", "--format", "{{json .}}"])
    }

    #[must_use]
    pub fn remove_force(&self, id: &str) -> CommandLine {
        self.command().args(["rm", "-f", id])
    }

    #[must_use]
    pub fn run(&self) -> CommandLine {
        self.command().arg("run")
    }

    /// `docker exec`, passing each `VAR=value` in `env` with `-e`.
    #[must_use]
    pub fn exec(&self, container: &str, env: &[String]) -> CommandLine {
        self.command()
            .arg("exec")
            .flag_each("-e", env)
            .arg(container)
    }
}
