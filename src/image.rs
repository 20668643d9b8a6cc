use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::command::CommandLine;
use crate::config::{BuildSource, ContainerSpec};
use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::prompt::Confirm;
use crate::runner::Runner;

/// A runnable image reference.
///
/// Images built from source are tagged
/// `{container}/{stage}:{revision}`, which never changes once
/// built, and `{container}/{stage}:latest`, which always points at
/// the most recent build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageTag(String);

impl ImageTag {
    #[must_use]
    pub fn new(reference: &str) -> Self {
        Self(reference.to_string())
    }

    #[must_use]
    pub fn for_revision(container: &str, stage: &str, revision: &str) -> Self {
        Self(format!("{container}/{stage}:{revision}"))
    }

    #[must_use]
    pub fn latest(container: &str, stage: &str) -> Self {
        Self::for_revision(container, stage, "latest")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a container spec into an image present on the target,
/// pulling or building as needed.
pub struct ImageProvider<'a> {
    runner: &'a dyn Runner,
    docker: Docker,
    confirm: &'a dyn Confirm,
}

impl<'a> ImageProvider<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn Runner, docker: Docker, confirm: &'a dyn Confirm) -> Self {
        Self {
            runner,
            docker,
            confirm,
        }
    }

    /// Pull the fixed image of `spec`, or build it from its source
    /// checkout.
    ///
    /// When an image for the current revision already exists the
    /// operator is asked whether to skip the build.
    pub fn resolve_image(&self, spec: &ContainerSpec, stage: &str) -> DeployResult<ImageTag> {
        if let Some(image) = &spec.image {
            eprintln!("Pulling {image}...");
            self.runner.run(&self.docker.pull(image))?;
            return Ok(ImageTag::new(image));
        }

        let source = spec
            .source
            .as_ref()
            .ok_or_else(|| DeployError::MissingImageSource(spec.name.clone()))?;

        let lock = BuildLock::acquire(self.runner, &source.code_dir)?;

        self.ensure_checkout(source)?;
        self.sync_checkout(source)?;

        let revision = self.revision(source)?;
        let tag = ImageTag::for_revision(&spec.name, stage, &revision);
        let latest = ImageTag::latest(&spec.name, stage);

        let _lock = if self.image_exists(&tag)? {
            // Never prompt while holding the lock: an interrupted
            // prompt would leave it behind.
            drop(lock);
            let question = format!("Image {tag} already exists. Skip the build?");
            if self.confirm.confirm(&question)? {
                info!(%tag, "reusing existing image");
                return Ok(tag);
            }
            let lock = BuildLock::acquire(self.runner, &source.code_dir)?;
            if self.revision(source)? != revision {
                return Err(DeployError::Other(format!(
                    "checkout {} moved while waiting for confirmation, deploy again",
                    source.code_dir
                )));
            }
            lock
        } else {
            lock
        };

        eprintln!("Building {tag}...");
        let build = self.docker.build(
            &source.build_dir(),
            &[tag.as_str(), latest.as_str()],
            &source.build_args,
        );
        self.runner.run(&build)?;

        Ok(tag)
    }

    /// Clone the repository unless the checkout directory already
    /// exists.
    fn ensure_checkout(&self, source: &BuildSource) -> DeployResult<()> {
        let exists = CommandLine::new("test")
            .arg("-d")
            .arg(source.code_dir.as_str());
        if self.runner.succeeds(&exists)? {
            debug!(code_dir = %source.code_dir, "checkout present");
            return Ok(());
        }

        eprintln!("Cloning {} ({})...", source.url, source.branch);
        let clone = CommandLine::new("git").args([
            "clone".to_string(),
            format!("--branch={}", source.branch),
            "--depth=1".to_string(),
            source.url.clone(),
            source.code_dir.clone(),
        ]);
        self.runner.run(&clone).map(|_| ())
    }

    /// Force the checkout onto the tip of the configured branch.
    fn sync_checkout(&self, source: &BuildSource) -> DeployResult<()> {
        let git = |args: &[&str]| {
            CommandLine::new("git")
                .args(args.iter().copied())
                .current_dir(&source.code_dir)
        };

        for step in [
            git(&["fetch", "origin"]),
            git(&["checkout", source.branch.as_str()]),
            git(&["reset", "--hard"]),
            git(&["clean", "-d", "-x", "-f"]),
            git(&["pull", "origin", source.branch.as_str()]),
        ] {
            self.runner.run(&step)?;
        }
        Ok(())
    }

    fn revision(&self, source: &BuildSource) -> DeployResult<String> {
        let describe = CommandLine::new("git")
            .args(["describe", "--always"])
            .current_dir(&source.code_dir);
        let revision = self.runner.run(&describe)?.trim().to_string();
        if revision.is_empty() {
            return Err(DeployError::Other(format!(
                "could not determine revision of {}",
                source.code_dir
            )));
        }
        Ok(revision)
    }

    fn image_exists(&self, tag: &ImageTag) -> DeployResult<bool> {
        let ids = self.runner.run(&self.docker.image_ids(tag.as_str()))?;
        Ok(!ids.trim().is_empty())
    }
}

/// Advisory lock on a source checkout, held for the duration of a
/// build. The lock is a sibling directory created with `mkdir`, which
/// fails atomically when another build holds it.
struct BuildLock<'a> {
    runner: &'a dyn Runner,
    path: String,
}

impl<'a> BuildLock<'a> {
    fn acquire(runner: &'a dyn Runner, code_dir: &str) -> DeployResult<Self> {
        let path = format!("{}.fdm-lock", code_dir.trim_end_matches('/'));

        if let Some(parent) = Path::new(&path).parent().and_then(Path::to_str) {
            if !parent.is_empty() {
                runner.run(&CommandLine::new("mkdir").args(["-p", parent]))?;
            }
        }

        if !runner.succeeds(&CommandLine::new("mkdir").arg(path.as_str()))? {
            return Err(DeployError::BuildLocked {
                code_dir: code_dir.to_string(),
                lock: path,
            });
        }
        debug!(%path, "build lock acquired");
        Ok(Self { runner, path })
    }
}

impl Drop for BuildLock<'_> {
    fn drop(&mut self) {
        let release = CommandLine::new("rmdir").arg(self.path.as_str());
        match self.runner.succeeds(&release) {
            Ok(true) => debug!(path = %self.path, "build lock released"),
            Ok(false) => warn!(path = %self.path, "build lock already gone"),
            Err(e) => warn!(path = %self.path, error = %e, "failed to release build lock"),
        }
    }
}
