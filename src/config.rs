//! Stage configuration.
//!
//! Each stage lives in its own `{config_dir}/{stage}.toml`:
//!
//! ```toml
//! [server]
//! host = "app.example.com"
//! user = "deploy"
//!
//! [containers.web]
//! build = "git@github.com:acme/web.git"
//! branch = "main"
//! code_dir = "/srv/web"
//! environments = ["DATABASE_URL=${DATABASE_URL}"]
//! ports = ["80:3000"]
//! hook_before_deploy = "migrate"
//!
//! [containers.cache]
//! image = "redis:6"
//!
//! [hooks.migrate]
//! command = ["docker", "run", "--rm", "{image}", "./migrate"]
//! ```
//!
//! `$VAR` and `${VAR}` references in string values are replaced from
//! the process environment before the file is interpreted. Unknown
//! variables are left as written.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::docker::Docker;
use crate::error::{DeployError, DeployResult};
use crate::hook::{CommandHook, HookRef, Hooks};
use crate::instance::instance_prefix;
use crate::runner::{LocalRunner, RemoteRunner, Runner};
use crate::ssh::SshSession;

/// Connection details of the host the stage deploys to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    /// Private key passed to `ssh -i`.
    #[serde(default)]
    pub key: Option<String>,
    /// Prefix docker invocations with `sudo`.
    #[serde(default)]
    pub sudo: bool,
}

const fn default_ssh_port() -> u16 {
    22
}

/// Where the image of a container is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSource {
    pub url: String,
    pub branch: String,
    pub code_dir: String,
    /// Build context below `code_dir`.
    pub build_path: Option<String>,
    pub build_args: Vec<String>,
}

impl BuildSource {
    /// Directory `docker build` runs in.
    #[must_use]
    pub fn build_dir(&self) -> String {
        self.build_path.as_ref().map_or_else(
            || self.code_dir.clone(),
            |path| {
                Path::new(&self.code_dir)
                    .join(path)
                    .to_string_lossy()
                    .into_owned()
            },
        )
    }
}

/// How to obtain and run one named service.
///
/// # Example
///
/// ```
/// use fdm::ContainerSpec;
///
/// let spec = ContainerSpec::new("web")
///     .source("git@github.com:acme/web.git", "main", "/srv/web")
///     .env("PORT=3000")
///     .port("80:3000");
///
/// assert_eq!(spec.name, "web");
/// assert!(spec.has_ports());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub display_name: Option<String>,
    pub image: Option<String>,
    pub source: Option<BuildSource>,
    pub environments: Vec<String>,
    pub volumes: Vec<String>,
    pub ports: Vec<String>,
    pub labels: Vec<String>,
    pub extra_args: Vec<String>,
    pub run_options: Vec<String>,
    pub hook_before_deploy: Option<HookRef>,
    pub hook_after_deploy: Option<HookRef>,
}

impl ContainerSpec {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Fixed name for the running container instead of a generated
    /// one. It must contain `{stage}_{name}`, otherwise later deploys
    /// cannot find the instance to replace. A container with a fixed
    /// name has its old instance removed before the new one starts.
    #[must_use]
    pub fn display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    #[must_use]
    pub fn source(mut self, url: &str, branch: &str, code_dir: &str) -> Self {
        self.source = Some(BuildSource {
            url: url.to_string(),
            branch: branch.to_string(),
            code_dir: code_dir.to_string(),
            build_path: None,
            build_args: Vec::new(),
        });
        self
    }

    /// Ignored unless a build source is set.
    #[must_use]
    pub fn build_path(mut self, path: &str) -> Self {
        if let Some(source) = &mut self.source {
            source.build_path = Some(path.to_string());
        }
        self
    }

    /// Ignored unless a build source is set.
    #[must_use]
    pub fn build_arg(mut self, arg: &str) -> Self {
        if let Some(source) = &mut self.source {
            source.build_args.push(arg.to_string());
        }
        self
    }

    #[must_use]
    pub fn env(mut self, var: &str) -> Self {
        self.environments.push(var.to_string());
        self
    }

    #[must_use]
    pub fn volume(mut self, volume: &str) -> Self {
        self.volumes.push(volume.to_string());
        self
    }

    #[must_use]
    pub fn port(mut self, port: &str) -> Self {
        self.ports.push(port.to_string());
        self
    }

    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    #[must_use]
    pub fn extra_arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }

    #[must_use]
    pub fn run_option(mut self, option: &str) -> Self {
        self.run_options.push(option.to_string());
        self
    }

    #[must_use]
    pub fn before_deploy(mut self, hook: HookRef) -> Self {
        self.hook_before_deploy = Some(hook);
        self
    }

    #[must_use]
    pub fn after_deploy(mut self, hook: HookRef) -> Self {
        self.hook_after_deploy = Some(hook);
        self
    }

    #[must_use]
    pub fn has_ports(&self) -> bool {
        !self.ports.is_empty()
    }

    /// Reject a display name that instance lookup would not match.
    pub fn check_display_name(&self, stage: &str) -> DeployResult<()> {
        let prefix = instance_prefix(stage, &self.name);
        match &self.display_name {
            Some(display) if !display.contains(&prefix) => Err(DeployError::Config(format!(
                "display_name '{display}' of container '{}' must contain '{prefix}'",
                self.name
            ))),
            _ => Ok(()),
        }
    }

    /// Per-container `docker run` arguments: environment, volumes,
    /// ports, labels, then the free-form extras.
    #[must_use]
    pub fn run_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, values) in [
            ("-e", &self.environments),
            ("-v", &self.volumes),
            ("-p", &self.ports),
            ("-l", &self.labels),
        ] {
            for value in values {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Connection to a Postgres database reachable from the stage host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseSpec {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub name: String,
    /// Run `pg_dump` inside this container instead of on the host.
    #[serde(default)]
    pub container: Option<String>,
    /// Local database to restore the dump into.
    #[serde(default)]
    pub local_database: Option<String>,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

const fn default_db_port() -> u16 {
    5432
}

fn default_backup_dir() -> String {
    ".".to_string()
}

/// An expected HTTP redirect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedirectCheck {
    pub from: String,
    pub to: String,
    #[serde(default = "default_redirect_status")]
    pub status: u16,
    /// Warn when the target certificate expires within this many
    /// days.
    #[serde(default = "default_warn_days")]
    pub warn_days: i64,
}

const fn default_redirect_status() -> u16 {
    301
}

const fn default_warn_days() -> i64 {
    14
}

/// Fully resolved configuration of one stage. Immutable once
/// loaded.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub stage: String,
    /// `None` runs everything on the local machine.
    pub server: Option<ServerConfig>,
    pub containers: IndexMap<String, ContainerSpec>,
    pub databases: IndexMap<String, DatabaseSpec>,
    pub redirects: Vec<RedirectCheck>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStage {
    server: Option<ServerConfig>,
    containers: IndexMap<String, RawContainer>,
    #[serde(alias = "databases")]
    database: IndexMap<String, DatabaseSpec>,
    redirects: Vec<RedirectCheck>,
    hooks: IndexMap<String, CommandHook>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawContainer {
    name: Option<String>,
    display_name: Option<String>,
    image: Option<String>,
    #[serde(alias = "build")]
    source_url: Option<String>,
    branch: Option<String>,
    code_dir: Option<String>,
    build_path: Option<String>,
    build_args: Vec<String>,
    #[serde(alias = "environment")]
    environments: Vec<String>,
    volumes: Vec<String>,
    ports: Vec<String>,
    labels: Vec<String>,
    #[serde(alias = "cmds")]
    extra_args: Vec<String>,
    run_options: Vec<String>,
    hook_before_deploy: Option<String>,
    hook_after_deploy: Option<String>,
}

impl StageConfig {
    /// An empty configuration for a stage, used when building one
    /// in code.
    #[must_use]
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            server: None,
            containers: IndexMap::new(),
            databases: IndexMap::new(),
            redirects: Vec::new(),
        }
    }

    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    #[must_use]
    pub fn container(mut self, spec: ContainerSpec) -> Self {
        self.containers.insert(spec.name.clone(), spec);
        self
    }

    /// Path of the file holding `stage`.
    #[must_use]
    pub fn path(config_dir: &Path, stage: &str) -> PathBuf {
        config_dir.join(format!("{stage}.toml"))
    }

    /// Load `{config_dir}/{stage}.toml`, interpolating the process
    /// environment.
    pub fn load(config_dir: &Path, stage: &str, hooks: &Hooks) -> DeployResult<Self> {
        let path = Self::path(config_dir, stage);
        if !path.exists() {
            return Err(DeployError::StageNotFound {
                stage: stage.to_string(),
                path: path.display().to_string(),
            });
        }
        debug!(path = %path.display(), "loading stage config");
        let content = std::fs::read_to_string(&path)?;
        Self::parse(stage, &content, hooks, |name| std::env::var(name).ok())
    }

    /// Parse stage file content, resolving variables through
    /// `lookup`.
    pub fn parse(
        stage: &str,
        content: &str,
        hooks: &Hooks,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> DeployResult<Self> {
        let mut value: toml::Value = toml::from_str(content)?;
        interpolate(&mut value, &lookup);
        let raw: RawStage = value.try_into()?;

        let mut hooks = hooks.clone();
        for (name, hook) in raw.hooks {
            if !hooks.contains(&name) {
                hooks.insert(HookRef::new(&name, hook));
            }
        }

        let mut containers = IndexMap::new();
        for (key, container) in raw.containers {
            let spec = resolve_container(&key, container, &hooks)?;
            spec.check_display_name(stage)?;
            containers.insert(key, spec);
        }

        Ok(Self {
            stage: stage.to_string(),
            server: raw.server,
            containers,
            databases: raw.database,
            redirects: raw.redirects,
        })
    }

    /// Look up a container by its key in the stage file.
    pub fn container_spec(&self, key: &str) -> DeployResult<&ContainerSpec> {
        self.containers
            .get(key)
            .ok_or_else(|| DeployError::ContainerNotFound(key.to_string()))
    }

    pub fn database(&self, key: &str) -> DeployResult<&DatabaseSpec> {
        self.databases
            .get(key)
            .ok_or_else(|| DeployError::DatabaseNotFound(key.to_string()))
    }

    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.server.is_some()
    }

    #[must_use]
    pub fn docker(&self) -> Docker {
        Docker::new(self.server.as_ref().is_some_and(|s| s.sudo))
    }

    /// Runner targeting the stage host, or the local machine when no
    /// server is configured.
    #[must_use]
    pub fn runner(&self) -> Box<dyn Runner> {
        match &self.server {
            Some(server) => {
                let mut ssh = SshSession::new(&server.host, &server.user).with_port(server.port);
                if let Some(key) = &server.key {
                    ssh = ssh.with_key(key);
                }
                Box::new(RemoteRunner::new(ssh))
            }
            None => Box::new(LocalRunner::new()),
        }
    }
}

fn resolve_container(key: &str, raw: RawContainer, hooks: &Hooks) -> DeployResult<ContainerSpec> {
    let name = raw.name.unwrap_or_else(|| key.to_string());

    let source = match (raw.source_url, raw.branch, raw.code_dir) {
        (Some(url), Some(branch), Some(code_dir)) => Some(BuildSource {
            url,
            branch,
            code_dir,
            build_path: raw.build_path,
            build_args: raw.build_args,
        }),
        (None, None, None) => None,
        _ if raw.image.is_some() => None,
        _ => {
            return Err(DeployError::Config(format!(
                "container '{key}' needs build, branch and code_dir to build from source"
            )));
        }
    };

    if raw.image.is_none() && source.is_none() {
        return Err(DeployError::MissingImageSource(key.to_string()));
    }

    let resolve = |name: Option<String>| name.map(|n| hooks.resolve(&n)).transpose();

    Ok(ContainerSpec {
        name,
        display_name: raw.display_name,
        image: raw.image,
        source,
        environments: raw.environments,
        volumes: raw.volumes,
        ports: raw.ports,
        labels: raw.labels,
        extra_args: raw.extra_args,
        run_options: raw.run_options,
        hook_before_deploy: resolve(raw.hook_before_deploy)?,
        hook_after_deploy: resolve(raw.hook_after_deploy)?,
    })
}

fn interpolate(value: &mut toml::Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(s) => *s = expand_vars(s, lookup),
        toml::Value::Array(items) => {
            for item in items {
                interpolate(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                interpolate(item, lookup);
            }
        }
        _ => {}
    }
}

/// Replace `$NAME` and `${NAME}` with values from `lookup`. Names
/// without a value, and malformed references, are kept verbatim.
#[must_use]
pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = after.strip_prefix('{').map_or_else(
            || {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], end)
            },
            |braced| {
                braced
                    .find('}')
                    .map_or(("", 0), |end| (&braced[..end], end + 2))
            },
        );

        let reference = &rest[pos..=pos + consumed];
        match lookup(name) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(reference),
        }
        rest = &rest[pos + 1 + consumed..];
    }

    out.push_str(rest);
    out
}
