use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::command::CommandLine;
use crate::error::{DeployError, DeployResult};
use crate::runner::Runner;

/// What a hook gets to see of the deploy in progress.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub stage: &'a str,
    pub container: &'a str,
    pub image: &'a str,
    pub run_args: &'a [String],
}

/// User-supplied step run before or after the new container
/// starts. An error aborts the deploy.
pub trait Hook {
    fn run(&self, ctx: &HookContext<'_>, runner: &dyn Runner) -> DeployResult<()>;
}

/// A closure used as a hook, see [`HookRef::from_fn`].
pub struct FnHook<F>(F);

impl<F> Hook for FnHook<F>
where
    F: Fn(&HookContext<'_>, &dyn Runner) -> DeployResult<()>,
{
    fn run(&self, ctx: &HookContext<'_>, runner: &dyn Runner) -> DeployResult<()> {
        (self.0)(ctx, runner)
    }
}

/// Hook declared in the stage file:
///
/// ```toml
/// [hooks.migrate]
/// command = ["docker", "run", "--rm", "{image}", "./migrate"]
/// ```
///
/// `{image}`, `{stage}` and `{container}` are substituted in every
/// argument before the command runs on the target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandHook {
    pub command: Vec<String>,
}

impl Hook for CommandHook {
    fn run(&self, ctx: &HookContext<'_>, runner: &dyn Runner) -> DeployResult<()> {
        let mut argv = self.command.iter().map(|arg| {
            arg.replace("{image}", ctx.image)
                .replace("{stage}", ctx.stage)
                .replace("{container}", ctx.container)
        });
        let program = argv
            .next()
            .ok_or_else(|| DeployError::Config("hook command is empty".into()))?;
        let output = runner.run(&CommandLine::new(&program).args(argv))?;
        if !output.is_empty() {
            info!(%output, "hook output");
        }
        Ok(())
    }
}

/// A hook resolved by name, ready to invoke.
#[derive(Clone)]
pub struct HookRef {
    pub name: String,
    hook: Arc<dyn Hook>,
}

impl HookRef {
    pub fn new(name: &str, hook: impl Hook + 'static) -> Self {
        Self {
            name: name.to_string(),
            hook: Arc::new(hook),
        }
    }

    /// Wrap a closure.
    pub fn from_fn<F>(name: &str, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>, &dyn Runner) -> DeployResult<()> + 'static,
    {
        Self::new(name, FnHook(hook))
    }

    /// Run the hook, wrapping any failure with the hook's name.
    pub fn invoke(&self, ctx: &HookContext<'_>, runner: &dyn Runner) -> DeployResult<()> {
        info!(hook = %self.name, image = ctx.image, "running hook");
        self.hook.run(ctx, runner).map_err(|e| DeployError::Hook {
            hook: self.name.clone(),
            source: Box::new(e),
        })
    }
}

impl fmt::Debug for HookRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Named hooks available to stage files.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: HashMap<String, HookRef>,
}

impl Hooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure under `name`, replacing any previous hook
    /// with that name.
    #[must_use]
    pub fn register<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>, &dyn Runner) -> DeployResult<()> + 'static,
    {
        self.insert(HookRef::from_fn(name, hook));
        self
    }

    pub fn insert(&mut self, hook: HookRef) {
        self.hooks.insert(hook.name.clone(), hook);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> DeployResult<HookRef> {
        self.hooks
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::HookNotFound(name.to_string()))
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("Hooks").field("names", &names).finish()
    }
}
