//! Opinionated helper to build, ship and restart docker containers.
//!
//! Every environment ("stage") is described by a TOML file naming the
//! host to deploy to and the containers that run there. A deploy
//! resolves the image of a container, by pulling a fixed image or by
//! building a git checkout on the host, then replaces the running
//! instances of that container with a fresh one.
//!
//! # Overview
//!
//! - [`StageConfig`] loads `<stage>.toml` and resolves its hooks
//! - [`Runner`] executes commands locally or over SSH
//! - [`ImageProvider`] pulls or builds images, tagging builds with
//!   the git revision
//! - [`InstanceTracker`] finds and removes running instances
//! - [`Orchestrator`] sequences a full deploy
//!
//! # Example
//!
//! A project ships its own binary to register hooks:
//!
//! ```rust,no_run
//! use fdm::Fdm;
//!
//! fn main() -> anyhow::Result<()> {
//!     Fdm::new()
//!         .hook("before_deploy", |ctx, _runner| {
//!             eprintln!("about to start {} with {:?}", ctx.image, ctx.run_args);
//!             Ok(())
//!         })
//!         .run()?;
//!     Ok(())
//! }
//! ```
//!
//! ```sh
//! fdm deploy app_1 --stage staging
//! fdm status --stage production
//! fdm shell app_1 --rebuild=false --cmd "./manage.py migrate"
//! ```
//!
//! [`Runner`]: runner::Runner
//! [`ImageProvider`]: image::ImageProvider
//! [`InstanceTracker`]: instance::InstanceTracker
//! [`Orchestrator`]: deploy::Orchestrator

#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod cli;
pub mod cmd;
pub mod command;
pub mod config;
pub mod database;
pub mod deploy;
pub mod docker;
pub mod error;
pub mod hook;
pub mod human;
pub mod image;
pub mod instance;
pub mod prompt;
pub mod redirect;
pub mod runner;
pub mod ssh;

pub use cli::Fdm;
pub use command::CommandLine;
pub use config::{ContainerSpec, StageConfig};
pub use deploy::{DeployOptions, DeployReport, Orchestrator};
pub use error::{DeployError, DeployResult};
pub use hook::{HookContext, HookRef, Hooks};
pub use image::{ImageProvider, ImageTag};
pub use instance::{InstanceTracker, RunningInstance};
pub use runner::{LocalRunner, RemoteRunner, Runner};
