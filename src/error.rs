pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("command failed{}: {command}", exit_suffix(.code.as_ref()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("stage '{stage}' not found: {path} does not exist")]
    StageNotFound { stage: String, path: String },

    #[error("container '{0}' not found")]
    ContainerNotFound(String),

    #[error("database '{0}' not found - please set it in the config")]
    DatabaseNotFound(String),

    #[error("container '{0}' has no image or build source defined")]
    MissingImageSource(String),

    #[error("hook '{0}' is not registered")]
    HookNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("hook '{hook}' failed")]
    Hook {
        hook: String,
        #[source]
        source: Box<Self>,
    },

    #[error(
        "checkout {code_dir} is locked by another build; \
         if no build is running, remove {lock}"
    )]
    BuildLocked { code_dir: String, lock: String },

    #[error("failed to remove running containers: {}", .0.join(", "))]
    StopFailed(Vec<String>),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl DeployError {
    /// Whether the error stems from the configuration rather than
    /// from a command run against the target host.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::StageNotFound { .. }
                | Self::ContainerNotFound(_)
                | Self::DatabaseNotFound(_)
                | Self::MissingImageSource(_)
                | Self::HookNotFound(_)
                | Self::Config(_)
                | Self::Toml(_)
        )
    }
}

fn exit_suffix(code: Option<&i32>) -> String {
    code.map_or_else(String::new, |c| format!(" (exit {c})"))
}
