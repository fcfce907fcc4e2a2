//! Error types for Shipyard
//!
//! All modules use `ShipyardResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Shipyard operations
pub type ShipyardResult<T> = Result<T, ShipyardError>;

/// All errors that can occur in Shipyard
#[derive(Error, Debug)]
pub enum ShipyardError {
    // Stage errors
    #[error("Stage {stage}: failed to attach {target}: {reason}")]
    Attach {
        stage: String,
        target: String,
        reason: String,
    },

    #[error("Stage {stage}: command #{command_index} `{command}` exited with status {exit_status}\n{stderr_tail}")]
    Command {
        stage: String,
        command_index: usize,
        command: String,
        exit_status: i32,
        stderr_tail: String,
    },

    #[error("Stage {stage}: verification #{command_index} `{command}` failed with status {exit_status}\n{stderr_tail}")]
    Verification {
        stage: String,
        command_index: usize,
        command: String,
        exit_status: i32,
        stderr_tail: String,
    },

    #[error("Stage {stage}: engine failure: {source}")]
    Engine {
        stage: String,
        #[source]
        source: Box<ShipyardError>,
    },

    // Pipeline definition errors
    #[error("Invalid glob pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    // Engine errors
    #[error("Podman not found. Install it from https://podman.io")]
    PodmanNotFound,

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Failed to create cache volume {name}: {reason}")]
    CacheVolumeCreate { name: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShipyardError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Wrap an engine failure that happened while `stage` was running
    pub fn engine(stage: impl Into<String>, source: ShipyardError) -> Self {
        Self::Engine {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Name of the stage that failed, for stage-scoped errors
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Attach { stage, .. }
            | Self::Command { stage, .. }
            | Self::Verification { stage, .. }
            | Self::Engine { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PodmanNotFound => Some("Install Podman from https://podman.io"),
            Self::Verification { .. } => {
                Some("The stage's commands succeeded but did not produce the expected artifact")
            }
            Self::UnknownStage(_) => Some("Run: shipyard plan"),
            Self::Engine { source, .. } => source.hint(),
            _ => None,
        }
    }
}
