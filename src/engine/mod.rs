//! Execution engines
//!
//! The pipeline never touches the filesystem, network or processes itself.
//! Every effect goes through an `ExecutionEngine`:
//! - `PodmanEngine`: drives a local rootless Podman
//! - `RecordingEngine`: records calls without executing (dry runs, tests)

mod podman;
pub mod recording;
pub mod state;

pub use podman::PodmanEngine;
pub use recording::{EngineCall, RecordingEngine};
pub use state::ImageState;

use crate::cache::CacheVolume;
use crate::context::BuildContext;
use crate::error::ShipyardResult;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of command output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub fn output_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Where a directory attached into an image comes from
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectorySource {
    /// A filtered host directory
    Host(BuildContext),
    /// A directory inside another image, never built locally
    Image { reference: String, path: String },
}

impl fmt::Display for DirectorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(ctx) => write!(f, "host:{}", ctx.source.display()),
            Self::Image { reference, path } => write!(f, "{}:{}", reference, path),
        }
    }
}

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Process exit status (-1 when killed by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last lines of combined output, for error reports
    pub fn tail(&self) -> String {
        output_tail(&self.stdout, &self.stderr)
    }
}

/// Result of running a command against an image state
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub output: ExecOutput,
    /// Snapshot after the command. Equal to the input state on failure.
    pub state: ImageState,
}

/// Abstract execution engine interface
///
/// Each method is a pure transformation from the caller's perspective: the
/// input `ImageState` is never invalidated.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Resolve an image reference into a starting state
    async fn from_image(&self, reference: &str) -> ShipyardResult<ImageState>;

    /// Copy a directory into the image at `target`
    async fn with_directory(
        &self,
        state: &ImageState,
        source: &DirectorySource,
        target: &str,
    ) -> ShipyardResult<ImageState>;

    /// Bind a cache volume at `target`, materialising it if needed
    async fn with_mounted_cache(
        &self,
        state: &ImageState,
        volume: &CacheVolume,
        target: &str,
    ) -> ShipyardResult<ImageState>;

    /// Run an argument vector in the state's workdir, env and mounts
    async fn exec(&self, state: &ImageState, argv: &[String]) -> ShipyardResult<ExecResult>;

    /// Run a read-only check like `exec`, but never produce a new snapshot
    async fn check(&self, state: &ImageState, argv: &[String]) -> ShipyardResult<ExecOutput>;

    /// Whether the engine already holds storage for this volume
    async fn cache_exists(&self, volume: &CacheVolume) -> ShipyardResult<bool>;

    /// Human-readable engine name for display
    fn engine_name(&self) -> &'static str;
}
