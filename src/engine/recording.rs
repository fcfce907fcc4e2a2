//! Recording engine for dry runs and tests
//!
//! Executes nothing. Every call is appended to a log, commands succeed with
//! empty output unless a failure rule matches them, and cache volumes are
//! tracked by name so repeated runs against one engine see warm caches.

use crate::cache::CacheVolume;
use crate::engine::{DirectorySource, ExecOutput, ExecResult, ExecutionEngine, ImageState};
use crate::error::{ShipyardError, ShipyardResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One call observed by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EngineCall {
    FromImage {
        reference: String,
    },
    WithDirectory {
        source: String,
        target: String,
    },
    MountCache {
        volume: String,
        target: String,
        /// True when the volume did not exist before this mount
        created: bool,
    },
    Exec {
        argv: Vec<String>,
        workdir: String,
    },
}

#[derive(Debug, Clone)]
struct FailureRule {
    needle: String,
    exit_code: i32,
    stderr: String,
}

/// Engine that records calls instead of executing them
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    volumes: Mutex<BTreeSet<String>>,
    command_failures: Vec<FailureRule>,
    attach_failures: Vec<String>,
    snapshots: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any command whose joined argv contains `needle` exit with `exit_code`
    pub fn fail_command(
        mut self,
        needle: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        self.command_failures.push(FailureRule {
            needle: needle.into(),
            exit_code,
            stderr: stderr.into(),
        });
        self
    }

    /// Make attaching anything at `target` fail
    pub fn fail_attach(mut self, target: impl Into<String>) -> Self {
        self.attach_failures.push(target.into());
        self
    }

    /// Pretend a volume survived from an earlier run
    pub fn with_existing_volume(self, volume_name: impl Into<String>) -> Self {
        lock(&self.volumes).insert(volume_name.into());
        self
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    /// Executed commands so far, each argv joined by spaces
    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                EngineCall::Exec { argv, .. } => Some(argv.join(" ")),
                _ => None,
            })
            .collect()
    }

    /// Whether any executed command contains `needle`
    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }

    /// Volumes the engine holds
    pub fn volumes(&self) -> Vec<String> {
        lock(&self.volumes).iter().cloned().collect()
    }

    /// Forget recorded calls, keeping volumes
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: EngineCall) {
        lock(&self.calls).push(call);
    }

    /// Record a command and produce its output from the failure rules
    fn simulate(&self, state: &ImageState, argv: &[String]) -> ExecOutput {
        self.record(EngineCall::Exec {
            argv: argv.to_vec(),
            workdir: state.workdir.clone(),
        });

        let joined = argv.join(" ");
        match self
            .command_failures
            .iter()
            .find(|r| joined.contains(&r.needle))
        {
            Some(rule) => ExecOutput {
                exit_code: rule.exit_code,
                stdout: String::new(),
                stderr: rule.stderr.clone(),
            },
            None => ExecOutput::default(),
        }
    }

    fn next_snapshot(&self) -> String {
        let n = self.snapshots.fetch_add(1, Ordering::SeqCst) + 1;
        format!("snapshot-{}", n)
    }
}

#[async_trait]
impl ExecutionEngine for RecordingEngine {
    async fn from_image(&self, reference: &str) -> ShipyardResult<ImageState> {
        self.record(EngineCall::FromImage {
            reference: reference.to_string(),
        });
        Ok(ImageState::new(reference))
    }

    async fn with_directory(
        &self,
        state: &ImageState,
        source: &DirectorySource,
        target: &str,
    ) -> ShipyardResult<ImageState> {
        self.record(EngineCall::WithDirectory {
            source: source.to_string(),
            target: target.to_string(),
        });

        if self.attach_failures.iter().any(|t| t == target) {
            return Err(ShipyardError::Internal(format!(
                "simulated attach failure for {}",
                source
            )));
        }

        Ok(state.with_image(self.next_snapshot()))
    }

    async fn with_mounted_cache(
        &self,
        state: &ImageState,
        volume: &CacheVolume,
        target: &str,
    ) -> ShipyardResult<ImageState> {
        let created = lock(&self.volumes).insert(volume.volume_name.clone());
        self.record(EngineCall::MountCache {
            volume: volume.volume_name.clone(),
            target: target.to_string(),
            created,
        });
        Ok(state.with_mount(volume.clone(), target))
    }

    async fn exec(&self, state: &ImageState, argv: &[String]) -> ShipyardResult<ExecResult> {
        let output = self.simulate(state, argv);
        let next = if output.success() {
            state.with_image(self.next_snapshot())
        } else {
            state.clone()
        };

        Ok(ExecResult {
            output,
            state: next,
        })
    }

    async fn check(&self, state: &ImageState, argv: &[String]) -> ShipyardResult<ExecOutput> {
        Ok(self.simulate(state, argv))
    }

    async fn cache_exists(&self, volume: &CacheVolume) -> ShipyardResult<bool> {
        Ok(lock(&self.volumes).contains(&volume.volume_name))
    }

    fn engine_name(&self) -> &'static str {
        "Dry run"
    }
}
