//! Pipeline composition
//!
//! A pipeline threads one `ImageState` through its stages in order. The
//! first failure ends the run: there is no rollback and no retry, and cache
//! volumes keep whatever earlier commands wrote to them.

pub mod operation;
pub mod stage;
pub mod stages;

pub use operation::{Operation, Verify};
pub use stage::Stage;

use crate::cache::{CacheRegistry, CacheVolume};
use crate::config::Config;
use crate::engine::{ExecutionEngine, ImageState};
use crate::error::{ShipyardError, ShipyardResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

/// Progress notification emitted while a pipeline runs
#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    Started {
        name: &'a str,
        index: usize,
        total: usize,
    },
    Finished {
        name: &'a str,
        duration_ms: u64,
    },
}

/// Timing for one completed stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub commands: usize,
    pub duration_ms: u64,
}

/// Result of a successful pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub base_image: String,
    pub stages: Vec<StageReport>,
    /// Cache volumes mounted during the run
    pub caches: Vec<CacheVolume>,
    pub final_state: ImageState,
}

/// Description of a pipeline, without executing anything
#[derive(Debug, Clone, Serialize)]
pub struct PipelinePlan<'a> {
    pub base_image: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub stages: &'a [Stage],
}

/// Ordered composition of stages over a base image
#[derive(Debug, Clone)]
pub struct Pipeline {
    base_image: String,
    env: BTreeMap<String, String>,
    cache_prefix: String,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline starting from `base_image`
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            env: BTreeMap::new(),
            cache_prefix: String::new(),
            stages: Vec::new(),
        }
    }

    /// The standard application pipeline for `config`
    pub fn from_config(config: &Config) -> ShipyardResult<Self> {
        let pipeline = stages::standard(config)?.into_iter().fold(
            Self::new(&config.images.base)
                .with_env(config.env.clone())
                .with_cache_prefix(&config.caches.prefix),
            Self::stage,
        );
        Ok(pipeline)
    }

    /// Environment every command sees
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Prefix for engine-level cache volume names
    pub fn with_cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    /// Append a stage
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Drop every stage after `name`
    pub fn until(mut self, name: &str) -> ShipyardResult<Self> {
        let position = self
            .stages
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ShipyardError::UnknownStage(name.to_string()))?;
        self.stages.truncate(position + 1);
        Ok(self)
    }

    pub fn plan(&self) -> PipelinePlan<'_> {
        PipelinePlan {
            base_image: &self.base_image,
            env: &self.env,
            stages: &self.stages,
        }
    }

    /// Run every stage and return the final image state
    pub async fn run(&self, engine: &dyn ExecutionEngine) -> ShipyardResult<ImageState> {
        let report = self.run_with(engine, &|_| {}).await?;
        Ok(report.final_state)
    }

    /// Run every stage, reporting progress to `observer`
    pub async fn run_with(
        &self,
        engine: &dyn ExecutionEngine,
        observer: &(dyn Fn(StageEvent<'_>) + Send + Sync),
    ) -> ShipyardResult<PipelineReport> {
        let started_at = Utc::now();
        let caches = CacheRegistry::new(&self.cache_prefix);

        info!(
            engine = engine.engine_name(),
            base = %self.base_image,
            stages = self.stages.len(),
            "Starting pipeline"
        );

        let mut state = engine
            .from_image(&self.base_image)
            .await?
            .with_env(self.env.clone());
        let mut reports = Vec::with_capacity(self.stages.len());
        let total = self.stages.len();

        for (index, stage) in self.stages.iter().enumerate() {
            observer(StageEvent::Started {
                name: &stage.name,
                index,
                total,
            });

            let start = Instant::now();
            state = stage.apply(engine, &caches, &state).await?;
            let duration_ms = start.elapsed().as_millis() as u64;

            observer(StageEvent::Finished {
                name: &stage.name,
                duration_ms,
            });
            reports.push(StageReport {
                name: stage.name.clone(),
                commands: stage.command_count(),
                duration_ms,
            });
        }

        info!(image = %state.image, "Pipeline complete");

        Ok(PipelineReport {
            started_at,
            finished_at: Utc::now(),
            base_image: self.base_image.clone(),
            stages: reports,
            caches: caches.acquired(),
            final_state: state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, RecordingEngine};
    use std::sync::Mutex;

    fn pipeline() -> Pipeline {
        Pipeline::from_config(&Config::default()).unwrap()
    }

    fn mounts(engine: &RecordingEngine) -> Vec<(String, bool)> {
        engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::MountCache {
                    volume, created, ..
                } => Some((volume, created)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn end_to_end_with_empty_caches() {
        let engine = RecordingEngine::new();
        let report = pipeline().run_with(&engine, &|_| {}).await.unwrap();

        let names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["source", "deps", "assets", "legacy-assets", "release"]
        );
        assert_eq!(
            engine.commands().last().map(String::as_str),
            Some("/app.release/bin/changelog version")
        );
        assert_eq!(report.final_state.workdir, "/app");
        assert_eq!(report.final_state.mounts.len(), 3);
        assert_eq!(
            report.final_state.env.get("MIX_ENV").map(String::as_str),
            Some("prod")
        );
        assert_eq!(report.caches.len(), 3);
        assert!(mounts(&engine).iter().all(|(_, created)| *created));
    }

    #[tokio::test]
    async fn dep_fetch_failure_stops_pipeline() {
        let engine = RecordingEngine::new().fail_command("mix deps.get", 1, "hex.pm unreachable");
        let err = pipeline().run(&engine).await.unwrap_err();

        match &err {
            ShipyardError::Command { stage, command, .. } => {
                assert_eq!(stage, "deps");
                assert_eq!(command, "mix deps.get");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!engine.ran("yarn"));
        assert!(!engine.calls().iter().any(|c| matches!(
            c,
            EngineCall::WithDirectory { target, .. } if target == "/app/assets"
        )));
    }

    #[tokio::test]
    async fn lockfile_mismatch_stops_before_asset_compile() {
        let engine = RecordingEngine::new().fail_command(
            "yarn install --frozen-lockfile",
            1,
            "Your lockfile needs to be updated",
        );
        let err = pipeline().run(&engine).await.unwrap_err();

        assert_eq!(err.stage(), Some("assets"));
        assert!(engine.ran("mix compile"));
        assert!(!engine.ran("yarn run compile"));
        assert!(!engine.ran("phx.digest"));
    }

    #[tokio::test]
    async fn missing_legacy_uploads_fails_verification() {
        let engine = RecordingEngine::new().fail_command("wp-content/uploads", 2, "No such file");
        let err = pipeline().run(&engine).await.unwrap_err();

        assert!(matches!(
            err,
            ShipyardError::Verification { ref stage, .. } if stage == "legacy-assets"
        ));
        assert!(!engine.ran("phx.gen.release"));
    }

    #[tokio::test]
    async fn verifications_do_not_snapshot() {
        let engine = RecordingEngine::new();
        let pipeline = Pipeline::new("base")
            .stage(Stage::new("check").then(Operation::Verify(Verify::file("/app/mix.exs"))));

        let state = pipeline.run(&engine).await.unwrap();

        assert_eq!(state.image, "base");
        assert!(engine.ran("ls -lah /app/mix.exs"));
    }

    #[tokio::test]
    async fn warm_rerun_reuses_caches() {
        let engine = RecordingEngine::new();
        let first = pipeline().run(&engine).await.unwrap();
        let first_commands = engine.commands();
        engine.clear_calls();

        let second = pipeline().run(&engine).await.unwrap();

        assert_eq!(engine.commands(), first_commands);
        assert_eq!(first.mounts, second.mounts);
        assert!(mounts(&engine).iter().all(|(_, created)| !*created));
        assert_eq!(engine.volumes().len(), 3);
    }

    #[tokio::test]
    async fn failed_run_keeps_caches_for_next_run() {
        let failing = RecordingEngine::new().fail_command("mix compile", 1, "syntax error");
        assert!(pipeline().run(&failing).await.is_err());

        assert_eq!(failing.volumes(), vec!["app-build", "app-deps"]);
    }

    #[tokio::test]
    async fn same_cache_name_mounted_twice_shares_volume() {
        let engine = RecordingEngine::new();
        let pipeline = Pipeline::new("base")
            .stage(Stage::new("one").then(Operation::mount_cache("shared", "/a")))
            .stage(Stage::new("two").then(Operation::mount_cache("shared", "/b")));

        let state = pipeline.run(&engine).await.unwrap();

        assert_eq!(
            mounts(&engine),
            vec![("shared".to_string(), true), ("shared".to_string(), false)]
        );
        assert_eq!(state.mounts.len(), 1);
        assert_eq!(state.mounts[0].target, "/b");
    }

    #[tokio::test]
    async fn observer_sees_every_stage() {
        let engine = RecordingEngine::new();
        let seen = Mutex::new(Vec::new());

        pipeline()
            .run_with(&engine, &|event| {
                if let StageEvent::Started { name, index, total } = event {
                    seen.lock().unwrap().push(format!("{}/{} {}", index + 1, total, name));
                }
            })
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first().map(String::as_str), Some("1/5 source"));
        assert_eq!(seen.last().map(String::as_str), Some("5/5 release"));
    }

    #[tokio::test]
    async fn partial_env_reaches_commands_with_mix_env() {
        let config: Config = toml::from_str("[env]\nLANG = \"C.UTF-8\"\n").unwrap();
        let engine = RecordingEngine::new();

        let state = Pipeline::from_config(&config)
            .unwrap()
            .run(&engine)
            .await
            .unwrap();

        assert_eq!(state.env.get("MIX_ENV").map(String::as_str), Some("prod"));
        assert_eq!(state.env.get("LANG").map(String::as_str), Some("C.UTF-8"));
    }

    #[tokio::test]
    async fn cache_prefix_applies_to_volumes() {
        let mut config = Config::default();
        config.caches.prefix = "ci-".to_string();
        let engine = RecordingEngine::new();

        Pipeline::from_config(&config)
            .unwrap()
            .run(&engine)
            .await
            .unwrap();

        assert_eq!(
            engine.volumes(),
            vec!["ci-app-build", "ci-app-deps", "ci-app-node-modules"]
        );
    }

    #[test]
    fn until_truncates() {
        let truncated = pipeline().until("deps").unwrap();
        let names: Vec<&str> = truncated.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["source", "deps"]);

        assert!(matches!(
            pipeline().until("deploy"),
            Err(ShipyardError::UnknownStage(_))
        ));
    }

    #[test]
    fn plan_serializes() {
        let pipeline = pipeline();
        let json = serde_json::to_value(pipeline.plan()).unwrap();
        assert_eq!(json["stages"].as_array().unwrap().len(), 5);
        assert_eq!(json["stages"][1]["operations"][0]["op"], "mount_cache");
        assert_eq!(json["stages"][0]["operations"][0]["source"]["kind"], "host");
    }
}
