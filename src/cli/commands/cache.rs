//! Cache command - inspect the pipeline's cache volumes

use crate::cache::CacheVolume;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::engine::{ExecutionEngine, PodmanEngine};
use crate::error::ShipyardResult;
use console::style;
use serde::Serialize;

#[derive(Serialize)]
struct CacheStatus {
    name: String,
    volume: String,
    exists: bool,
}

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ShipyardResult<()> {
    let engine = PodmanEngine::new()?;

    match args.action {
        CacheAction::List { format } => list_caches(&engine, config, format).await,
    }
}

/// Cache volumes the configured pipeline mounts
pub fn configured_caches(config: &Config) -> Vec<CacheVolume> {
    let caches = &config.caches;
    [&caches.deps, &caches.build, &caches.node_modules]
        .into_iter()
        .map(|name| CacheVolume::new(name.as_str(), &caches.prefix))
        .collect()
}

async fn list_caches(
    engine: &dyn ExecutionEngine,
    config: &Config,
    format: OutputFormat,
) -> ShipyardResult<()> {
    let mut statuses = Vec::new();
    for volume in configured_caches(config) {
        let exists = engine.cache_exists(&volume).await?;
        statuses.push(CacheStatus {
            name: volume.name,
            volume: volume.volume_name,
            exists,
        });
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
        OutputFormat::Table => print_cache_table(&statuses),
    }

    Ok(())
}

fn print_cache_table(statuses: &[CacheStatus]) {
    println!(
        "{:<24} {:<32} {:<10}",
        style("CACHE").bold(),
        style("VOLUME").bold(),
        style("STATE").bold()
    );
    println!("{}", "-".repeat(66));

    for status in statuses {
        let state = if status.exists {
            style("warm").green().to_string()
        } else {
            style("empty").dim().to_string()
        };
        println!("{:<24} {:<32} {:<10}", status.name, status.volume, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_caches_use_prefix() {
        let mut config = Config::default();
        config.caches.prefix = "ci-".to_string();

        let names: Vec<String> = configured_caches(&config)
            .into_iter()
            .map(|v| v.volume_name)
            .collect();
        assert_eq!(names, vec!["ci-app-deps", "ci-app-build", "ci-app-node-modules"]);
    }

    #[tokio::test]
    async fn list_reports_existing_volumes() {
        use crate::engine::RecordingEngine;

        let engine = RecordingEngine::new().with_existing_volume("app-deps");
        let result = list_caches(&engine, &Config::default(), OutputFormat::Json).await;
        assert!(result.is_ok());
    }
}
