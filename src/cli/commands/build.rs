//! Build command - run the image pipeline

use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::engine::{ExecutionEngine, PodmanEngine, RecordingEngine};
use crate::error::ShipyardResult;
use crate::pipeline::{Pipeline, PipelineReport, StageEvent};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> ShipyardResult<()> {
    let mut pipeline = Pipeline::from_config(config)?;
    if let Some(ref stage) = args.until {
        pipeline = pipeline.until(stage)?;
    }

    let engine: Box<dyn ExecutionEngine> = if args.dry_run {
        Box::new(RecordingEngine::new())
    } else {
        Box::new(PodmanEngine::new()?)
    };
    debug!("Using engine: {}", engine.engine_name());

    let pb = create_progress_bar(&format!("Preparing {}...", config.images.base));
    let quiet = args.json;

    let result = pipeline
        .run_with(&*engine, &|event| match event {
            StageEvent::Started { name, index, total } => {
                pb.set_message(format!("[{}/{}] {}", index + 1, total, name));
            }
            StageEvent::Finished { name, duration_ms } => {
                if !quiet {
                    pb.suspend(|| {
                        println!(
                            "{} {} ({})",
                            style("✓").green(),
                            name,
                            format_duration(duration_ms)
                        );
                    });
                }
            }
        })
        .await;
    pb.finish_and_clear();
    let report = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, args.dry_run);
    }

    Ok(())
}

fn print_summary(report: &PipelineReport, dry_run: bool) {
    let total: u64 = report.stages.iter().map(|s| s.duration_ms).sum();
    let label = if dry_run { "Dry run complete" } else { "Build complete" };

    println!();
    println!(
        "{} {} in {}",
        style("✓").green().bold(),
        style(label).bold(),
        format_duration(total)
    );
    println!("  Image:  {}", style(&report.final_state.image).cyan());
    println!("  Stages: {}", report.stages.len());
    if !report.caches.is_empty() {
        let names: Vec<&str> = report.caches.iter().map(|c| c.volume_name.as_str()).collect();
        println!("  Caches: {}", names.join(", "));
    }
}

fn format_duration(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
