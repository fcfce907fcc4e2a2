//! Plan command - show stages without running them

use crate::cli::args::{OutputFormat, PlanArgs};
use crate::config::Config;
use crate::engine::DirectorySource;
use crate::error::ShipyardResult;
use crate::pipeline::{Operation, Pipeline};
use console::style;

/// Execute the plan command
pub async fn execute(args: PlanArgs, config: &Config) -> ShipyardResult<()> {
    let pipeline = Pipeline::from_config(config)?;

    match args.format {
        OutputFormat::Table => print_table(&pipeline),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pipeline.plan())?),
    }

    Ok(())
}

fn print_table(pipeline: &Pipeline) {
    let plan = pipeline.plan();

    println!("{} {}", style("FROM").bold(), style(plan.base_image).cyan());
    for (k, v) in plan.env {
        println!("{}  {}={}", style("ENV").bold(), k, v);
    }

    for (i, stage) in plan.stages.iter().enumerate() {
        println!();
        println!(
            "{} {}",
            style(format!("[{}/{}]", i + 1, plan.stages.len())).dim(),
            style(&stage.name).bold()
        );
        for op in &stage.operations {
            let line = op.to_string();
            match op {
                Operation::Verify(_) => println!("  {}", style(line).yellow()),
                Operation::Note { .. } => println!("  {}", style(line).dim()),
                Operation::Attach {
                    source: DirectorySource::Host(ctx),
                    ..
                } => {
                    println!("  {}", line);
                    let includes: Vec<&str> = ctx.includes().collect();
                    let excludes: Vec<&str> = ctx.excludes().collect();
                    if !includes.is_empty() {
                        println!("         {}", style(format!("include {}", includes.join(" "))).dim());
                    }
                    if !excludes.is_empty() {
                        println!("         {}", style(format!("exclude {}", excludes.join(" "))).dim());
                    }
                }
                _ => println!("  {}", line),
            }
        }
    }
}
