#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use nnsnap::namespace::{
    LifecycleDemoResult, NamespaceConfig, Scenario, ScenarioReport, StepEvent,
    run_lifecycle_demo, run_scenario,
};
use serde::Serialize;
use std::env;
use std::path::Path;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Serialize)]
struct DemoOutput<'a> {
    lines: Vec<String>,
    result: &'a LifecycleDemoResult,
}

fn main() {
    setup_logger();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

/// Console logging to stderr. `RUST_LOG` overrides the default `warn`.
fn setup_logger() {
    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .init();
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    debug!(target: "nnsnap::cli", event = "command", command = %command);

    match command.as_str() {
        "demo" => {
            let json = args.any(|arg| arg == "--json");
            demo(json)
        }
        "replay" => {
            let Some(path) = args.next() else {
                bail!("replay requires a scenario path");
            };
            let json = args.any(|arg| arg == "--json");
            replay(Path::new(&path), json)
        }
        "config" => {
            let Some(path) = args.next() else {
                bail!("config requires a path argument");
            };
            check_config(Path::new(&path))
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("nnsnap\n");
    println!("USAGE:");
    println!("  nnsnap demo [--json]");
    println!("  nnsnap replay <scenario.json> [--json]");
    println!("  nnsnap config <config.json>");
}

fn demo(json: bool) -> Result<()> {
    let result = run_lifecycle_demo().context("lifecycle demo failed")?;
    let lines = result.output_lines();
    if json {
        let output = DemoOutput {
            lines: lines.to_vec(),
            result: &result,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize demo output")?
        );
    } else {
        for line in lines {
            println!("{line}");
        }
    }
    Ok(())
}

fn replay(path: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario = Scenario::from_json_str(&text)
        .with_context(|| format!("invalid scenario {}", path.display()))?;
    let report = run_scenario(&scenario).context("scenario replay failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    for (step, event) in report.steps.iter().enumerate() {
        println!("{step:>4}  {}", describe(event));
    }
    println!("collected blocks: {}", report.collected_blocks.len());
    println!("live blocks: {}", report.live_blocks);
    for (file, factor) in &report.replication_requests {
        println!("replication target {file} -> {factor}");
    }
}

fn describe(event: &StepEvent) -> String {
    match event {
        StepEvent::FileCreated { file } => format!("created {file}"),
        StepEvent::Appended { blocks } => format!("appended {} blocks", blocks.len()),
        StepEvent::Truncated { displaced } => {
            format!("truncated, {} blocks displaced", displaced.len())
        }
        StepEvent::ReplicationSet { required } => format!("replication set, required {required}"),
        StepEvent::SnapshotCreated { snapshot } => format!("snapshot {snapshot}"),
        StepEvent::SnapshotDeleted { deletion } => format!(
            "deleted {}: {} files combined, {} blocks collected, {} released, {} destroyed",
            deletion.snapshot,
            deletion.files.len(),
            deletion.collected_blocks,
            deletion.released_blocks,
            deletion.destroyed_files.len()
        ),
        StepEvent::FileDeleted { outcome } => format!(
            "file deleted: {} blocks collected, destroyed={}",
            outcome.collected_blocks, outcome.destroyed
        ),
        StepEvent::View { view } => {
            format!("view size={} rep={}", view.size, view.replication)
        }
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = NamespaceConfig::load(path)
        .with_context(|| format!("invalid config {}", path.display()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("serialize config")?
    );
    Ok(())
}
