//! MissionRunner replay node
//!
//! Runs the headless mission runner against a simulated vehicle link driven
//! by a JSON-lines script and prints the final runner status as JSON.

mod cli;
mod replay;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use missionrunner_runner::sim::parse_script;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    missionrunner_core::logging::init_with(&config.logging)?;

    let script = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("reading replay script {}", cli.script.display()))?;
    let steps = parse_script(&script)?;

    info!(
        plan = %config.mission.plan_file.display(),
        steps = steps.len(),
        "Starting replay"
    );

    let report = replay::replay(&config.mission.plan_file, &steps)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
