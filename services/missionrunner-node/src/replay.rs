use missionrunner_runner::sim::{ScriptStep, SimRegistry, SimUploader};
use missionrunner_runner::{
    driver, event_channel, HeadlessMissionRunner, RunnerResult, RunnerStatus, VehicleId,
    VehicleRegistry,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upload request observed by the simulated uploader
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadRecord {
    pub vehicle_id: VehicleId,
    pub plan_file: PathBuf,
}

/// Outcome of a replay run
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: usize,
    /// 1-based numbers of steps that reached no subscriber
    pub undelivered_steps: Vec<usize>,
    pub status: RunnerStatus,
    pub uploads: Vec<UploadRecord>,
}

/// Apply `steps` to a simulated link, letting the runner handle everything a
/// step produced before the next one is applied, then shut down and report.
pub fn replay(plan_file: &Path, steps: &[ScriptStep]) -> RunnerResult<ReplayReport> {
    let registry = SimRegistry::new();
    let uploader = SimUploader::new();
    let (sink, mut events) = event_channel();
    let mut runner = HeadlessMissionRunner::new(
        plan_file,
        Some(registry.clone() as Arc<dyn VehicleRegistry>),
        uploader.clone(),
        sink,
    );

    let mut undelivered_steps = Vec::new();
    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        let delivered = registry.apply(step)?;
        if delivered == 0 {
            warn!(step = number, ?step, "Replay step reached no subscriber");
            undelivered_steps.push(number);
        }
        let handled = driver::pump(&mut runner, &mut events);
        debug!(step = number, delivered, handled, "Replay step applied");
    }

    runner.shutdown();

    Ok(ReplayReport {
        steps: steps.len(),
        undelivered_steps,
        status: runner.status(),
        uploads: uploader
            .requests()
            .into_iter()
            .map(|(vehicle_id, plan_file)| UploadRecord {
                vehicle_id,
                plan_file,
            })
            .collect(),
    })
}
