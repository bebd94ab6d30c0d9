//! Serializable runner snapshot for logs and the replay report

use crate::link::VehicleId;
use crate::upload::UploadState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cumulative counters across all attachments.
///
/// Diagnostic only; transitions never read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerCounters {
    /// Vehicles attached
    pub attachments: u64,
    /// Upload requests issued
    pub upload_requests: u64,
    /// Uploads that completed with an error
    pub upload_failures: u64,
    /// Start commands issued
    pub start_commands: u64,
    /// Vehicle notifications dropped because their attachment was released
    pub dropped_notifications: u64,
}

/// Point-in-time view of the runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerStatus {
    /// Preconditions held at construction and the runner has not shut down
    pub active: bool,
    /// Resolved plan file, if preconditions held
    pub plan_file: Option<PathBuf>,
    /// Tracked vehicle
    pub vehicle_id: Option<VehicleId>,
    /// Upload state of the current attachment
    pub upload: UploadState,
    /// Start command issued for the current attachment
    pub mission_started: bool,
    /// Lifetime counters
    pub counters: RunnerCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes() {
        let status = RunnerStatus {
            active: true,
            plan_file: Some(PathBuf::from("/plans/survey.plan")),
            vehicle_id: Some(1),
            upload: UploadState::Completed,
            mission_started: true,
            counters: RunnerCounters {
                attachments: 1,
                upload_requests: 1,
                upload_failures: 0,
                start_commands: 1,
                dropped_notifications: 0,
            },
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["vehicle_id"], 1);
        assert_eq!(json["upload"], "Completed");
        assert_eq!(json["counters"]["start_commands"], 1);

        let back: RunnerStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }
}
