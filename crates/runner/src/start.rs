//! Mission start trigger
//!
//! Issues the start command at most once per attachment, and only after the
//! plan upload completed.

use crate::link::Vehicle;
use crate::upload::UploadState;
use tracing::{debug, info, warn};

/// Result of a start attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Start command issued
    Started,
    /// Already issued for this attachment
    AlreadyStarted,
    /// Upload has not completed
    UploadIncomplete(UploadState),
    /// Vehicle exposes no firmware plugin
    PluginUnavailable,
}

/// Per-attachment mission-started flag and the logic guarding it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionStartTrigger {
    started: bool,
}

impl MissionStartTrigger {
    /// Fresh trigger, nothing started
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the start command has been issued for this attachment
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Issue `start_mission` through the vehicle's firmware plugin if allowed.
    ///
    /// A missing plugin leaves the flag clear. Nothing retries it; the next
    /// chance is a fresh attachment.
    pub fn attempt(&mut self, vehicle: &dyn Vehicle, upload: UploadState) -> StartOutcome {
        if self.started {
            debug!(vehicle_id = vehicle.id(), "Mission already started");
            return StartOutcome::AlreadyStarted;
        }
        if upload != UploadState::Completed {
            debug!(vehicle_id = vehicle.id(), upload = %upload, "Start deferred until upload completes");
            return StartOutcome::UploadIncomplete(upload);
        }

        let Some(plugin) = vehicle.firmware_plugin() else {
            warn!(vehicle_id = vehicle.id(), "Firmware plugin unavailable");
            return StartOutcome::PluginUnavailable;
        };

        info!(vehicle_id = vehicle.id(), "Starting mission");
        plugin.start_mission(vehicle);
        self.started = true;
        StartOutcome::Started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimVehicle;

    #[test]
    fn test_start_requires_completed_upload() {
        let vehicle = SimVehicle::new(1);
        let mut trigger = MissionStartTrigger::new();

        for state in [
            UploadState::NotStarted,
            UploadState::InProgress,
            UploadState::Failed,
        ] {
            assert_eq!(
                trigger.attempt(vehicle.as_ref(), state),
                StartOutcome::UploadIncomplete(state)
            );
        }
        assert!(!trigger.is_started());
        assert_eq!(vehicle.firmware().start_count(), 0);
    }

    #[test]
    fn test_start_issued_once() {
        let vehicle = SimVehicle::new(1);
        let mut trigger = MissionStartTrigger::new();

        assert_eq!(
            trigger.attempt(vehicle.as_ref(), UploadState::Completed),
            StartOutcome::Started
        );
        assert_eq!(
            trigger.attempt(vehicle.as_ref(), UploadState::Completed),
            StartOutcome::AlreadyStarted
        );
        assert!(trigger.is_started());
        assert_eq!(vehicle.firmware().start_count(), 1);
    }

    #[test]
    fn test_missing_plugin_leaves_flag_clear() {
        let vehicle = SimVehicle::builder(7).without_firmware_plugin().build();
        let mut trigger = MissionStartTrigger::new();

        assert_eq!(
            trigger.attempt(vehicle.as_ref(), UploadState::Completed),
            StartOutcome::PluginUnavailable
        );
        assert!(!trigger.is_started());
    }
}
