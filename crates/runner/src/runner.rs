//! Headless mission runner
//!
//! Watches the vehicle registry, attaches to whichever vehicle becomes
//! active, uploads the mission plan to it once, and starts the mission when
//! the upload completes. No operator is involved.
//!
//! # Attachment lifecycle
//!
//! - Exactly one vehicle is tracked at a time, or none.
//! - Attaching subscribes to the vehicle's send-complete, error and armed
//!   notifications, then requests the upload.
//! - Each attachment hands its collaborators a sink stamped with a fresh
//!   [`AttachmentTag`]. Detaching releases those subscriptions and drops all
//!   per-attachment state; notifications still queued under the old tag are
//!   dropped, even when the same vehicle id has since reattached.
//! - The tracked vehicle is compared by reference. A registry that replaces
//!   the active vehicle with a new object carrying the same id causes a
//!   fresh attachment.
//! - A failed upload is terminal for the attachment. Recovery is a new
//!   attachment, typically after the vehicle reconnects.

use crate::error::{RunnerError, RunnerResult};
use crate::link::{
    AttachmentTag, EventSink, Notification, PlanUploader, RunnerEvent, Vehicle, VehicleId,
    VehicleRegistry,
};
use crate::plan::MissionPlanReference;
use crate::start::{MissionStartTrigger, StartOutcome};
use crate::status::{RunnerCounters, RunnerStatus};
use crate::subscription::{Subscription, SubscriptionSet};
use crate::upload::{CompletionOutcome, UploadSession, UploadState};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State owned by one attachment; dropped wholesale on detach.
struct Attachment {
    tag: AttachmentTag,
    vehicle: Arc<dyn Vehicle>,
    subscriptions: SubscriptionSet,
    upload: UploadSession,
    start: MissionStartTrigger,
}

/// Orchestrates attach, upload and start for the active vehicle.
pub struct HeadlessMissionRunner {
    plan: Option<MissionPlanReference>,
    registry: Option<Arc<dyn VehicleRegistry>>,
    uploader: Arc<dyn PlanUploader>,
    sink: EventSink,
    registry_subscriptions: SubscriptionSet,
    attachment: Option<Attachment>,
    last_tag: AttachmentTag,
    counters: RunnerCounters,
}

impl HeadlessMissionRunner {
    /// Create a runner for `plan_file`.
    ///
    /// If the plan file does not exist or no registry is supplied the runner
    /// is permanently inert: the failure is logged, nothing is subscribed and
    /// every later event is ignored. Otherwise it subscribes to the registry
    /// and immediately evaluates the current active vehicle.
    pub fn new<P: AsRef<Path>>(
        plan_file: P,
        registry: Option<Arc<dyn VehicleRegistry>>,
        uploader: Arc<dyn PlanUploader>,
        sink: EventSink,
    ) -> Self {
        let mut runner = Self {
            plan: None,
            registry: None,
            uploader,
            sink,
            registry_subscriptions: SubscriptionSet::new(),
            attachment: None,
            last_tag: AttachmentTag::new(0),
            counters: RunnerCounters::default(),
        };

        match Self::check_preconditions(plan_file.as_ref(), registry) {
            Ok((plan, registry)) => runner.activate(plan, registry),
            Err(e) => warn!(error = %e, "Mission runner inert"),
        }

        runner
    }

    fn check_preconditions(
        plan_file: &Path,
        registry: Option<Arc<dyn VehicleRegistry>>,
    ) -> RunnerResult<(MissionPlanReference, Arc<dyn VehicleRegistry>)> {
        let plan = MissionPlanReference::resolve(plan_file)?;
        plan.ensure_exists()?;
        let registry = registry.ok_or(RunnerError::RegistryUnavailable)?;
        Ok((plan, registry))
    }

    fn activate(&mut self, plan: MissionPlanReference, registry: Arc<dyn VehicleRegistry>) {
        info!(plan = %plan.path().display(), "Mission runner watching for vehicles");

        let token = registry.subscribe_availability(self.sink.clone());
        let source = Arc::clone(&registry);
        self.registry_subscriptions
            .push(Subscription::new(token, move |t| source.unsubscribe(t)));

        let token = registry.subscribe_active_vehicle(self.sink.clone());
        let source = Arc::clone(&registry);
        self.registry_subscriptions
            .push(Subscription::new(token, move |t| source.unsubscribe(t)));

        let active = registry.active_vehicle();
        self.plan = Some(plan);
        self.registry = Some(registry);
        self.handle_active_vehicle(active);
    }

    /// Whether preconditions held and the runner has not been shut down
    pub fn is_active(&self) -> bool {
        self.registry.is_some()
    }

    /// Resolved plan path, when active
    pub fn plan_file(&self) -> Option<&Path> {
        self.plan.as_ref().map(MissionPlanReference::path)
    }

    /// Currently tracked vehicle
    pub fn tracked_vehicle_id(&self) -> Option<VehicleId> {
        self.attachment.as_ref().map(|a| a.vehicle.id())
    }

    /// Upload state of the current attachment (`NotStarted` when detached)
    pub fn upload_state(&self) -> UploadState {
        self.attachment
            .as_ref()
            .map_or(UploadState::NotStarted, |a| a.upload.state())
    }

    /// Whether the start command was issued for the current attachment
    pub fn mission_started(&self) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|a| a.start.is_started())
    }

    /// Snapshot for reporting
    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            active: self.is_active(),
            plan_file: self.plan_file().map(Path::to_path_buf),
            vehicle_id: self.tracked_vehicle_id(),
            upload: self.upload_state(),
            mission_started: self.mission_started(),
            counters: self.counters,
        }
    }

    /// Tag of the current attachment
    pub fn attachment_tag(&self) -> Option<AttachmentTag> {
        self.attachment.as_ref().map(|a| a.tag)
    }

    /// Dispatch an event that did not come through any attachment's sink.
    ///
    /// Vehicle scoped events handed in this way are dropped.
    pub fn handle_event(&mut self, event: RunnerEvent) {
        self.handle_notification(Notification::untagged(event));
    }

    /// Dispatch one queued notification.
    ///
    /// Registry events are always handled. Vehicle scoped events are handled
    /// only when tagged with the current attachment.
    pub fn handle_notification(&mut self, notification: Notification) {
        let Notification { attachment, event } = notification;
        if !self.is_active() {
            debug!(?event, "Runner inert, event ignored");
            return;
        }

        match event {
            RunnerEvent::ActiveVehicleAvailable(available) => {
                self.on_active_vehicle_available(available)
            }
            RunnerEvent::ActiveVehicleChanged(vehicle) => self.handle_active_vehicle(vehicle),
            event if attachment.is_none() || attachment != self.attachment_tag() => {
                debug!(?event, ?attachment, "Notification from released attachment dropped");
                self.counters.dropped_notifications += 1;
            }
            RunnerEvent::SendComplete { vehicle, error } => self.on_send_complete(vehicle, error),
            RunnerEvent::MissionError {
                vehicle,
                code,
                message,
            } => {
                warn!(vehicle_id = vehicle, code, %message, "Mission manager error");
            }
            RunnerEvent::ArmedChanged { vehicle, armed } => {
                info!(vehicle_id = vehicle, armed, "Vehicle armed state");
            }
        }
    }

    /// Detach and release the registry subscriptions. Later events are ignored.
    pub fn shutdown(&mut self) {
        self.detach_vehicle();
        let released = self.registry_subscriptions.release_all();
        if self.registry.take().is_some() {
            info!(released, "Mission runner stopped");
        }
    }

    fn on_active_vehicle_available(&mut self, available: bool) {
        if !available {
            self.detach_vehicle();
            return;
        }

        // Availability can flip before the active-vehicle notification lands
        if self.attachment.is_none() {
            let active = self.registry.as_ref().and_then(|r| r.active_vehicle());
            self.handle_active_vehicle(active);
        }
    }

    fn handle_active_vehicle(&mut self, vehicle: Option<Arc<dyn Vehicle>>) {
        let unchanged = match (&vehicle, &self.attachment) {
            (Some(incoming), Some(current)) => Arc::ptr_eq(incoming, &current.vehicle),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        self.detach_vehicle();

        let Some(vehicle) = vehicle else {
            return;
        };

        let Some(mission_manager) = vehicle.mission_manager() else {
            warn!(vehicle_id = vehicle.id(), "Mission manager unavailable for vehicle");
            return;
        };

        let tag = self.last_tag.next();
        self.last_tag = tag;
        let sink = self.sink.for_attachment(tag);
        let mut subscriptions = SubscriptionSet::new();

        let token = mission_manager.subscribe_send_complete(sink.clone());
        let source = Arc::clone(&mission_manager);
        subscriptions.push(Subscription::new(token, move |t| source.unsubscribe(t)));

        let token = mission_manager.subscribe_errors(sink.clone());
        let source = Arc::clone(&mission_manager);
        subscriptions.push(Subscription::new(token, move |t| source.unsubscribe(t)));

        let token = vehicle.subscribe_armed(sink);
        let source = Arc::clone(&vehicle);
        subscriptions.push(Subscription::new(token, move |t| source.unsubscribe(t)));

        info!(vehicle_id = vehicle.id(), attachment = %tag, "Vehicle attached");
        self.counters.attachments += 1;
        self.attachment = Some(Attachment {
            tag,
            vehicle,
            subscriptions,
            upload: UploadSession::new(),
            start: MissionStartTrigger::new(),
        });

        self.begin_upload();
    }

    fn detach_vehicle(&mut self) {
        let Some(mut attachment) = self.attachment.take() else {
            return;
        };

        let released = attachment.subscriptions.release_all();
        info!(
            vehicle_id = attachment.vehicle.id(),
            attachment = %attachment.tag,
            upload = %attachment.upload.state(),
            mission_started = attachment.start.is_started(),
            released,
            "Vehicle detached"
        );
    }

    fn begin_upload(&mut self) {
        let (Some(attachment), Some(plan)) = (self.attachment.as_mut(), self.plan.as_ref()) else {
            return;
        };
        if !attachment.upload.begin() {
            debug!(
                vehicle_id = attachment.vehicle.id(),
                upload = %attachment.upload.state(),
                "Upload already requested for this attachment"
            );
            return;
        }

        info!(
            vehicle_id = attachment.vehicle.id(),
            plan = %plan.path().display(),
            "Uploading mission plan"
        );
        self.counters.upload_requests += 1;
        self.uploader
            .send_plan_to_vehicle(attachment.vehicle.as_ref(), plan.path());
    }

    fn on_send_complete(&mut self, vehicle: VehicleId, error: bool) {
        let Some(attachment) = self.attachment.as_mut() else {
            debug!(vehicle_id = vehicle, error, "Send-complete with no vehicle attached");
            return;
        };
        if attachment.vehicle.id() != vehicle {
            debug!(vehicle_id = vehicle, error, "Send-complete from untracked vehicle");
            return;
        }

        match attachment.upload.complete(error) {
            CompletionOutcome::Completed => {
                info!(vehicle_id = vehicle, "Mission upload complete");
                self.attempt_start();
            }
            CompletionOutcome::Failed => {
                warn!(vehicle_id = vehicle, "Mission upload failed");
                self.counters.upload_failures += 1;
            }
            CompletionOutcome::Ignored(state) => {
                debug!(vehicle_id = vehicle, error, upload = %state, "Send-complete without upload in flight");
            }
        }
    }

    fn attempt_start(&mut self) {
        let Some(attachment) = self.attachment.as_mut() else {
            return;
        };
        let upload = attachment.upload.state();
        if attachment.start.attempt(attachment.vehicle.as_ref(), upload) == StartOutcome::Started {
            self.counters.start_commands += 1;
        }
    }
}

impl fmt::Debug for HeadlessMissionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessMissionRunner")
            .field("plan", &self.plan_file())
            .field("active", &self.is_active())
            .field("vehicle_id", &self.tracked_vehicle_id())
            .field("upload", &self.upload_state())
            .field("mission_started", &self.mission_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::pump;
    use crate::link::{event_channel, EventSource};
    use crate::sim::{SimRegistry, SimUploader, SimVehicle};

    struct Harness {
        registry: Arc<SimRegistry>,
        uploader: Arc<SimUploader>,
        runner: HeadlessMissionRunner,
        events: EventSource,
        _plan: tempfile::NamedTempFile,
    }

    impl Harness {
        fn new() -> Self {
            let plan = tempfile::NamedTempFile::new().unwrap();
            let registry = SimRegistry::new();
            let uploader = SimUploader::new();
            let (sink, events) = event_channel();
            let runner = HeadlessMissionRunner::new(
                plan.path(),
                Some(registry.clone() as Arc<dyn VehicleRegistry>),
                uploader.clone(),
                sink,
            );
            Self {
                registry,
                uploader,
                runner,
                events,
                _plan: plan,
            }
        }

        fn pump(&mut self) {
            pump(&mut self.runner, &mut self.events);
        }
    }

    #[test]
    fn test_attach_subscribes_and_uploads() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(1);

        h.registry.connect(vehicle.clone());
        h.pump();

        assert_eq!(h.runner.tracked_vehicle_id(), Some(1));
        assert_eq!(h.runner.upload_state(), UploadState::InProgress);
        assert_eq!(vehicle.active_subscriptions(), 3);
        assert_eq!(h.uploader.requests_for(1), 1);
        assert_eq!(h.uploader.requests()[0].1, h.runner.plan_file().unwrap());
    }

    #[test]
    fn test_same_vehicle_is_idempotent() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(1);
        h.registry.connect(vehicle.clone());
        h.pump();

        h.runner
            .handle_event(RunnerEvent::ActiveVehicleChanged(Some(vehicle.clone() as Arc<dyn Vehicle>)));
        h.registry.emit_availability(true);
        h.pump();

        assert_eq!(h.uploader.requests_for(1), 1);
        assert_eq!(vehicle.total_subscriptions(), 3);
    }

    #[test]
    fn test_same_id_replacement_reattaches() {
        let mut h = Harness::new();
        let original = SimVehicle::new(1);
        h.registry.connect(original.clone());
        h.pump();
        let first_tag = h.runner.attachment_tag();

        let replacement = SimVehicle::new(1);
        h.runner
            .handle_event(RunnerEvent::ActiveVehicleChanged(Some(replacement.clone() as Arc<dyn Vehicle>)));

        assert_eq!(original.active_subscriptions(), 0);
        assert_eq!(replacement.active_subscriptions(), 3);
        assert_ne!(h.runner.attachment_tag(), first_tag);
        assert_eq!(h.uploader.requests_for(1), 2);

        assert_eq!(replacement.emit_send_complete(false), 1);
        h.pump();
        assert_eq!(h.runner.upload_state(), UploadState::Completed);
        assert_eq!(replacement.firmware().start_count(), 1);
        assert_eq!(original.firmware().start_count(), 0);
    }

    #[test]
    fn test_switching_vehicle_detaches_previous() {
        let mut h = Harness::new();
        let first = SimVehicle::new(1);
        let second = SimVehicle::new(2);

        h.registry.connect(first.clone());
        h.pump();
        h.registry.connect(second.clone());
        h.pump();

        assert_eq!(h.runner.tracked_vehicle_id(), Some(2));
        assert_eq!(first.active_subscriptions(), 0);
        assert_eq!(second.active_subscriptions(), 3);
        assert_eq!(h.uploader.requests_for(2), 1);
    }

    #[test]
    fn test_upload_success_starts_mission() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(1);
        h.registry.connect(vehicle.clone());
        h.pump();

        vehicle.emit_send_complete(false);
        h.pump();

        assert_eq!(h.runner.upload_state(), UploadState::Completed);
        assert!(h.runner.mission_started());
        assert_eq!(vehicle.firmware().starts(), vec![1]);
    }

    #[test]
    fn test_mission_error_is_diagnostic_only() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(1);
        h.registry.connect(vehicle.clone());
        h.pump();

        vehicle.emit_mission_error(5, "item count mismatch");
        h.pump();

        assert_eq!(h.runner.upload_state(), UploadState::InProgress);
        assert!(!h.runner.mission_started());

        vehicle.emit_send_complete(false);
        vehicle.emit_mission_error(5, "late error");
        h.pump();
        assert!(h.runner.mission_started());
        assert_eq!(h.runner.upload_state(), UploadState::Completed);
    }

    #[test]
    fn test_armed_changes_do_not_affect_state() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(1);
        h.registry.connect(vehicle.clone());
        h.pump();

        vehicle.emit_armed(true);
        vehicle.emit_armed(false);
        h.pump();

        assert_eq!(h.runner.upload_state(), UploadState::InProgress);
        assert_eq!(h.uploader.requests().len(), 1);
    }

    #[test]
    fn test_completion_from_other_vehicle_ignored() {
        let mut h = Harness::new();
        h.registry.connect(SimVehicle::new(1));
        h.pump();

        h.runner.handle_event(RunnerEvent::SendComplete {
            vehicle: 99,
            error: false,
        });

        assert_eq!(h.runner.upload_state(), UploadState::InProgress);
        assert!(!h.runner.mission_started());
    }

    #[test]
    fn test_untagged_completion_dropped() {
        let mut h = Harness::new();
        h.registry.connect(SimVehicle::new(1));
        h.pump();

        h.runner.handle_event(RunnerEvent::SendComplete {
            vehicle: 1,
            error: false,
        });

        assert_eq!(h.runner.upload_state(), UploadState::InProgress);
        assert_eq!(h.runner.status().counters.dropped_notifications, 1);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(1);
        h.registry.connect(vehicle.clone());
        h.pump();

        h.runner.shutdown();

        assert!(!h.runner.is_active());
        assert_eq!(h.registry.active_subscriptions(), 0);
        assert_eq!(vehicle.active_subscriptions(), 0);

        h.runner
            .handle_event(RunnerEvent::ActiveVehicleChanged(Some(SimVehicle::new(2) as Arc<dyn Vehicle>)));
        assert_eq!(h.runner.tracked_vehicle_id(), None);
        assert_eq!(h.uploader.requests().len(), 1);
    }

    #[test]
    fn test_status_reflects_attachment() {
        let mut h = Harness::new();
        let vehicle = SimVehicle::new(4);
        h.registry.connect(vehicle.clone());
        h.pump();
        vehicle.emit_send_complete(false);
        h.pump();

        let status = h.runner.status();
        assert!(status.active);
        assert_eq!(status.vehicle_id, Some(4));
        assert_eq!(status.upload, UploadState::Completed);
        assert!(status.mission_started);
        assert_eq!(status.counters.attachments, 1);
        assert_eq!(status.counters.upload_requests, 1);
        assert_eq!(status.counters.start_commands, 1);
    }
}
