//! Collaborator contracts consumed by the runner.
//!
//! The vehicle registry, vehicles, their mission managers and firmware
//! plugins are owned elsewhere. The runner only holds shared references to
//! them and receives their notifications as [`RunnerEvent`]s pushed into an
//! [`EventSink`] it registered when subscribing.

use crate::subscription::SubscriptionToken;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Vehicle identifier (autopilot system id)
pub type VehicleId = u32;

/// Generation number of one vehicle attachment.
///
/// Every attachment gets a fresh tag, so two attachments of the same vehicle
/// id never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentTag(u64);

impl AttachmentTag {
    /// Wrap a raw generation number
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw generation number
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Tag following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for AttachmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "att-{}", self.0)
    }
}

/// A queued [`RunnerEvent`] plus the attachment whose subscription delivered it.
///
/// Registry notifications are untagged.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Attachment the delivering sink was handed to, if any
    pub attachment: Option<AttachmentTag>,
    /// The notification itself
    pub event: RunnerEvent,
}

impl Notification {
    /// Notification not tied to any attachment
    pub fn untagged(event: RunnerEvent) -> Self {
        Self {
            attachment: None,
            event,
        }
    }
}

impl From<RunnerEvent> for Notification {
    fn from(event: RunnerEvent) -> Self {
        Self::untagged(event)
    }
}

/// Channel end collaborators push notifications into.
///
/// Sinks handed out for an attachment stamp every event with that
/// attachment's tag, which lets the runner drop notifications still queued
/// from an attachment it has already released.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Notification>,
    attachment: Option<AttachmentTag>,
}

impl EventSink {
    /// Queue `event`; returns `false` once the receiving end is gone
    pub fn send(&self, event: RunnerEvent) -> bool {
        self.tx
            .send(Notification {
                attachment: self.attachment,
                event,
            })
            .is_ok()
    }

    /// Sink on the same channel that stamps `tag`
    pub fn for_attachment(&self, tag: AttachmentTag) -> Self {
        Self {
            tx: self.tx.clone(),
            attachment: Some(tag),
        }
    }

    /// Tag stamped by this sink
    pub fn attachment(&self) -> Option<AttachmentTag> {
        self.attachment
    }
}

/// Receiving end drained by the driver.
pub type EventSource = mpsc::UnboundedReceiver<Notification>;

/// Create a connected sink/source pair. The sink is untagged.
pub fn event_channel() -> (EventSink, EventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSink {
            tx,
            attachment: None,
        },
        rx,
    )
}

/// Source of "which vehicle is active" notifications.
pub trait VehicleRegistry: Send + Sync {
    /// Currently active vehicle, if any
    fn active_vehicle(&self) -> Option<Arc<dyn Vehicle>>;

    /// Deliver [`RunnerEvent::ActiveVehicleAvailable`] to `sink`
    fn subscribe_availability(&self, sink: EventSink) -> SubscriptionToken;

    /// Deliver [`RunnerEvent::ActiveVehicleChanged`] to `sink`
    fn subscribe_active_vehicle(&self, sink: EventSink) -> SubscriptionToken;

    /// Stop delivering to the subscription behind `token`
    fn unsubscribe(&self, token: SubscriptionToken);
}

/// A connected vehicle.
pub trait Vehicle: Send + Sync {
    /// Vehicle identifier
    fn id(&self) -> VehicleId;

    /// Mission manager, absent until the vehicle has finished initial connect
    fn mission_manager(&self) -> Option<Arc<dyn MissionManager>>;

    /// Firmware plugin used to issue flight commands
    fn firmware_plugin(&self) -> Option<Arc<dyn FirmwarePlugin>>;

    /// Deliver [`RunnerEvent::ArmedChanged`] to `sink`
    fn subscribe_armed(&self, sink: EventSink) -> SubscriptionToken;

    /// Stop delivering to the subscription behind `token`
    fn unsubscribe(&self, token: SubscriptionToken);
}

/// Per-vehicle mission item transfer endpoint.
pub trait MissionManager: Send + Sync {
    /// Deliver [`RunnerEvent::SendComplete`] to `sink`
    fn subscribe_send_complete(&self, sink: EventSink) -> SubscriptionToken;

    /// Deliver [`RunnerEvent::MissionError`] to `sink`
    fn subscribe_errors(&self, sink: EventSink) -> SubscriptionToken;

    /// Stop delivering to the subscription behind `token`
    fn unsubscribe(&self, token: SubscriptionToken);
}

/// Loads a plan file and sends it to a vehicle.
///
/// Fire-and-forget: the outcome arrives later as a send-complete
/// notification from the vehicle's mission manager.
pub trait PlanUploader: Send + Sync {
    /// Begin sending the plan at `plan_file` to `vehicle`
    fn send_plan_to_vehicle(&self, vehicle: &dyn Vehicle, plan_file: &Path);
}

/// Firmware-specific flight command layer.
pub trait FirmwarePlugin: Send + Sync {
    /// Command the vehicle to begin executing its loaded mission
    fn start_mission(&self, vehicle: &dyn Vehicle);
}

/// Inbound notification handled by the runner.
///
/// Vehicle scoped variants are only acted on when they arrive through a sink
/// tagged with the current attachment.
#[derive(Clone)]
pub enum RunnerEvent {
    /// Registry gained or lost an active vehicle
    ActiveVehicleAvailable(bool),
    /// Registry switched its active vehicle
    ActiveVehicleChanged(Option<Arc<dyn Vehicle>>),
    /// Plan transfer finished
    SendComplete {
        /// Emitting vehicle
        vehicle: VehicleId,
        /// Whether the transfer failed
        error: bool,
    },
    /// Mission manager reported an error (diagnostic only)
    MissionError {
        /// Emitting vehicle
        vehicle: VehicleId,
        /// Protocol error code
        code: i32,
        /// Human-readable message
        message: String,
    },
    /// Vehicle armed state changed (diagnostic only)
    ArmedChanged {
        /// Emitting vehicle
        vehicle: VehicleId,
        /// New armed state
        armed: bool,
    },
}

impl fmt::Debug for RunnerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerEvent::ActiveVehicleAvailable(available) => f
                .debug_tuple("ActiveVehicleAvailable")
                .field(available)
                .finish(),
            RunnerEvent::ActiveVehicleChanged(vehicle) => f
                .debug_tuple("ActiveVehicleChanged")
                .field(&vehicle.as_ref().map(|v| v.id()))
                .finish(),
            RunnerEvent::SendComplete { vehicle, error } => f
                .debug_struct("SendComplete")
                .field("vehicle", vehicle)
                .field("error", error)
                .finish(),
            RunnerEvent::MissionError {
                vehicle,
                code,
                message,
            } => f
                .debug_struct("MissionError")
                .field("vehicle", vehicle)
                .field("code", code)
                .field("message", message)
                .finish(),
            RunnerEvent::ArmedChanged { vehicle, armed } => f
                .debug_struct("ArmedChanged")
                .field("vehicle", vehicle)
                .field("armed", armed)
                .finish(),
        }
    }
}
