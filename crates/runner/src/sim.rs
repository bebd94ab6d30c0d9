//! In-memory vehicle link
//!
//! Simulated registry, vehicles, mission managers, firmware plugins and plan
//! uploader. Every collaborator records what the runner asked of it so the
//! replay service can report it and tests can assert on it.

use crate::error::{RunnerError, RunnerResult};
use crate::link::{
    EventSink, FirmwarePlugin, MissionManager, PlanUploader, RunnerEvent, Vehicle, VehicleId,
    VehicleRegistry,
};
use crate::subscription::{SubscriptionToken, TokenAllocator};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Subscribers of one notification stream.
#[derive(Debug, Default)]
struct Subscribers {
    sinks: Mutex<BTreeMap<SubscriptionToken, EventSink>>,
    subscribed: AtomicUsize,
}

impl Subscribers {
    fn add(&self, token: SubscriptionToken, sink: EventSink) -> SubscriptionToken {
        self.sinks.lock().insert(token, sink);
        self.subscribed.fetch_add(1, Ordering::Relaxed);
        token
    }

    fn remove(&self, token: SubscriptionToken) -> bool {
        self.sinks.lock().remove(&token).is_some()
    }

    /// Deliver to every live subscriber, pruning closed channels
    fn emit(&self, event: &RunnerEvent) -> usize {
        let mut sinks = self.sinks.lock();
        sinks.retain(|_, sink| sink.send(event.clone()));
        sinks.len()
    }

    fn active(&self) -> usize {
        self.sinks.lock().len()
    }

    fn total(&self) -> usize {
        self.subscribed.load(Ordering::Relaxed)
    }
}

/// Simulated mission manager for one vehicle.
#[derive(Debug)]
pub struct SimMissionManager {
    vehicle_id: VehicleId,
    tokens: TokenAllocator,
    send_complete: Subscribers,
    errors: Subscribers,
}

impl SimMissionManager {
    fn new(vehicle_id: VehicleId) -> Self {
        Self {
            vehicle_id,
            tokens: TokenAllocator::new(),
            send_complete: Subscribers::default(),
            errors: Subscribers::default(),
        }
    }

    /// Report a finished plan transfer; returns how many subscribers saw it
    pub fn emit_send_complete(&self, error: bool) -> usize {
        self.send_complete.emit(&RunnerEvent::SendComplete {
            vehicle: self.vehicle_id,
            error,
        })
    }

    /// Report a transfer error; returns how many subscribers saw it
    pub fn emit_error(&self, code: i32, message: &str) -> usize {
        self.errors.emit(&RunnerEvent::MissionError {
            vehicle: self.vehicle_id,
            code,
            message: message.to_string(),
        })
    }

    /// Live subscriptions across both streams
    pub fn active_subscriptions(&self) -> usize {
        self.send_complete.active() + self.errors.active()
    }

    /// Subscribe calls received across both streams
    pub fn total_subscriptions(&self) -> usize {
        self.send_complete.total() + self.errors.total()
    }
}

impl MissionManager for SimMissionManager {
    fn subscribe_send_complete(&self, sink: EventSink) -> SubscriptionToken {
        self.send_complete.add(self.tokens.allocate(), sink)
    }

    fn subscribe_errors(&self, sink: EventSink) -> SubscriptionToken {
        self.errors.add(self.tokens.allocate(), sink)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        if !self.send_complete.remove(token) {
            self.errors.remove(token);
        }
    }
}

/// Simulated firmware plugin recording start commands.
#[derive(Debug, Default)]
pub struct SimFirmwarePlugin {
    starts: Mutex<Vec<VehicleId>>,
}

impl SimFirmwarePlugin {
    /// Number of start commands received
    pub fn start_count(&self) -> usize {
        self.starts.lock().len()
    }

    /// Vehicles commanded to start, in order
    pub fn starts(&self) -> Vec<VehicleId> {
        self.starts.lock().clone()
    }
}

impl FirmwarePlugin for SimFirmwarePlugin {
    fn start_mission(&self, vehicle: &dyn Vehicle) {
        debug!(vehicle_id = vehicle.id(), "Simulated start_mission");
        self.starts.lock().push(vehicle.id());
    }
}

/// Builder for [`SimVehicle`] with optional capabilities removed.
#[derive(Debug)]
pub struct SimVehicleBuilder {
    id: VehicleId,
    mission_manager: bool,
    firmware_plugin: bool,
}

impl SimVehicleBuilder {
    /// Vehicle that never exposes a mission manager
    pub fn without_mission_manager(mut self) -> Self {
        self.mission_manager = false;
        self
    }

    /// Vehicle that never exposes a firmware plugin
    pub fn without_firmware_plugin(mut self) -> Self {
        self.firmware_plugin = false;
        self
    }

    /// Build the vehicle
    pub fn build(self) -> Arc<SimVehicle> {
        Arc::new(SimVehicle {
            id: self.id,
            mission_manager: self
                .mission_manager
                .then(|| Arc::new(SimMissionManager::new(self.id))),
            firmware: Arc::new(SimFirmwarePlugin::default()),
            firmware_present: self.firmware_plugin,
            tokens: TokenAllocator::new(),
            armed: Subscribers::default(),
        })
    }
}

/// Simulated vehicle.
#[derive(Debug)]
pub struct SimVehicle {
    id: VehicleId,
    mission_manager: Option<Arc<SimMissionManager>>,
    firmware: Arc<SimFirmwarePlugin>,
    firmware_present: bool,
    tokens: TokenAllocator,
    armed: Subscribers,
}

impl SimVehicle {
    /// Fully capable vehicle
    pub fn new(id: VehicleId) -> Arc<Self> {
        Self::builder(id).build()
    }

    /// Start building a vehicle
    pub fn builder(id: VehicleId) -> SimVehicleBuilder {
        SimVehicleBuilder {
            id,
            mission_manager: true,
            firmware_plugin: true,
        }
    }

    /// Simulated mission manager, if the vehicle has one
    pub fn mission(&self) -> Option<&Arc<SimMissionManager>> {
        self.mission_manager.as_ref()
    }

    /// Firmware plugin recorder (present even when not exposed)
    pub fn firmware(&self) -> &Arc<SimFirmwarePlugin> {
        &self.firmware
    }

    /// Report plan transfer outcome through the mission manager
    pub fn emit_send_complete(&self, error: bool) -> usize {
        self.mission_manager
            .as_ref()
            .map_or(0, |m| m.emit_send_complete(error))
    }

    /// Report a mission manager error
    pub fn emit_mission_error(&self, code: i32, message: &str) -> usize {
        self.mission_manager
            .as_ref()
            .map_or(0, |m| m.emit_error(code, message))
    }

    /// Report an armed state change
    pub fn emit_armed(&self, armed: bool) -> usize {
        self.armed.emit(&RunnerEvent::ArmedChanged {
            vehicle: self.id,
            armed,
        })
    }

    /// Live subscriptions on the vehicle and its mission manager
    pub fn active_subscriptions(&self) -> usize {
        self.armed.active()
            + self
                .mission_manager
                .as_ref()
                .map_or(0, |m| m.active_subscriptions())
    }

    /// Subscribe calls received by the vehicle and its mission manager
    pub fn total_subscriptions(&self) -> usize {
        self.armed.total()
            + self
                .mission_manager
                .as_ref()
                .map_or(0, |m| m.total_subscriptions())
    }
}

impl Vehicle for SimVehicle {
    fn id(&self) -> VehicleId {
        self.id
    }

    fn mission_manager(&self) -> Option<Arc<dyn MissionManager>> {
        self.mission_manager
            .clone()
            .map(|m| m as Arc<dyn MissionManager>)
    }

    fn firmware_plugin(&self) -> Option<Arc<dyn FirmwarePlugin>> {
        self.firmware_present
            .then(|| Arc::clone(&self.firmware) as Arc<dyn FirmwarePlugin>)
    }

    fn subscribe_armed(&self, sink: EventSink) -> SubscriptionToken {
        self.armed.add(self.tokens.allocate(), sink)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.armed.remove(token);
    }
}

/// Simulated plan uploader recording every request.
#[derive(Debug, Default)]
pub struct SimUploader {
    requests: Mutex<Vec<(VehicleId, PathBuf)>>,
}

impl SimUploader {
    /// Create an uploader with no recorded requests
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All requests, in order
    pub fn requests(&self) -> Vec<(VehicleId, PathBuf)> {
        self.requests.lock().clone()
    }

    /// Number of requests for `vehicle`
    pub fn requests_for(&self, vehicle: VehicleId) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(id, _)| *id == vehicle)
            .count()
    }
}

impl PlanUploader for SimUploader {
    fn send_plan_to_vehicle(&self, vehicle: &dyn Vehicle, plan_file: &Path) {
        debug!(vehicle_id = vehicle.id(), plan = %plan_file.display(), "Simulated plan upload");
        self.requests
            .lock()
            .push((vehicle.id(), plan_file.to_path_buf()));
    }
}

/// Simulated multi-vehicle registry with a single active vehicle.
#[derive(Debug, Default)]
pub struct SimRegistry {
    active: Mutex<Option<Arc<SimVehicle>>>,
    known: Mutex<BTreeMap<VehicleId, Arc<SimVehicle>>>,
    tokens: TokenAllocator,
    availability: Subscribers,
    active_vehicle: Subscribers,
}

impl SimRegistry {
    /// Create a registry with no vehicles
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `vehicle` active: active-vehicle-changed, then available(true)
    /// if nothing was active before. Returns the number of deliveries.
    pub fn connect(&self, vehicle: Arc<SimVehicle>) -> usize {
        self.known.lock().insert(vehicle.id, Arc::clone(&vehicle));
        let was_empty = self.active.lock().replace(Arc::clone(&vehicle)).is_none();
        let mut delivered = self
            .active_vehicle
            .emit(&RunnerEvent::ActiveVehicleChanged(Some(vehicle as Arc<dyn Vehicle>)));
        if was_empty {
            delivered += self
                .availability
                .emit(&RunnerEvent::ActiveVehicleAvailable(true));
        }
        delivered
    }

    /// Drop the active vehicle: available(false), then active-vehicle-changed(None).
    /// Returns the number of deliveries.
    pub fn disconnect(&self) -> usize {
        if self.active.lock().take().is_none() {
            return 0;
        }
        self.availability
            .emit(&RunnerEvent::ActiveVehicleAvailable(false))
            + self
                .active_vehicle
                .emit(&RunnerEvent::ActiveVehicleChanged(None))
    }

    /// Emit only an availability notification
    pub fn emit_availability(&self, available: bool) -> usize {
        self.availability
            .emit(&RunnerEvent::ActiveVehicleAvailable(available))
    }

    /// Change the active vehicle without any availability notification
    pub fn set_active_silently(&self, vehicle: Option<Arc<SimVehicle>>) {
        if let Some(vehicle) = &vehicle {
            self.known.lock().insert(vehicle.id, Arc::clone(vehicle));
        }
        *self.active.lock() = vehicle;
    }

    /// Emit active-vehicle-changed for the current active vehicle
    pub fn emit_active_vehicle(&self) -> usize {
        let active = self.active.lock().clone();
        self.active_vehicle.emit(&RunnerEvent::ActiveVehicleChanged(
            active.map(|v| v as Arc<dyn Vehicle>),
        ))
    }

    /// Most recently connected vehicle with `id`
    pub fn vehicle(&self, id: VehicleId) -> Option<Arc<SimVehicle>> {
        self.known.lock().get(&id).cloned()
    }

    /// Live registry subscriptions
    pub fn active_subscriptions(&self) -> usize {
        self.availability.active() + self.active_vehicle.active()
    }

    /// Subscribe calls received by the registry
    pub fn total_subscriptions(&self) -> usize {
        self.availability.total() + self.active_vehicle.total()
    }

    /// Apply one replay step. Returns how many subscribers it reached.
    pub fn apply(&self, step: &ScriptStep) -> RunnerResult<usize> {
        let delivered = match step {
            ScriptStep::Connect {
                vehicle,
                mission_manager,
                firmware_plugin,
            } => {
                let mut builder = SimVehicle::builder(*vehicle);
                if !mission_manager {
                    builder = builder.without_mission_manager();
                }
                if !firmware_plugin {
                    builder = builder.without_firmware_plugin();
                }
                self.connect(builder.build())
            }
            ScriptStep::Disconnect => self.disconnect(),
            ScriptStep::Availability { available } => self.emit_availability(*available),
            ScriptStep::SendComplete { vehicle, error } => {
                self.known_vehicle(*vehicle)?.emit_send_complete(*error)
            }
            ScriptStep::MissionError {
                vehicle,
                code,
                message,
            } => self
                .known_vehicle(*vehicle)?
                .emit_mission_error(*code, message),
            ScriptStep::Armed { vehicle, armed } => {
                self.known_vehicle(*vehicle)?.emit_armed(*armed)
            }
        };
        Ok(delivered)
    }

    fn known_vehicle(&self, id: VehicleId) -> RunnerResult<Arc<SimVehicle>> {
        self.vehicle(id).ok_or(RunnerError::UnknownVehicle(id))
    }
}

impl VehicleRegistry for SimRegistry {
    fn active_vehicle(&self) -> Option<Arc<dyn Vehicle>> {
        self.active
            .lock()
            .clone()
            .map(|v| v as Arc<dyn Vehicle>)
    }

    fn subscribe_availability(&self, sink: EventSink) -> SubscriptionToken {
        self.availability.add(self.tokens.allocate(), sink)
    }

    fn subscribe_active_vehicle(&self, sink: EventSink) -> SubscriptionToken {
        self.active_vehicle.add(self.tokens.allocate(), sink)
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        if !self.availability.remove(token) {
            self.active_vehicle.remove(token);
        }
    }
}

fn default_true() -> bool {
    true
}

/// One step of a replay script (JSON lines, tagged by `op`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// A vehicle becomes the active vehicle
    Connect {
        /// Vehicle id
        vehicle: VehicleId,
        /// Whether it exposes a mission manager
        #[serde(default = "default_true")]
        mission_manager: bool,
        /// Whether it exposes a firmware plugin
        #[serde(default = "default_true")]
        firmware_plugin: bool,
    },
    /// The active vehicle goes away
    Disconnect,
    /// Bare availability notification
    Availability {
        /// New availability
        available: bool,
    },
    /// Plan transfer finished on `vehicle`
    SendComplete {
        /// Emitting vehicle
        vehicle: VehicleId,
        /// Whether the transfer failed
        #[serde(default)]
        error: bool,
    },
    /// Mission manager error on `vehicle`
    MissionError {
        /// Emitting vehicle
        vehicle: VehicleId,
        /// Error code
        code: i32,
        /// Error text
        message: String,
    },
    /// Armed state change on `vehicle`
    Armed {
        /// Emitting vehicle
        vehicle: VehicleId,
        /// New armed state
        armed: bool,
    },
}

/// Parse a JSON-lines replay script. Blank lines and `#` comments are skipped.
pub fn parse_script(text: &str) -> RunnerResult<Vec<ScriptStep>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| RunnerError::Script {
                line: index + 1,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::event_channel;

    #[test]
    fn test_emit_reaches_only_live_subscribers() {
        let registry = SimRegistry::new();
        let (sink, mut source) = event_channel();
        let token = registry.subscribe_availability(sink.clone());
        registry.subscribe_active_vehicle(sink);

        assert_eq!(registry.emit_availability(true), 1);
        assert!(matches!(
            source.try_recv().map(|n| n.event),
            Ok(RunnerEvent::ActiveVehicleAvailable(true))
        ));

        registry.unsubscribe(token);
        assert_eq!(registry.emit_availability(false), 0);
        assert!(source.try_recv().is_err());
        assert_eq!(registry.active_subscriptions(), 1);
        assert_eq!(registry.total_subscriptions(), 2);
    }

    #[test]
    fn test_closed_sinks_are_pruned() {
        let vehicle = SimVehicle::new(3);
        let (sink, source) = event_channel();
        vehicle.subscribe_armed(sink);
        drop(source);

        assert_eq!(vehicle.emit_armed(true), 0);
        assert_eq!(vehicle.active_subscriptions(), 0);
    }

    #[test]
    fn test_connect_then_disconnect_event_order() {
        let registry = SimRegistry::new();
        let (sink, mut source) = event_channel();
        registry.subscribe_availability(sink.clone());
        registry.subscribe_active_vehicle(sink);

        registry.connect(SimVehicle::new(1));
        registry.disconnect();

        let events: Vec<String> = std::iter::from_fn(|| source.try_recv().ok())
            .map(|n| format!("{:?}", n.event))
            .collect();
        assert_eq!(
            events,
            vec![
                "ActiveVehicleChanged(Some(1))",
                "ActiveVehicleAvailable(true)",
                "ActiveVehicleAvailable(false)",
                "ActiveVehicleChanged(None)",
            ]
        );
        assert!(registry.active_vehicle().is_none());
    }

    #[test]
    fn test_vehicle_without_capabilities() {
        let vehicle = SimVehicle::builder(9)
            .without_mission_manager()
            .without_firmware_plugin()
            .build();
        assert!(vehicle.mission_manager().is_none());
        assert!(vehicle.firmware_plugin().is_none());
        assert_eq!(vehicle.emit_send_complete(false), 0);
    }

    #[test]
    fn test_parse_script() {
        let script = r#"
# bring up vehicle 1
{"op":"connect","vehicle":1}
{"op":"send_complete","vehicle":1}
{"op":"mission_error","vehicle":1,"code":4,"message":"timeout"}
{"op":"disconnect"}
"#;
        let steps = parse_script(script).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[0],
            ScriptStep::Connect {
                vehicle: 1,
                mission_manager: true,
                firmware_plugin: true
            }
        );
        assert_eq!(
            steps[1],
            ScriptStep::SendComplete {
                vehicle: 1,
                error: false
            }
        );
    }

    #[test]
    fn test_parse_script_reports_line() {
        let script = "{\"op\":\"disconnect\"}\n{\"op\":\"warp\"}\n";
        match parse_script(script) {
            Err(RunnerError::Script { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected script error, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_unknown_vehicle() {
        let registry = SimRegistry::new();
        let err = registry
            .apply(&ScriptStep::Armed {
                vehicle: 5,
                armed: true,
            })
            .unwrap_err();
        assert!(matches!(err, RunnerError::UnknownVehicle(5)));
    }

    #[test]
    fn test_apply_reports_deliveries() {
        let registry = SimRegistry::new();
        let (sink, _source) = event_channel();
        registry.subscribe_availability(sink.clone());
        registry.subscribe_active_vehicle(sink);

        let connect = ScriptStep::Connect {
            vehicle: 2,
            mission_manager: true,
            firmware_plugin: true,
        };
        assert_eq!(registry.apply(&connect).unwrap(), 2);

        // Nobody subscribed to the vehicle's mission manager
        let complete = ScriptStep::SendComplete {
            vehicle: 2,
            error: false,
        };
        assert_eq!(registry.apply(&complete).unwrap(), 0);

        assert_eq!(registry.apply(&ScriptStep::Disconnect).unwrap(), 2);
        assert_eq!(registry.apply(&ScriptStep::Disconnect).unwrap(), 0);
    }
}
