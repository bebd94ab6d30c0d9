//! MissionRunner headless orchestrator
//!
//! Given a mission plan file and a vehicle registry, uploads the plan to
//! whichever vehicle becomes active and commands it to start the mission,
//! without operator interaction.
//!
//! This crate provides:
//! - Collaborator contracts for the registry, vehicles and plan upload
//! - The attach/upload/start state machine ([`HeadlessMissionRunner`])
//! - Explicit per-attachment subscription handles
//! - A single-task async event driver
//! - An in-memory simulated link for replay and tests

#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod link;
pub mod plan;
pub mod runner;
pub mod sim;
pub mod start;
pub mod status;
pub mod subscription;
pub mod upload;

pub use error::{RunnerError, RunnerResult};
pub use link::{
    event_channel, AttachmentTag, EventSink, EventSource, FirmwarePlugin, MissionManager,
    Notification, PlanUploader, RunnerEvent, Vehicle, VehicleId, VehicleRegistry,
};
pub use plan::MissionPlanReference;
pub use runner::HeadlessMissionRunner;
pub use start::{MissionStartTrigger, StartOutcome};
pub use status::{RunnerCounters, RunnerStatus};
pub use subscription::{Subscription, SubscriptionSet, SubscriptionToken};
pub use upload::{CompletionOutcome, UploadSession, UploadState};
