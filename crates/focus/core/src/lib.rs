//! Focus Core
//!
//! Host-independent enforcement logic: policy decisions, intervention,
//! usage tracking and service supervision.

pub mod commands;
pub mod engine;
pub mod error;
pub mod event;
pub mod intervention;
pub mod policy;
pub mod supervisor;
pub mod usage;

#[cfg(test)]
mod testing;

pub use commands::{CommandSurface, Launcher, StatusReport};
pub use engine::Engine;
pub use error::{ConfigurationError, HostActionFailure, LaunchError, LivenessLost};
pub use event::ForegroundEvent;
pub use intervention::{Actuator, InterventionHost, InterventionReport};
pub use policy::{ApplicationId, Decision, PolicyHandle, PolicyState, decide};
pub use supervisor::{ServiceHost, Supervisor, SupervisorState, Transition, Trigger};
pub use usage::{UsageRecord, UsageTracker};
