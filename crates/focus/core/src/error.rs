//! Error taxonomy shared by the engine, actuator and supervisor.

use thiserror::Error;

/// Malformed or missing policy input.
///
/// Never fatal: the caller keeps the last-known-good policy in force.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("application id is empty")]
    EmptyApplicationId,
    #[error("application id {0:?} contains whitespace or control characters")]
    InvalidApplicationId(String),
    #[error("policy payload is malformed: {0}")]
    Malformed(String),
}

/// The host rejected an intervention or supervisor signal.
///
/// Logged, never retried: a later event re-triggers evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host refused {action}: {reason}")]
pub struct HostActionFailure {
    pub action: &'static str,
    pub reason: String,
}

impl HostActionFailure {
    pub fn new(action: &'static str, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
        }
    }
}

/// The supervisor could not sustain its liveness signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("liveness signal lost: {0}")]
pub struct LivenessLost(pub String);

/// Failure of `launch_application`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("application {0} could not be resolved on the host")]
    NotFound(String),
}
