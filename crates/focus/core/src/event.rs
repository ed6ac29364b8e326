//! Foreground switch events.

use chrono::{DateTime, Utc};

use crate::policy::ApplicationId;

/// The visibly active application changed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ForegroundEvent {
    pub application_id: ApplicationId,
    pub observed_at: DateTime<Utc>,
}

impl ForegroundEvent {
    pub fn new(application_id: ApplicationId, observed_at: DateTime<Utc>) -> Self {
        Self {
            application_id,
            observed_at,
        }
    }

    /// Event observed now.
    pub fn now(application_id: ApplicationId) -> Self {
        Self::new(application_id, Utc::now())
    }
}
