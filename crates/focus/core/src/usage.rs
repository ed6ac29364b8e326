//! Usage telemetry for allowed foreground switches.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::policy::ApplicationId;

/// One allowed foreground switch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UsageRecord {
    pub application_id: ApplicationId,
    pub observed_at: DateTime<Utc>,
}

/// Append-only log of usage records since daemon start.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Never fails.
    pub fn record(&self, application_id: ApplicationId, observed_at: DateTime<Utc>) {
        tracing::debug!(app_id = %application_id, "usage recorded");
        self.lock().push(UsageRecord {
            application_id,
            observed_at,
        });
    }

    /// Every record in append order.
    pub fn all(&self) -> Vec<UsageRecord> {
        self.lock().clone()
    }

    /// Records observed at or after `cursor`, in append order.
    pub fn since(&self, cursor: DateTime<Utc>) -> Vec<UsageRecord> {
        self.lock()
            .iter()
            .filter(|r| r.observed_at >= cursor)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while appending cannot leave the Vec half-written, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<UsageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
