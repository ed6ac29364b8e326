//! Request/response surface for the configuration layer.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::engine::Engine;
use crate::error::LaunchError;
use crate::intervention::InterventionHost;
use crate::policy::{ApplicationId, PolicyState};
use crate::supervisor::{ServiceHost, SupervisorState};
use crate::usage::UsageRecord;

/// Starts applications on the host.
#[trait_variant::make(Send)]
pub trait Launcher: Send + Sync {
    /// Launch an application, or report that the host cannot resolve it.
    async fn launch(&self, application_id: &ApplicationId) -> Result<(), LaunchError>;
}

/// Snapshot of the daemon for status queries.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusReport {
    pub self_id: ApplicationId,
    pub state: SupervisorState,
    pub lock_mode_enabled: bool,
    pub blocked_applications: usize,
    pub usage_records: usize,
}

/// Commands accepted from the configuration layer.
pub struct CommandSurface<I, S, L> {
    engine: Arc<Engine<I, S>>,
    launcher: L,
}

impl<I, S, L> CommandSurface<I, S, L>
where
    I: InterventionHost,
    S: ServiceHost,
    L: Launcher,
{
    pub fn new(engine: Arc<Engine<I, S>>, launcher: L) -> Self {
        Self { engine, launcher }
    }

    pub fn engine(&self) -> &Arc<Engine<I, S>> {
        &self.engine
    }

    pub fn is_enforcement_active(&self) -> bool {
        self.engine.supervisor().is_running()
    }

    pub fn set_enforcement_active(&self, active: bool) -> SupervisorState {
        let supervisor = self.engine.supervisor();
        if active {
            supervisor.start()
        } else {
            supervisor.stop()
        }
    }

    pub fn update_policy(&self, policy: PolicyState) {
        self.engine.policy().replace(policy);
    }

    pub fn set_lock_mode(&self, enabled: bool) {
        self.engine.policy().set_lock_mode(enabled);
    }

    pub fn set_blocked_applications(&self, blocked: BTreeSet<ApplicationId>) {
        self.engine.policy().set_blocked_applications(blocked);
    }

    pub async fn launch_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<(), LaunchError> {
        let result = self.launcher.launch(application_id).await;
        if let Err(e) = &result {
            tracing::warn!(app_id = %application_id, error = %e, "launch failed");
        }
        result
    }

    /// Usage since `cursor`, or everything since daemon start.
    pub fn read_usage_since(&self, cursor: Option<DateTime<Utc>>) -> Vec<UsageRecord> {
        let tracker = self.engine.tracker();
        match cursor {
            Some(cursor) => tracker.since(cursor),
            None => tracker.all(),
        }
    }

    pub fn task_removed(&self) -> SupervisorState {
        self.engine.supervisor().on_task_removed()
    }

    pub fn status(&self) -> StatusReport {
        let policy = self.engine.policy().snapshot();
        StatusReport {
            self_id: self.engine.self_id().clone(),
            state: self.engine.supervisor().state(),
            lock_mode_enabled: policy.lock_mode_enabled,
            blocked_applications: policy.blocked_applications.len(),
            usage_records: self.engine.tracker().len(),
        }
    }
}
