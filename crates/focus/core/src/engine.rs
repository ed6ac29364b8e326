//! Event intake: decide, then intervene or record usage.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::event::ForegroundEvent;
use crate::intervention::{Actuator, InterventionHost};
use crate::policy::{ApplicationId, Decision, PolicyHandle, decide};
use crate::supervisor::{ServiceHost, Supervisor};
use crate::usage::UsageTracker;

/// Single consumer of foreground switch events.
pub struct Engine<I, S> {
    self_id: ApplicationId,
    policy: PolicyHandle,
    actuator: Actuator<I>,
    tracker: UsageTracker,
    supervisor: Arc<Supervisor<S>>,
}

impl<I, S> Engine<I, S>
where
    I: InterventionHost,
    S: ServiceHost,
{
    pub fn new(
        self_id: ApplicationId,
        policy: PolicyHandle,
        actuator: Actuator<I>,
        tracker: UsageTracker,
        supervisor: Arc<Supervisor<S>>,
    ) -> Self {
        Self {
            self_id,
            policy,
            actuator,
            tracker,
            supervisor,
        }
    }

    pub fn self_id(&self) -> &ApplicationId {
        &self.self_id
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    pub fn supervisor(&self) -> &Arc<Supervisor<S>> {
        &self.supervisor
    }

    /// Process one event.
    ///
    /// Returns `None` when the pipeline is detached (supervisor not running).
    pub fn handle(&self, event: &ForegroundEvent) -> Option<Decision> {
        if !self.supervisor.is_running() {
            tracing::trace!(app_id = %event.application_id, "pipeline detached, event dropped");
            return None;
        }

        let policy = self.policy.snapshot();
        let decision = decide(&policy, event, &self.self_id);
        tracing::debug!(app_id = %event.application_id, ?decision, "foreground switch");

        match decision {
            Decision::Block => {
                let report = self.actuator.intervene(&self.self_id, &event.application_id);
                tracing::debug!(app_id = %event.application_id, ?report, "intervention issued");
            }
            Decision::Allow => {
                self.tracker
                    .record(event.application_id.clone(), event.observed_at);
            }
        }

        Some(decision)
    }

    /// Consume events in order until every sender is gone.
    pub async fn run(&self, mut events: mpsc::Receiver<ForegroundEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        tracing::info!("event source closed");
    }
}
