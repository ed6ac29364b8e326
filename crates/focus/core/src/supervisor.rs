//! Service supervision state machine.
//!
//! Keeps the enforcement pipeline attached across boots, task removals and
//! liveness failures. Every trigger is applied as a single
//! read-check-transition under one lock, so racing triggers can never start
//! the service twice.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::{HostActionFailure, LivenessLost};

const TRANSITION_LOG_LEN: usize = 64;

/// Lifecycle state of the enforcement service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    RestartPending,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::RestartPending => "restart_pending",
        };
        f.write_str(s)
    }
}

/// Cause of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Boot,
    Start,
    Stop,
    TaskRemoved,
    LivenessLost,
    Restart,
    Attached,
}

/// One entry of the transition log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transition {
    pub from: SupervisorState,
    pub to: SupervisorState,
    pub trigger: Trigger,
    pub at: DateTime<Utc>,
}

/// Host process-manager hooks used by the supervisor.
pub trait ServiceHost: Send + Sync {
    /// Ask the host to run (or re-run) the service with elevated priority.
    fn request_foreground_execution(&self) -> Result<(), HostActionFailure>;

    /// Tell the host the service no longer needs to be kept alive.
    fn request_termination(&self) -> Result<(), HostActionFailure>;

    /// Raise the always-visible liveness signal.
    fn establish_liveness(&self) -> Result<(), LivenessLost>;

    /// Re-assert the liveness signal while running.
    fn refresh_liveness(&self) -> Result<(), LivenessLost>;

    /// Withdraw the liveness signal.
    fn release_liveness(&self);
}

struct Inner {
    state: SupervisorState,
    log: VecDeque<Transition>,
}

/// Owner of the [`SupervisorState`].
pub struct Supervisor<H> {
    host: H,
    inner: Mutex<Inner>,
}

impl<H: ServiceHost> Supervisor<H> {
    /// Create a stopped supervisor.
    pub fn new(host: H) -> Self {
        Self {
            host,
            inner: Mutex::new(Inner {
                state: SupervisorState::Stopped,
                log: VecDeque::with_capacity(TRANSITION_LOG_LEN),
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn state(&self) -> SupervisorState {
        self.lock().state
    }

    /// Whether the event pipeline is attached.
    pub fn is_running(&self) -> bool {
        self.state() == SupervisorState::Running
    }

    /// Recent transitions, oldest first.
    pub fn transitions(&self) -> Vec<Transition> {
        self.lock().log.iter().cloned().collect()
    }

    /// Device startup completed.
    pub fn on_boot(&self) -> SupervisorState {
        let mut inner = self.lock();
        if inner.state != SupervisorState::Stopped {
            tracing::debug!(state = %inner.state, "boot signal ignored");
            return inner.state;
        }
        Self::transition(&mut inner, SupervisorState::Starting, Trigger::Boot);
        self.bring_up(&mut inner);
        inner.state
    }

    /// Explicit start command from the configuration layer.
    pub fn start(&self) -> SupervisorState {
        let mut inner = self.lock();
        match inner.state {
            SupervisorState::Stopped | SupervisorState::RestartPending => {
                Self::transition(&mut inner, SupervisorState::Starting, Trigger::Start);
                self.bring_up(&mut inner);
            }
            SupervisorState::Starting | SupervisorState::Running => {
                tracing::debug!(state = %inner.state, "start ignored");
            }
        }
        inner.state
    }

    /// Explicit stop command. No restart happens until the next boot signal
    /// or start command.
    pub fn stop(&self) -> SupervisorState {
        let mut inner = self.lock();
        if inner.state == SupervisorState::Stopped {
            return inner.state;
        }
        Self::transition(&mut inner, SupervisorState::Stopped, Trigger::Stop);
        self.host.release_liveness();
        if let Err(e) = self.host.request_termination() {
            tracing::warn!(error = %e, "termination request refused");
        }
        inner.state
    }

    /// The user dismissed the service's visible task.
    pub fn on_task_removed(&self) -> SupervisorState {
        let mut inner = self.lock();
        if inner.state != SupervisorState::Running {
            tracing::debug!(state = %inner.state, "task removal ignored");
            return inner.state;
        }
        Self::transition(&mut inner, SupervisorState::RestartPending, Trigger::TaskRemoved);
        Self::transition(&mut inner, SupervisorState::Starting, Trigger::Restart);
        self.bring_up(&mut inner);
        inner.state
    }

    /// Periodic liveness check.
    ///
    /// While running the liveness signal is refreshed; losing it forces a
    /// restart. A restart left pending by an earlier failure is retried.
    pub fn on_liveness_tick(&self) -> SupervisorState {
        let mut inner = self.lock();
        match inner.state {
            SupervisorState::Running => {
                if let Err(e) = self.host.refresh_liveness() {
                    tracing::error!(error = %e, "liveness lost, restarting");
                    Self::transition(
                        &mut inner,
                        SupervisorState::RestartPending,
                        Trigger::LivenessLost,
                    );
                    Self::transition(&mut inner, SupervisorState::Starting, Trigger::Restart);
                    self.bring_up(&mut inner);
                }
            }
            SupervisorState::RestartPending => {
                Self::transition(&mut inner, SupervisorState::Starting, Trigger::Restart);
                self.bring_up(&mut inner);
            }
            SupervisorState::Stopped | SupervisorState::Starting => {}
        }
        inner.state
    }

    // Starting -> Running, or RestartPending when liveness can't be raised.
    fn bring_up(&self, inner: &mut Inner) {
        debug_assert_eq!(inner.state, SupervisorState::Starting);

        if let Err(e) = self.host.request_foreground_execution() {
            tracing::warn!(error = %e, "foreground execution request refused");
        }

        match self.host.establish_liveness() {
            Ok(()) => Self::transition(inner, SupervisorState::Running, Trigger::Attached),
            Err(e) => {
                tracing::error!(error = %e, "could not establish liveness");
                Self::transition(inner, SupervisorState::RestartPending, Trigger::LivenessLost);
            }
        }
    }

    fn transition(inner: &mut Inner, to: SupervisorState, trigger: Trigger) {
        let from = inner.state;
        inner.state = to;
        tracing::info!(%from, %to, ?trigger, "supervisor transition");

        if inner.log.len() == TRANSITION_LOG_LEN {
            inner.log.pop_front();
        }
        inner.log.push_back(Transition {
            from,
            to,
            trigger,
            at: Utc::now(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingServiceHost, ServiceCall};
    use std::sync::Arc;

    fn states(s: &Supervisor<RecordingServiceHost>) -> Vec<SupervisorState> {
        s.transitions().iter().map(|t| t.to).collect()
    }

    #[test]
    fn test_boot_reaches_running() {
        let host = RecordingServiceHost::default();
        let supervisor = Supervisor::new(host.clone());

        assert_eq!(supervisor.on_boot(), SupervisorState::Running);
        assert_eq!(
            states(&supervisor),
            vec![SupervisorState::Starting, SupervisorState::Running]
        );
        assert_eq!(
            host.calls(),
            vec![ServiceCall::ForegroundExecution, ServiceCall::EstablishLiveness]
        );
    }

    #[test]
    fn test_boot_while_running_is_ignored() {
        let supervisor = Supervisor::new(RecordingServiceHost::default());
        supervisor.on_boot();
        supervisor.on_boot();
        assert_eq!(supervisor.transitions().len(), 2);
    }

    #[test]
    fn test_task_removal_reenters_starting() {
        let host = RecordingServiceHost::default();
        let supervisor = Supervisor::new(host.clone());
        supervisor.on_boot();

        assert_eq!(supervisor.on_task_removed(), SupervisorState::Running);
        assert_eq!(
            states(&supervisor)[2..],
            [
                SupervisorState::RestartPending,
                SupervisorState::Starting,
                SupervisorState::Running,
            ]
        );
        assert_eq!(host.count(ServiceCall::ForegroundExecution), 2);
    }

    #[test]
    fn test_task_removal_when_stopped_is_ignored() {
        let supervisor = Supervisor::new(RecordingServiceHost::default());
        assert_eq!(supervisor.on_task_removed(), SupervisorState::Stopped);
        assert!(supervisor.transitions().is_empty());
    }

    #[test]
    fn test_stop_releases_and_prevents_restart() {
        let host = RecordingServiceHost::default();
        let supervisor = Supervisor::new(host.clone());
        supervisor.on_boot();

        assert_eq!(supervisor.stop(), SupervisorState::Stopped);
        assert_eq!(host.count(ServiceCall::ReleaseLiveness), 1);
        assert_eq!(host.count(ServiceCall::Termination), 1);

        assert_eq!(supervisor.on_task_removed(), SupervisorState::Stopped);
        assert_eq!(supervisor.on_liveness_tick(), SupervisorState::Stopped);
        assert_eq!(supervisor.start(), SupervisorState::Running);
    }

    #[test]
    fn test_refused_host_requests_do_not_block_transitions() {
        let host = RecordingServiceHost::default();
        host.fail_host_requests(true);
        let supervisor = Supervisor::new(host.clone());

        assert_eq!(supervisor.on_boot(), SupervisorState::Running);
        assert_eq!(supervisor.stop(), SupervisorState::Stopped);
    }

    #[test]
    fn test_liveness_loss_restarts() {
        let host = RecordingServiceHost::default();
        let supervisor = Supervisor::new(host.clone());
        supervisor.on_boot();

        host.fail_refresh(true);
        assert_eq!(supervisor.on_liveness_tick(), SupervisorState::Running);
        let last: Vec<_> = supervisor.transitions()[2..]
            .iter()
            .map(|t| (t.to, t.trigger))
            .collect();
        assert_eq!(
            last,
            vec![
                (SupervisorState::RestartPending, Trigger::LivenessLost),
                (SupervisorState::Starting, Trigger::Restart),
                (SupervisorState::Running, Trigger::Attached),
            ]
        );
    }

    #[test]
    fn test_pending_restart_is_retried_on_next_tick() {
        let host = RecordingServiceHost::default();
        host.fail_establish(true);
        let supervisor = Supervisor::new(host.clone());

        assert_eq!(supervisor.on_boot(), SupervisorState::RestartPending);
        assert!(!supervisor.is_running());

        host.fail_establish(false);
        assert_eq!(supervisor.on_liveness_tick(), SupervisorState::Running);
    }

    #[test]
    fn test_racing_start_triggers_start_once() {
        let host = RecordingServiceHost::default();
        let supervisor = Arc::new(Supervisor::new(host.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let supervisor = supervisor.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        supervisor.on_boot();
                    } else {
                        supervisor.start();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(supervisor.state(), SupervisorState::Running);
        assert_eq!(host.count(ServiceCall::EstablishLiveness), 1);
    }

    #[test]
    fn test_transition_log_is_bounded() {
        let supervisor = Supervisor::new(RecordingServiceHost::default());
        supervisor.on_boot();
        for _ in 0..100 {
            supervisor.on_task_removed();
        }
        assert_eq!(supervisor.transitions().len(), TRANSITION_LOG_LEN);
    }
}
