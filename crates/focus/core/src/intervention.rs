//! Intervention on blocked applications.

use crate::error::HostActionFailure;
use crate::policy::ApplicationId;

/// Host actions used to push a blocked application out of the foreground.
///
/// Implementations must return as soon as the request is issued; they never
/// wait for the host to act on it.
pub trait InterventionHost: Send + Sync {
    /// Bring the supervisor surface forward with its lock screen showing.
    fn present_lock_screen(&self, self_id: &ApplicationId) -> Result<(), HostActionFailure>;

    /// Collapse the blocked application's foreground presence.
    fn navigate_back(&self, blocked: &ApplicationId) -> Result<(), HostActionFailure>;
}

/// What an intervention managed to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterventionReport {
    pub lock_screen_presented: bool,
    pub dismissed: bool,
}

/// Executes Block decisions.
#[derive(Debug, Clone)]
pub struct Actuator<H> {
    host: H,
}

impl<H: InterventionHost> Actuator<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Present the lock screen, then dismiss the blocked application.
    ///
    /// Dismissal is attempted even when the lock screen cannot be shown.
    /// Nothing is retried.
    pub fn intervene(
        &self,
        self_id: &ApplicationId,
        blocked: &ApplicationId,
    ) -> InterventionReport {
        tracing::info!(app_id = %blocked, "intervening on blocked app");

        let lock_screen_presented = match self.host.present_lock_screen(self_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to present lock screen");
                false
            }
        };

        let dismissed = match self.host.navigate_back(blocked) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(app_id = %blocked, error = %e, "failed to dismiss blocked app");
                false
            }
        };

        InterventionReport {
            lock_screen_presented,
            dismissed,
        }
    }
}
