//! Recording fakes shared by the unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone as _, Utc};

use crate::commands::Launcher;
use crate::error::{HostActionFailure, LaunchError, LivenessLost};
use crate::event::ForegroundEvent;
use crate::intervention::InterventionHost;
use crate::policy::ApplicationId;
use crate::supervisor::ServiceHost;

pub fn app(id: &str) -> ApplicationId {
    ApplicationId::parse(id).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn event(id: &str, secs: i64) -> ForegroundEvent {
    ForegroundEvent::new(app(id), at(secs))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    LockScreen(ApplicationId),
    NavigateBack(ApplicationId),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    calls: Arc<Mutex<Vec<HostCall>>>,
    fail_lock_screen: Arc<AtomicBool>,
    fail_navigate_back: Arc<AtomicBool>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn navigate_back_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::NavigateBack(_)))
            .count()
    }

    pub fn fail_lock_screen(&self, fail: bool) {
        self.fail_lock_screen.store(fail, Ordering::SeqCst);
    }

    pub fn fail_navigate_back(&self, fail: bool) {
        self.fail_navigate_back.store(fail, Ordering::SeqCst);
    }
}

impl InterventionHost for RecordingHost {
    fn present_lock_screen(&self, self_id: &ApplicationId) -> Result<(), HostActionFailure> {
        self.calls
            .lock()
            .unwrap()
            .push(HostCall::LockScreen(self_id.clone()));
        if self.fail_lock_screen.load(Ordering::SeqCst) {
            return Err(HostActionFailure::new("present_lock_screen", "surface unavailable"));
        }
        Ok(())
    }

    fn navigate_back(&self, blocked: &ApplicationId) -> Result<(), HostActionFailure> {
        self.calls
            .lock()
            .unwrap()
            .push(HostCall::NavigateBack(blocked.clone()));
        if self.fail_navigate_back.load(Ordering::SeqCst) {
            return Err(HostActionFailure::new("navigate_back", "no back stack"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    ForegroundExecution,
    Termination,
    EstablishLiveness,
    RefreshLiveness,
    ReleaseLiveness,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingServiceHost {
    calls: Arc<Mutex<Vec<ServiceCall>>>,
    fail_host_requests: Arc<AtomicBool>,
    fail_establish: Arc<AtomicBool>,
    fail_refresh: Arc<AtomicBool>,
}

impl RecordingServiceHost {
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: ServiceCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn fail_host_requests(&self, fail: bool) {
        self.fail_host_requests.store(fail, Ordering::SeqCst);
    }

    pub fn fail_establish(&self, fail: bool) {
        self.fail_establish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    fn push(&self, call: ServiceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ServiceHost for RecordingServiceHost {
    fn request_foreground_execution(&self) -> Result<(), HostActionFailure> {
        self.push(ServiceCall::ForegroundExecution);
        if self.fail_host_requests.load(Ordering::SeqCst) {
            return Err(HostActionFailure::new("foreground_execution", "refused"));
        }
        Ok(())
    }

    fn request_termination(&self) -> Result<(), HostActionFailure> {
        self.push(ServiceCall::Termination);
        if self.fail_host_requests.load(Ordering::SeqCst) {
            return Err(HostActionFailure::new("termination", "refused"));
        }
        Ok(())
    }

    fn establish_liveness(&self) -> Result<(), LivenessLost> {
        self.push(ServiceCall::EstablishLiveness);
        if self.fail_establish.load(Ordering::SeqCst) {
            return Err(LivenessLost("indicator unavailable".into()));
        }
        Ok(())
    }

    fn refresh_liveness(&self) -> Result<(), LivenessLost> {
        self.push(ServiceCall::RefreshLiveness);
        if self.fail_refresh.load(Ordering::SeqCst) {
            // One-shot: the restart that follows succeeds.
            self.fail_refresh.store(false, Ordering::SeqCst);
            return Err(LivenessLost("indicator dismissed".into()));
        }
        Ok(())
    }

    fn release_liveness(&self) {
        self.push(ServiceCall::ReleaseLiveness);
    }
}

/// Launcher that knows a fixed set of installed applications.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    installed: BTreeSet<ApplicationId>,
    launched: Arc<Mutex<Vec<ApplicationId>>>,
}

impl FakeLauncher {
    pub fn with_installed(ids: &[&str]) -> Self {
        Self {
            installed: ids.iter().map(|id| app(id)).collect(),
            launched: Arc::default(),
        }
    }

    pub fn launched(&self) -> Vec<ApplicationId> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for FakeLauncher {
    async fn launch(&self, application_id: &ApplicationId) -> Result<(), LaunchError> {
        if !self.installed.contains(application_id) {
            return Err(LaunchError::NotFound(application_id.to_string()));
        }
        self.launched.lock().unwrap().push(application_id.clone());
        Ok(())
    }
}
