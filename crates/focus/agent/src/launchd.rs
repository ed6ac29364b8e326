//! Service supervision backed by launchd.
//!
//! The launchd job is expected to use `KeepAlive.PathState` on the keep-alive
//! marker, so launchd restarts the agent for as long as the marker exists.
//! The liveness signal is a status file rewritten on every tick.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use focus_core::{HostActionFailure, LivenessLost, ServiceHost};
use serde::{Deserialize, Serialize};

use crate::config::DaemonConfig;
use crate::host::spawn_detached;

/// Contents of the liveness status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessStatus {
    pub pid: u32,
    pub since: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl LivenessStatus {
    pub fn read(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// `gui/<uid>/<label>` service target for launchctl.
pub fn service_target(label: &str) -> String {
    format!("gui/{}/{}", nix::unistd::getuid(), label)
}

/// `launchctl kickstart` for the job. With `kill`, a running instance is
/// killed first; without it, a running job is left alone.
fn kickstart_command(label: &str, kill: bool) -> Command {
    let mut command = Command::new("launchctl");
    command.arg("kickstart");
    if kill {
        command.arg("-k");
    }
    command.arg(service_target(label));
    command
}

/// Ask launchd to start the job if it isn't running.
pub fn kickstart(label: &str) -> std::io::Result<()> {
    spawn_detached(&mut kickstart_command(label, false))
}

/// Kill the job if it is running and start it again.
pub fn restart(label: &str) -> std::io::Result<()> {
    spawn_detached(&mut kickstart_command(label, true))
}

pub struct LaunchdHost {
    label: String,
    keepalive_path: PathBuf,
    status_path: PathBuf,
    since: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl LaunchdHost {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            label: config.launchd_label.clone(),
            keepalive_path: config.keepalive_path(),
            status_path: config.status_path(),
            since: std::sync::Mutex::new(None),
        }
    }

    fn write_status(&self, since: DateTime<Utc>) -> Result<(), LivenessLost> {
        let status = LivenessStatus {
            pid: std::process::id(),
            since,
            heartbeat_at: Utc::now(),
        };
        let json = serde_json::to_string(&status).map_err(|e| LivenessLost(e.to_string()))?;

        if let Some(dir) = self.status_path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| LivenessLost(e.to_string()))?;
        }
        // Write then rename so readers never see a torn file.
        let tmp = self.status_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| LivenessLost(e.to_string()))?;
        std::fs::rename(&tmp, &self.status_path).map_err(|e| LivenessLost(e.to_string()))
    }

    fn since(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.since
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ServiceHost for LaunchdHost {
    fn request_foreground_execution(&self) -> Result<(), HostActionFailure> {
        if let Some(dir) = self.keepalive_path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| HostActionFailure::new("foreground_execution", e.to_string()))?;
        }
        std::fs::write(&self.keepalive_path, self.label.as_bytes())
            .map_err(|e| HostActionFailure::new("foreground_execution", e.to_string()))?;
        kickstart(&self.label)
            .map_err(|e| HostActionFailure::new("foreground_execution", e.to_string()))
    }

    fn request_termination(&self) -> Result<(), HostActionFailure> {
        match std::fs::remove_file(&self.keepalive_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HostActionFailure::new("termination", e.to_string())),
        }
    }

    fn establish_liveness(&self) -> Result<(), LivenessLost> {
        let since = Utc::now();
        self.write_status(since)?;
        *self.since() = Some(since);
        Ok(())
    }

    fn refresh_liveness(&self) -> Result<(), LivenessLost> {
        let Some(since) = *self.since() else {
            return Err(LivenessLost("liveness was never established".into()));
        };
        if !self.status_path.exists() {
            return Err(LivenessLost(format!(
                "{} was removed",
                self.status_path.display()
            )));
        }
        self.write_status(since)
    }

    fn release_liveness(&self) {
        *self.since() = None;
        if let Err(e) = std::fs::remove_file(&self.status_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "failed to remove status file");
            }
        }
    }
}
