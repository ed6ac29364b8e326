//! macOS intervention and launch actions.

use std::process::{Command, Stdio};

use focus_core::{ApplicationId, HostActionFailure, InterventionHost, LaunchError, Launcher};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use crate::accessibility;
use crate::config::DismissBehavior;

/// Spawn a command without waiting for it; a helper thread reaps the child.
pub(crate) fn spawn_detached(command: &mut Command) -> std::io::Result<()> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// Host actions backed by `open`, `osascript` and signals.
#[derive(Debug, Clone, Copy)]
pub struct MacHost {
    dismiss: DismissBehavior,
}

impl MacHost {
    pub fn new(dismiss: DismissBehavior) -> Self {
        Self { dismiss }
    }

    fn hide(&self, blocked: &ApplicationId) -> Result<(), HostActionFailure> {
        let script = format!(
            "tell application \"System Events\" to set visible of \
             (first process whose bundle identifier is {}) to false",
            applescript_string(blocked.as_str())
        );
        spawn_detached(Command::new("osascript").args(["-e", script.as_str()]))
            .map_err(|e| HostActionFailure::new("navigate_back", e.to_string()))
    }

    fn terminate(&self, blocked: &ApplicationId) -> Result<(), HostActionFailure> {
        let bundle_id = blocked.to_string();
        // lsappinfo blocks; resolve and signal off the event thread.
        std::thread::Builder::new()
            .name("dismiss".into())
            .spawn(move || kill_bundle(&bundle_id))
            .map(drop)
            .map_err(|e| HostActionFailure::new("navigate_back", e.to_string()))
    }
}

fn kill_bundle(bundle_id: &str) {
    let pids = match accessibility::get_pids_for_bundle(bundle_id) {
        Ok(pids) => pids,
        Err(e) => {
            tracing::warn!(bundle_id = %bundle_id, error = %e, "failed to resolve pids");
            return;
        }
    };

    for pid in pids {
        match kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => tracing::info!(bundle_id = %bundle_id, pid, "SIGKILL sent"),
            Err(e) => tracing::warn!(bundle_id = %bundle_id, pid, error = %e, "failed to kill"),
        }
    }
}

/// Quote a value as an AppleScript string literal.
fn applescript_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

impl InterventionHost for MacHost {
    fn present_lock_screen(&self, self_id: &ApplicationId) -> Result<(), HostActionFailure> {
        spawn_detached(Command::new("open").args([
            "-b",
            self_id.as_str(),
            "--args",
            "--show-lock-screen",
        ]))
        .map_err(|e| HostActionFailure::new("present_lock_screen", e.to_string()))
    }

    fn navigate_back(&self, blocked: &ApplicationId) -> Result<(), HostActionFailure> {
        match self.dismiss {
            DismissBehavior::Hide => self.hide(blocked),
            DismissBehavior::Kill => self.terminate(blocked),
        }
    }
}

impl Launcher for MacHost {
    async fn launch(&self, application_id: &ApplicationId) -> Result<(), LaunchError> {
        let status = tokio::process::Command::new("open")
            .args(["-b", application_id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                tracing::info!(app_id = %application_id, "launched");
                Ok(())
            }
            Ok(status) => {
                tracing::debug!(app_id = %application_id, %status, "open could not resolve app");
                Err(LaunchError::NotFound(application_id.to_string()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to run open");
                Err(LaunchError::NotFound(application_id.to_string()))
            }
        }
    }
}
