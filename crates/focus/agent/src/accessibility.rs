//! Foreground application tracking via lsappinfo.

use std::process::Command;
use std::thread::JoinHandle;
use std::time::Duration;

use color_eyre::eyre::WrapErr as _;
use focus_core::{ApplicationId, ForegroundEvent};
use tokio::sync::mpsc;

/// Get the bundle id of the frontmost application.
pub fn get_frontmost_app() -> color_eyre::eyre::Result<Option<String>> {
    let output = Command::new("lsappinfo")
        .args(["info", "-only", "bundleid", "-app", "front"])
        .output()
        .wrap_err("failed to run lsappinfo")?;

    if !output.status.success() {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_bundle_id(&stdout))
}

/// Get all PIDs for a bundle ID.
pub fn get_pids_for_bundle(bundle_id: &str) -> color_eyre::eyre::Result<Vec<i32>> {
    let output = Command::new("lsappinfo")
        .args(["info", "-only", "pid", "-app", bundle_id])
        .output()
        .wrap_err("failed to run lsappinfo")?;

    if !output.status.success() {
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_pids(&stdout))
}

fn parse_bundle_id(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("\"bundleid\"=")?;
        let value = value.trim().trim_matches('"');
        (!value.is_empty() && value != "[ NULL ]").then(|| value.to_string())
    })
}

fn parse_pids(output: &str) -> Vec<i32> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("\"pid\"="))
        .filter_map(|pid| pid.trim().parse().ok())
        .collect()
}

/// Turns successive frontmost samples into switch events.
#[derive(Debug, Default)]
pub struct SwitchDetector {
    current: Option<String>,
}

impl SwitchDetector {
    /// Feed one sample; returns the newly foregrounded app, if it changed.
    pub fn observe(&mut self, frontmost: Option<String>) -> Option<ApplicationId> {
        let frontmost = frontmost?;
        if self.current.as_deref() == Some(frontmost.as_str()) {
            return None;
        }
        self.current = Some(frontmost.clone());

        match ApplicationId::parse(frontmost) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unusable bundle id");
                None
            }
        }
    }
}

/// Poll the frontmost app on a dedicated thread and send an event per switch.
///
/// The thread exits once the receiving side is dropped.
pub fn watch_foreground(
    tx: mpsc::Sender<ForegroundEvent>,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("foreground-watch".into())
        .spawn(move || {
            let mut detector = SwitchDetector::default();
            while !tx.is_closed() {
                let sample = match get_frontmost_app() {
                    Ok(sample) => sample,
                    Err(e) => {
                        tracing::debug!(error = %e, "could not get frontmost app");
                        None
                    }
                };

                if let Some(app) = detector.observe(sample) {
                    if tx.blocking_send(ForegroundEvent::now(app)).is_err() {
                        break;
                    }
                }

                std::thread::sleep(interval);
            }
            tracing::info!("foreground watcher stopped");
        })
}
