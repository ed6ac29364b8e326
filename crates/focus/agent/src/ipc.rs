//! Command socket between the daemon and its clients.
//!
//! Each connection carries one JSON request line and one JSON response line.

use std::io::{BufRead as _, BufReader, Write as _};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use focus_core::{StatusReport, SupervisorState, UsageRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
const MAX_MISSED_HEARTBEATS: u32 = 4;
const IO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("Connection closed before a response")]
    Closed,
    #[error("Heartbeat missed")]
    HeartbeatMissed,
}

/// Requests from the configuration layer and the watchdog.
///
/// Identifiers travel as plain strings and are validated by the daemon, so a
/// malformed policy is answered with an error instead of a dropped request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Heartbeat,
    Status,
    IsEnforcementActive,
    SetEnforcementActive {
        active: bool,
    },
    UpdatePolicy {
        lock_mode_enabled: bool,
        blocked_applications: Vec<String>,
    },
    SetLockMode {
        enabled: bool,
    },
    SetBlockedApplications {
        applications: Vec<String>,
    },
    LaunchApplication {
        application_id: String,
    },
    ReadUsageSince {
        #[serde(default)]
        cursor: Option<DateTime<Utc>>,
    },
    TaskRemoved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Active { active: bool },
    State { state: SupervisorState },
    Status { status: StatusReport },
    Launched,
    NotFound { application_id: String },
    Usage { records: Vec<UsageRecord> },
    Error { message: String },
}

/// A request waiting for the daemon's answer.
#[derive(Debug)]
pub struct PendingRequest {
    pub request: Request,
    reply: oneshot::Sender<Response>,
}

impl PendingRequest {
    pub fn respond(self, response: Response) {
        if self.reply.send(response).is_err() {
            debug!("client went away before the response");
        }
    }
}

/// Server side - runs in the daemon
pub struct IpcServer {
    path: PathBuf,
    listener: UnixListener,
    running: Arc<AtomicBool>,
}

impl IpcServer {
    pub fn bind(path: &Path) -> Result<Self, IpcError> {
        // Remove existing socket if present
        let _ = std::fs::remove_file(path);

        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;

        info!("IPC server listening on {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            listener,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Run the accept loop, returning a channel of requests to answer
    pub fn run(&self) -> Result<mpsc::Receiver<PendingRequest>, IpcError> {
        let (tx, rx) = mpsc::channel(32);
        let running = self.running.clone();
        let listener = self.listener.try_clone()?;

        std::thread::Builder::new()
            .name("ipc-accept".into())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            if let Err(e) = serve_connection(stream, &tx) {
                                warn!("IPC connection error: {}", e);
                            }
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(50));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                    if tx.is_closed() {
                        break;
                    }
                }
            })?;

        Ok(rx)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.stop();
        let _ = std::fs::remove_file(&self.path);
    }
}

fn serve_connection(stream: UnixStream, tx: &mpsc::Sender<PendingRequest>) -> Result<(), IpcError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    let mut line = String::new();
    BufReader::new(&stream).read_line(&mut line)?;

    let response = match serde_json::from_str::<Request>(&line) {
        Ok(request) => {
            debug!("Received request: {:?}", request);
            let (reply, answer) = oneshot::channel();
            if tx.blocking_send(PendingRequest { request, reply }).is_err() {
                return Err(IpcError::Closed);
            }
            answer.blocking_recv().map_err(|_| IpcError::Closed)?
        }
        Err(e) => Response::Error {
            message: format!("malformed request: {e}"),
        },
    };

    write_line(&stream, &response)
}

fn write_line<T: Serialize>(mut stream: &UnixStream, value: &T) -> Result<(), IpcError> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    stream.write_all(&bytes)?;
    stream.flush()?;
    Ok(())
}

/// Client side - used by watchdog and CLI
pub struct IpcClient {
    path: PathBuf,
}

impl IpcClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Send a request and wait for the daemon's response
    pub fn request(&self, request: &Request) -> Result<Response, IpcError> {
        let stream = UnixStream::connect(&self.path)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(Duration::from_secs(1)))?;
        write_line(&stream, request)?;

        let mut line = String::new();
        if BufReader::new(&stream).read_line(&mut line)? == 0 {
            return Err(IpcError::Closed);
        }
        Ok(serde_json::from_str(&line)?)
    }

    /// Send heartbeat and check if daemon is alive
    pub fn heartbeat(&self) -> Result<(), IpcError> {
        match self.request(&Request::Heartbeat)? {
            Response::Ok => Ok(()),
            _ => Err(IpcError::Closed),
        }
    }

    /// Run heartbeat loop, returns error if daemon stops responding
    pub async fn run_heartbeat_loop(&self) -> IpcError {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut consecutive_failures = 0;

        loop {
            interval.tick().await;

            match self.heartbeat() {
                Ok(()) => {
                    consecutive_failures = 0;
                    debug!("Heartbeat OK");
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Heartbeat failed ({}/{}): {}",
                        consecutive_failures, MAX_MISSED_HEARTBEATS, e
                    );

                    if consecutive_failures >= MAX_MISSED_HEARTBEATS {
                        error!("Daemon not responding");
                        return IpcError::HeartbeatMissed;
                    }
                }
            }
        }
    }
}

/// Check if daemon is running
pub fn is_daemon_running(path: &Path) -> bool {
    IpcClient::new(path).request(&Request::Heartbeat).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&Request::SetEnforcementActive { active: true }).unwrap();
        assert_eq!(json, r#"{"type":"set_enforcement_active","active":true}"#);

        let parsed: Request = serde_json::from_str(r#"{"type":"read_usage_since"}"#).unwrap();
        assert_eq!(parsed, Request::ReadUsageSince { cursor: None });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.sock");
        let server = IpcServer::bind(&path).unwrap();
        let mut requests = server.run().unwrap();

        tokio::spawn(async move {
            while let Some(pending) = requests.recv().await {
                let response = match &pending.request {
                    Request::IsEnforcementActive => Response::Active { active: true },
                    _ => Response::Ok,
                };
                pending.respond(response);
            }
        });

        let client_path = path.clone();
        let (active, heartbeat) = tokio::task::spawn_blocking(move || {
            let client = IpcClient::new(client_path);
            let active = client.request(&Request::IsEnforcementActive).unwrap();
            let heartbeat = client.heartbeat();
            (active, heartbeat)
        })
        .await
        .unwrap();

        assert_eq!(active, Response::Active { active: true });
        assert!(heartbeat.is_ok());
        server.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_malformed_request_gets_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.sock");
        let server = IpcServer::bind(&path).unwrap();
        let _requests = server.run().unwrap();

        let response = tokio::task::spawn_blocking(move || {
            let mut stream = UnixStream::connect(&path).unwrap();
            stream.write_all(b"{\"type\":\"nonsense\"}\n").unwrap();
            let mut line = String::new();
            BufReader::new(&stream).read_line(&mut line).unwrap();
            serde_json::from_str::<Response>(&line).unwrap()
        })
        .await
        .unwrap();

        assert!(matches!(response, Response::Error { .. }));
        server.stop();
    }

    #[test]
    fn test_client_reports_missing_daemon() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_daemon_running(&dir.path().join("absent.sock")));
    }
}
