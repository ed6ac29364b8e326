//! Daemon wiring: event source, engine, supervisor and command socket.

use std::collections::BTreeSet;
use std::sync::Arc;

use color_eyre::eyre::WrapErr as _;
use focus_core::{
    Actuator, ApplicationId, CommandSurface, ConfigurationError, Engine, InterventionHost,
    LaunchError, Launcher, PolicyHandle, PolicyState, ServiceHost, Supervisor, UsageTracker,
};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::accessibility;
use crate::config::Config;
use crate::host::MacHost;
use crate::ipc::{IpcServer, PendingRequest, Request, Response};
use crate::launchd::LaunchdHost;

pub type Surface = CommandSurface<MacHost, LaunchdHost, MacHost>;

const EVENT_QUEUE_LEN: usize = 64;

/// Build the engine and command surface described by `config`.
///
/// A malformed `[policy]` section falls back to the unlocked default.
pub fn build(config: &Config) -> color_eyre::eyre::Result<Arc<Surface>> {
    let self_id = config.self_id().wrap_err("invalid daemon.self_id")?;

    let policy = config.initial_policy().unwrap_or_else(|e| {
        warn!(error = %e, "invalid policy in config, starting unlocked");
        PolicyState::default()
    });

    let host = MacHost::new(config.intervention.dismiss);
    let supervisor = Arc::new(Supervisor::new(LaunchdHost::new(&config.daemon)));
    let engine = Engine::new(
        self_id,
        PolicyHandle::new(policy),
        Actuator::new(host),
        UsageTracker::new(),
        supervisor,
    );

    Ok(Arc::new(CommandSurface::new(Arc::new(engine), host)))
}

/// Run until SIGTERM or SIGINT.
pub async fn run(config: Config) -> color_eyre::eyre::Result<()> {
    let surface = build(&config)?;
    let engine = surface.engine().clone();
    let supervisor = engine.supervisor().clone();

    let server =
        IpcServer::bind(&config.daemon.socket_path).wrap_err("failed to start IPC server")?;
    let mut requests = server.run().wrap_err("failed to start IPC server")?;

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_LEN);
    accessibility::watch_foreground(tx, config.daemon.poll_interval())
        .wrap_err("failed to start foreground watcher")?;
    let pipeline = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run(rx).await }
    });

    // Process start is the boot signal: launchd runs us at load.
    supervisor.on_boot();

    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).wrap_err("failed to install SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).wrap_err("failed to install SIGHUP handler")?;
    let mut liveness = tokio::time::interval(config.daemon.liveness_interval());

    info!(self_id = %engine.self_id(), "focus agent running");

    loop {
        tokio::select! {
            Some(pending) = requests.recv() => {
                let surface = surface.clone();
                tokio::spawn(async move { answer(&surface, pending).await });
            }
            _ = liveness.tick() => {
                supervisor.on_liveness_tick();
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, treating as task removal");
                supervisor.on_task_removed();
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                break;
            }
        }
    }

    info!("focus agent shutting down");
    server.stop();
    pipeline.abort();
    // Leave the keep-alive marker alone so launchd brings us back.
    supervisor.host().release_liveness();
    Ok(())
}

async fn answer(surface: &Surface, pending: PendingRequest) {
    let response = dispatch(surface, pending.request.clone()).await;
    pending.respond(response);
}

/// Execute one command against the surface.
pub async fn dispatch<I, S, L>(surface: &CommandSurface<I, S, L>, request: Request) -> Response
where
    I: InterventionHost,
    S: ServiceHost,
    L: Launcher,
{
    match request {
        Request::Heartbeat => Response::Ok,
        Request::Status => Response::Status {
            status: surface.status(),
        },
        Request::IsEnforcementActive => Response::Active {
            active: surface.is_enforcement_active(),
        },
        Request::SetEnforcementActive { active } => Response::State {
            state: surface.set_enforcement_active(active),
        },
        Request::UpdatePolicy {
            lock_mode_enabled,
            blocked_applications,
        } => match PolicyState::from_raw(lock_mode_enabled, blocked_applications) {
            Ok(policy) => {
                surface.update_policy(policy);
                Response::Ok
            }
            Err(e) => rejected(e),
        },
        Request::SetLockMode { enabled } => {
            surface.set_lock_mode(enabled);
            Response::Ok
        }
        Request::SetBlockedApplications { applications } => {
            match applications
                .into_iter()
                .map(ApplicationId::parse)
                .collect::<Result<BTreeSet<_>, _>>()
            {
                Ok(blocked) => {
                    surface.set_blocked_applications(blocked);
                    Response::Ok
                }
                Err(e) => rejected(e),
            }
        }
        Request::LaunchApplication { application_id } => {
            let id = match ApplicationId::parse(application_id.clone()) {
                Ok(id) => id,
                Err(_) => return Response::NotFound { application_id },
            };
            match surface.launch_application(&id).await {
                Ok(()) => Response::Launched,
                Err(LaunchError::NotFound(application_id)) => Response::NotFound { application_id },
            }
        }
        Request::ReadUsageSince { cursor } => Response::Usage {
            records: surface.read_usage_since(cursor),
        },
        Request::TaskRemoved => Response::State {
            state: surface.task_removed(),
        },
    }
}

fn rejected(e: ConfigurationError) -> Response {
    warn!(error = %e, "policy update rejected, keeping previous policy");
    Response::Error {
        message: e.to_string(),
    }
}
