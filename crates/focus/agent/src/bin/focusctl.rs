use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use focus_agent::config::Config;
use focus_agent::ipc::{IpcClient, Request, Response, is_daemon_running};
use focus_agent::launchd::LivenessStatus;

#[derive(Parser)]
#[command(name = "focusctl")]
#[command(about = "Control the focus enforcement daemon", long_about = None)]
struct Cli {
    /// Daemon socket (defaults to the configured path)
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current status
    Status,

    /// Start enforcement
    Enable,

    /// Stop enforcement until the next boot or enable
    Disable,

    /// Turn lock mode on or off
    Lock {
        #[arg(value_parser = ["on", "off"])]
        mode: String,
    },

    /// Replace the blocked application set
    Block { applications: Vec<String> },

    /// Launch an application by bundle id
    Launch { application_id: String },

    /// Show recorded usage
    Usage {
        /// Only records at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();
    let socket = cli
        .socket
        .unwrap_or_else(|| config.daemon.socket_path.clone());
    let client = IpcClient::new(&socket);

    let request = match cli.command {
        Commands::Status => return cmd_status(&client, &config, &socket),
        Commands::Enable => Request::SetEnforcementActive { active: true },
        Commands::Disable => Request::SetEnforcementActive { active: false },
        Commands::Lock { mode } => Request::SetLockMode {
            enabled: mode == "on",
        },
        Commands::Block { applications } => Request::SetBlockedApplications { applications },
        Commands::Launch { application_id } => Request::LaunchApplication { application_id },
        Commands::Usage { since } => Request::ReadUsageSince { cursor: since },
    };

    match client.request(&request) {
        Ok(response) => print_response(response),
        Err(e) => {
            eprintln!("Failed to communicate with daemon: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_status(client: &IpcClient, config: &Config, socket: &Path) {
    println!("=== Focus Status ===\n");

    if !is_daemon_running(socket) {
        println!("Daemon:    STOPPED");
        match LivenessStatus::read(&config.daemon.status_path()) {
            Some(status) => println!(
                "Last heartbeat: {} (pid {})",
                status.heartbeat_at, status.pid
            ),
            None => println!("No liveness record"),
        }
        std::process::exit(1);
    }

    println!("Daemon:    RUNNING");
    match client.request(&Request::Status) {
        Ok(response) => print_response(response),
        Err(e) => eprintln!("Failed to read status: {}", e),
    }
}

fn print_response(response: Response) {
    match response {
        Response::Ok => println!("OK"),
        Response::Active { active } => println!("{}", if active { "ACTIVE" } else { "INACTIVE" }),
        Response::State { state } => println!("Enforcement: {}", state),
        Response::Status { status } => {
            println!("Enforcement: {}", status.state);
            println!(
                "Lock mode:   {}",
                if status.lock_mode_enabled { "ON" } else { "OFF" }
            );
            println!("Blocked apps: {}", status.blocked_applications);
            println!("Usage records: {}", status.usage_records);
            println!("Supervisor surface: {}", status.self_id);
        }
        Response::Launched => println!("Launched"),
        Response::NotFound { application_id } => {
            eprintln!("Application not found: {}", application_id);
            std::process::exit(1);
        }
        Response::Usage { records } => {
            for record in records {
                println!("{}  {}", record.observed_at.to_rfc3339(), record.application_id);
            }
        }
        Response::Error { message } => {
            eprintln!("Error: {}", message);
            std::process::exit(1);
        }
    }
}
