//! Focus Agent Daemon

use std::path::PathBuf;

use clap::Parser;
use focus_agent::config::Config;

#[derive(Parser)]
#[command(name = "focus-agent")]
#[command(about = "Focus enforcement daemon", long_about = None)]
struct Args {
    /// Config file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("focus_agent=info".parse()?)
                .add_directive("focus_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    tracing::info!("focus-agent starting");

    let path = args.config.unwrap_or_else(Config::config_path);
    let config = match Config::load_from(&path) {
        Ok(c) => {
            tracing::info!("Configuration loaded from {:?}", path);
            c
        }
        Err(e) => {
            tracing::warn!("Failed to load config: {}. Using defaults.", e);
            Config::default()
        }
    };

    focus_agent::daemon::run(config).await
}
