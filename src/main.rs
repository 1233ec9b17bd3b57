use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use trainings::admin::{self, AppState};
use trainings::config::{init_timezone, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "trainings")]
#[command(about = "Admin panel for training email templates and recurring schedules")]
struct Args {
    /// Path to the TOML config (default: $TRAININGS_CONFIG or trainings.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=warn".parse()?);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_tracing(args.log_level.as_deref().unwrap_or(&config.log_level))?;
    init_timezone(&config.timezone);

    fs::create_dir_all(&config.static_dir)
        .with_context(|| format!("creating {}", config.static_dir.display()))?;

    let bind = config.bind.clone();
    let app = admin::app(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {}", bind))?;
    info!(address = %bind, "admin panel listening");
    axum::serve(listener, app).await?;

    Ok(())
}
