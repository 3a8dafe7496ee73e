//! ccmp - cluster controller process entry point.

use std::path::PathBuf;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use ccmp::cc::{builder_from, ClusterController};
use ccmp::config::CcConfig;
use ccmp::observability::init_tracing;
use ccmp::settings::{apply_to, FileSettingsSource, SettingsSource};

/// Cluster controller process: mediates message-plane traffic for local
/// consumers and providers.
#[derive(Parser, Debug)]
#[command(name = "ccmp", about = "Cluster controller message-plane process")]
struct Args {
    /// Path to an INI-style settings file (§6). Falls back to the
    /// production preset if omitted.
    #[arg(long)]
    settings_file: Option<PathBuf>,

    /// Preset to start from before applying the settings file: `development`,
    /// `production`, or `testing`.
    #[arg(long, default_value = "production")]
    preset: String,

    /// Address the admin health endpoint binds to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    admin_addr: String,
}

fn preset(name: &str) -> CcConfig {
    match name {
        "development" => CcConfig::development(),
        "testing" => CcConfig::testing(),
        _ => CcConfig::production(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let base = preset(&args.preset);

    // Tracing isn't initialized yet, so log-level resolution failures before
    // this point would be silent; it's small enough to accept.
    init_tracing(&base.log_level)?;

    let config = if let Some(path) = &args.settings_file {
        let source = FileSettingsSource::open(path)?;
        let values = source.load().await?;
        apply_to(&values, builder_from(base))?
    } else {
        base
    };

    info!(log_level = %config.log_level, "starting cluster controller");

    let cc = match ClusterController::start(config) {
        Ok(cc) => cc,
        Err(err) => {
            error!(%err, "failed to start cluster controller");
            return Err(err.into());
        }
    };
    info!("cluster controller started");

    let app = Router::new().route("/health", get(|| async { "ok" }));
    let listener = TcpListener::bind(&args.admin_addr).await?;
    info!(addr = %args.admin_addr, "admin health endpoint listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    drop(cc);
    info!("cluster controller shutting down");
    Ok(())
}
