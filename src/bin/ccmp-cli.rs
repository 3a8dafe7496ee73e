//! ccmp-cli - minimal provider/consumer harness (§6 "CLI (out of core)").
//!
//! Takes a domain name and a settings file path, starts a cluster
//! controller against that settings file, and exits 0 on clean shutdown or
//! non-zero on a fatal initialization error. It does not itself host a
//! provider or consumer; it is the thin process wrapper those processes
//! use to pick up their settings.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ccmp::cc::{builder_from, ClusterController};
use ccmp::config::CcConfig;
use ccmp::observability::init_tracing;
use ccmp::settings::{apply_to, FileSettingsSource, SettingsSource};

#[derive(Parser, Debug)]
#[command(name = "ccmp-cli", about = "Start a cluster controller for one domain")]
struct Args {
    /// Domain this process serves providers and consumers for.
    domain: String,

    /// Path to the INI-style settings file (§6).
    settings_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = run(args).await {
        eprintln!("fatal: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(args: Args) -> anyhow::Result<()> {
    let source = FileSettingsSource::open(&args.settings_file)?;
    let values = source.load().await?;
    let config = apply_to(&values, builder_from(CcConfig::production()))?;

    init_tracing(&config.log_level)?;
    info!(domain = %args.domain, settings_file = %args.settings_file.display(), "starting cluster controller for domain");

    let cc = match ClusterController::start(config) {
        Ok(cc) => cc,
        Err(err) => {
            error!(%err, "cluster controller failed to start");
            return Err(err.into());
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");
    drop(cc);
    Ok(())
}
