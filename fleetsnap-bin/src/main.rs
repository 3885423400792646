use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre;
use fleetsnap_client::DaemonClient;
use fleetsnap_common::{FailureMode, WaitPolicy};
use fleetsnap_pipeline::{Pipeline, RunConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// --- Command Line Interface ---

/// Backs up a container fleet: snapshots every container on the local
/// daemon, publishes each snapshot as a private image, and exports the
/// image archives into a directory.
#[derive(Debug, Parser)]
#[command(name = "fleetsnap", version, about)]
struct Cli {
    /// Path of the daemon's unix socket.
    #[arg(long, env = "FLEETSNAP_SOCK")]
    sock: PathBuf,

    /// Directory the exported archives are written to.
    #[arg(long, env = "FLEETSNAP_OUT", default_value = ".")]
    out: PathBuf,

    /// Seconds between polls of the running-operations listing.
    #[arg(long, env = "FLEETSNAP_POLL_INTERVAL", default_value_t = 10)]
    poll_interval: u64,

    /// Busy polls tolerated per operation before the run gives up.
    #[arg(long, env = "FLEETSNAP_MAX_POLLS", default_value_t = 360)]
    max_polls: u32,

    /// Keep going after a failed container or image instead of aborting
    /// the run on the first error.
    #[arg(long, env = "FLEETSNAP_KEEP_GOING")]
    keep_going: bool,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            output_dir: self.out.clone(),
            wait_policy: WaitPolicy {
                poll_interval: Duration::from_secs(self.poll_interval),
                max_polls: self.max_polls,
            },
            failure_mode: if self.keep_going {
                FailureMode::ContinueOnError
            } else {
                FailureMode::AbortOnError
            },
        }
    }
}

// --- Main Entrypoint ---

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(sock = %cli.sock.display(), out = %cli.out.display(), "starting backup run");

    let client = DaemonClient::connect(&cli.sock).await?;

    // Ctrl-C stops the run between requests rather than mid-write.
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping the run");
            interrupt.cancel();
        }
    });

    let pipeline = Pipeline::new(client, cli.run_config());
    let summary = pipeline.run(&cancel).await?;

    info!(
        containers = summary.containers_discovered,
        archives = summary.archives_written,
        bytes = summary.bytes_written,
        "backup run finished"
    );
    if !summary.is_clean() {
        for failure in &summary.failures {
            error!(error = %failure, "item failed during the run");
        }
        eyre::bail!("{} item(s) failed during the run", summary.failures.len());
    }
    Ok(())
}
