//! Fleet-wide backup pipeline.
//!
//! Runs five phases strictly in order: discover containers, snapshot every
//! container, publish every snapshot as a private image, discover images,
//! then export and persist every image archive. A phase finishes its whole
//! collection before the next phase starts; items are never interleaved
//! across phases.

use std::path::PathBuf;

use fleetsnap_client::DaemonClient;
use fleetsnap_common::{FailureMode, FleetsnapError, WaitPolicy};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub mod naming;
pub mod stages;
pub mod waiter;
pub mod writer;

pub use stages::{ExportArtifact, SnapshotRef};

// --- Custom Error Type ---

/// A pipeline failure, carrying the item it happened on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to list containers: {source}")]
    ListContainers {
        #[source]
        source: FleetsnapError,
    },
    #[error("failed to snapshot container {container}: {source}")]
    Snapshot {
        container: String,
        #[source]
        source: FleetsnapError,
    },
    #[error("failed to publish snapshot {snapshot} of container {container}: {source}")]
    Publish {
        container: String,
        snapshot: String,
        #[source]
        source: FleetsnapError,
    },
    #[error("failed to list images: {source}")]
    ListImages {
        #[source]
        source: FleetsnapError,
    },
    #[error("failed to export image {image}: {source}")]
    Export {
        image: String,
        #[source]
        source: FleetsnapError,
    },
    #[error("failed to write archive {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: FleetsnapError,
    },
    #[error(transparent)]
    Core(#[from] FleetsnapError),
}

impl Error {
    /// The taxonomy-level cause behind the item context.
    pub fn cause(&self) -> &FleetsnapError {
        match self {
            Error::ListContainers { source }
            | Error::Snapshot { source, .. }
            | Error::Publish { source, .. }
            | Error::ListImages { source }
            | Error::Export { source, .. }
            | Error::Write { source, .. } => source,
            Error::Core(source) => source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// --- Run Configuration ---

/// Everything a run needs besides the client: where archives land, how to
/// wait on the daemon, and what to do when a single item fails.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub wait_policy: WaitPolicy,
    pub failure_mode: FailureMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            wait_policy: WaitPolicy::default(),
            failure_mode: FailureMode::default(),
        }
    }
}

/// What a run accomplished.
///
/// `failures` only fills up in [`FailureMode::ContinueOnError`]; the default
/// mode aborts the run on the first error instead of recording it here.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub containers_discovered: usize,
    pub snapshots_taken: usize,
    pub images_published: usize,
    pub archives_written: usize,
    pub bytes_written: u64,
    pub failures: Vec<Error>,
}

impl RunSummary {
    /// True when every discovered item made it all the way to disk.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// --- Pipeline Implementation ---

/// Drives one backup run over the whole fleet through an explicit client
/// handle.
pub struct Pipeline {
    client: DaemonClient,
    config: RunConfig,
}

impl Pipeline {
    pub fn new(client: DaemonClient, config: RunConfig) -> Self {
        Self { client, config }
    }

    /// Runs the five phases and reports what landed on disk.
    ///
    /// Cancellation is honored between items and inside every wait; a
    /// cancelled run always aborts, whatever the failure mode.
    #[instrument(skip(self, cancel), fields(run_id = %Uuid::new_v4()))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        self.check_cancelled(cancel)?;

        // Phase 1: discover containers. Without a listing there is no run,
        // so this phase aborts in either failure mode.
        let containers = self
            .client
            .list_containers()
            .await
            .map_err(|source| Error::ListContainers { source })?;
        summary.containers_discovered = containers.len();
        info!(containers = containers.len(), "discovered containers");

        // Phase 2: snapshot every container.
        let mut snapshots = Vec::with_capacity(containers.len());
        for container in &containers {
            self.check_cancelled(cancel)?;
            match stages::snapshot_container(
                &self.client,
                container,
                &self.config.wait_policy,
                cancel,
            )
            .await
            {
                Ok(snapshot) => {
                    info!(
                        container = %container.name(),
                        snapshot = %snapshot.snapshot_name,
                        "snapshot complete"
                    );
                    snapshots.push(snapshot);
                }
                Err(source) => self.item_failed(
                    &mut summary,
                    Error::Snapshot {
                        container: container.name().to_string(),
                        source,
                    },
                )?,
            }
        }
        summary.snapshots_taken = snapshots.len();

        // Phase 3: publish every snapshot as a private image.
        for snapshot in &snapshots {
            self.check_cancelled(cancel)?;
            match stages::publish_snapshot(
                &self.client,
                snapshot,
                &self.config.wait_policy,
                cancel,
            )
            .await
            {
                Ok(()) => {
                    info!(snapshot = %snapshot.snapshot_name, "publish complete");
                    summary.images_published += 1;
                }
                Err(source) => self.item_failed(
                    &mut summary,
                    Error::Publish {
                        container: snapshot.container_name.clone(),
                        snapshot: snapshot.snapshot_name.clone(),
                        source,
                    },
                )?,
            }
        }

        // Phase 4: discover images. Same as phase 1, a failed listing ends
        // the run in either mode.
        self.check_cancelled(cancel)?;
        let images = self
            .client
            .list_images()
            .await
            .map_err(|source| Error::ListImages { source })?;
        info!(images = images.len(), "discovered images");

        // Phase 5: export every image and persist its archive.
        for image in &images {
            self.check_cancelled(cancel)?;
            let artifact = match stages::export_image(&self.client, image, cancel).await {
                Ok(artifact) => artifact,
                Err(source) => {
                    self.item_failed(
                        &mut summary,
                        Error::Export {
                            image: image.path().to_string(),
                            source,
                        },
                    )?;
                    continue;
                }
            };
            match writer::write_archive(
                &self.config.output_dir,
                &artifact.filename,
                &artifact.payload,
            )
            .await
            {
                Ok(bytes) => {
                    info!(filename = %artifact.filename, bytes, "archive persisted");
                    summary.archives_written += 1;
                    summary.bytes_written += bytes;
                }
                Err(source) => self.item_failed(
                    &mut summary,
                    Error::Write {
                        filename: artifact.filename.clone(),
                        source,
                    },
                )?,
            }
        }

        info!(
            containers = summary.containers_discovered,
            snapshots = summary.snapshots_taken,
            published = summary.images_published,
            archives = summary.archives_written,
            bytes = summary.bytes_written,
            failures = summary.failures.len(),
            "run finished"
        );
        Ok(summary)
    }

    /// Applies the configured failure policy to one item's error: abort the
    /// run, or record the error and move on. Cancellation always aborts.
    fn item_failed(&self, summary: &mut RunSummary, err: Error) -> Result<()> {
        if matches!(err.cause(), FleetsnapError::Cancelled) {
            return Err(err);
        }
        match self.config.failure_mode {
            FailureMode::AbortOnError => {
                error!(error = %err, "aborting run");
                Err(err)
            }
            FailureMode::ContinueOnError => {
                warn!(error = %err, "continuing past failed item");
                summary.failures.push(err);
                Ok(())
            }
        }
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(FleetsnapError::Cancelled.into());
        }
        Ok(())
    }
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_failed_item() {
        let err = Error::Snapshot {
            container: "web".to_string(),
            source: FleetsnapError::Transport("connection reset".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("web"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn test_cause_reaches_through_item_context() {
        let err = Error::Publish {
            container: "db".to_string(),
            snapshot: "db_2024-03-01-04-05-06".to_string(),
            source: FleetsnapError::Cancelled,
        };
        assert!(matches!(err.cause(), FleetsnapError::Cancelled));
    }

    #[test]
    fn test_summary_is_clean_only_without_failures() {
        let mut summary = RunSummary::default();
        assert!(summary.is_clean());

        summary.failures.push(Error::ListImages {
            source: FleetsnapError::Protocol("truncated body".to_string()),
        });
        assert!(!summary.is_clean());
    }
}
