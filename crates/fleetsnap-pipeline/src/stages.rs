//! Per-item stages of the backup pipeline.
//!
//! Each stage takes the client handle it should talk through, does one unit
//! of work for one container or image, and reports the outcome. Fleet-wide
//! sequencing lives in [`crate::Pipeline`], not here.

use chrono::Local;
use fleetsnap_client::{ContainerRef, DaemonClient, ImageRef};
use fleetsnap_common::{FleetsnapError, Result, WaitPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::naming;
use crate::waiter;

/// A snapshot taken during this run, identified by its parent container and
/// its derived name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub container_name: String,
    pub snapshot_name: String,
}

/// The exported archive of one image, ready for persistence.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// Canonical filename reported by the daemon, e.g. `web_....tar.xz`.
    pub filename: String,
    /// Raw archive bytes, exactly as the daemon streamed them.
    pub payload: Vec<u8>,
}

/// Snapshots one container and waits for the daemon to finish the job.
///
/// The snapshot is durable server-side state; a failure in a later stage
/// does not roll it back.
#[instrument(skip(client, policy, cancel), fields(container = %container.name()))]
pub async fn snapshot_container(
    client: &DaemonClient,
    container: &ContainerRef,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<SnapshotRef> {
    let snapshot_name = naming::snapshot_name(container.name(), Local::now());
    let operation = client.create_snapshot(container, &snapshot_name).await?;
    info!(snapshot = %snapshot_name, operation = %operation.id, "snapshot requested");
    waiter::wait_for_operation(client, &operation.id, policy, cancel).await?;
    Ok(SnapshotRef {
        container_name: container.name().to_string(),
        snapshot_name,
    })
}

/// Publishes a snapshot as a private image and waits for completion.
///
/// The daemon does not hand back the new image here; it surfaces in the
/// next image listing instead.
#[instrument(
    skip(client, snapshot, policy, cancel),
    fields(container = %snapshot.container_name, snapshot = %snapshot.snapshot_name)
)]
pub async fn publish_snapshot(
    client: &DaemonClient,
    snapshot: &SnapshotRef,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let operation = client
        .publish_snapshot(&snapshot.container_name, &snapshot.snapshot_name)
        .await?;
    info!(operation = %operation.id, "publish requested");
    waiter::wait_for_operation(client, &operation.id, policy, cancel).await
}

/// Retrieves one image's archive bytes and its canonical filename.
///
/// Two independent reads: the export endpoint yields the bytes, the image
/// record yields the filename. The bytes are never inspected for a name.
#[instrument(skip(client, cancel), fields(image = %image.path()))]
pub async fn export_image(
    client: &DaemonClient,
    image: &ImageRef,
    cancel: &CancellationToken,
) -> Result<ExportArtifact> {
    if cancel.is_cancelled() {
        return Err(FleetsnapError::Cancelled);
    }

    let payload = client.export_image(image).await?;
    let properties = client.image_properties(image).await?;
    if properties.filename.is_empty() {
        return Err(FleetsnapError::Protocol(format!(
            "image {} reports no export filename",
            image.path()
        )));
    }
    info!(filename = %properties.filename, bytes = payload.len(), "export fetched");
    Ok(ExportArtifact {
        filename: properties.filename,
        payload,
    })
}
