//! Typed operations of the management API consumed by the backup pipeline.

use std::path::Path;
use std::sync::Arc;

use fleetsnap_common::{FleetsnapError, Result};
use hyper::Method;
use serde::de::DeserializeOwned;

use crate::api::{
    ContainerRef, Envelope, ImageAlias, ImageProperties, ImageRef, OperationRecord,
    PublishRequest, PublishSource, RunningOperations, SnapshotRequest,
};
use crate::transport::{Transport, UnixSocketTransport};

/// Handle to the platform daemon.
///
/// Constructed once per run and passed by reference into every stage; all
/// requests go through the transport's single connection.
pub struct DaemonClient {
    transport: Arc<dyn Transport>,
}

impl DaemonClient {
    /// Connects to the daemon's unix socket.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let transport = UnixSocketTransport::connect(socket_path).await?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Wraps an existing transport. Tests use this to substitute a scripted
    /// one.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Lists all containers known to the daemon.
    pub async fn list_containers(&self) -> Result<Vec<ContainerRef>> {
        let body = self
            .transport
            .send(Method::GET, "/1.0/containers", None)
            .await?;
        decode::<Vec<ContainerRef>>(&body)?.into_metadata()
    }

    /// Requests a snapshot of one container, returning the background
    /// operation that tracks it. Snapshots are always stateless.
    pub async fn create_snapshot(
        &self,
        container: &ContainerRef,
        snapshot_name: &str,
    ) -> Result<OperationRecord> {
        let path = format!("{}/snapshots", container.path());
        let request = SnapshotRequest {
            name: snapshot_name.to_string(),
            stateful: false,
        };
        let body = self
            .transport
            .send(Method::POST, &path, Some(encode(&request)?))
            .await?;
        decode::<OperationRecord>(&body)?.into_metadata()
    }

    /// Publishes `container/snapshot` as a private image carrying one alias
    /// named after the snapshot.
    pub async fn publish_snapshot(
        &self,
        container_name: &str,
        snapshot_name: &str,
    ) -> Result<OperationRecord> {
        let request = PublishRequest {
            filename: format!("{snapshot_name}.tar.xz"),
            public: false,
            aliases: vec![ImageAlias {
                name: snapshot_name.to_string(),
                description: String::new(),
            }],
            source: PublishSource {
                kind: "snapshot".to_string(),
                name: format!("{container_name}/{snapshot_name}"),
            },
        };
        let body = self
            .transport
            .send(Method::POST, "/1.0/images", Some(encode(&request)?))
            .await?;
        decode::<OperationRecord>(&body)?.into_metadata()
    }

    /// Returns the ids of the operations the daemon currently reports as
    /// running.
    pub async fn running_operations(&self) -> Result<Vec<String>> {
        let body = self
            .transport
            .send(Method::GET, "/1.0/operations", None)
            .await?;
        Ok(decode::<RunningOperations>(&body)?.into_metadata()?.running)
    }

    /// Lists all published images.
    pub async fn list_images(&self) -> Result<Vec<ImageRef>> {
        let body = self.transport.send(Method::GET, "/1.0/images", None).await?;
        decode::<Vec<ImageRef>>(&body)?.into_metadata()
    }

    /// Fetches the raw archive bytes of an image. The one endpoint that
    /// answers without an envelope.
    pub async fn export_image(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let path = format!("{}/export", image.path());
        self.transport.send(Method::GET, &path, None).await
    }

    /// Fetches an image's metadata, including its canonical filename.
    pub async fn image_properties(&self, image: &ImageRef) -> Result<ImageProperties> {
        let body = self.transport.send(Method::GET, image.path(), None).await?;
        decode::<ImageProperties>(&body)?.into_metadata()
    }
}

fn encode<T: serde::Serialize>(body: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(body)
        .map_err(|e| FleetsnapError::Protocol(format!("failed to serialize request: {e}")))
}

fn decode<M: DeserializeOwned + Default>(body: &[u8]) -> Result<Envelope<M>> {
    serde_json::from_slice(body)
        .map_err(|e| FleetsnapError::Protocol(format!("failed to decode response: {e}")))
}
