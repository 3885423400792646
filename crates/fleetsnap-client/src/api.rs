//! Wire contracts of the management API.

use chrono::{DateTime, Utc};
use fleetsnap_common::{FleetsnapError, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Response envelope
// =============================================================================

/// Envelope shared by every structured response.
///
/// Fields the daemon omits (or sends as `null`) decode to their zero values,
/// the same way the envelope behaves on synchronous error responses.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<M> {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub metadata: Option<M>,
}

impl<M: Default> Envelope<M> {
    /// Applies the envelope-level error gate: a non-zero `error_code` is a
    /// remote failure no matter what the HTTP status line said.
    pub fn into_metadata(self) -> Result<M> {
        if self.error_code != 0 {
            return Err(FleetsnapError::RemoteOperation {
                code: self.error_code,
                message: self.error,
            });
        }
        Ok(self.metadata.unwrap_or_default())
    }
}

// =============================================================================
// Resource locators
// =============================================================================

/// Locator of one container, e.g. `/1.0/containers/web`.
///
/// The daemon always returns locators of the fixed shape
/// `/<version>/containers/<name>`; the short name is pulled out when the
/// listing decodes, and any other shape is a contract break.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ContainerRef {
    path: String,
    name: String,
}

impl ContainerRef {
    /// Full resource path, used to build per-container request URLs.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The container's short name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TryFrom<String> for ContainerRef {
    type Error = FleetsnapError;

    fn try_from(path: String) -> Result<Self> {
        let name = path
            .split('/')
            .nth(3)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                FleetsnapError::Protocol(format!("malformed container locator: {path:?}"))
            })?
            .to_string();
        Ok(Self { path, name })
    }
}

/// Opaque locator of a published image, e.g. `/1.0/images/<fingerprint>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Request bodies
// =============================================================================

/// Body of a snapshot-creation request.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRequest {
    pub name: String,
    pub stateful: bool,
}

/// Body of an image-publish request.
#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest {
    pub filename: String,
    pub public: bool,
    pub aliases: Vec<ImageAlias>,
    pub source: PublishSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageAlias {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

// =============================================================================
// Response metadata
// =============================================================================

/// Metadata of a background operation, as returned when one is created.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub may_cancel: bool,
    #[serde(default)]
    pub err: String,
}

/// Metadata of the running-operations listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunningOperations {
    #[serde(default)]
    pub running: Vec<String>,
}

/// Image metadata; only `filename` matters to the export flow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageProperties {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub size: i64,
}
