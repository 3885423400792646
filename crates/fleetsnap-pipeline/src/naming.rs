//! Snapshot naming.

use chrono::{DateTime, Local};

/// Timestamp layout baked into snapshot names. Second resolution, and
/// lexicographic order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Derives the name for a new snapshot of `container_name` taken at `at`.
///
/// Names have the form `<container>_<timestamp>`, so two snapshots taken in
/// the same second are still distinct as long as their containers are.
/// Container names come from the daemon and are never empty; an empty name
/// here is a caller bug, not a runtime condition.
pub fn snapshot_name(container_name: &str, at: DateTime<Local>) -> String {
    debug_assert!(
        !container_name.is_empty(),
        "snapshot names require a container name"
    );
    format!("{}_{}", container_name, at.format(TIMESTAMP_FORMAT))
}
