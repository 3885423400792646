// Shared error taxonomy and run-policy types used across the fleetsnap crates.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetsnapError {
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Protocol Error: {0}")]
    Protocol(String),

    #[error("Remote Operation Failed (code {code}): {message}")]
    RemoteOperation { code: i64, message: String },

    #[error("Local IO Error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("Wait Timed Out: operation {operation} still running after {polls} polls")]
    WaitTimedOut { operation: String, polls: u32 },

    #[error("Run Cancelled")]
    Cancelled,
}

// Define the primary Result type for fleetsnap operations
pub type Result<T> = std::result::Result<T, FleetsnapError>;

/// Polling policy for the background-operation waiter.
///
/// Snapshot and publish requests come back as background operations; the
/// waiter re-reads the daemon's running set every `poll_interval` until the
/// target operation clears, giving up after `max_polls` attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_polls: 360, // one hour at the default interval
        }
    }
}

/// What the pipeline does when a single container or image fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Abort the whole run on the first per-item error.
    #[default]
    AbortOnError,
    /// Record the failure and keep going with the remaining items.
    ContinueOnError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_cause() {
        let err = FleetsnapError::RemoteOperation {
            code: 400,
            message: "snapshot already exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Remote Operation Failed (code 400): snapshot already exists"
        );

        let err = FleetsnapError::WaitTimedOut {
            operation: "d331ba7c".to_string(),
            polls: 3,
        };
        assert!(err.to_string().contains("d331ba7c"));
        assert!(err.to_string().contains("3 polls"));
    }

    #[test]
    fn test_default_wait_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_secs(10));
        assert_eq!(policy.max_polls, 360);
    }

    #[test]
    fn test_failure_mode_defaults_to_abort() {
        assert_eq!(FailureMode::default(), FailureMode::AbortOnError);
    }
}
