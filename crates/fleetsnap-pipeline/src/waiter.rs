//! Polling loop for server-side background operations.

use fleetsnap_client::DaemonClient;
use fleetsnap_common::{FleetsnapError, Result, WaitPolicy};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Blocks until the daemon stops reporting `operation_id` as running.
///
/// Each poll reads the whole running set. An empty set resolves the wait,
/// and so does the first entry that does not reference `operation_id` as a
/// substring: the scan is first-match-wins, so one unrelated entry is
/// enough even while other entries still name the operation. Only when
/// every entry references the id does the waiter sleep `policy.poll_interval`
/// and try again, up to `policy.max_polls` busy observations.
///
/// Transport and decode failures abort the wait immediately. The loop
/// re-polls to observe state changes, never to retry errors.
pub async fn wait_for_operation(
    client: &DaemonClient,
    operation_id: &str,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut polls = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(FleetsnapError::Cancelled);
        }

        let running = client.running_operations().await?;
        if running.is_empty() {
            return Ok(());
        }
        if running.iter().any(|entry| !entry.contains(operation_id)) {
            return Ok(());
        }

        polls += 1;
        if polls >= policy.max_polls {
            return Err(FleetsnapError::WaitTimedOut {
                operation: operation_id.to_string(),
                polls,
            });
        }

        debug!(operation = %operation_id, polls, "operation still in progress");
        tokio::select! {
            _ = cancel.cancelled() => return Err(FleetsnapError::Cancelled),
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsnap_client::testing::ScriptedTransport;
    use fleetsnap_client::Method;
    use std::sync::Arc;
    use std::time::Duration;

    const OPERATIONS: &str = "/1.0/operations";
    const OP_ID: &str = "d17a442f-40a6-4a41-8e83-b6b680a37bc2";

    #[tokio::test]
    async fn test_empty_running_set_resolves_on_first_poll() {
        let (transport, client) = scripted_client(&[running_body(&[])]).await;

        wait_for_operation(&client, OP_ID, &fast_policy(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.count(Method::GET, OPERATIONS).await, 1);
    }

    #[tokio::test]
    async fn test_unrelated_entry_resolves_even_while_operation_still_listed() {
        let ours = format!("/1.0/operations/{OP_ID}");
        let body = running_body(&[&ours, "/1.0/operations/other"]);
        let (transport, client) = scripted_client(&[body]).await;

        wait_for_operation(&client, OP_ID, &fast_policy(5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.count(Method::GET, OPERATIONS).await, 1);
    }

    #[tokio::test]
    async fn test_busy_set_polls_again_until_drained() {
        let ours = format!("/1.0/operations/{OP_ID}");
        let (transport, client) =
            scripted_client(&[running_body(&[&ours]), running_body(&[&ours]), running_body(&[])])
                .await;

        wait_for_operation(&client, OP_ID, &fast_policy(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.count(Method::GET, OPERATIONS).await, 3);
    }

    #[tokio::test]
    async fn test_bounded_wait_gives_up_after_max_polls() {
        let ours = format!("/1.0/operations/{OP_ID}");
        let (transport, client) = scripted_client(&[running_body(&[&ours])]).await;

        let err = wait_for_operation(&client, OP_ID, &fast_policy(3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FleetsnapError::WaitTimedOut { polls: 3, .. }
        ));
        assert_eq!(transport.count(Method::GET, OPERATIONS).await, 3);
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_without_retry() {
        let transport = Arc::new(ScriptedTransport::new());
        let ours = format!("/1.0/operations/{OP_ID}");
        transport
            .script(Method::GET, OPERATIONS, running_body(&[&ours]))
            .await;
        transport
            .script_failure(Method::GET, OPERATIONS, "connection reset")
            .await;
        let client = DaemonClient::with_transport(transport.clone());

        let err = wait_for_operation(&client, OP_ID, &fast_policy(10), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FleetsnapError::Transport(_)));
        assert_eq!(transport.count(Method::GET, OPERATIONS).await, 2);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits_before_any_request() {
        let (transport, client) = scripted_client(&[running_body(&[])]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_for_operation(&client, OP_ID, &fast_policy(5), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FleetsnapError::Cancelled));
        assert_eq!(transport.count(Method::GET, OPERATIONS).await, 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_the_poll_sleep() {
        let ours = format!("/1.0/operations/{OP_ID}");
        let (_transport, client) = scripted_client(&[running_body(&[&ours])]).await;
        let cancel = CancellationToken::new();

        let waiter = {
            let cancel = cancel.clone();
            let policy = WaitPolicy {
                poll_interval: Duration::from_secs(60),
                max_polls: 10,
            };
            tokio::spawn(async move {
                wait_for_operation(&client, OP_ID, &policy, &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should return promptly once cancelled")
            .expect("waiter task should not panic");
        assert!(matches!(result, Err(FleetsnapError::Cancelled)));
    }

    // Test helpers

    async fn scripted_client(replies: &[String]) -> (Arc<ScriptedTransport>, DaemonClient) {
        let transport = Arc::new(ScriptedTransport::new());
        for reply in replies {
            transport.script(Method::GET, OPERATIONS, reply.as_str()).await;
        }
        let client = DaemonClient::with_transport(transport.clone());
        (transport, client)
    }

    fn fast_policy(max_polls: u32) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(2),
            max_polls,
        }
    }

    fn running_body(entries: &[&str]) -> String {
        let list = entries
            .iter()
            .map(|entry| format!("{entry:?}"))
            .collect::<Vec<_>>()
            .join(",");
        format!(r#"{{"type":"sync","status":"Success","error_code":0,"metadata":{{"running":[{list}]}}}}"#)
    }
}
