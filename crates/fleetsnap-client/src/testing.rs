//! Scripted transport double for exercising the client and the pipeline
//! without a daemon socket. Hidden from docs; depended on by this crate's
//! tests and the pipeline integration tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use fleetsnap_common::{FleetsnapError, Result};
use hyper::Method;
use tokio::sync::Mutex;

use crate::transport::Transport;

/// One request as seen by the scripted transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Vec<u8>>,
}

impl RecordedRequest {
    /// Decodes the recorded body as JSON for shape assertions.
    pub fn body_json(&self) -> serde_json::Value {
        match &self.body {
            Some(bytes) => serde_json::from_slice(bytes).unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Body(Vec<u8>),
    Fail(String),
}

/// Transport double that replays canned responses and records every request.
///
/// Replies are queued per (method, path). When a queue is down to its last
/// entry that entry repeats, so a polling loop can be scripted with a finite
/// sequence. A request against an unscripted path fails, which keeps tests
/// honest about the exact surface they exercise.
#[derive(Default)]
pub struct ScriptedTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    replies: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response body for a method/path.
    pub async fn script(&self, method: Method, path: &str, body: impl Into<Vec<u8>>) {
        self.replies
            .lock()
            .await
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Reply::Body(body.into()));
    }

    /// Queues a transport failure for a method/path.
    pub async fn script_failure(&self, method: Method, path: &str, message: &str) {
        self.replies
            .lock()
            .await
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Reply::Fail(message.to_string()));
    }

    /// Everything sent through this transport, in order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of requests issued against one method/path.
    pub async fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        self.requests.lock().await.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body,
        });

        let mut replies = self.replies.lock().await;
        let Some(queue) = replies.get_mut(&(method.clone(), path.to_string())) else {
            return Err(FleetsnapError::Transport(format!(
                "no scripted reply for {method} {path}"
            )));
        };
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        let Some(reply) = reply else {
            return Err(FleetsnapError::Transport(format!(
                "no scripted reply for {method} {path}"
            )));
        };

        match reply {
            Reply::Body(bytes) => Ok(bytes),
            Reply::Fail(message) => Err(FleetsnapError::Transport(message)),
        }
    }
}
