//! # Request/Response Correlator
//!
//! Turns a fire-and-forget publish into an awaitable call. Requests and replies
//! are paired implicitly by topic: a reply for `<request>` arrives on
//! `<request>/response`.
//!
//! ```text
//! subscribe(response) ──► publish(request) ──► wait ──► reply ──► Success / Failure
//!                               ▲                │
//!                               │             timeout
//!                               │                ▼
//!                      (retransmit_on_retry) attempts left? ── no ──► Timeout
//! ```
//!
//! The response subscription is registered before the first publish so a fast
//! reply cannot slip through, and it is removed exactly once however the call
//! ends. Two overlapping calls on the same response topic share it: the later
//! one takes the replies, and the earlier one leaves the subscription in place
//! when it gives up.

pub mod request;

pub use request::CorrelatedRequest;

use crate::error::SyncError;
use crate::transport::{handler, Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reserved reply meaning "request rejected"
pub const FAILURE_MARKER: &str = "FAIL";

/// Retry budget for one correlated call
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct CallOptions {
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    /// Re-publish the request on every attempt instead of only re-waiting
    pub retransmit_on_retry: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new(3, 1_000, false)
    }
}

impl CallOptions {
    pub const fn new(max_attempts: u32, attempt_timeout_ms: u64, retransmit_on_retry: bool) -> Self {
        Self {
            max_attempts,
            attempt_timeout_ms,
            retransmit_on_retry,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Upper bound on how long a call with these options can wait.
    pub fn total_budget(&self) -> Duration {
        self.attempt_timeout() * self.max_attempts.max(1)
    }
}

/// Terminal outcome of a correlated call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Raw reply payload
    Success(String),
    /// Negative acknowledgement
    Failure,
    /// Attempts exhausted without any reply
    Timeout,
}

impl Resolution {
    fn from_reply(payload: String) -> Self {
        if is_failure_marker(&payload) {
            Resolution::Failure
        } else {
            Resolution::Success(payload)
        }
    }
}

/// `FAIL` or a bare boolean `false` mean the device said no.
pub fn is_failure_marker(payload: &str) -> bool {
    let payload = payload.trim();
    payload == FAILURE_MARKER || payload.eq_ignore_ascii_case("false")
}

pub struct Correlator {
    transport: Arc<dyn Transport>,
}

impl Correlator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Publishes `payload` to `request_topic` and waits for a reply on `response_topic`.
    ///
    /// Resolves within `options.total_budget()`. A publish attempted while the
    /// transport is down fails with [`SyncError::TransportUnavailable`].
    pub async fn call(
        &self,
        request_topic: &str,
        response_topic: &str,
        payload: &str,
        options: &CallOptions,
    ) -> Result<Resolution, SyncError> {
        let mut request = CorrelatedRequest::new(request_topic, response_topic, options.max_attempts);
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

        let reply_handler = handler(move |_, reply| {
            // Receiver gone means the call already resolved.
            let _ = reply_tx.send(reply.to_string());
        });
        let subscribed = self
            .transport
            .subscribe(response_topic, reply_handler.clone())
            .await;

        let outcome = match subscribed {
            Ok(()) => {
                self.drive(&mut request, &mut reply_rx, payload, options)
                    .await
            }
            Err(e) => Err(publish_error(request_topic, e)),
        };

        // A later call on the same response topic may own the subscription now.
        match self
            .transport
            .unsubscribe_handler(response_topic, &reply_handler)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(
                "{} was taken over by another call, leaving it subscribed",
                response_topic
            ),
            Err(e) => warn!("Failed to unsubscribe {}: {}", response_topic, e),
        }

        match &outcome {
            Ok(resolution) => info!(
                "Call {} resolved {:?} after {} attempt(s)",
                request_topic,
                ResolutionKind::from(resolution),
                request.attempts_used()
            ),
            Err(e) => warn!("Call {} aborted: {}", request_topic, e),
        }
        outcome
    }

    async fn drive(
        &self,
        request: &mut CorrelatedRequest,
        replies: &mut mpsc::UnboundedReceiver<String>,
        payload: &str,
        options: &CallOptions,
    ) -> Result<Resolution, SyncError> {
        loop {
            if request.attempts_used() == 0 || options.retransmit_on_retry {
                self.transport
                    .publish(request.request_topic(), payload)
                    .await
                    .map_err(|e| publish_error(request.request_topic(), e))?;
                request.mark_sent();
            }
            request.begin_attempt();
            debug!(
                "Waiting up to {} ms on {} (attempt {}/{})",
                options.attempt_timeout_ms,
                request.response_topic(),
                request.attempts_used(),
                options.max_attempts.max(1)
            );

            match tokio::time::timeout(options.attempt_timeout(), replies.recv()).await {
                Ok(Some(reply)) => {
                    let resolution = Resolution::from_reply(reply);
                    request.resolve(resolution.clone());
                    return Ok(resolution);
                }
                Ok(None) => {
                    warn!(
                        "Reply channel for {} closed before any reply",
                        request.response_topic()
                    );
                    request.resolve(Resolution::Timeout);
                    return Ok(Resolution::Timeout);
                }
                Err(_) => {
                    if request.attempts_remaining() == 0 {
                        request.resolve(Resolution::Timeout);
                        return Ok(Resolution::Timeout);
                    }
                    debug!(
                        "No reply on {}, {} attempt(s) left",
                        request.response_topic(),
                        request.attempts_remaining()
                    );
                }
            }
        }
    }
}

fn publish_error(topic: &str, error: TransportError) -> SyncError {
    match error {
        TransportError::NotConnected => SyncError::TransportUnavailable {
            topic: topic.to_string(),
        },
        other => SyncError::Transport(other),
    }
}

#[derive(Debug)]
enum ResolutionKind {
    Success,
    Failure,
    Timeout,
}

impl From<&Resolution> for ResolutionKind {
    fn from(resolution: &Resolution) -> Self {
        match resolution {
            Resolution::Success(_) => ResolutionKind::Success,
            Resolution::Failure => ResolutionKind::Failure,
            Resolution::Timeout => ResolutionKind::Timeout,
        }
    }
}
