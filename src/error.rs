//! Error taxonomy for the configuration synchronization core
//!
//! Each layer owns its own error enum. `SyncError` is what the topology and
//! device layers surface to callers, and it keeps the failure kinds apart so a
//! UI can tell a missing reply from an explicit rejection or a broken precondition.

use crate::codec::CodecError;
use crate::transport::TransportError;

/// Errors surfaced by correlated calls, device handshakes and batch operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A publish was attempted while the transport was disconnected
    ///
    /// Never retried automatically. Callers decide whether to reconnect and retry.
    #[error("transport unavailable while publishing to {topic}")]
    TransportUnavailable { topic: String },

    /// No reply arrived on the response topic within the attempt budget
    #[error("no response on {topic} after {attempts} attempt(s)")]
    CorrelationTimeout { topic: String, attempts: u32 },

    /// The device answered with a negative acknowledgement
    #[error("device rejected request on {topic}")]
    CorrelationFailure { topic: String },

    /// A structural precondition does not hold, e.g. adopting a device that owns slaves
    #[error("precondition violated for {device_id}: {reason}")]
    PreconditionViolation { device_id: String, reason: String },

    /// Malformed wire data
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport-level failure other than "not connected"
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SyncError {
    /// Only timeouts are worth another attempt; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::CorrelationTimeout { .. })
    }

    /// Short machine-readable kind, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::TransportUnavailable { .. } => "transport_unavailable",
            SyncError::CorrelationTimeout { .. } => "timeout",
            SyncError::CorrelationFailure { .. } => "rejected",
            SyncError::PreconditionViolation { .. } => "precondition",
            SyncError::Codec(_) => "codec",
            SyncError::Transport(_) => "transport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        let timeout = SyncError::CorrelationTimeout {
            topic: "config/subscribe/dev-A/response".into(),
            attempts: 3,
        };
        let rejected = SyncError::CorrelationFailure {
            topic: "config/publish/dev-A/response".into(),
        };
        let precondition = SyncError::PreconditionViolation {
            device_id: "dev-C".into(),
            reason: "already owns slaves".into(),
        };

        assert!(timeout.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!precondition.is_retryable());
        assert_eq!(precondition.kind(), "precondition");
    }
}
