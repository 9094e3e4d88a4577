use super::Resolution;
use chrono::{DateTime, Local};

/// Lifecycle record of one in-flight correlated call
///
/// Pending while `resolution` is `None`. Lives only for the duration of
/// [`Correlator::call`](super::Correlator::call).
#[derive(Debug, Clone)]
pub struct CorrelatedRequest {
    request_topic: String,
    response_topic: String,
    sent_at: Option<DateTime<Local>>,
    attempts_used: u32,
    attempts_remaining: u32,
    resolution: Option<Resolution>,
}

impl CorrelatedRequest {
    /// A budget of zero attempts still gets one wait.
    pub fn new(request_topic: &str, response_topic: &str, max_attempts: u32) -> Self {
        Self {
            request_topic: request_topic.to_string(),
            response_topic: response_topic.to_string(),
            sent_at: None,
            attempts_used: 0,
            attempts_remaining: max_attempts.max(1),
            resolution: None,
        }
    }

    pub fn request_topic(&self) -> &str {
        &self.request_topic
    }

    pub fn response_topic(&self) -> &str {
        &self.response_topic
    }

    pub fn sent_at(&self) -> Option<DateTime<Local>> {
        self.sent_at
    }

    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.resolution.is_none()
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent_at = Some(Local::now());
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.attempts_used += 1;
        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
    }

    /// First resolution wins; later ones are ignored.
    pub(crate) fn resolve(&mut self, resolution: Resolution) {
        if self.resolution.is_none() {
            self.resolution = Some(resolution);
        }
    }
}
