//! Error types and reconnect backoff.
//!
//! Boundary errors are typed so callers can tell a dead transport from a
//! malformed payload. None of them is fatal to a replica.

use std::time::Duration;

/// Decoding failures for channel frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame is not a JSON event envelope: {0}")]
    InvalidFrame(#[source] serde_json::Error),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("malformed `{event}` payload: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{event}` payload carries an empty marker id")]
    EmptyId { event: String },

    #[error("failed to encode `{event}`: {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Initial snapshot fetch failures. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid bootstrap endpoint `{url}`: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("bootstrap request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("bootstrap response is not a marker map: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("snapshot key `{key}` does not match marker id `{id}`")]
    KeyMismatch { key: String, id: String },

    #[error("snapshot carries a marker with an empty id")]
    EmptyId,
}

impl BootstrapError {
    /// Network-level failure as opposed to a bad payload
    pub fn is_transport(&self) -> bool {
        matches!(self, BootstrapError::Transport(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("channel task has shut down")]
    Closed,
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, `None` for unlimited
    pub max_attempts: Option<u32>,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a no-retry policy
    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            ..Default::default()
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}
