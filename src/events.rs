//! Connection lifecycle notifications
//!
//! The connect/reconnect machinery layered on top of the session engine
//! publishes these to interested subscribers (status displays, health
//! checks, backoff logic). The session engine itself only produces the
//! inputs - most notably [`crate::keepalive::PingTimeout`], which maps to
//! [`ConnectionEvent::Lost`].

use crate::keepalive::PingTimeout;

/// Notification about the state of the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection is up and the session is live.
    Connected,
    /// A connect cycle has started.
    Connecting { is_reconnect: bool, attempt: u32 },
    /// The connect cycle gave up.
    Failed { reason: String },
    /// An established connection was lost.
    Lost { reason: String },
    /// A single broker address is about to be tried.
    Attempt { broker: String },
    /// A single broker address failed.
    AttemptFailed { broker: String, reason: String },
}

impl From<PingTimeout> for ConnectionEvent {
    fn from(timeout: PingTimeout) -> Self {
        ConnectionEvent::Lost {
            reason: timeout.to_string(),
        }
    }
}
