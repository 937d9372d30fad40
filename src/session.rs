//! Shared connection-liveness state
//!
//! The connection reader and writer stamp these timestamps on every packet;
//! the keepalive monitor reads them from its own task. Access always goes
//! through the lock - these fields are the input to the liveness decision
//! and a torn read would make that decision wrong.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Liveness state shared between the reader, writer and keepalive tasks.
pub struct ConnectionState {
    last_sent: Mutex<Instant>,
    last_received: Mutex<Instant>,
    /// At most one liveness probe is in flight at a time.
    ping_outstanding: AtomicBool,
}

impl ConnectionState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_sent: Mutex::new(now),
            last_received: Mutex::new(now),
            ping_outstanding: AtomicBool::new(false),
        }
    }

    /// Stamp the send clock. Called by the writer path for every packet.
    pub fn packet_sent(&self) {
        *self.last_sent.lock() = Instant::now();
    }

    /// Stamp the receive clock. Called by the reader path for every packet.
    pub fn packet_received(&self) {
        *self.last_received.lock() = Instant::now();
    }

    /// Record a PINGRESP: the outstanding probe has been answered.
    pub fn pong_received(&self) {
        self.ping_outstanding.store(false, Ordering::Release);
        self.packet_received();
    }

    pub fn since_last_sent(&self) -> Duration {
        self.last_sent.lock().elapsed()
    }

    pub fn since_last_received(&self) -> Duration {
        self.last_received.lock().elapsed()
    }

    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding.load(Ordering::Acquire)
    }

    pub(crate) fn set_ping_outstanding(&self, outstanding: bool) {
        self.ping_outstanding.store(outstanding, Ordering::Release);
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stamps_advance_with_traffic() {
        let state = ConnectionState::new();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(state.since_last_sent(), Duration::from_secs(5));

        state.packet_sent();
        assert_eq!(state.since_last_sent(), Duration::ZERO);
        assert_eq!(state.since_last_received(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn pong_clears_outstanding_probe() {
        let state = ConnectionState::new();
        state.set_ping_outstanding(true);
        assert!(state.ping_outstanding());

        state.pong_received();
        assert!(!state.ping_outstanding());
        assert_eq!(state.since_last_received(), Duration::ZERO);
    }
}
