//! Keepalive monitor
//!
//! Sends a PINGREQ when the connection has been unused for the configured
//! keepalive interval and declares the connection lost when the response
//! does not arrive in time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::SessionConfig;
use crate::protocol::Packet;
use crate::session::ConnectionState;

/// Returned by [`KeepaliveMonitor::run`] when the broker stops responding
/// to liveness probes. This is the signal that triggers the reconnect
/// machinery layered above the session engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingTimeout;

impl fmt::Display for PingTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ping response not received, disconnecting")
    }
}

impl std::error::Error for PingTimeout {}

/// Periodically checks the shared send/receive timestamps and probes the
/// broker when the connection has gone quiet.
pub struct KeepaliveMonitor {
    keep_alive: Duration,
    ping_timeout: Duration,
    state: Arc<ConnectionState>,
    outbound: mpsc::UnboundedSender<Packet>,
    stop: watch::Receiver<bool>,
}

impl KeepaliveMonitor {
    pub fn new(
        config: &SessionConfig,
        state: Arc<ConnectionState>,
        outbound: mpsc::UnboundedSender<Packet>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            keep_alive: config.keep_alive,
            ping_timeout: config.ping_timeout,
            state,
            outbound,
            stop,
        }
    }

    /// Run until the stop signal fires (`Ok`) or the broker misses the
    /// probe deadline (`Err`). A zero keepalive disables monitoring.
    pub async fn run(mut self) -> Result<(), PingTimeout> {
        if self.keep_alive.is_zero() {
            debug!("keepalive disabled");
            return Ok(());
        }

        // Short keepalive intervals get a proportionally finer check so
        // timeout detection resolution scales with the interval itself.
        let check_interval = if self.keep_alive > Duration::from_secs(10) {
            Duration::from_secs(5)
        } else {
            self.keep_alive / 4
        };
        debug!(interval = ?check_interval, "keepalive starting");

        let mut ticker = tokio::time::interval(check_interval);
        let mut ping_sent = Instant::now();

        loop {
            tokio::select! {
                _ = self.stop.changed() => {
                    debug!("keepalive stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if !self.state.ping_outstanding()
                        && (self.state.since_last_sent() >= self.keep_alive
                            || self.state.since_last_received() >= self.keep_alive)
                    {
                        debug!("keepalive sending ping");
                        self.state.set_ping_outstanding(true);
                        // An unbounded queue cannot make the probe wait
                        // behind large in-progress writes.
                        if self.outbound.send(Packet::PingReq).is_err() {
                            // The response deadline below still applies and
                            // will end the loop if the writer stays gone.
                            error!("failed to queue ping request");
                        }
                        self.state.packet_sent();
                        ping_sent = Instant::now();
                    }

                    if self.state.ping_outstanding()
                        && ping_sent.elapsed() >= self.ping_timeout
                    {
                        warn!("ping response not received, disconnecting");
                        return Err(PingTimeout);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(keep_alive: Duration, ping_timeout: Duration) -> SessionConfig {
        SessionConfig {
            keep_alive,
            ping_timeout,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_connection_gets_exactly_one_probe_then_loss() {
        let (outbound, mut probes) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(ConnectionState::new());

        let monitor = KeepaliveMonitor::new(
            &config(Duration::from_secs(30), Duration::from_secs(10)),
            state,
            outbound,
            stop_rx,
        );

        // No traffic and no PINGRESP: the monitor probes once, then
        // declares the connection lost when the timeout passes.
        assert_eq!(monitor.run().await, Err(PingTimeout));

        assert!(matches!(probes.try_recv(), Ok(Packet::PingReq)));
        assert!(probes.try_recv().is_err(), "only one probe may be in flight");
    }

    #[tokio::test(start_paused = true)]
    async fn pong_keeps_the_connection_alive() {
        let (outbound, mut probes) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(ConnectionState::new());

        let monitor = KeepaliveMonitor::new(
            &config(Duration::from_secs(30), Duration::from_secs(10)),
            state.clone(),
            outbound,
            stop_rx,
        );
        let handle = tokio::spawn(monitor.run());

        // Answer two probe rounds, then stop the monitor.
        for _ in 0..2 {
            assert!(matches!(probes.recv().await, Some(Packet::PingReq)));
            state.pong_received();
        }
        stop_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_ends_the_loop_cleanly() {
        let (outbound, mut probes) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(ConnectionState::new());

        let monitor = KeepaliveMonitor::new(
            &config(Duration::from_secs(30), Duration::from_secs(10)),
            state,
            outbound,
            stop_rx,
        );
        let handle = tokio::spawn(monitor.run());
        stop_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), Ok(()));
        assert!(probes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn regular_traffic_suppresses_probes() {
        let (outbound, mut probes) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(ConnectionState::new());

        let monitor = KeepaliveMonitor::new(
            &config(Duration::from_secs(8), Duration::from_secs(4)),
            state.clone(),
            outbound,
            stop_rx,
        );
        let handle = tokio::spawn(monitor.run());

        // Touch the connection more often than the keepalive interval.
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(4)).await;
            state.packet_sent();
            state.packet_received();
        }
        stop_tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), Ok(()));
        assert!(probes.try_recv().is_err(), "no probe expected while traffic flows");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_keepalive_disables_monitoring() {
        let (outbound, mut probes) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(ConnectionState::new());

        let monitor = KeepaliveMonitor::new(
            &config(Duration::ZERO, Duration::from_secs(10)),
            state,
            outbound,
            stop_rx,
        );
        assert_eq!(monitor.run().await, Ok(()));
        assert!(probes.try_recv().is_err());
    }
}
