//! Single bounded-time network join.

use super::{RadioError, StationRadio};
use crate::config::NetworkConfig;
use log::{info, warn};
use std::time::{Duration, Instant};

/// How long a join may take before the credentials are rejected.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between join status polls.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The join completed within the timeout.
    Connected,
    /// The timeout elapsed before the join completed.
    TimedOut,
}

/// A single bounded-time attempt to join a network as a client.
///
/// Exactly one attempt per boot: there is no cancellation path other than
/// the timeout and no retry. The poll loop blocks the whole device, which
/// is intentional; nothing else is supposed to run while connectivity is
/// being validated.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionAttempt {
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for ConnectionAttempt {
    fn default() -> Self {
        Self::new(JOIN_TIMEOUT, JOIN_POLL_INTERVAL)
    }
}

impl ConnectionAttempt {
    /// Create an attempt with explicit bounds. Tests use scaled-down
    /// durations; production uses [`Default`].
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Drive the join to completion or timeout.
    ///
    /// Returns [`JoinOutcome::TimedOut`] no earlier than the timeout and at
    /// most one poll interval after it.
    pub fn run(
        &self,
        radio: &mut impl StationRadio,
        config: &NetworkConfig,
    ) -> Result<JoinOutcome, RadioError> {
        info!(
            "Joining network {:?}, timeout {:?}",
            config.ssid, self.timeout
        );
        radio.begin_join(&config.ssid, &config.password)?;

        let start = Instant::now();
        loop {
            if radio.is_joined() {
                info!("Joined {:?} after {:?}", config.ssid, start.elapsed());
                return Ok(JoinOutcome::Connected);
            }
            if start.elapsed() >= self.timeout {
                warn!(
                    "Join of {:?} timed out after {:?}",
                    config.ssid,
                    start.elapsed()
                );
                return Ok(JoinOutcome::TimedOut);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}
