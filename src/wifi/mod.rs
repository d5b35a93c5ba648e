//! Radio capabilities and the bounded connection attempt.
//!
//! The hardware radio is modeled as two capabilities: [`StationRadio`]
//! (join an existing network as a client) and [`AccessPoint`] (host the
//! provisioning network). The ESP32 implements both with one driver (see
//! [`esp`], `esp32` feature) since the chip cannot hold both roles with
//! independent state at once; host tests use fakes.
//!
//! [`ConnectionAttempt`] is the platform-independent core: a single
//! bounded-time join with a fixed status poll interval.

use std::fmt;
use std::net::Ipv4Addr;

mod join;

#[cfg(feature = "esp32")]
mod esp;

pub use join::{ConnectionAttempt, JoinOutcome, JOIN_POLL_INTERVAL, JOIN_TIMEOUT};

#[cfg(feature = "esp32")]
pub use esp::EspRadio;

/// Address of the provisioning access point.
pub const AP_LOCAL_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Gateway advertised on the provisioning subnet.
pub const AP_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 254);

/// Prefix length of the provisioning subnet (255.255.255.0).
pub const AP_SUBNET_PREFIX: u8 = 24;

/// Client-mode radio: joins an existing network.
pub trait StationRadio {
    /// Switch into client mode and initiate a join. Returns once the join
    /// is underway; completion is observed by polling [`is_joined`].
    ///
    /// [`is_joined`]: StationRadio::is_joined
    fn begin_join(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// Whether the join has completed.
    fn is_joined(&self) -> bool;
}

/// Access-point-mode radio: hosts the provisioning network.
pub trait AccessPoint {
    /// Configure the fixed provisioning subnet and start broadcasting an
    /// open access point under the given network name.
    fn start(&mut self, ssid: &str) -> Result<(), RadioError>;

    /// Stop broadcasting.
    fn stop(&mut self);
}

/// Errors from the radio driver.
#[derive(Debug)]
pub enum RadioError {
    /// Network name was rejected by the driver (too long for the radio).
    InvalidName,
    /// Network secret was rejected by the driver.
    InvalidSecret,
    /// Underlying driver failure.
    Driver(String),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "invalid network name"),
            Self::InvalidSecret => write!(f, "invalid network secret"),
            Self::Driver(msg) => write!(f, "radio driver error: {}", msg),
        }
    }
}

impl std::error::Error for RadioError {}
