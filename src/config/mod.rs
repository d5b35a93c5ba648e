//! Network configuration record for the sensor node.
//!
//! This module contains the platform-independent credential record that the
//! whole provisioning state machine revolves around: the Wi-Fi network name,
//! the network secret, and the collector address the node reports to. It can
//! be tested on the host machine without hardware.
//!
//! # Example
//!
//! ```
//! use airnode_esp32::config::{parse_collector_addr, NetworkConfig};
//!
//! let config = NetworkConfig::new("Home", "secret123", parse_collector_addr("192.168.1.50"));
//! assert!(config.is_valid());
//! assert!(!NetworkConfig::sentinel().is_valid());
//! ```

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Width of the persisted network name region in bytes.
pub const SSID_LEN: usize = 32;

/// Width of the persisted network secret region in bytes.
pub const PASSWORD_LEN: usize = 63;

/// Width of the persisted collector address region in bytes
/// (an IPv4 literal is at most 15 characters).
pub const ADDR_LEN: usize = 15;

/// Byte offset of the network name region.
pub const SSID_OFFSET: usize = 0;

/// Byte offset of the network secret region.
pub const PASSWORD_OFFSET: usize = SSID_LEN;

/// Byte offset of the collector address region.
pub const ADDR_OFFSET: usize = SSID_LEN + PASSWORD_LEN;

/// Total size of the persisted configuration image.
///
/// The layout (offsets, widths, ordering, no padding) is fixed for
/// interoperability with storage written by already-deployed nodes.
pub const IMAGE_LEN: usize = SSID_LEN + PASSWORD_LEN + ADDR_LEN;

/// Fixed port of the report collector.
pub const COLLECTOR_PORT: u16 = 42123;

/// Marker string stored in the name/secret fields of a rejected record.
const SENTINEL_FIELD: &str = "invalid";

/// Parse a collector address field.
///
/// Returns `None` for anything that is not a parseable IPv4 literal, and for
/// the all-zero address, which marks the record as unset.
pub fn parse_collector_addr(s: &str) -> Option<Ipv4Addr> {
    let addr: Ipv4Addr = s.trim().parse().ok()?;
    if addr.is_unspecified() {
        None
    } else {
        Some(addr)
    }
}

/// Truncate a field to its persisted region width, on a char boundary.
fn truncate_field(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Read a NUL-terminated string out of a fixed-width storage region.
///
/// Uninitialized or garbage storage decodes to whatever bytes are present;
/// rejecting nonsense is the validator's job, not the decoder's.
fn decode_region(region: &[u8]) -> String {
    let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    String::from_utf8_lossy(&region[..end]).into_owned()
}

/// The node's network configuration.
///
/// A record is binary classified: *valid* (usable to attempt a connection)
/// or *invalid* (forces provisioning). The single authoritative validity
/// signal is whether the collector address parsed; the name and secret are
/// accepted as-is since the provisioning form always supplies them together
/// with a parseable address.
///
/// The secret is zeroed in memory when the record is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct NetworkConfig {
    /// Wi-Fi network name (at most [`SSID_LEN`] bytes).
    pub ssid: String,
    /// Wi-Fi network secret (at most [`PASSWORD_LEN`] bytes).
    pub password: String,
    /// Collector address, `None` when unset or unparseable.
    #[zeroize(skip)]
    pub collector_addr: Option<Ipv4Addr>,
}

impl NetworkConfig {
    /// Create a configuration record.
    ///
    /// Over-limit name/secret input is truncated to the persisted region
    /// widths so that an in-memory record always round-trips through storage
    /// unchanged.
    pub fn new(
        ssid: impl AsRef<str>,
        password: impl AsRef<str>,
        collector_addr: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            ssid: truncate_field(ssid.as_ref(), SSID_LEN),
            password: truncate_field(password.as_ref(), PASSWORD_LEN),
            collector_addr,
        }
    }

    /// The reserved invalid-marker record that forces re-provisioning.
    pub fn sentinel() -> Self {
        Self {
            ssid: SENTINEL_FIELD.to_string(),
            password: SENTINEL_FIELD.to_string(),
            collector_addr: None,
        }
    }

    /// Whether this record is usable to attempt a connection.
    ///
    /// True iff the collector address parsed to a non-zero IPv4 literal,
    /// independent of the name/secret content.
    pub fn is_valid(&self) -> bool {
        self.collector_addr.is_some()
    }

    /// The collector endpoint, if the record is valid.
    pub fn collector_endpoint(&self) -> Option<SocketAddrV4> {
        self.collector_addr
            .map(|addr| SocketAddrV4::new(addr, COLLECTOR_PORT))
    }

    /// Encode into the fixed persistent layout.
    ///
    /// Each field is written at its fixed offset with the remainder of its
    /// region zero-filled, so a field shorter than its region is
    /// NUL-terminated and a full-width field is terminated by the region end.
    pub fn encode_image(&self) -> [u8; IMAGE_LEN] {
        let mut image = [0u8; IMAGE_LEN];
        let addr = match self.collector_addr {
            Some(addr) => addr.to_string(),
            None => String::new(),
        };

        for (offset, len, field) in [
            (SSID_OFFSET, SSID_LEN, self.ssid.as_str()),
            (PASSWORD_OFFSET, PASSWORD_LEN, self.password.as_str()),
            (ADDR_OFFSET, ADDR_LEN, addr.as_str()),
        ] {
            let bytes = field.as_bytes();
            let n = bytes.len().min(len);
            image[offset..offset + n].copy_from_slice(&bytes[..n]);
        }
        image
    }

    /// Decode from the fixed persistent layout.
    ///
    /// Never fails: garbage or uninitialized storage decodes to a record
    /// with whatever bytes were present, and an unparseable address field
    /// marks the record invalid.
    pub fn decode_image(image: &[u8; IMAGE_LEN]) -> Self {
        let ssid = decode_region(&image[SSID_OFFSET..SSID_OFFSET + SSID_LEN]);
        let password = decode_region(&image[PASSWORD_OFFSET..PASSWORD_OFFSET + PASSWORD_LEN]);
        let addr_field = decode_region(&image[ADDR_OFFSET..ADDR_OFFSET + ADDR_LEN]);

        Self {
            ssid,
            password,
            collector_addr: parse_collector_addr(&addr_field),
        }
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The secret never reaches the log stream.
        write!(
            f,
            "ssid={:?} secret=<{} bytes> collector={}",
            self.ssid,
            self.password.len(),
            match self.collector_addr {
                Some(addr) => addr.to_string(),
                None => "unset".to_string(),
            }
        )
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("collector_addr", &self.collector_addr)
            .finish()
    }
}
