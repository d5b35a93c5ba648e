//! Durable storage for the network configuration.
//!
//! The [`Eeprom`] trait is the node's view of its persistent key-value
//! store: a small byte array with fixed-offset regions. [`ConfigStore`]
//! layers the configuration record codec on top and owns the save policy
//! (verified writes with bounded retry).
//!
//! On the device the backing store is NVS (see [`nvs`], `esp32` feature);
//! on the host, [`MemoryEeprom`] backs the unit tests.

use crate::config::{NetworkConfig, IMAGE_LEN};
use log::{error, info, warn};
use std::fmt;

#[cfg(feature = "esp32")]
pub mod nvs;

/// Number of times a failed save is retried before the fault is surfaced.
pub const SAVE_ATTEMPTS: usize = 3;

/// Errors from the durable store.
///
/// Reads never fail: uninitialized or unreadable storage yields whatever
/// bytes are present (zero-filled at worst) and downstream validation
/// rejects garbage.
#[derive(Debug)]
pub enum StorageError {
    /// A region write was rejected by the backing store.
    Write(String),
    /// The commit flushing all regions failed.
    Commit(String),
    /// The committed image did not read back as written.
    VerifyMismatch,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write(msg) => write!(f, "region write failed: {}", msg),
            Self::Commit(msg) => write!(f, "commit failed: {}", msg),
            Self::VerifyMismatch => write!(f, "read-back verification mismatch"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Raw persistent byte store with fixed-size regions.
pub trait Eeprom {
    /// Read bytes starting at `offset`, zero-filling anything the store
    /// cannot provide. Reads are infallible from the caller's perspective.
    fn read(&self, offset: usize, buf: &mut [u8]);

    /// Stage bytes starting at `offset`. Takes effect on [`commit`].
    ///
    /// [`commit`]: Eeprom::commit
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Flush all staged writes to durable storage together.
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// Durable storage of the node's [`NetworkConfig`].
pub struct ConfigStore<E: Eeprom> {
    eeprom: E,
}

impl<E: Eeprom> ConfigStore<E> {
    /// Create a store over a raw byte store.
    pub fn new(eeprom: E) -> Self {
        Self { eeprom }
    }

    /// Load the configuration record.
    ///
    /// Never fails: garbage or uninitialized storage decodes to an invalid
    /// record, which routes the device into provisioning.
    pub fn load(&self) -> NetworkConfig {
        let mut image = [0u8; IMAGE_LEN];
        self.eeprom.read(0, &mut image);
        let config = NetworkConfig::decode_image(&image);
        info!("Loaded configuration: {}", config);
        config
    }

    /// Persist a configuration record.
    ///
    /// Writes the three fixed regions in layout order, commits them together,
    /// and verifies by read-back. A silent flash failure on the credential
    /// erase path would leave the device alternating between provisioning and
    /// connecting forever, so a failed save is retried up to [`SAVE_ATTEMPTS`]
    /// times before the error is surfaced.
    pub fn save(&mut self, config: &NetworkConfig) -> Result<(), StorageError> {
        let image = config.encode_image();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_save(&image) {
                Ok(()) => {
                    info!("Configuration saved: {}", config);
                    return Ok(());
                }
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    warn!(
                        "Configuration save attempt {}/{} failed: {}",
                        attempt, SAVE_ATTEMPTS, e
                    );
                }
                Err(e) => {
                    error!("Configuration save failed after {} attempts: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    /// Overwrite the stored record with the sentinel, forcing provisioning
    /// on the next boot.
    pub fn invalidate(&mut self) -> Result<(), StorageError> {
        self.save(&NetworkConfig::sentinel())
    }

    fn try_save(&mut self, image: &[u8; IMAGE_LEN]) -> Result<(), StorageError> {
        use crate::config::{ADDR_OFFSET, PASSWORD_OFFSET, SSID_OFFSET};

        self.eeprom
            .write(SSID_OFFSET, &image[SSID_OFFSET..PASSWORD_OFFSET])?;
        self.eeprom
            .write(PASSWORD_OFFSET, &image[PASSWORD_OFFSET..ADDR_OFFSET])?;
        self.eeprom.write(ADDR_OFFSET, &image[ADDR_OFFSET..])?;
        self.eeprom.commit()?;

        // Read back to catch flash failures that do not report an error.
        let mut verify = [0u8; IMAGE_LEN];
        self.eeprom.read(0, &mut verify);
        if &verify != image {
            return Err(StorageError::VerifyMismatch);
        }
        Ok(())
    }
}

/// In-memory byte store for host tests.
///
/// Models the staged-write/commit split of real EEPROM emulation: reads see
/// only committed data, and commits can be made to fail for fault-injection
/// tests.
#[derive(Debug)]
pub struct MemoryEeprom {
    staged: [u8; IMAGE_LEN],
    committed: [u8; IMAGE_LEN],
    fail_commits: usize,
}

impl Default for MemoryEeprom {
    fn default() -> Self {
        Self {
            staged: [0u8; IMAGE_LEN],
            committed: [0u8; IMAGE_LEN],
            fail_commits: 0,
        }
    }
}

impl MemoryEeprom {
    /// Create a zero-filled (factory fresh) store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a committed image.
    pub fn with_image(image: [u8; IMAGE_LEN]) -> Self {
        Self {
            staged: image,
            committed: image,
            fail_commits: 0,
        }
    }

    /// Make the next `n` commits fail.
    pub fn fail_next_commits(&mut self, n: usize) {
        self.fail_commits = n;
    }

    /// The committed image, for assertions.
    pub fn committed(&self) -> &[u8; IMAGE_LEN] {
        &self.committed
    }
}

impl Eeprom for MemoryEeprom {
    fn read(&self, offset: usize, buf: &mut [u8]) {
        buf.fill(0);
        if offset >= self.committed.len() {
            return;
        }
        let n = buf.len().min(self.committed.len() - offset);
        buf[..n].copy_from_slice(&self.committed[offset..offset + n]);
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let end = offset.checked_add(data.len()).filter(|&e| e <= self.staged.len());
        match end {
            Some(end) => {
                self.staged[offset..end].copy_from_slice(data);
                Ok(())
            }
            None => Err(StorageError::Write(format!(
                "write of {} bytes at offset {} exceeds capacity {}",
                data.len(),
                offset,
                self.staged.len()
            ))),
        }
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.fail_commits > 0 {
            self.fail_commits -= 1;
            return Err(StorageError::Commit("injected commit failure".into()));
        }
        self.committed = self.staged;
        Ok(())
    }
}
