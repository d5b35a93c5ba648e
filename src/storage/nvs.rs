//! NVS-backed byte store for the configuration image.
//!
//! ESP-IDF has no raw EEPROM; the fixed 110-byte configuration image is
//! held as a single NVS blob instead. Region writes stage into an
//! in-memory copy and `commit` flushes the whole image in one `set_raw`,
//! which preserves the all-regions-together commit the callers expect.

use super::{Eeprom, StorageError};
use crate::config::IMAGE_LEN;
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;
use log::warn;

/// NVS namespace for the sensor node.
const NVS_NAMESPACE: &str = "airnode";

/// NVS key holding the configuration image blob.
const NVS_KEY: &str = "config_image";

/// NVS blob store presenting the fixed-region [`Eeprom`] interface.
pub struct NvsEeprom {
    nvs: EspNvs<NvsDefault>,
    staged: [u8; IMAGE_LEN],
}

impl NvsEeprom {
    /// Open the configuration namespace on the default NVS partition.
    ///
    /// Pre-loads the staged image from the stored blob so partial region
    /// writes do not clobber the untouched regions.
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;

        let mut staged = [0u8; IMAGE_LEN];
        let mut buf = [0u8; IMAGE_LEN];
        if let Ok(Some(bytes)) = nvs.get_raw(NVS_KEY, &mut buf) {
            let n = bytes.len().min(IMAGE_LEN);
            staged[..n].copy_from_slice(&bytes[..n]);
        }

        Ok(Self { nvs, staged })
    }
}

impl Eeprom for NvsEeprom {
    fn read(&self, offset: usize, buf: &mut [u8]) {
        buf.fill(0);

        let mut image = [0u8; IMAGE_LEN];
        match self.nvs.get_raw(NVS_KEY, &mut image) {
            Ok(Some(bytes)) => {
                if offset < bytes.len() {
                    let n = buf.len().min(bytes.len() - offset);
                    buf[..n].copy_from_slice(&bytes[offset..offset + n]);
                }
            }
            Ok(None) => {
                // Factory fresh: zero-filled read, downstream validation
                // routes the device into provisioning.
            }
            Err(e) => {
                warn!("NVS read failed, treating storage as empty: {:?}", e);
            }
        }
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let end = offset
            .checked_add(data.len())
            .filter(|&e| e <= self.staged.len())
            .ok_or_else(|| {
                StorageError::Write(format!(
                    "write of {} bytes at offset {} exceeds image size {}",
                    data.len(),
                    offset,
                    IMAGE_LEN
                ))
            })?;
        self.staged[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.nvs
            .set_raw(NVS_KEY, &self.staged)
            .map(|_| ())
            .map_err(|e| StorageError::Commit(format!("{:?}", e)))
    }
}
