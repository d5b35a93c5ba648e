//! Air quality sensor node firmware library.
//!
//! This library contains the platform-independent components that can be
//! tested on the host machine without ESP32 hardware: configuration
//! encoding and validation, the storage layer, the bounded connection
//! attempt, the provisioning portal, the device state machine, the MQ135
//! curve math, and the reporting cycle. The hardware glue (NVS storage,
//! Wi-Fi driver, DHT22/ADC wiring) is gated behind the `esp32` feature.

pub mod config;
pub mod device;
pub mod portal;
pub mod report;
pub mod sensor;
pub mod storage;
pub mod wifi;

// Re-export commonly used items
pub use config::{NetworkConfig, COLLECTOR_PORT};
pub use device::{BootOutcome, DeviceStateMachine, RestartReason};
pub use portal::{PortalServer, ProvisioningSession, SessionAction};
pub use report::{ReportingCycle, TcpCollector};
pub use sensor::{EnvironmentSensor, Mq135, SensorReading};
pub use storage::{ConfigStore, Eeprom};
pub use wifi::{AccessPoint, ConnectionAttempt, StationRadio};
