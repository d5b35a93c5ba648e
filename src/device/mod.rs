//! Top-level device state machine.
//!
//! Composes storage, validation, the connection attempt, the provisioning
//! portal, and the reporting handoff. One boot produces one outcome:
//!
//! ```text
//! Boot ──load config──▶ invalid ──▶ Provisioning ──save──▶ Restart
//!                   └─▶ valid ──▶ Connecting ──joined──▶ Operational
//!                                          └──timeout──▶ erase + Restart
//! ```
//!
//! Restarts are modeled as explicit outcomes with the reset itself left to
//! the platform layer, so every transition can be exercised on the host
//! without hardware. All mutable state lives in [`DeviceContext`]; there
//! are no free-standing mode flags.

use crate::config::NetworkConfig;
use crate::portal::{PortalServer, ProvisioningSession, SessionAction};
use crate::storage::{ConfigStore, Eeprom};
use crate::wifi::{AccessPoint, ConnectionAttempt, JoinOutcome, RadioError, StationRadio};
use log::{error, info, warn};
use std::fmt;

/// The mode the device operates in, derived from config validity and the
/// connection outcome. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Unconfigured: advertise the portal and wait for credentials.
    Provisioning,
    /// Configured: validating connectivity with a bounded join.
    Connecting,
    /// Connected: reporting until power-off.
    Operational,
}

/// All mutable device state, owned by the driver.
#[derive(Debug)]
pub struct DeviceContext {
    /// The configuration loaded at boot.
    pub config: NetworkConfig,
    /// Current mode.
    pub mode: DeviceMode,
}

impl DeviceContext {
    /// Load the stored configuration and derive the boot mode.
    pub fn load<E: Eeprom>(store: &ConfigStore<E>) -> Self {
        let config = store.load();
        let mode = decide_boot(&config);
        Self { config, mode }
    }
}

/// Pure boot decision: a valid record goes to connectivity validation,
/// anything else goes to provisioning.
pub fn decide_boot(config: &NetworkConfig) -> DeviceMode {
    if config.is_valid() {
        DeviceMode::Connecting
    } else {
        DeviceMode::Provisioning
    }
}

/// Why the platform is being asked to reset the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// A new configuration was persisted; it takes effect on next boot.
    ProvisioningSaved,
    /// The join timed out; credentials were erased.
    CredentialsRejected,
}

/// Result of one boot.
#[derive(Debug, PartialEq, Eq)]
pub enum BootOutcome {
    /// No usable configuration; the caller runs the provisioning flow.
    NeedsProvisioning,
    /// Connected; the caller initializes the sensor and starts reporting
    /// with the validated configuration.
    EnterOperational(NetworkConfig),
    /// The caller performs a full device reset.
    Restart(RestartReason),
}

/// Errors from the provisioning flow plumbing.
#[derive(Debug)]
pub enum DeviceError {
    /// The access point could not be brought up.
    Radio(RadioError),
    /// The portal server failed.
    Portal(std::io::Error),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio(e) => write!(f, "radio error: {}", e),
            Self::Portal(e) => write!(f, "portal error: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Radio(e) => Some(e),
            Self::Portal(e) => Some(e),
        }
    }
}

impl From<RadioError> for DeviceError {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        Self::Portal(e)
    }
}

/// The provisioning/connectivity state machine.
#[derive(Debug, Default)]
pub struct DeviceStateMachine {
    attempt: ConnectionAttempt,
}

impl DeviceStateMachine {
    /// State machine with the production join timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// State machine with an explicit connection attempt (tests use
    /// scaled-down timings).
    pub fn with_attempt(attempt: ConnectionAttempt) -> Self {
        Self { attempt }
    }

    /// Run one boot up to the mode handoff.
    ///
    /// On a join timeout the held configuration is overwritten with the
    /// sentinel and persisted before the restart is requested, so the next
    /// boot lands in provisioning. A misconfigured or unreachable network
    /// is never retried indefinitely.
    pub fn boot<E: Eeprom, R: StationRadio>(
        &self,
        store: &mut ConfigStore<E>,
        radio: &mut R,
    ) -> BootOutcome {
        let context = DeviceContext::load(store);
        info!("Boot: entering {:?} mode", context.mode);

        match context.mode {
            DeviceMode::Provisioning => BootOutcome::NeedsProvisioning,
            DeviceMode::Connecting => match self.attempt.run(radio, &context.config) {
                Ok(JoinOutcome::Connected) => {
                    info!("Connectivity validated, entering operational mode");
                    BootOutcome::EnterOperational(context.config)
                }
                Ok(JoinOutcome::TimedOut) => self.reject_credentials(store, &context.config),
                Err(e) => {
                    // A radio that cannot even start a join gives the same
                    // information as a timeout: these credentials are not
                    // usable on this hardware right now.
                    error!("Radio failure during join: {}", e);
                    self.reject_credentials(store, &context.config)
                }
            },
            DeviceMode::Operational => unreachable!("operational is never a boot mode"),
        }
    }

    fn reject_credentials<E: Eeprom>(
        &self,
        store: &mut ConfigStore<E>,
        config: &NetworkConfig,
    ) -> BootOutcome {
        warn!(
            "Could not join {:?}; invalidating credentials and restarting into provisioning",
            config.ssid
        );
        if let Err(e) = store.invalidate() {
            // A failed erase would leave the next boot retrying the same
            // dead network. Restart regardless; the fault is in the logs
            // and the erase is retried on the next rejection.
            error!("Failed to erase credentials: {}", e);
        }
        BootOutcome::Restart(RestartReason::CredentialsRejected)
    }

    /// Run the provisioning flow until a saved configuration requests a
    /// restart.
    ///
    /// Advertises an access point named after the device's hardware
    /// address and polls the portal from this single thread; each poll
    /// returns within one receive timeout, so the loop stays responsive
    /// without real concurrency. The portal never exits in-process other
    /// than by requesting a restart.
    pub fn run_provisioning<E: Eeprom, A: AccessPoint>(
        &self,
        store: &mut ConfigStore<E>,
        ap: &mut A,
        ap_ssid: &str,
        portal: &PortalServer,
    ) -> Result<RestartReason, DeviceError> {
        info!("Provisioning: advertising access point {:?}", ap_ssid);
        ap.start(ap_ssid)?;

        let mut session = ProvisioningSession::new();
        let result = loop {
            match portal.poll(&mut session, store) {
                Ok(SessionAction::None) => {}
                Ok(SessionAction::Restart) => break Ok(RestartReason::ProvisioningSaved),
                Err(e) => break Err(DeviceError::Portal(e)),
            }
        };

        info!("Provisioning finished, taking down access point");
        ap.stop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_collector_addr;
    use crate::storage::MemoryEeprom;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// Radio whose join either completes immediately or never.
    struct FakeRadio {
        joins: bool,
        join_calls: usize,
    }

    impl FakeRadio {
        fn joining() -> Self {
            Self {
                joins: true,
                join_calls: 0,
            }
        }

        fn unreachable() -> Self {
            Self {
                joins: false,
                join_calls: 0,
            }
        }
    }

    impl StationRadio for FakeRadio {
        fn begin_join(&mut self, _ssid: &str, _password: &str) -> Result<(), RadioError> {
            self.join_calls += 1;
            Ok(())
        }

        fn is_joined(&self) -> bool {
            self.joins
        }
    }

    /// Access point recording its lifecycle.
    #[derive(Default)]
    struct FakeAp {
        started_as: Option<String>,
        stopped: bool,
    }

    impl AccessPoint for FakeAp {
        fn start(&mut self, ssid: &str) -> Result<(), RadioError> {
            self.started_as = Some(ssid.to_string());
            Ok(())
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    fn fast_machine() -> DeviceStateMachine {
        DeviceStateMachine::with_attempt(ConnectionAttempt::new(
            Duration::from_millis(50),
            Duration::from_millis(5),
        ))
    }

    fn valid_config() -> NetworkConfig {
        NetworkConfig::new("Home", "secret123", parse_collector_addr("192.168.1.50"))
    }

    #[test]
    fn test_decide_boot() {
        assert_eq!(decide_boot(&valid_config()), DeviceMode::Connecting);
        assert_eq!(
            decide_boot(&NetworkConfig::sentinel()),
            DeviceMode::Provisioning
        );
    }

    #[test]
    fn test_unset_storage_boots_into_provisioning() {
        let mut store = ConfigStore::new(MemoryEeprom::new());
        let mut radio = FakeRadio::joining();

        let outcome = fast_machine().boot(&mut store, &mut radio);
        assert_eq!(outcome, BootOutcome::NeedsProvisioning);
        // The radio is never touched without a valid record.
        assert_eq!(radio.join_calls, 0);
    }

    #[test]
    fn test_valid_config_and_reachable_network_goes_operational() {
        let mut store = ConfigStore::new(MemoryEeprom::new());
        store.save(&valid_config()).expect("save failed");
        let mut radio = FakeRadio::joining();

        let outcome = fast_machine().boot(&mut store, &mut radio);
        assert_eq!(outcome, BootOutcome::EnterOperational(valid_config()));
    }

    #[test]
    fn test_operational_handoff_produces_reports() {
        use crate::report::{CycleOutcome, ReportSink, ReportingCycle};
        use crate::sensor::{EnvironmentSensor, SensorError, SensorReading};

        struct FixedSensor;
        impl EnvironmentSensor for FixedSensor {
            fn read_environment(&mut self) -> Result<SensorReading, SensorError> {
                Ok(SensorReading {
                    temperature: 23.5,
                    humidity: 41.2,
                    gas_ppm: 410.0,
                    baseline_resistance: 30000.0,
                    corrected_resistance: 29500.0,
                })
            }
        }

        #[derive(Default)]
        struct CapturingSink {
            lines: Vec<String>,
        }
        impl ReportSink for CapturingSink {
            fn send_report(&mut self, line: &str) -> std::io::Result<()> {
                self.lines.push(line.to_string());
                Ok(())
            }
        }

        let mut store = ConfigStore::new(MemoryEeprom::new());
        store.save(&valid_config()).expect("save failed");
        let mut radio = FakeRadio::joining();

        let config = match fast_machine().boot(&mut store, &mut radio) {
            BootOutcome::EnterOperational(config) => config,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(
            config.collector_endpoint().map(|e| e.port()),
            Some(crate::config::COLLECTOR_PORT)
        );

        let mut sink = CapturingSink::default();
        let cycle = ReportingCycle::new(Duration::ZERO, 5);
        assert_eq!(
            cycle.run_once(&mut FixedSensor, &mut sink),
            CycleOutcome::Sent
        );
        assert_eq!(sink.lines, vec!["23.50|41.20|410.00|30000.00|29500.00\n"]);
    }

    #[test]
    fn test_unreachable_network_erases_credentials_and_restarts() {
        let mut store = ConfigStore::new(MemoryEeprom::new());
        store.save(&valid_config()).expect("save failed");
        let mut radio = FakeRadio::unreachable();

        let outcome = fast_machine().boot(&mut store, &mut radio);
        assert_eq!(
            outcome,
            BootOutcome::Restart(RestartReason::CredentialsRejected)
        );
        assert_eq!(store.load(), NetworkConfig::sentinel());
    }

    #[test]
    fn test_rejection_survives_erase_failure() {
        // Storage holds a valid record but every commit fails, so the
        // erase cannot be persisted. The restart must still be requested.
        let mut eeprom = MemoryEeprom::with_image(valid_config().encode_image());
        eeprom.fail_next_commits(usize::MAX);
        let mut store = ConfigStore::new(eeprom);
        let mut radio = FakeRadio::unreachable();

        let outcome = fast_machine().boot(&mut store, &mut radio);
        assert_eq!(
            outcome,
            BootOutcome::Restart(RestartReason::CredentialsRejected)
        );
        // The old record is still there; the next boot retries the erase.
        assert_eq!(store.load(), valid_config());
    }

    #[test]
    fn test_rejected_boot_then_reboot_lands_in_provisioning() {
        // Same persistent storage across two simulated boots.
        let mut store = ConfigStore::new(MemoryEeprom::new());
        store.save(&valid_config()).expect("save failed");
        let machine = fast_machine();

        let first = machine.boot(&mut store, &mut FakeRadio::unreachable());
        assert_eq!(
            first,
            BootOutcome::Restart(RestartReason::CredentialsRejected)
        );

        let second = machine.boot(&mut store, &mut FakeRadio::joining());
        assert_eq!(second, BootOutcome::NeedsProvisioning);
    }

    /// Full provisioning round over real HTTP: submit, save, restart
    /// signal, then a reboot with the persisted record goes operational.
    #[test]
    fn test_provisioning_end_to_end() {
        let mut store = ConfigStore::new(MemoryEeprom::new());
        let mut ap = FakeAp::default();
        let portal = PortalServer::bind("127.0.0.1:0").expect("bind failed");
        let addr = portal.local_addr().expect("no local addr");
        let machine = fast_machine();

        let client = std::thread::spawn(move || {
            let exchange = |raw: String| {
                let mut stream = TcpStream::connect(addr).expect("connect failed");
                stream.write_all(raw.as_bytes()).expect("write failed");
                let mut response = String::new();
                stream.read_to_string(&mut response).expect("read failed");
                response
            };

            let body = "ssid=Home&password=secret123&targetIp=192.168.1.50";
            let confirm = exchange(format!(
                "POST / HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 Content-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ));
            assert!(confirm.contains("Save settings and reboot"));

            let reboot = exchange(
                "GET /saveSettingsAndReboot HTTP/1.1\r\nHost: portal\r\nConnection: close\r\n\r\n"
                    .to_string(),
            );
            assert!(reboot.contains("Rebooting"));
        });

        let reason = machine
            .run_provisioning(&mut store, &mut ap, "AA:BB:CC:DD:EE:FF", &portal)
            .expect("provisioning failed");
        client.join().expect("client panicked");

        assert_eq!(reason, RestartReason::ProvisioningSaved);
        assert_eq!(ap.started_as.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(ap.stopped);
        assert_eq!(store.load(), valid_config());

        // Simulated reboot: the saved record now validates and connects.
        let outcome = machine.boot(&mut store, &mut FakeRadio::joining());
        assert_eq!(outcome, BootOutcome::EnterOperational(valid_config()));
    }
}
