//! Air quality sensor node firmware binary.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    // Route the log crate into the ESP-IDF console
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== Air quality node starting ===");

    match run() {
        Ok(reason) => log::info!("Restarting: {:?}", reason),
        Err(e) => log::error!("Fatal error, restarting: {}", e),
    }
    esp_idf_hal::reset::restart();
}

/// One boot of the device. Returns when a restart is required; the
/// operational reporting loop never returns.
#[cfg(feature = "esp32")]
fn run() -> Result<airnode_esp32::RestartReason, Box<dyn std::error::Error>> {
    use airnode_esp32::sensor::esp::EspEnvironmentSensor;
    use airnode_esp32::storage::nvs::NvsEeprom;
    use airnode_esp32::wifi::{EspRadio, AP_LOCAL_ADDR};
    use airnode_esp32::{
        BootOutcome, ConfigStore, DeviceStateMachine, Mq135, PortalServer, ReportingCycle,
        TcpCollector,
    };
    use esp_idf_hal::adc::attenuation::DB_11;
    use esp_idf_hal::adc::oneshot::config::AdcChannelConfig;
    use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
    use esp_idf_hal::gpio::IOPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut store = ConfigStore::new(NvsEeprom::new(nvs_partition)?);
    let mut radio = EspRadio::new(peripherals.modem, sysloop)?;
    let machine = DeviceStateMachine::new();

    match machine.boot(&mut store, &mut radio) {
        BootOutcome::NeedsProvisioning => {
            let ssid = radio.hardware_address()?;
            let portal = PortalServer::bind(&format!("{}:80", AP_LOCAL_ADDR))?;
            let reason = machine.run_provisioning(&mut store, &mut radio, &ssid, &portal)?;
            Ok(reason)
        }
        BootOutcome::Restart(reason) => Ok(reason),
        BootOutcome::EnterOperational(config) => {
            let endpoint = config
                .collector_endpoint()
                .ok_or("operational config has no collector endpoint")?;

            // DHT22 data line on GPIO4, MQ135 analog out on GPIO34 (ADC1).
            let adc = AdcDriver::new(peripherals.adc1)?;
            let gas = AdcChannelDriver::new(
                adc,
                peripherals.pins.gpio34,
                &AdcChannelConfig {
                    attenuation: DB_11,
                    ..Default::default()
                },
            )?;
            let mut sensor = EspEnvironmentSensor::new(
                peripherals.pins.gpio4.downgrade(),
                gas,
                Mq135::with_12bit_adc(),
            )?;
            let mut sink = TcpCollector::new(endpoint);

            ReportingCycle::default().run(&mut sensor, &mut sink)
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("This binary requires the 'esp32' feature.");
    log::info!("Use 'cargo test' for host testing of the platform-independent core.");
}
