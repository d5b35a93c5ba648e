//! ESP32 sensor wiring: DHT22 probe plus MQ135 on the ADC.

use super::{EnvironmentSensor, Mq135, SensorError, SensorReading};
use dht_sensor::{dht22, DhtError};
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{ADCPin, AnyIOPin, InputOutput, PinDriver};
use esp_idf_sys::EspError;
use log::debug;

/// Combined DHT22 + MQ135 environment sensor.
///
/// Constructing this performs the pin setup, which is why it only happens
/// when the device enters operational mode.
pub struct EspEnvironmentSensor<'d, T: ADCPin> {
    dht: PinDriver<'d, AnyIOPin, InputOutput>,
    delay: Ets,
    gas: AdcChannelDriver<'d, T, AdcDriver<'d, ADC1>>,
    mq135: Mq135,
}

impl<'d, T: ADCPin> EspEnvironmentSensor<'d, T> {
    /// Wire up the probes.
    ///
    /// `dht_pin` is the DHT22 data line (driven open-drain); `gas` is the
    /// ADC channel the MQ135 analog output is connected to.
    pub fn new(
        dht_pin: AnyIOPin,
        gas: AdcChannelDriver<'d, T, AdcDriver<'d, ADC1>>,
        mq135: Mq135,
    ) -> Result<Self, EspError> {
        let mut dht = PinDriver::input_output_od(dht_pin)?;
        // Idle-high releases the bus until the first conversation.
        dht.set_high()?;
        Ok(Self {
            dht,
            delay: Ets,
            gas,
            mq135,
        })
    }
}

impl<'d, T: ADCPin> EnvironmentSensor for EspEnvironmentSensor<'d, T> {
    fn read_environment(&mut self) -> Result<SensorReading, SensorError> {
        self.dht
            .set_high()
            .map_err(|e| SensorError::Bus(format!("dht line: {:?}", e)))?;
        let probe =
            dht22::blocking::read(&mut self.delay, &mut self.dht).map_err(|e| match e {
                DhtError::Timeout => SensorError::NotReady,
                DhtError::ChecksumMismatch => SensorError::Bus("checksum mismatch".into()),
                DhtError::PinError(e) => SensorError::Bus(format!("{:?}", e)),
            })?;

        let count = self
            .gas
            .read_raw()
            .map_err(|e| SensorError::Bus(format!("adc: {:?}", e)))?;
        debug!(
            "Probe: {:.1} degC {:.1} %RH, gas count {}",
            probe.temperature, probe.relative_humidity, count
        );

        Ok(SensorReading {
            temperature: probe.temperature,
            humidity: probe.relative_humidity,
            gas_ppm: self
                .mq135
                .corrected_ppm(count, probe.temperature, probe.relative_humidity),
            baseline_resistance: self.mq135.rzero(count),
            corrected_resistance: self.mq135.corrected_rzero(
                count,
                probe.temperature,
                probe.relative_humidity,
            ),
        })
    }
}
