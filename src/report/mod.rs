//! Operational-mode reporting cycle.
//!
//! Once the node is connected it loops forever: settle, read the
//! environment, push one report line to the collector over a fresh TCP
//! connection, close, repeat. Transport failures are transient by design;
//! the loop never escalates them and keeps sampling.

use crate::sensor::{EnvironmentSensor, SensorReading};
use log::{error, info, warn};
use std::io::Write;
use std::net::{Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::time::Duration;

/// Settle delay before each sensor acquisition.
pub const SENSOR_SETTLE: Duration = Duration::from_secs(2);

/// Bound on re-acquisitions after malformed or failed sensor reads.
///
/// The retry used to be unbounded, which risks an infinite loop when a
/// probe fails permanently mid-run; after this many attempts the cycle is
/// skipped and sampling continues on the next one.
pub const MAX_READ_RETRIES: usize = 5;

/// How long a collector connect may take before the cycle is skipped.
pub const COLLECTOR_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Serialize a reading into the collector wire format.
///
/// A single line of five `|`-separated fields at fixed two-decimal
/// precision, newline-terminated:
/// `temperature|humidity|gasPpm|baselineResistance|correctedResistance`.
pub fn encode_report(reading: &SensorReading) -> String {
    format!(
        "{:.2}|{:.2}|{:.2}|{:.2}|{:.2}\n",
        reading.temperature,
        reading.humidity,
        reading.gas_ppm,
        reading.baseline_resistance,
        reading.corrected_resistance
    )
}

/// Where report lines go.
pub trait ReportSink {
    /// Deliver one report line.
    fn send_report(&mut self, line: &str) -> std::io::Result<()>;
}

/// The fixed collector endpoint, one fresh connection per report.
#[derive(Debug, Clone, Copy)]
pub struct TcpCollector {
    endpoint: SocketAddrV4,
    connect_timeout: Duration,
}

impl TcpCollector {
    /// Create a sink for the given collector endpoint.
    pub fn new(endpoint: SocketAddrV4) -> Self {
        Self {
            endpoint,
            connect_timeout: COLLECTOR_CONNECT_TIMEOUT,
        }
    }
}

impl ReportSink for TcpCollector {
    fn send_report(&mut self, line: &str) -> std::io::Result<()> {
        let mut stream =
            TcpStream::connect_timeout(&SocketAddr::V4(self.endpoint), self.connect_timeout)?;
        stream.write_all(line.as_bytes())?;
        // Nothing is read back; the connection closes right after the write.
        stream.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

/// Outcome of one reporting cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A report line reached the collector.
    Sent,
    /// No well-formed reading could be acquired; cycle skipped.
    SkippedSensor,
    /// The collector was unreachable; cycle skipped.
    SkippedTransport,
}

/// The periodic acquire-and-transmit loop.
#[derive(Debug, Clone, Copy)]
pub struct ReportingCycle {
    settle: Duration,
    max_read_retries: usize,
}

impl Default for ReportingCycle {
    fn default() -> Self {
        Self::new(SENSOR_SETTLE, MAX_READ_RETRIES)
    }
}

impl ReportingCycle {
    /// Create a cycle with explicit settle time and retry bound.
    pub fn new(settle: Duration, max_read_retries: usize) -> Self {
        Self {
            settle,
            max_read_retries,
        }
    }

    /// Run one cycle: settle, acquire, transmit.
    pub fn run_once(
        &self,
        sensor: &mut impl EnvironmentSensor,
        sink: &mut impl ReportSink,
    ) -> CycleOutcome {
        std::thread::sleep(self.settle);

        let reading = match self.acquire(sensor) {
            Some(reading) => reading,
            None => return CycleOutcome::SkippedSensor,
        };

        let line = encode_report(&reading);
        match sink.send_report(&line) {
            Ok(()) => {
                info!("Report sent: {}", line.trim_end());
                CycleOutcome::Sent
            }
            Err(e) => {
                warn!("Collector unreachable, skipping cycle: {}", e);
                CycleOutcome::SkippedTransport
            }
        }
    }

    /// Run cycles until power-off.
    pub fn run(&self, sensor: &mut impl EnvironmentSensor, sink: &mut impl ReportSink) -> ! {
        info!("Entering reporting loop");
        loop {
            self.run_once(sensor, sink);
        }
    }

    fn acquire(&self, sensor: &mut impl EnvironmentSensor) -> Option<SensorReading> {
        for attempt in 1..=self.max_read_retries {
            match sensor.read_environment() {
                Ok(reading) if reading.is_well_formed() => return Some(reading),
                Ok(_) => warn!(
                    "Malformed sensor reading, attempt {}/{}",
                    attempt, self.max_read_retries
                ),
                Err(e) => warn!(
                    "Sensor read failed, attempt {}/{}: {}",
                    attempt, self.max_read_retries, e
                ),
            }
        }
        error!(
            "No well-formed reading after {} attempts, skipping cycle",
            self.max_read_retries
        );
        None
    }
}
