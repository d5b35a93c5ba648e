//! MQ135 gas sensor curve math.
//!
//! The MQ135 exposes a resistance that falls with gas concentration; the
//! datasheet curve is `ppm = a * (Rs/R0)^-b`. The temperature/humidity
//! correction polynomial compensates the resistance for ambient conditions
//! before applying the curve. All of this is pure math over the raw ADC
//! count, so it is fully host-testable.

/// Curve scaling parameter `a`.
const PARA: f32 = 116.602_07;

/// Curve exponent parameter `b`.
const PARB: f32 = 2.769_034_9;

/// Correction polynomial coefficients (temperature squared, temperature,
/// constant, humidity) for ambient compensation around 33 % RH.
const CORA: f32 = 0.00035;
const CORB: f32 = 0.02718;
const CORC: f32 = 1.39538;
const CORD: f32 = 0.0018;

/// Assumed atmospheric CO2 level in ppm, used to derive the calibration
/// baseline from a reading taken in clean air.
const ATMOCO2: f32 = 397.13;

/// Default load resistance on the sensor board in kOhm.
const DEFAULT_RLOAD: f32 = 10.0;

/// Default calibration baseline in kOhm.
const DEFAULT_RZERO: f32 = 76.63;

/// MQ135 curve calculator.
///
/// Holds the board's load resistance, the calibration baseline, and the
/// ADC full-scale count (1023 on the original 10-bit board, 4095 on the
/// ESP32's 12-bit ADC).
#[derive(Debug, Clone, Copy)]
pub struct Mq135 {
    rload: f32,
    rzero: f32,
    full_scale: f32,
}

impl Default for Mq135 {
    fn default() -> Self {
        Self::new(DEFAULT_RLOAD, DEFAULT_RZERO, 1023.0)
    }
}

impl Mq135 {
    /// Create a calculator with explicit board parameters.
    pub fn new(rload: f32, rzero: f32, full_scale: f32) -> Self {
        Self {
            rload,
            rzero,
            full_scale,
        }
    }

    /// Calculator with default board parameters for a 12-bit ADC.
    pub fn with_12bit_adc() -> Self {
        Self::new(DEFAULT_RLOAD, DEFAULT_RZERO, 4095.0)
    }

    /// Sensor resistance in kOhm from a raw ADC count.
    ///
    /// A zero count (shorted or disconnected input) yields NaN, which the
    /// acquisition loop treats as a malformed reading.
    pub fn resistance(&self, count: u16) -> f32 {
        if count == 0 {
            return f32::NAN;
        }
        (self.full_scale / count as f32 - 1.0) * self.rload
    }

    /// Ambient correction factor for the given conditions.
    pub fn correction_factor(temperature: f32, humidity: f32) -> f32 {
        CORA * temperature * temperature - CORB * temperature + CORC
            - (humidity - 33.0) * CORD
    }

    /// Resistance corrected for ambient temperature and humidity.
    pub fn corrected_resistance(&self, count: u16, temperature: f32, humidity: f32) -> f32 {
        self.resistance(count) / Self::correction_factor(temperature, humidity)
    }

    /// Gas concentration in ppm, uncorrected.
    pub fn ppm(&self, count: u16) -> f32 {
        PARA * (self.resistance(count) / self.rzero).powf(-PARB)
    }

    /// Gas concentration in ppm, corrected for ambient conditions.
    pub fn corrected_ppm(&self, count: u16, temperature: f32, humidity: f32) -> f32 {
        PARA * (self.corrected_resistance(count, temperature, humidity) / self.rzero).powf(-PARB)
    }

    /// Calibration baseline implied by a clean-air reading.
    pub fn rzero(&self, count: u16) -> f32 {
        self.resistance(count) * (ATMOCO2 / PARA).powf(1.0 / PARB)
    }

    /// Ambient-corrected calibration baseline.
    pub fn corrected_rzero(&self, count: u16, temperature: f32, humidity: f32) -> f32 {
        self.corrected_resistance(count, temperature, humidity)
            * (ATMOCO2 / PARA).powf(1.0 / PARB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resistance_at_half_scale() {
        let mq = Mq135::default();
        // (1023/512 - 1) * 10 kOhm
        let r = mq.resistance(512);
        assert!((r - 9.98).abs() < 0.01, "got {}", r);
    }

    #[test]
    fn test_zero_count_is_nan() {
        let mq = Mq135::default();
        assert!(mq.resistance(0).is_nan());
        assert!(mq.ppm(0).is_nan());
        assert!(mq.corrected_ppm(0, 20.0, 50.0).is_nan());
    }

    #[test]
    fn test_correction_factor_reference_point() {
        // At 20 degC / 33 % RH the humidity term vanishes:
        // 0.00035*400 - 0.02718*20 + 1.39538
        let f = Mq135::correction_factor(20.0, 33.0);
        assert!((f - 0.991_78).abs() < 1e-4, "got {}", f);
    }

    #[test]
    fn test_higher_count_means_higher_ppm() {
        // Higher ADC count = lower sensor resistance = more gas.
        let mq = Mq135::default();
        assert!(mq.ppm(600) > mq.ppm(400));
        assert!(mq.ppm(400) > mq.ppm(200));
    }

    #[test]
    fn test_rzero_is_consistent_with_atmospheric_ppm() {
        // Calibrating against a reading and then evaluating the curve with
        // that baseline must give back the assumed atmospheric level.
        let mq = Mq135::default();
        let baseline = mq.corrected_rzero(512, 21.0, 40.0);
        let calibrated = Mq135::new(10.0, baseline, 1023.0);
        let ppm = calibrated.corrected_ppm(512, 21.0, 40.0);
        assert!((ppm - ATMOCO2).abs() < 0.5, "got {}", ppm);
    }

    #[test]
    fn test_12bit_adc_scaling() {
        // Half scale must give the same resistance regardless of ADC width.
        let mq10 = Mq135::default();
        let mq12 = Mq135::with_12bit_adc();
        let r10 = mq10.resistance(512);
        let r12 = mq12.resistance(2048);
        assert!((r10 - r12).abs() / r10 < 0.01, "{} vs {}", r10, r12);
    }
}
