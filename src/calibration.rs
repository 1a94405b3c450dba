//! Gain/range selection and calibration math.
//!
//! Everything in here is pure: it turns the physical description of the
//! measurement setup into register values and unit divisors. Writing those
//! values to the device is done by [`crate::driver::INA233Driver`].

use crate::register::{
    config, CALIBRATION_MAX, CALIBRATION_SCALING, CURRENT_FULL_SCALE, MAX_BUS_RANGE_V,
    MILLIS_PER_UNIT, POWER_LSB_FACTOR,
};

/// Bus voltage full scale range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusVoltageRange {
    V16 = 0,
    V32 = 1,
}

impl BusVoltageRange {
    /// Ranges in ascending order.
    pub const ALL: [BusVoltageRange; 2] = [BusVoltageRange::V16, BusVoltageRange::V32];

    pub fn volts(self) -> f32 {
        match self {
            BusVoltageRange::V16 => 16.0,
            BusVoltageRange::V32 => 32.0,
        }
    }
}

/// Programmable gain setting of the shunt voltage measurement.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PGAGain {
    Gain1X = 0,
    Gain2X = 1,
    Gain4X = 2,
    Gain8X = 3,
}

impl PGAGain {
    /// Gains in ascending order.
    pub const ALL: [PGAGain; 4] = [
        PGAGain::Gain1X,
        PGAGain::Gain2X,
        PGAGain::Gain4X,
        PGAGain::Gain8X,
    ];

    pub fn factor(self) -> f32 {
        match self {
            PGAGain::Gain1X => 1.0,
            PGAGain::Gain2X => 2.0,
            PGAGain::Gain4X => 4.0,
            PGAGain::Gain8X => 8.0,
        }
    }
}

/// Physical description of the measurement setup.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationParams {
    /// Shunt resistance in ohms
    pub shunt_ohms: f32,
    /// Largest current expected through the shunt, in amps
    pub max_current_a: f32,
    /// Largest bus voltage expected, in volts
    pub max_bus_voltage_v: f32,
}

/// Errors of the settings and calibration computations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// A parameter was zero, negative, NaN or infinite
    InvalidParameter,
    /// No gain and bus range combination covers the requested shunt voltage or bus voltage
    UnsatisfiableRange,
    /// The calibration constant does not fit the calibration register
    CalibrationOverflow,
}

/// Gain and bus range selected for a measurement setup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub bus_range: BusVoltageRange,
    pub pga_gain: PGAGain,
}

impl Settings {
    /// Full scale shunt voltage in volts: `range / 100 / (8 / gain)`.
    pub fn shunt_full_scale_v(&self) -> f32 {
        self.bus_range.volts() * self.pga_gain.factor() / 800.0
    }

    /// Whether the full scale range reaches `target_v`.
    ///
    /// `target_v` is a product of two rounded `f32` values, so a target sitting exactly on a
    /// range boundary may come out a few ulps high. Those still count as covered.
    pub fn covers(&self, target_v: f32) -> bool {
        self.shunt_full_scale_v() * (1.0 + FULL_SCALE_TOLERANCE) >= target_v
    }

    /// Configuration register value, 12-bit ADCs in continuous shunt and bus mode.
    pub fn bits(&self) -> u16 {
        ((self.bus_range as u16) << config::BRNG_SHIFT)
            | ((self.pga_gain as u16) << config::PG_SHIFT)
            | (config::ADC_12BIT << config::BADC_SHIFT)
            | (config::ADC_12BIT << config::SADC_SHIFT)
            | config::MODE_SHUNT_BUS_CONTINUOUS
    }
}

/// Relative slack when comparing a shunt voltage target against a full scale range.
const FULL_SCALE_TOLERANCE: f32 = 1e-6;

/// Calibration register value plus the divisors needed to scale current and power readings.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    register_value: u16,
    current_lsb_a: f32,
    current_divider_ma: f32,
    power_divider_mw: f32,
}

impl Calibration {
    /// Derive the effective LSBs from a calibration register value and the shunt resistance.
    ///
    /// `register_value` must be non-zero and `shunt_ohms` positive.
    fn from_register(register_value: u16, shunt_ohms: f32) -> Self {
        let current_lsb_a = CALIBRATION_SCALING / (f32::from(register_value) * shunt_ohms);
        let power_lsb_w = current_lsb_a * POWER_LSB_FACTOR;

        Self {
            register_value,
            current_lsb_a,
            current_divider_ma: 1.0 / (current_lsb_a * MILLIS_PER_UNIT),
            power_divider_mw: 1.0 / (power_lsb_w * MILLIS_PER_UNIT),
        }
    }

    /// Value to write to the calibration register
    pub fn register_value(&self) -> u16 {
        self.register_value
    }

    /// Amps per LSB of the current register
    pub fn current_lsb_a(&self) -> f32 {
        self.current_lsb_a
    }

    /// Watts per LSB of the power register
    pub fn power_lsb_w(&self) -> f32 {
        self.current_lsb_a * POWER_LSB_FACTOR
    }

    /// Current register counts per milliamp
    pub fn current_divider_ma(&self) -> f32 {
        self.current_divider_ma
    }

    /// Power register counts per milliwatt
    pub fn power_divider_mw(&self) -> f32 {
        self.power_divider_mw
    }

    pub fn current_ma(&self, raw: i16) -> f32 {
        f32::from(raw) / self.current_divider_ma
    }

    pub fn power_mw(&self, raw: u16) -> f32 {
        f32::from(raw) / self.power_divider_mw
    }
}

fn check_positive(value: f32) -> Result<f32, CalibrationError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CalibrationError::InvalidParameter)
    }
}

/// Select the gain and bus range for a shunt, a maximum current and a maximum bus voltage.
///
/// Among the combinations whose bus range covers `max_bus_voltage_v`, picks
/// the one with the smallest full scale shunt voltage that is still at least
/// `max_current_a * shunt_ohms`, allowing for `f32` rounding of that product.
/// On equal full scale the lower bus range wins.
pub fn compute_settings(
    shunt_ohms: f32,
    max_current_a: f32,
    max_bus_voltage_v: f32,
) -> Result<Settings, CalibrationError> {
    let shunt_ohms = check_positive(shunt_ohms)?;
    let max_current_a = check_positive(max_current_a)?;
    let max_bus_voltage_v = check_positive(max_bus_voltage_v)?;

    if max_bus_voltage_v > MAX_BUS_RANGE_V {
        warn!("bus voltage {} V above device range", max_bus_voltage_v);
        return Err(CalibrationError::UnsatisfiableRange);
    }

    let target_v = max_current_a * shunt_ohms;
    let mut best: Option<Settings> = None;

    for bus_range in BusVoltageRange::ALL {
        if bus_range.volts() < max_bus_voltage_v {
            continue;
        }
        for pga_gain in PGAGain::ALL {
            let candidate = Settings {
                bus_range,
                pga_gain,
            };
            if !candidate.covers(target_v) {
                continue;
            }
            let full_scale = candidate.shunt_full_scale_v();
            match best {
                Some(current) if current.shunt_full_scale_v() <= full_scale => {}
                _ => best = Some(candidate),
            }
        }
    }

    match best {
        Some(settings) => {
            debug!(
                "shunt target {} V, full scale {} V, config {:#x}",
                target_v,
                settings.shunt_full_scale_v(),
                settings.bits()
            );
            Ok(settings)
        }
        None => {
            warn!("no gain covers shunt voltage {} V", target_v);
            Err(CalibrationError::UnsatisfiableRange)
        }
    }
}

/// Compute the calibration register value and unit divisors for a shunt and a maximum current.
///
/// The current LSB starts at `max_current_a / 2^15` and is then quantized to
/// what the integer calibration register can actually express.
pub fn compute_calibration(
    shunt_ohms: f32,
    max_current_a: f32,
) -> Result<Calibration, CalibrationError> {
    let shunt_ohms = check_positive(shunt_ohms)?;
    let max_current_a = check_positive(max_current_a)?;

    let current_lsb_a = max_current_a / CURRENT_FULL_SCALE;
    let cal = CALIBRATION_SCALING / (current_lsb_a * shunt_ohms);

    if !(cal >= 1.0 && cal < f32::from(CALIBRATION_MAX) + 1.0) {
        return Err(CalibrationError::CalibrationOverflow);
    }

    // Truncation is the device formula; the range was checked above.
    let calibration = Calibration::from_register(cal as u16, shunt_ohms);
    debug!(
        "calibration {}, current lsb {} A",
        calibration.register_value(),
        calibration.current_lsb_a()
    );
    Ok(calibration)
}

#[cfg(feature = "std")]
impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::InvalidParameter => write!(f, "Parameter must be finite and positive"),
            CalibrationError::UnsatisfiableRange => {
                write!(f, "No gain and bus range covers the requested range")
            }
            CalibrationError::CalibrationOverflow => {
                write!(f, "Calibration value does not fit the calibration register")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CalibrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_settings() -> impl Iterator<Item = Settings> {
        BusVoltageRange::ALL.into_iter().flat_map(|bus_range| {
            PGAGain::ALL.into_iter().map(move |pga_gain| Settings {
                bus_range,
                pga_gain,
            })
        })
    }

    #[test]
    fn full_scale_follows_range_and_gain() {
        let lowest = Settings {
            bus_range: BusVoltageRange::V16,
            pga_gain: PGAGain::Gain1X,
        };
        let highest = Settings {
            bus_range: BusVoltageRange::V32,
            pga_gain: PGAGain::Gain8X,
        };
        assert!((lowest.shunt_full_scale_v() - 0.02).abs() < 1e-6);
        assert!((highest.shunt_full_scale_v() - 0.32).abs() < 1e-6);
    }

    #[test]
    fn config_bits() {
        let settings = Settings {
            bus_range: BusVoltageRange::V32,
            pga_gain: PGAGain::Gain8X,
        };
        // Power-on default of the configuration register
        assert_eq!(settings.bits(), 0x399F);

        let settings = Settings {
            bus_range: BusVoltageRange::V16,
            pga_gain: PGAGain::Gain1X,
        };
        assert_eq!(settings.bits(), 0x019F);
    }

    #[test]
    fn settings_pick_smallest_covering_range() {
        let shunts = [0.001_f32, 0.005, 0.01, 0.05, 0.1, 0.5];
        let currents = [0.05_f32, 0.2, 0.5, 1.0, 2.0, 3.2, 5.0, 10.0];
        let voltages = [3.3_f32, 5.0, 12.0, 16.0, 24.0, 32.0];

        for &shunt in &shunts {
            for &current in &currents {
                for &voltage in &voltages {
                    let target = shunt * current;
                    let valid = || {
                        all_settings().filter(move |s| {
                            s.bus_range.volts() >= voltage && s.covers(target)
                        })
                    };

                    match compute_settings(shunt, current, voltage) {
                        Ok(selected) => {
                            let fs = selected.shunt_full_scale_v();
                            assert!(selected.covers(target));
                            assert!(selected.bus_range.volts() >= voltage);
                            assert!(valid().all(|s| s.shunt_full_scale_v() >= fs));
                        }
                        Err(e) => {
                            assert_eq!(e, CalibrationError::UnsatisfiableRange);
                            assert_eq!(valid().count(), 0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn settings_example() {
        // 0.1 Ohm * 1 A = 100 mV needs the 160 mV range
        let settings = compute_settings(0.1, 1.0, 12.0).unwrap();
        assert_eq!(settings.bus_range, BusVoltageRange::V16);
        assert_eq!(settings.pga_gain, PGAGain::Gain8X);

        // Same shunt voltage, but the bus needs the 32 V range
        let settings = compute_settings(0.1, 1.0, 24.0).unwrap();
        assert_eq!(settings.bus_range, BusVoltageRange::V32);
        assert_eq!(settings.pga_gain, PGAGain::Gain4X);
    }

    #[test]
    fn settings_boundary_targets_select_that_range() {
        // Both are exactly 20 mV; 0.1 * 0.2 rounds one ulp above 0.02 in f32
        for (shunt, current) in [(0.01_f32, 2.0_f32), (0.1, 0.2), (0.02, 1.0), (0.004, 5.0)] {
            let settings = compute_settings(shunt, current, 12.0).unwrap();
            assert_eq!(settings.bus_range, BusVoltageRange::V16);
            assert_eq!(settings.pga_gain, PGAGain::Gain1X);
        }

        // 0.32 V is the top of the 32 V/8X range
        for (shunt, current) in [(0.1_f32, 3.2_f32), (0.032, 10.0), (0.16, 2.0)] {
            let settings = compute_settings(shunt, current, 24.0).unwrap();
            assert_eq!(settings.bus_range, BusVoltageRange::V32);
            assert_eq!(settings.pga_gain, PGAGain::Gain8X);
        }
    }

    #[test]
    fn settings_beyond_tolerance_move_up() {
        // 20.1 mV no longer fits the 20 mV range
        let settings = compute_settings(0.01, 2.01, 12.0).unwrap();
        assert_eq!(settings.pga_gain, PGAGain::Gain2X);
    }

    #[test]
    fn settings_tie_prefers_lower_bus_range() {
        // 40 mV is both 16 V/2X and 32 V/1X
        let settings = compute_settings(0.01, 3.0, 5.0).unwrap();
        assert_eq!(settings.bus_range, BusVoltageRange::V16);
        assert_eq!(settings.pga_gain, PGAGain::Gain2X);
    }

    #[test]
    fn settings_reject_bus_voltage_above_device_range() {
        assert_eq!(
            compute_settings(0.01, 2.0, 40.0),
            Err(CalibrationError::UnsatisfiableRange)
        );
    }

    #[test]
    fn settings_reject_shunt_voltage_above_full_scale() {
        // 0.1 Ohm * 5 A = 500 mV, largest full scale is 320 mV
        assert_eq!(
            compute_settings(0.1, 5.0, 12.0),
            Err(CalibrationError::UnsatisfiableRange)
        );
        // 200 mV fits 32 V/8X but not the 16 V range
        assert_eq!(
            compute_settings(0.1, 2.0, 20.0).map(|s| s.pga_gain),
            Ok(PGAGain::Gain8X)
        );
    }

    #[test]
    fn invalid_parameters() {
        assert_eq!(
            compute_settings(0.0, 2.0, 12.0),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            compute_settings(0.01, -1.0, 12.0),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            compute_settings(0.01, 1.0, f32::NAN),
            Err(CalibrationError::InvalidParameter)
        );
        assert_eq!(
            compute_calibration(f32::INFINITY, 1.0),
            Err(CalibrationError::InvalidParameter)
        );
    }

    #[test]
    fn calibration_example() {
        let cal = compute_calibration(0.01, 2.0).unwrap();

        // 0.00512 / (2 / 32768 * 0.01) = 8388.6
        assert_eq!(cal.register_value(), 8388);
        assert!((cal.current_lsb_a() - 61.0e-6).abs() < 0.1e-6);

        let counts_per_amp = cal.current_divider_ma() * 1000.0;
        assert!((counts_per_amp - 16384.0).abs() < 2.0);

        let ratio = cal.current_divider_ma() / cal.power_divider_mw();
        assert!((ratio - POWER_LSB_FACTOR).abs() < 1e-3);
        assert!((cal.power_lsb_w() - 25.0 * cal.current_lsb_a()).abs() < 1e-9);
    }

    #[test]
    fn calibration_scales_readings() {
        let cal = compute_calibration(0.01, 2.0).unwrap();

        // Full scale of the current register is about the requested maximum
        assert!((cal.current_ma(i16::MAX) - 2000.0).abs() < 1.0);
        assert!((cal.current_ma(-16384) + 1000.0).abs() < 1.0);
        assert_eq!(cal.current_ma(0), 0.0);

        let mw = cal.power_mw(1000);
        assert!((mw - 1000.0 * cal.power_lsb_w() * 1000.0).abs() < 0.01);
    }

    #[test]
    fn calibration_overflow() {
        // Shunt too small for the current: constant far above 15 bits
        assert_eq!(
            compute_calibration(0.001, 0.01),
            Err(CalibrationError::CalibrationOverflow)
        );
        // Shunt too large: constant truncates to zero
        assert_eq!(
            compute_calibration(100.0, 10.0),
            Err(CalibrationError::CalibrationOverflow)
        );
    }

    #[test]
    fn calibration_fits_register() {
        for &shunt in &[0.002_f32, 0.01, 0.1, 1.0] {
            for &current in &[0.1_f32, 0.5, 1.0, 2.0, 8.0] {
                if let Ok(cal) = compute_calibration(shunt, current) {
                    assert!(cal.register_value() >= 1);
                    assert!(cal.register_value() <= CALIBRATION_MAX);
                    // Quantizing only ever makes the LSB coarser
                    assert!(cal.current_lsb_a() >= current / CURRENT_FULL_SCALE * 0.999);
                }
            }
        }
    }
}
