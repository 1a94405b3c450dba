//! Register map and fixed field constants of the INA233.

/// Register addresses used by this driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Bus range, PGA gain, ADC resolution and operating mode
    Configuration = 0x00,
    /// Signed shunt voltage, 10 µV per LSB
    ShuntVoltage = 0x01,
    /// Bus voltage in bits 15..3, conversion ready in bit 1, math overflow in bit 0
    BusVoltage = 0x02,
    /// Calculated power, scaled by the calibration register
    Power = 0x03,
    /// Signed current, scaled by the calibration register
    Current = 0x04,
    /// Calibration constant used by the device to compute current and power
    Calibration = 0x05,
}

impl Register {
    #[inline(always)]
    pub fn addr(self) -> u8 {
        self as u8
    }
}

/// Default 7-bit bus address (A0 and A1 tied to GND).
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// Largest valid 7-bit bus address.
pub const MAX_ADDRESS: u8 = 0x7F;

/// Minimum wait between addressing a register and reading it back.
///
/// Covers the worst-case 12-bit conversion time (586 µs). It must not be
/// shortened even if lower resolution settings are used.
pub const CONVERSION_DELAY_US: u32 = 1_000;

/// Bus voltage register value LSB in millivolts.
pub const BUS_VOLTAGE_LSB_MV: u16 = 4;

/// Milli-units per unit, for mV to V and A to mA.
pub const MILLIS_PER_UNIT: f32 = 1_000.0;

/// Number of status bits (CNVR, OVF and one reserved) below the bus voltage value.
pub const BUS_VOLTAGE_STATUS_BITS: u16 = 3;

/// Shunt voltage register LSB in millivolts (10 µV).
pub const SHUNT_VOLTAGE_LSB_MV: f32 = 0.01;

/// Fixed scaling of the calibration formula `cal = 0.00512 / (current_lsb * r_shunt)`.
pub const CALIBRATION_SCALING: f32 = 0.00512;

/// Bit 15 of the calibration register is reserved.
pub const CALIBRATION_MAX: u16 = 0x7FFF;

/// Power register LSB as a multiple of the current LSB.
pub const POWER_LSB_FACTOR: f32 = 25.0;

/// Full scale of the signed current register, 2^15.
pub const CURRENT_FULL_SCALE: f32 = 32_768.0;

/// Highest bus voltage range the device supports, in volts.
pub const MAX_BUS_RANGE_V: f32 = 32.0;

/// Configuration register field offsets and values.
pub mod config {
    /// Bus voltage range bit (0 = 16 V, 1 = 32 V)
    pub const BRNG_SHIFT: u16 = 13;
    /// PGA gain field, two bits
    pub const PG_SHIFT: u16 = 11;
    /// Bus ADC resolution/averaging field, four bits
    pub const BADC_SHIFT: u16 = 7;
    /// Shunt ADC resolution/averaging field, four bits
    pub const SADC_SHIFT: u16 = 3;
    /// 12-bit, single sample
    pub const ADC_12BIT: u16 = 0b0011;
    /// Shunt and bus, continuous
    pub const MODE_SHUNT_BUS_CONTINUOUS: u16 = 0b111;
}
