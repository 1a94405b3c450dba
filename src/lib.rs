//!
//! A platform-agnostic driver for the INA233 current and power monitor. Built using embedded-hal.
//!
//! The driver picks the programmable gain and bus voltage range for a given shunt resistor,
//! maximum current and maximum bus voltage, computes the calibration register value, and
//! scales the raw bus voltage, shunt voltage, current and power registers into physical units.
//!
//! ```no_run
//! # fn run<I2C: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs>(i2c: I2C, delay: D)
//! # -> Result<(), ina233::INA233Error<I2C::Error>> {
//! use ina233::{CalibrationParams, INA233Driver, DEFAULT_ADDRESS};
//!
//! let params = CalibrationParams {
//!     shunt_ohms: 0.01,
//!     max_current_a: 2.0,
//!     max_bus_voltage_v: 12.0,
//! };
//! let mut driver = INA233Driver::new(i2c, delay, DEFAULT_ADDRESS, Some(params))?;
//!
//! let volts = driver.get_bus_voltage_v()?;
//! let milliamps = driver.get_current_ma()?;
//! # let _ = (volts, milliamps);
//! # Ok(())
//! # }
//! ```
//!

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod calibration;
pub mod driver;
pub mod register;

pub use calibration::{
    compute_calibration, compute_settings, BusVoltageRange, Calibration, CalibrationError,
    CalibrationParams, PGAGain, Settings,
};
pub use driver::*;
pub use register::{Register, DEFAULT_ADDRESS};
