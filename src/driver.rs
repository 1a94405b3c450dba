use crate::calibration::{
    compute_calibration, compute_settings, Calibration, CalibrationError, CalibrationParams,
};
use crate::register::{
    Register, BUS_VOLTAGE_LSB_MV, BUS_VOLTAGE_STATUS_BITS, CONVERSION_DELAY_US, MAX_ADDRESS,
    MILLIS_PER_UNIT, SHUNT_VOLTAGE_LSB_MV,
};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum INA233Error<I2C> {
    /// The bus transaction could not complete
    I2c(I2C),
    /// The requested measurement range cannot be configured
    Calibration(CalibrationError),
    /// Current or power was requested before any calibration was applied
    Uncalibrated,
    /// The bus address does not fit in 7 bits
    InvalidAddress(u8),
}

impl<I2C> From<CalibrationError> for INA233Error<I2C> {
    fn from(e: CalibrationError) -> Self {
        INA233Error::Calibration(e)
    }
}

pub struct INA233Driver<I2C, Delay> {
    i2c: I2C,
    delay: Delay,
    address: u8,
    calibration: Option<Calibration>,
}

impl<I2C, Delay> INA233Driver<I2C, Delay>
where
    I2C: I2c,
    Delay: DelayNs,
{
    ///
    ///
    /// # Arguments
    ///
    /// * `i2c`: The i2c bus.
    /// * `delay`: Used to wait for a conversion before reading a register back.
    /// * `address`: The 7-bit bus address of the device.
    /// * `init_config`: An optional measurement setup. When provided, the configuration and
    /// calibration registers are written before returning. Otherwise current and power
    /// readings are refused until [`Self::calibrate`] or [`Self::set_calibration`] is called.
    ///
    /// returns: Result<INA233Driver<I2C, Delay>, INA233Error<<I2C as ErrorType>::Error>>
    pub fn new(
        i2c: I2C,
        delay: Delay,
        address: u8,
        init_config: Option<CalibrationParams>,
    ) -> Result<Self, INA233Error<I2C::Error>> {
        if address > MAX_ADDRESS {
            return Err(INA233Error::InvalidAddress(address));
        }

        let mut driver = Self {
            i2c,
            delay,
            address,
            calibration: None,
        };

        if let Some(params) = init_config {
            driver.calibrate(&params)?;
        }

        Ok(driver)
    }

    /// Give back the bus and the delay.
    pub fn release(self) -> (I2C, Delay) {
        (self.i2c, self.delay)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// The calibration last written by [`Self::set_calibration`], if any.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Configure gain and bus range, then write the calibration for `params`.
    ///
    /// Both register values are computed before anything is written, so a parameter set
    /// that cannot be calibrated leaves the device untouched.
    pub fn calibrate(
        &mut self,
        params: &CalibrationParams,
    ) -> Result<(), INA233Error<I2C::Error>> {
        let settings = compute_settings(
            params.shunt_ohms,
            params.max_current_a,
            params.max_bus_voltage_v,
        )?;
        let calibration = compute_calibration(params.shunt_ohms, params.max_current_a)?;
        self.write_register(Register::Configuration, settings.bits())?;
        self.apply_calibration(calibration)?;
        Ok(())
    }

    /// Select gain and bus range for `params` and write the configuration register.
    ///
    /// returns: the configuration register value written
    pub fn set_settings(
        &mut self,
        params: &CalibrationParams,
    ) -> Result<u16, INA233Error<I2C::Error>> {
        let settings = compute_settings(
            params.shunt_ohms,
            params.max_current_a,
            params.max_bus_voltage_v,
        )?;
        let config = settings.bits();
        self.write_register(Register::Configuration, config)?;
        Ok(config)
    }

    /// Compute the calibration for `params`, write it and keep it for later current and
    /// power conversions.
    ///
    /// returns: the calibration register value written
    pub fn set_calibration(
        &mut self,
        params: &CalibrationParams,
    ) -> Result<u16, INA233Error<I2C::Error>> {
        let calibration = compute_calibration(params.shunt_ohms, params.max_current_a)?;
        self.apply_calibration(calibration)?;
        Ok(calibration.register_value())
    }

    /// The stored calibration is only replaced once the register write succeeded.
    fn apply_calibration(
        &mut self,
        calibration: Calibration,
    ) -> Result<(), INA233Error<I2C::Error>> {
        self.write_register(Register::Calibration, calibration.register_value())?;
        self.calibration = Some(calibration);
        Ok(())
    }

    /// Bus voltage in mV with the status bits dropped.
    pub fn bus_voltage_raw(&mut self) -> Result<u16, INA233Error<I2C::Error>> {
        let value = self.read_register(Register::BusVoltage)?;
        Ok((value >> BUS_VOLTAGE_STATUS_BITS) * BUS_VOLTAGE_LSB_MV)
    }

    pub fn shunt_voltage_raw(&mut self) -> Result<i16, INA233Error<I2C::Error>> {
        Ok(self.read_register(Register::ShuntVoltage)? as i16)
    }

    /// Raw signed current register.
    ///
    /// A sharp load transient can reset the device, which clears the calibration
    /// register and with it the current and power results. The calibration is
    /// therefore written again right before every read.
    pub fn current_raw(&mut self) -> Result<i16, INA233Error<I2C::Error>> {
        self.reassert_calibration()?;
        Ok(self.read_register(Register::Current)? as i16)
    }

    /// Raw power register. Re-asserts the calibration like [`Self::current_raw`].
    pub fn power_raw(&mut self) -> Result<u16, INA233Error<I2C::Error>> {
        self.reassert_calibration()?;
        self.read_register(Register::Power)
    }

    pub fn get_bus_voltage_v(&mut self) -> Result<f32, INA233Error<I2C::Error>> {
        Ok(self.bus_voltage_raw()? as f32 / MILLIS_PER_UNIT)
    }

    pub fn get_shunt_voltage_mv(&mut self) -> Result<f32, INA233Error<I2C::Error>> {
        Ok(self.shunt_voltage_raw()? as f32 * SHUNT_VOLTAGE_LSB_MV)
    }

    /// Current in mA.
    ///
    /// Requires a prior calibration and writes the calibration register before
    /// reading, see [`Self::current_raw`].
    pub fn get_current_ma(&mut self) -> Result<f32, INA233Error<I2C::Error>> {
        let calibration = self.require_calibration()?;
        Ok(calibration.current_ma(self.current_raw()?))
    }

    /// Power in mW. Same preconditions as [`Self::get_current_ma`].
    pub fn get_power_mw(&mut self) -> Result<f32, INA233Error<I2C::Error>> {
        let calibration = self.require_calibration()?;
        Ok(calibration.power_mw(self.power_raw()?))
    }

    fn require_calibration(&self) -> Result<Calibration, INA233Error<I2C::Error>> {
        match self.calibration {
            Some(calibration) => Ok(calibration),
            None => {
                warn!("read refused on {:#x}: not calibrated", self.address);
                Err(INA233Error::Uncalibrated)
            }
        }
    }

    fn reassert_calibration(&mut self) -> Result<(), INA233Error<I2C::Error>> {
        let calibration = self.require_calibration()?;
        self.write_register(Register::Calibration, calibration.register_value())
    }

    pub fn write_register(
        &mut self,
        register: Register,
        data: u16,
    ) -> Result<(), INA233Error<I2C::Error>> {
        trace!("write {:#x} <- {:#x}", register.addr(), data);
        let [high, low] = data.to_be_bytes();
        self.i2c
            .write(self.address, &[register.addr(), high, low])
            .map_err(INA233Error::I2c)
    }

    pub fn read_register(&mut self, register: Register) -> Result<u16, INA233Error<I2C::Error>> {
        let mut read_buffer = [0u8; 2];
        self.i2c
            .write(self.address, &[register.addr()])
            .map_err(INA233Error::I2c)?;
        self.delay.delay_us(CONVERSION_DELAY_US);
        self.i2c
            .read(self.address, &mut read_buffer)
            .map_err(INA233Error::I2c)?;

        let result = u16::from_be_bytes(read_buffer);
        trace!("read {:#x} -> {:#x}", register.addr(), result);

        Ok(result)
    }
}

#[cfg(feature = "std")]
impl<I2C> std::fmt::Display for INA233Error<I2C>
where
    I2C: std::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            INA233Error::I2c(i2c) => write!(f, "I2C Error: {i2c:?}"),
            INA233Error::Calibration(e) => write!(f, "Calibration Error: {e}"),
            INA233Error::Uncalibrated => write!(f, "Current and power need a calibration first"),
            INA233Error::InvalidAddress(addr) => write!(f, "Invalid 7-bit address {addr:#04x}"),
        }
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for INA233Error<I2C>
where
    I2C: std::fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
