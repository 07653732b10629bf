//! Hall Current Click: Hall-effect current sensor behind an MCP3221 ADC
//!
//! The sensor outputs a voltage proportional to the current, centred on a
//! zero-current level. The MCP3221 digitises it to 12 bits against the
//! supply voltage. It has no registers: every two-byte read returns the
//! latest conversion.

use core::fmt;
use core::fmt::{Display, Formatter};

use embedded_hal::i2c::{self, Error as _};

use crate::{hal_type::i2c::I2c, maybe_async_attr};

/// I2C address of the MCP3221A5
pub const DEFAULT_ADDRESS: u8 = 0x4D;

/// Full scale of the 12-bit ADC
const ADC_FULL_SCALE: u32 = 4096;

/// Conversion parameters
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// ADC reference, the supply voltage, in mV
    pub vref_mv: u16,
    /// Sensor output at zero current in mV
    pub zero_mv: u16,
    /// Sensor sensitivity in µV per mA
    pub sensitivity_uv_per_ma: u16,
}

impl Default for Config {
    /// ±15 A sensor at 3.3 V: 90 mV/A around half the supply
    fn default() -> Self {
        Config {
            vref_mv: 3300,
            zero_mv: 1650,
            sensitivity_uv_per_ma: 90,
        }
    }
}

/// Entry point to the Hall Current driver API
pub struct HallCurrent<I2C> {
    i2c: I2C,
    address: u8,
    config: Config,
}

impl<I2C> HallCurrent<I2C>
where
    I2C: I2c,
{
    /// Create a new instance of `HallCurrent` at [`DEFAULT_ADDRESS`]
    pub fn new(i2c: I2C, config: Config) -> Self {
        HallCurrent {
            i2c,
            address: DEFAULT_ADDRESS,
            config,
        }
    }

    /// Use an MCP3221 variant with another address
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// The conversion parameters in use
    pub fn config(&self) -> Config {
        self.config
    }

    /// Release the I2C bus
    pub fn free(self) -> I2C {
        self.i2c
    }

    /// Latest conversion, 0 to 4095
    #[maybe_async_attr]
    pub async fn read_raw(&mut self) -> Result<u16, Error<I2C>> {
        let mut buf = [0; 2];
        self.i2c
            .read(self.address, &mut buf)
            .await
            .map_err(Error::I2c)?;

        Ok(u16::from_be_bytes(buf) & 0x0FFF)
    }

    /// At most `vref_mv * 1000`, which always fits
    fn raw_to_uv(&self, raw: u32) -> u32 {
        (u64::from(raw) * u64::from(self.config.vref_mv) * 1000 / u64::from(ADC_FULL_SCALE)) as u32
    }

    /// Sensor output voltage in mV
    #[maybe_async_attr]
    pub async fn read_voltage_mv(&mut self) -> Result<u16, Error<I2C>> {
        let raw = self.read_raw().await?;
        Ok((self.raw_to_uv(u32::from(raw)) / 1000) as u16)
    }

    /// Current in mA, negative in the reverse direction
    #[maybe_async_attr]
    pub async fn read_current_ma(&mut self) -> Result<i32, Error<I2C>> {
        if self.config.sensitivity_uv_per_ma == 0 {
            return Err(Error::InvalidConfiguration);
        }

        let raw = self.read_raw().await?;
        let offset_uv = self.raw_to_uv(u32::from(raw)) as i32 - i32::from(self.config.zero_mv) * 1000;

        Ok(offset_uv / i32::from(self.config.sensitivity_uv_per_ma))
    }

    /// Measure the zero-current output over `samples` conversions
    ///
    /// No current may flow while calibrating. The average becomes the new
    /// zero level, which is returned in mV.
    #[maybe_async_attr]
    pub async fn calibrate_zero(&mut self, samples: u16) -> Result<u16, Error<I2C>> {
        if samples == 0 {
            return Err(Error::InvalidConfiguration);
        }

        let mut sum = 0u32;
        for _ in 0..samples {
            sum += u32::from(self.read_raw().await?);
        }
        let average = sum / u32::from(samples);

        self.config.zero_mv = (self.raw_to_uv(average) / 1000) as u16;
        debug!("hall current zero at {=u16} mV", self.config.zero_mv);

        Ok(self.config.zero_mv)
    }
}

/// An error that can occur when talking to the Hall Current Click
pub enum Error<I2C>
where
    I2C: i2c::ErrorType,
{
    /// Error occured while using I2C bus
    I2c(I2C::Error),

    /// The configuration or an argument is out of range
    InvalidConfiguration,
}

impl<I2C> Display for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for Error<I2C> where I2C: i2c::ErrorType {}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::I2c(error) => write!(f, "I2c({:?})", error.kind()),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<I2C> defmt::Format for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::I2c(error) => defmt::write!(f, "I2c({})", error.kind()),
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
        }
    }
}
