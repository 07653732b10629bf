//! VCP Monitor Click: INA260 voltage, current and power monitor
//!
//! The INA260 has an integrated 2 mΩ shunt, so measurements come out in
//! fixed units: 1.25 mA per current LSB, 1.25 mV per bus voltage LSB and
//! 10 mW per power LSB. This driver converts them to µA, µV and µW.

use core::fmt;
use core::fmt::{Display, Formatter};

use embedded_hal::i2c;

use crate::{hal_type::i2c::I2c, maybe_async_attr};

pub mod ll;

/// I2C address with A0 and A1 tied to GND
pub const DEFAULT_ADDRESS: u8 = 0x40;

/// `MANUFACTURER_ID` of Texas Instruments
pub const MANUFACTURER_ID: u16 = 0x5449;

const CURRENT_LSB_UA: i32 = 1250;
const BUS_VOLTAGE_LSB_UV: u32 = 1250;
const POWER_LSB_UW: u32 = 10_000;

/// `CONFIG` bits 14..12 read back as 0b110
const CONFIG_RESERVED: u8 = 0b110;

/// Number of samples averaged per result
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Averaging {
    #[default]
    Samples1 = 0,
    Samples4 = 1,
    Samples16 = 2,
    Samples64 = 3,
    Samples128 = 4,
    Samples256 = 5,
    Samples512 = 6,
    Samples1024 = 7,
}

/// Conversion time of a single sample
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConversionTime {
    Us140 = 0,
    Us204 = 1,
    Us332 = 2,
    Us588 = 3,
    #[default]
    Us1100 = 4,
    Us2116 = 5,
    Us4156 = 6,
    Us8244 = 7,
}

/// What is measured, and whether continuously or once per trigger
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperatingMode {
    PowerDown = 0,
    CurrentTriggered = 1,
    VoltageTriggered = 2,
    CurrentAndVoltageTriggered = 3,
    CurrentContinuous = 5,
    VoltageContinuous = 6,
    #[default]
    CurrentAndVoltageContinuous = 7,
}

/// Configuration written by [`VcpMonitor::default_cfg`]
///
/// The default matches the power-on state of the chip.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub averaging: Averaging,
    pub bus_voltage_conversion: ConversionTime,
    pub current_conversion: ConversionTime,
    pub mode: OperatingMode,
}

/// The measurement compared against the alert limit
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alert {
    /// Current above the limit
    OverCurrent,
    /// Current below the limit
    UnderCurrent,
    /// Bus voltage above the limit
    BusOverVoltage,
    /// Bus voltage below the limit
    BusUnderVoltage,
    /// Power above the limit
    PowerOverLimit,
    /// Assert the alert pin when a conversion is ready, the limit is unused
    ConversionReady,
}

/// Active level of the alert pin
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlertPolarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

/// Flags from `MASK_ENABLE`
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlertFlags {
    /// The selected alert condition occured
    pub alert: bool,
    /// A conversion finished
    pub conversion_ready: bool,
    /// The power calculation overflowed
    pub overflow: bool,
}

/// One set of readings
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    pub current_ua: i32,
    pub bus_voltage_uv: u32,
    pub power_uw: u32,
}

/// Entry point to the VCP Monitor driver API
pub struct VcpMonitor<I2C> {
    ll: ll::Ina260<I2C>,
}

impl<I2C> VcpMonitor<I2C>
where
    I2C: I2c,
{
    /// Create a new instance of `VcpMonitor`
    ///
    /// `address` is the 7-bit I2C address, [`DEFAULT_ADDRESS`] unless the
    /// address jumpers were changed.
    pub fn new(i2c: I2C, address: u8) -> Self {
        VcpMonitor {
            ll: ll::Ina260::new(i2c, address),
        }
    }

    /// Returns the register-level interface
    pub fn ll(&mut self) -> &mut ll::Ina260<I2C> {
        &mut self.ll
    }

    /// Release the I2C bus
    pub fn free(self) -> I2C {
        self.ll.i2c
    }

    /// Check the manufacturer ID
    #[maybe_async_attr]
    pub async fn check_id(&mut self) -> Result<(), Error<I2C>> {
        let id = self.ll.manufacturer_id().read().await?.value();
        if id != MANUFACTURER_ID {
            return Err(Error::WrongChip(id));
        }

        Ok(())
    }

    /// Reset the chip and apply `config`
    #[maybe_async_attr]
    pub async fn default_cfg(&mut self, config: Config) -> Result<(), Error<I2C>> {
        self.ll
            .config()
            .write(|w| w.rst(1).reserved(CONFIG_RESERVED))
            .await?;
        self.ll
            .config()
            .write(|w| {
                w.reserved(CONFIG_RESERVED)
                    .avg(config.averaging as u8)
                    .vbusct(config.bus_voltage_conversion as u8)
                    .ishct(config.current_conversion as u8)
                    .mode(config.mode as u8)
            })
            .await?;

        Ok(())
    }

    /// Current through the shunt in µA
    #[maybe_async_attr]
    pub async fn current_ua(&mut self) -> Result<i32, Error<I2C>> {
        let raw = self.ll.current().read().await?.value() as i16;
        Ok(raw as i32 * CURRENT_LSB_UA)
    }

    /// Bus voltage in µV
    #[maybe_async_attr]
    pub async fn bus_voltage_uv(&mut self) -> Result<u32, Error<I2C>> {
        let raw = self.ll.bus_voltage().read().await?.value();
        Ok(raw as u32 * BUS_VOLTAGE_LSB_UV)
    }

    /// Power in µW
    #[maybe_async_attr]
    pub async fn power_uw(&mut self) -> Result<u32, Error<I2C>> {
        let raw = self.ll.power().read().await?.value();
        Ok(raw as u32 * POWER_LSB_UW)
    }

    /// Read current, bus voltage and power
    #[maybe_async_attr]
    pub async fn read_all(&mut self) -> Result<Measurement, Error<I2C>> {
        Ok(Measurement {
            current_ua: self.current_ua().await?,
            bus_voltage_uv: self.bus_voltage_uv().await?,
            power_uw: self.power_uw().await?,
        })
    }

    /// Configure the alert pin
    ///
    /// `limit_raw` is in the units of the register `alert` compares against.
    /// Only one alert function can be active at a time.
    #[maybe_async_attr]
    pub async fn set_alert(
        &mut self,
        alert: Alert,
        limit_raw: u16,
        polarity: AlertPolarity,
        latch: bool,
    ) -> Result<(), Error<I2C>> {
        self.ll.alert_limit().write(|w| w.value(limit_raw)).await?;
        self.ll
            .mask_enable()
            .write(|w| {
                match alert {
                    Alert::OverCurrent => w.ocl(1),
                    Alert::UnderCurrent => w.ucl(1),
                    Alert::BusOverVoltage => w.bol(1),
                    Alert::BusUnderVoltage => w.bul(1),
                    Alert::PowerOverLimit => w.pol(1),
                    Alert::ConversionReady => w.cnvr(1),
                };
                w.apol((polarity == AlertPolarity::ActiveHigh) as u8)
                    .len(latch as u8)
            })
            .await?;

        Ok(())
    }

    /// Read and clear the alert flags
    #[maybe_async_attr]
    pub async fn alert_flags(&mut self) -> Result<AlertFlags, Error<I2C>> {
        let mask_enable = self.ll.mask_enable().read().await?;

        Ok(AlertFlags {
            alert: mask_enable.aff() == 1,
            conversion_ready: mask_enable.cvrf() == 1,
            overflow: mask_enable.ovf() == 1,
        })
    }

    /// Whether a conversion finished since the last check
    #[maybe_async_attr]
    pub async fn conversion_ready(&mut self) -> Result<bool, Error<I2C>> {
        Ok(self.alert_flags().await?.conversion_ready)
    }
}

/// An error that can occur when talking to the INA260
pub enum Error<I2C>
where
    I2C: i2c::ErrorType,
{
    /// Error occured while using I2C bus
    I2c(ll::Error<I2C>),

    /// The chip did not report the TI manufacturer ID
    WrongChip(u16),
}

impl<I2C> From<ll::Error<I2C>> for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn from(error: ll::Error<I2C>) -> Self {
        Error::I2c(error)
    }
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
            Error::I2c(error) => write!(f, "I2c({:?})", error),
            Error::WrongChip(id) => write!(f, "WrongChip({:#06x})", id),
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
            Error::I2c(error) => defmt::write!(f, "I2c({})", error),
            Error::WrongChip(id) => defmt::write!(f, "WrongChip({=u16:#06x})", id),
        }
    }
}
