//! Low-level interface to the INA260
//!
//! All registers are 16 bits wide and transferred MSB first. A read writes
//! the register pointer and reads two bytes in a repeated-start transaction,
//! a write sends the pointer followed by the value.
//!
//! Please consider using the [high-level interface] instead.
//!
//! [high-level interface]: super::VcpMonitor

use core::{fmt, marker::PhantomData};

use embedded_hal::i2c::ErrorType;

use crate::{
    hal_type::i2c::I2c,
    maybe_async_attr,
    register::{Readable, Register, Writable},
};

/// Entry point to the INA260 driver's low-level API
///
/// Please consider using [VcpMonitor] instead.
///
/// [VcpMonitor]: super::VcpMonitor
pub struct Ina260<I2C> {
    pub(crate) i2c: I2C,
    address: u8,
}

impl<I2C> Ina260<I2C> {
    /// Create a new instance of `Ina260`
    ///
    /// `address` is the 7-bit I2C address selected with A0/A1.
    pub fn new(i2c: I2C, address: u8) -> Self {
        Ina260 { i2c, address }
    }

    /// Allow access to the I2C bus
    pub fn bus(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    /// The I2C address
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<I2C> Ina260<I2C>
where
    I2C: I2c,
{
    /// Read a register
    #[maybe_async_attr]
    pub async fn read_register(&mut self, register: u8) -> Result<u16, Error<I2C>> {
        let mut buf = [0; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .await
            .map_err(Error::Read)?;

        Ok(u16::from_be_bytes(buf))
    }

    /// Write a register
    #[maybe_async_attr]
    pub async fn write_register(&mut self, register: u8, value: u16) -> Result<(), Error<I2C>> {
        let [high, low] = value.to_be_bytes();
        self.i2c
            .write(self.address, &[register, high, low])
            .await
            .map_err(Error::Write)
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`Ina260`].
pub struct RegAccessor<'s, R, I2C>(&'s mut Ina260<I2C>, PhantomData<R>);

impl<'s, R, I2C> RegAccessor<'s, R, I2C>
where
    I2C: I2c,
    R: Register<Address = u8, Raw = u16>,
{
    /// Read from the register
    #[maybe_async_attr]
    pub async fn read(&mut self) -> Result<R::Read, Error<I2C>>
    where
        R: Readable,
    {
        let raw = self.0.read_register(R::ADDRESS).await?;
        Ok(R::from_raw(raw))
    }

    /// Write to the register
    #[maybe_async_attr]
    pub async fn write<F>(&mut self, f: F) -> Result<(), Error<I2C>>
    where
        R: Writable,
        F: FnOnce(&mut R::Write) -> &mut R::Write,
    {
        let mut w = R::write(0);
        f(&mut w);
        self.0.write_register(R::ADDRESS, R::into_raw(&w)).await
    }

    /// Modify the register
    #[maybe_async_attr]
    pub async fn modify<F>(&mut self, f: F) -> Result<(), Error<I2C>>
    where
        R: Readable + Writable,
        F: for<'r> FnOnce(&R::Read, &'r mut R::Write) -> &'r mut R::Write,
    {
        let r = self.read().await?;
        let mut w = R::write(R::raw(&r));
        f(&r, &mut w);
        self.0.write_register(R::ADDRESS, R::into_raw(&w)).await
    }
}

/// An I2C error that can occur when communicating with the INA260
pub enum Error<I2C>
where
    I2C: ErrorType,
{
    /// I2C error occured during a read transaction
    Read(I2C::Error),

    /// I2C error occured during a write transaction
    Write(I2C::Error),
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Read(error) => write!(f, "Read({:?})", error),
            Error::Write(error) => write!(f, "Write({:?})", error),
        }
    }
}

#[cfg(feature = "defmt")]
impl<I2C> defmt::Format for Error<I2C>
where
    I2C: ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        use embedded_hal::i2c::Error as _;

        match self {
            Error::Read(error) => defmt::write!(f, "Read({})", error.kind()),
            Error::Write(error) => defmt::write!(f, "Write({})", error.kind()),
        }
    }
}

impl_register! {
    Ina260<I2C>, u8;

    0x00, u16, RW, CONFIG(config) { /// Configuration
        mode,     0,  2, u8; /// Operating mode
        ishct,    3,  5, u8; /// Shunt current conversion time
        vbusct,   6,  8, u8; /// Bus voltage conversion time
        avg,      9, 11, u8; /// Averaging mode
        reserved, 12, 14, u8; /// Reserved, reads 0b110
        rst,     15, 15, u8; /// Reset all registers
    }
    0x01, u16, RO, CURRENT(current) { /// Current, 1.25 mA/LSB, two's complement
        value, 0, 15, u16; /// Raw value
    }
    0x02, u16, RO, BUS_VOLTAGE(bus_voltage) { /// Bus voltage, 1.25 mV/LSB
        value, 0, 15, u16; /// Raw value
    }
    0x03, u16, RO, POWER(power) { /// Power, 10 mW/LSB
        value, 0, 15, u16; /// Raw value
    }
    0x06, u16, RW, MASK_ENABLE(mask_enable) { /// Alert configuration and conversion ready flag
        len,  0,  0, u8; /// Latch the alert pin
        apol, 1,  1, u8; /// Alert polarity, 1: active high
        ovf,  2,  2, u8; /// Math overflow
        cvrf, 3,  3, u8; /// Conversion ready, cleared by reading this register
        aff,  4,  4, u8; /// Alert function flag
        cnvr, 10, 10, u8; /// Alert on conversion ready
        pol,  11, 11, u8; /// Alert on power over limit
        bul,  12, 12, u8; /// Alert on bus voltage under limit
        bol,  13, 13, u8; /// Alert on bus voltage over limit
        ucl,  14, 14, u8; /// Alert on current under limit
        ocl,  15, 15, u8; /// Alert on current over limit
    }
    0x07, u16, RW, ALERT_LIMIT(alert_limit) { /// Alert limit
        value, 0, 15, u16; /// Compared against the selected measurement register
    }
    0xFE, u16, RO, MANUFACTURER_ID(manufacturer_id) { /// Manufacturer ID
        value, 0, 15, u16; /// 0x5449, "TI" in ASCII
    }
    0xFF, u16, RO, DIE_ID(die_id) { /// Die ID
        rid, 0,  3, u8; /// Die revision
        did, 4, 15, u16; /// Device ID, 0x227
    }
}
