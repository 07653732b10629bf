use core::fmt;
use core::fmt::{Display, Formatter};

use embedded_hal::spi;

use super::ll;

/// An error that can occur when talking to the MCP2517FD
pub enum Error<SPI>
where
    SPI: spi::ErrorType,
{
    /// Error occured while using SPI bus
    Spi(ll::Error<SPI>),

    /// The controller did not reach the requested operation mode
    ModeChangeTimeout,

    /// A FIFO, filter or timing parameter is out of range
    InvalidConfiguration,

    /// The frame does not fit the FIFO's payload size
    PayloadTooLarge,

    /// A message object could not be encoded or decoded
    Frame(byte::Error),
}

impl<SPI> From<ll::Error<SPI>> for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn from(error: ll::Error<SPI>) -> Self {
        Error::Spi(error)
    }
}

impl<SPI> From<byte::Error> for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn from(error: byte::Error) -> Self {
        Error::Frame(error)
    }
}

impl<SPI> Display for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<SPI> std::error::Error for Error<SPI> where SPI: spi::ErrorType {}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<SPI> fmt::Debug for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Spi(error) => write!(f, "Spi({:?})", error),
            Error::ModeChangeTimeout => write!(f, "ModeChangeTimeout"),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            Error::PayloadTooLarge => write!(f, "PayloadTooLarge"),
            Error::Frame(error) => write!(f, "Frame({:?})", error),
        }
    }
}

#[cfg(feature = "defmt")]
impl<SPI> defmt::Format for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Spi(error) => defmt::write!(f, "Spi({})", error),
            Error::ModeChangeTimeout => defmt::write!(f, "ModeChangeTimeout"),
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
            Error::PayloadTooLarge => defmt::write!(f, "PayloadTooLarge"),
            Error::Frame(error) => defmt::write!(f, "Frame({:?})", defmt::Debug2Format(error)),
        }
    }
}
