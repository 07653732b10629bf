use core::fmt;
use core::fmt::{Display, Formatter};

use embedded_hal::spi;

use super::ll;

/// An error that can occur when talking to the CC1120
pub enum Error<SPI>
where
    SPI: spi::ErrorType,
{
    /// Error occured while using SPI bus
    Spi(ll::Error<SPI>),

    /// The chip did not identify as a CC1120
    WrongChip(u8),

    /// The chip did not come out of reset
    ChipNotReady,

    /// The frequency synthesizer calibration did not finish in time
    CalibrationTimeout,

    /// The configuration was not valid
    InvalidConfiguration,

    /// The payload does not fit in a variable length packet
    PayloadTooLarge,

    /// The TX FIFO ran empty during transmission
    TxUnderflow,

    /// The RX FIFO overflowed
    RxOverflow,

    /// The received packet failed the CRC check
    CrcMismatch,

    /// Buffer too small
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },
}

impl<SPI> From<ll::Error<SPI>> for Error<SPI>
where
    SPI: spi::ErrorType,
{
    fn from(error: ll::Error<SPI>) -> Self {
        Error::Spi(error)
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
            Error::WrongChip(part) => write!(f, "WrongChip({:#04x})", part),
            Error::ChipNotReady => write!(f, "ChipNotReady"),
            Error::CalibrationTimeout => write!(f, "CalibrationTimeout"),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            Error::PayloadTooLarge => write!(f, "PayloadTooLarge"),
            Error::TxUnderflow => write!(f, "TxUnderflow"),
            Error::RxOverflow => write!(f, "RxOverflow"),
            Error::CrcMismatch => write!(f, "CrcMismatch"),
            Error::BufferTooSmall { required_len } => {
                write!(f, "BufferTooSmall {{ required_len: {:?} }}", required_len,)
            }
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
            Error::WrongChip(part) => defmt::write!(f, "WrongChip({=u8:#04x})", part),
            Error::ChipNotReady => defmt::write!(f, "ChipNotReady"),
            Error::CalibrationTimeout => defmt::write!(f, "CalibrationTimeout"),
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
            Error::PayloadTooLarge => defmt::write!(f, "PayloadTooLarge"),
            Error::TxUnderflow => defmt::write!(f, "TxUnderflow"),
            Error::RxOverflow => defmt::write!(f, "RxOverflow"),
            Error::CrcMismatch => defmt::write!(f, "CrcMismatch"),
            Error::BufferTooSmall { required_len } => {
                defmt::write!(f, "BufferTooSmall {{ required_len: {} }}", required_len,)
            }
        }
    }
}
