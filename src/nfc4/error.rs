use core::fmt;
use core::fmt::{Display, Formatter};

use embedded_hal::{digital, spi};

use super::ll;

/// An error that can occur when talking to the ST25R3916 or to a card
pub enum Error<SPI>
where
    SPI: spi::ErrorType,
{
    /// Error occured while using SPI bus
    Spi(ll::Error<SPI>),

    /// Error occured while reading the IRQ line
    Irq(digital::ErrorKind),

    /// The chip did not identify as an ST25R3916
    WrongChip(u8),

    /// The oscillator did not report stable frequency in time
    OscillatorTimeout,

    /// No answer within the frame waiting time, or the chip went silent
    Timeout,

    /// Received frame has a wrong CRC
    Crc,

    /// Received frame has a parity error
    Parity,

    /// Hard or soft framing error
    Framing,

    /// Bit collision in the received frame
    Collision {
        /// Byte position of the first collision in the frame
        byte: u8,
        /// Bit position of the first collision within that byte
        bit: u8,
    },

    /// The FIFO overflowed during reception
    Overrun,

    /// The FIFO ran empty during transmission
    FifoUnderflow,

    /// Buffer too small
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },

    /// The configuration was not valid
    InvalidConfiguration,

    /// UID check byte does not match
    Bcc,

    /// Card answer violates ISO14443-3
    Protocol,

    /// The transceive operation was already aborted by an earlier error
    TransceiveFailed,
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
            Error::Irq(error) => write!(f, "Irq({:?})", error),
            Error::WrongChip(identity) => write!(f, "WrongChip({:#04x})", identity),
            Error::OscillatorTimeout => write!(f, "OscillatorTimeout"),
            Error::Timeout => write!(f, "Timeout"),
            Error::Crc => write!(f, "Crc"),
            Error::Parity => write!(f, "Parity"),
            Error::Framing => write!(f, "Framing"),
            Error::Collision { byte, bit } => {
                write!(f, "Collision {{ byte: {}, bit: {} }}", byte, bit)
            }
            Error::Overrun => write!(f, "Overrun"),
            Error::FifoUnderflow => write!(f, "FifoUnderflow"),
            Error::BufferTooSmall { required_len } => {
                write!(f, "BufferTooSmall {{ required_len: {:?} }}", required_len,)
            }
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            Error::Bcc => write!(f, "Bcc"),
            Error::Protocol => write!(f, "Protocol"),
            Error::TransceiveFailed => write!(f, "TransceiveFailed"),
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
            Error::Irq(error) => defmt::write!(f, "Irq({})", error),
            Error::WrongChip(identity) => defmt::write!(f, "WrongChip({=u8:#04x})", identity),
            Error::OscillatorTimeout => defmt::write!(f, "OscillatorTimeout"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::Crc => defmt::write!(f, "Crc"),
            Error::Parity => defmt::write!(f, "Parity"),
            Error::Framing => defmt::write!(f, "Framing"),
            Error::Collision { byte, bit } => {
                defmt::write!(f, "Collision {{ byte: {}, bit: {} }}", byte, bit)
            }
            Error::Overrun => defmt::write!(f, "Overrun"),
            Error::FifoUnderflow => defmt::write!(f, "FifoUnderflow"),
            Error::BufferTooSmall { required_len } => {
                defmt::write!(f, "BufferTooSmall {{ required_len: {} }}", required_len,)
            }
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
            Error::Bcc => defmt::write!(f, "Bcc"),
            Error::Protocol => defmt::write!(f, "Protocol"),
            Error::TransceiveFailed => defmt::write!(f, "TransceiveFailed"),
        }
    }
}
