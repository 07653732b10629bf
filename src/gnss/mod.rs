//! GNSS Click boards: NMEA 0183 receivers on a UART
//!
//! The entry point to this driver is the [Gnss] struct. It reads sentences
//! from the receiver with [`Gnss::read_sentence`], or the next position fix
//! with [`Gnss::read_fix`], and sends proprietary configuration commands
//! (PMTK, PUBX) with [`Gnss::send_command`]. Parsing lives in [`nmea`] and
//! does not need the driver.

use core::fmt;
use core::fmt::{Display, Formatter, Write as _};

use embedded_hal::digital::{self, Error as _, OutputPin};
use embedded_io::ErrorType;

use crate::{
    hal_type::delay::DelayNs,
    io_type::{Read, Write},
    maybe_async_attr,
};

pub mod nmea;

pub use nmea::{Gga, Gll, Rmc, Sentence, SentenceReader, MAX_SENTENCE_LEN};

/// Time the reset line is held low
const RESET_HOLD_MS: u32 = 10;

/// Start-up time of the receiver after reset
const STARTUP_MS: u32 = 1000;

/// Entry point to the GNSS driver API
pub struct Gnss<UART, RST> {
    uart: UART,
    rst: RST,
    reader: SentenceReader,
}

impl<UART, RST> Gnss<UART, RST>
where
    UART: Read + Write,
    RST: OutputPin,
{
    /// Create a new instance of `Gnss`
    ///
    /// Requires the UART connected to the receiver, set up for its baud rate
    /// (9600 by default on most boards), and the reset pin.
    pub fn new(uart: UART, rst: RST) -> Self {
        Gnss {
            uart,
            rst,
            reader: SentenceReader::new(),
        }
    }

    /// Release the UART and the reset pin
    pub fn free(self) -> (UART, RST) {
        (self.uart, self.rst)
    }

    /// Reset the receiver
    ///
    /// Holds the reset line low, releases it and waits for the receiver to
    /// start up. Partially received sentences are dropped.
    #[maybe_async_attr]
    pub async fn reset<D>(&mut self, delay: &mut D) -> Result<(), Error<UART>>
    where
        D: DelayNs,
    {
        self.rst.set_low().map_err(|error| Error::Pin(error.kind()))?;
        delay.delay_ms(RESET_HOLD_MS).await;
        self.rst.set_high().map_err(|error| Error::Pin(error.kind()))?;
        delay.delay_ms(STARTUP_MS).await;

        self.reader = SentenceReader::new();
        Ok(())
    }

    #[maybe_async_attr]
    async fn read_byte(&mut self) -> Result<u8, Error<UART>> {
        let mut byte = [0];
        if self.uart.read(&mut byte).await.map_err(Error::Uart)? == 0 {
            return Err(Error::EndOfStream);
        }

        Ok(byte[0])
    }

    /// Read the next valid sentence into `buf`
    ///
    /// Lines that fail to parse, e.g. because of a checksum mismatch, are
    /// skipped.
    #[maybe_async_attr]
    pub async fn read_sentence<'b>(
        &mut self,
        buf: &'b mut [u8],
    ) -> Result<Sentence<'b>, Error<UART>> {
        let len = loop {
            let byte = self.read_byte().await?;
            let Some(line) = self.reader.push(byte) else {
                continue;
            };

            match Sentence::parse(line) {
                Ok(_) => {
                    if line.len() > buf.len() {
                        return Err(Error::BufferTooSmall {
                            required_len: line.len(),
                        });
                    }
                    buf[..line.len()].copy_from_slice(line.as_bytes());
                    break line.len();
                }
                Err(error) => warn!("dropping sentence: {}", error),
            }
        };

        let line = core::str::from_utf8(&buf[..len]).map_err(|_| nmea::Error::Format)?;
        Ok(Sentence::parse(line)?)
    }

    /// Read sentences until the next GGA and return it
    #[maybe_async_attr]
    pub async fn read_fix(&mut self) -> Result<Gga, Error<UART>> {
        let mut buf = [0; MAX_SENTENCE_LEN];

        loop {
            let sentence = self.read_sentence(&mut buf).await?;
            if sentence.kind == "GGA" {
                return Ok(Gga::try_from(&sentence)?);
            }
        }
    }

    /// Send a command
    ///
    /// `body` is everything between `$` and `*`, e.g. `PMTK220,1000`. The
    /// checksum and line ending are appended.
    #[maybe_async_attr]
    pub async fn send_command(&mut self, body: &str) -> Result<(), Error<UART>> {
        let mut line = heapless::String::<MAX_SENTENCE_LEN>::new();
        write!(line, "${}*{:02X}\r\n", body, nmea::checksum(body)).map_err(|_| {
            Error::BufferTooSmall {
                required_len: body.len() + 6,
            }
        })?;

        self.uart
            .write_all(line.as_bytes())
            .await
            .map_err(Error::Uart)?;
        self.uart.flush().await.map_err(Error::Uart)
    }
}

/// An error that can occur when talking to a GNSS receiver
pub enum Error<UART>
where
    UART: ErrorType,
{
    /// Error occured while using the UART
    Uart(UART::Error),

    /// Error occured while driving the reset pin
    Pin(digital::ErrorKind),

    /// The UART returned no more data
    EndOfStream,

    /// A sentence could not be parsed
    Nmea(nmea::Error),

    /// Buffer too small
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },
}

impl<UART> From<nmea::Error> for Error<UART>
where
    UART: ErrorType,
{
    fn from(error: nmea::Error) -> Self {
        Error::Nmea(error)
    }
}

impl<UART> Display for Error<UART>
where
    UART: ErrorType,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<UART> std::error::Error for Error<UART> where UART: ErrorType {}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<UART> fmt::Debug for Error<UART>
where
    UART: ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Uart(error) => write!(f, "Uart({:?})", error),
            Error::Pin(error) => write!(f, "Pin({:?})", error),
            Error::EndOfStream => write!(f, "EndOfStream"),
            Error::Nmea(error) => write!(f, "Nmea({:?})", error),
            Error::BufferTooSmall { required_len } => {
                write!(f, "BufferTooSmall {{ required_len: {:?} }}", required_len,)
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl<UART> defmt::Format for Error<UART>
where
    UART: ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Uart(error) => defmt::write!(f, "Uart({})", embedded_io::Error::kind(error)),
            Error::Pin(error) => defmt::write!(f, "Pin({})", error),
            Error::EndOfStream => defmt::write!(f, "EndOfStream"),
            Error::Nmea(error) => defmt::write!(f, "Nmea({})", error),
            Error::BufferTooSmall { required_len } => {
                defmt::write!(f, "BufferTooSmall {{ required_len: {} }}", required_len,)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::collections::VecDeque;

    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        digital::{Mock as PinMock, State as PinState, Transaction as PinTransaction},
        MockError,
    };

    /// UART replaying canned receiver output and recording what is sent
    #[derive(Default)]
    struct Uart {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl Uart {
        fn with_output(output: &str) -> Self {
            Uart {
                rx: output.bytes().collect(),
                tx: Vec::new(),
            }
        }

        fn drain_into(&mut self, buf: &mut [u8]) -> usize {
            let mut n = 0;
            while n < buf.len() {
                match self.rx.pop_front() {
                    Some(byte) => buf[n] = byte,
                    None => break,
                }
                n += 1;
            }
            n
        }
    }

    impl embedded_io::ErrorType for Uart {
        type Error = embedded_io::ErrorKind;
    }

    impl embedded_io::Read for Uart {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            Ok(self.drain_into(buf))
        }
    }

    impl embedded_io::Write for Uart {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl embedded_io_async::Read for Uart {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            Ok(self.drain_into(buf))
        }
    }

    impl embedded_io_async::Write for Uart {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    const OUTPUT: &str = concat!(
        "$GPTXT,01,01,02,ANTSTATUS=OK*3B\r\n",
        "$GNGGA,092725.00,4717.11399,N,00833.91590,E,1,08,1.01,499.6,M,48.0,M,,*46\r\n",
        "$GPGLL,4916.45,N,12311.12,W,225444,A,*1D\r\n",
        "$GNGGA,092725.00,4717.11399,N,00833.91590,E,1,08,1.01,499.6,M,48.0,M,,*45\r\n",
    );

    fn gnss(output: &str) -> Gnss<Uart, PinMock> {
        Gnss::new(Uart::with_output(output), PinMock::new(&[]))
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn sentences_are_read_in_order() {
        let mut gnss = gnss(OUTPUT);
        let mut buf = [0; MAX_SENTENCE_LEN];

        {
            let sentence = gnss.read_sentence(&mut buf).await.unwrap();
            assert_eq!(sentence.kind, "TXT");
        }

        // The GGA with the bad checksum is skipped
        {
            let sentence = gnss.read_sentence(&mut buf).await.unwrap();
            assert_eq!(sentence.kind, "GLL");
        }

        {
            let sentence = gnss.read_sentence(&mut buf).await.unwrap();
            assert_eq!(sentence.talker, "GN");
            assert_eq!(sentence.kind, "GGA");
        }

        assert!(matches!(
            gnss.read_sentence(&mut buf).await,
            Err(Error::EndOfStream)
        ));

        let (_, mut rst) = gnss.free();
        rst.done();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn read_fix_skips_other_sentences() {
        let mut gnss = gnss(OUTPUT);

        let fix = gnss.read_fix().await.unwrap();

        assert!(fix.has_fix());
        assert_eq!(fix.satellites, 8);
        assert_eq!(fix.altitude_m, Some(499.6));
        let latitude = fix.latitude.unwrap();
        assert!((latitude - (47.0 + 17.11399 / 60.0)).abs() < 1e-6);

        let (_, mut rst) = gnss.free();
        rst.done();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn small_buffer_is_reported() {
        let mut gnss = gnss(OUTPUT);
        let mut buf = [0; 16];

        let result = gnss.read_sentence(&mut buf).await;

        assert!(matches!(
            result,
            Err(Error::BufferTooSmall { required_len: 31 })
        ));

        let (_, mut rst) = gnss.free();
        rst.done();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn commands_are_framed() {
        let mut gnss = gnss("");

        gnss.send_command("PMTK220,1000").await.unwrap();
        gnss.send_command("PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0")
            .await
            .unwrap();

        let (uart, mut rst) = gnss.free();
        assert_eq!(
            uart.tx,
            b"$PMTK220,1000*1F\r\n$PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0*28\r\n"
        );
        rst.done();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn reset_pulses_pin_low() {
        let mut gnss = Gnss::new(
            Uart::default(),
            PinMock::new(&[
                PinTransaction::set(PinState::Low),
                PinTransaction::set(PinState::High),
            ]),
        );

        gnss.reset(&mut NoopDelay).await.unwrap();

        let (_, mut rst) = gnss.free();
        rst.done();
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn reset_pin_error_is_reported() {
        let mut gnss = Gnss::new(
            Uart::default(),
            PinMock::new(&[PinTransaction::set(PinState::Low)
                .with_error(MockError::Io(std::io::ErrorKind::NotConnected))]),
        );

        assert!(matches!(
            gnss.reset(&mut NoopDelay).await,
            Err(Error::Pin(digital::ErrorKind::Other))
        ));

        let (_, mut rst) = gnss.free();
        rst.done();
    }
}
