//! CAN FD Click: MCP2517FD/MCP2518FD CAN FD controller
//!
//! The controller has up to 31 FIFOs in 2 KiB of message RAM, each
//! configured for either transmission or reception, and 32 acceptance
//! filters that steer received frames into receive FIFOs. FIFOs, filters and
//! bit timing can only be changed in configuration mode.
//!
//! [`CanFd::default_cfg`] sets up FIFO 1 for transmission and FIFO 2 for
//! reception with a filter accepting every frame:
//!
//! ```ignore
//! can.default_cfg(Config::default()).await?;
//!
//! let frame = Frame::new_fd(Id::Standard(0x123), &[0; 16], true).unwrap();
//! loop {
//!     match can.transmit(1, &frame).await {
//!         Err(nb::Error::WouldBlock) => continue,
//!         result => break result?,
//!     }
//! }
//! ```

use byte::BytesExt as _;

use crate::{hal_type::spi::SpiDevice, maybe_async_attr};

mod error;
mod frame;
pub mod ll;
mod timing;

pub use error::Error;
pub use frame::{dlc_to_len, len_to_dlc, Frame, Id, MAX_DATA_LEN};
pub use timing::{BitTiming, Phase};

use frame::{RxLayout, TxObject};

/// Oscillator of the CAN FD Click
pub const DEFAULT_SYSCLK_HZ: u32 = 40_000_000;

/// Number of FIFOs, the transmit queue included
const FIFO_COUNT: usize = 32;

/// Number of acceptance filters
const FILTER_COUNT: u8 = 32;

/// Polls of `OPMOD` before giving up on a mode change
const MODE_POLLS: u32 = 1000;

/// Second byte of `C1FIFOCONm`
const FIFOCON_UINC: u8 = 1 << 0;
const FIFOCON_TXREQ: u8 = 1 << 1;

/// Enable bit of a `C1FLTCONm` byte
const FLTCON_ENABLE: u8 = 1 << 7;

const TXAT_UNLIMITED: u8 = 0b11;
const TDCMOD_AUTO: u8 = 0b10;

/// Largest message object: header, timestamp and 64 data bytes
const MAX_OBJECT_LEN: usize = 8 + 4 + MAX_DATA_LEN;

/// Operation mode
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum OperationMode {
    /// CAN FD and classic CAN frames
    NormalFd = 0,
    Sleep = 1,
    InternalLoopback = 2,
    ListenOnly = 3,
    Configuration = 4,
    ExternalLoopback = 5,
    /// Classic CAN frames only, FD frames are error frames
    NormalClassic = 6,
    /// Receive and acknowledge, never transmit
    Restricted = 7,
}

impl OperationMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => OperationMode::NormalFd,
            1 => OperationMode::Sleep,
            2 => OperationMode::InternalLoopback,
            3 => OperationMode::ListenOnly,
            4 => OperationMode::Configuration,
            5 => OperationMode::ExternalLoopback,
            6 => OperationMode::NormalClassic,
            _ => OperationMode::Restricted,
        }
    }
}

/// Whether a FIFO transmits or receives
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Transmit,
    #[default]
    Receive,
}

/// Payload bytes reserved per message object
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PayloadSize {
    Bytes8 = 0,
    Bytes12 = 1,
    Bytes16 = 2,
    Bytes20 = 3,
    Bytes24 = 4,
    Bytes32 = 5,
    Bytes48 = 6,
    #[default]
    Bytes64 = 7,
}

impl PayloadSize {
    /// Payload size in bytes
    pub fn len(self) -> usize {
        match self {
            PayloadSize::Bytes8 => 8,
            PayloadSize::Bytes12 => 12,
            PayloadSize::Bytes16 => 16,
            PayloadSize::Bytes20 => 20,
            PayloadSize::Bytes24 => 24,
            PayloadSize::Bytes32 => 32,
            PayloadSize::Bytes48 => 48,
            PayloadSize::Bytes64 => 64,
        }
    }
}

/// FIFO configuration
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FifoConfig {
    pub direction: Direction,
    /// Number of message objects, 1 to 32
    pub depth: u8,
    pub payload_size: PayloadSize,
    /// Transmit priority, 0 (lowest) to 31
    pub priority: u8,
    /// Store the time base counter with received frames
    pub timestamps: bool,
}

impl Default for FifoConfig {
    fn default() -> Self {
        FifoConfig {
            direction: Direction::Receive,
            depth: 8,
            payload_size: PayloadSize::Bytes64,
            priority: 0,
            timestamps: false,
        }
    }
}

/// Bus configuration applied by [`CanFd::default_cfg`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// System clock in Hz
    pub sysclk_hz: u32,
    /// Arbitration phase bit rate
    pub nominal_bitrate: u32,
    /// Data phase bit rate
    pub data_bitrate: u32,
    /// Sample point of both phases, per mille
    pub sample_point: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sysclk_hz: DEFAULT_SYSCLK_HZ,
            nominal_bitrate: 500_000,
            data_bitrate: 2_000_000,
            sample_point: 800,
        }
    }
}

/// Error counters and fault confinement state
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorCounters {
    /// Transmit error counter
    pub tec: u8,
    /// Receive error counter
    pub rec: u8,
    /// One of the counters reached 96
    pub warning: bool,
    pub rx_passive: bool,
    pub tx_passive: bool,
    pub bus_off: bool,
}

/// Entry point to the CAN FD driver API
pub struct CanFd<SPI> {
    ll: ll::Mcp2517fd<SPI>,
    layouts: [RxLayout; FIFO_COUNT],
    directions: [Direction; FIFO_COUNT],
}

const RESET_LAYOUT: RxLayout = RxLayout {
    timestamps: false,
    payload_len: 8,
};

/// FIFOs receive after reset, the transmit queue always transmits
const RESET_DIRECTIONS: [Direction; FIFO_COUNT] = {
    let mut directions = [Direction::Receive; FIFO_COUNT];
    directions[0] = Direction::Transmit;
    directions
};

impl<SPI> CanFd<SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Create a new instance of `CanFd`
    pub fn new(spi: SPI) -> Self {
        CanFd {
            ll: ll::Mcp2517fd::new(spi),
            layouts: [RESET_LAYOUT; FIFO_COUNT],
            directions: RESET_DIRECTIONS,
        }
    }

    /// Returns the register-level interface
    pub fn ll(&mut self) -> &mut ll::Mcp2517fd<SPI> {
        &mut self.ll
    }

    /// Release the SPI bus
    pub fn free(self) -> SPI {
        self.ll.spi
    }

    /// Reset the controller into configuration mode
    #[maybe_async_attr]
    pub async fn reset(&mut self) -> Result<(), Error<SPI>> {
        self.ll.reset().await?;
        self.layouts = [RESET_LAYOUT; FIFO_COUNT];
        self.directions = RESET_DIRECTIONS;
        Ok(())
    }

    /// Request an operation mode and wait until the controller is in it
    ///
    /// Leaving normal mode waits for the end of the current frame.
    #[maybe_async_attr]
    pub async fn request_mode(&mut self, mode: OperationMode) -> Result<(), Error<SPI>> {
        self.ll.c1con().modify(|_, w| w.reqop(mode as u8)).await?;

        for _ in 0..MODE_POLLS {
            if self.operation_mode().await? == mode {
                debug!("mcp2517fd mode {}", mode);
                return Ok(());
            }
        }

        Err(Error::ModeChangeTimeout)
    }

    /// Current operation mode
    #[maybe_async_attr]
    pub async fn operation_mode(&mut self) -> Result<OperationMode, Error<SPI>> {
        let opmod = self.ll.c1con().read().await?.opmod();
        Ok(OperationMode::from_bits(opmod))
    }

    /// Program nominal and data bit timing
    ///
    /// Transmitter delay compensation runs in automatic mode with the offset
    /// taken from the data phase timing.
    #[maybe_async_attr]
    pub async fn configure_bit_timing(
        &mut self,
        nominal: BitTiming,
        data: BitTiming,
    ) -> Result<(), Error<SPI>> {
        let valid = |t: &BitTiming, tseg1_max: u16, tseg2_max: u8| {
            (1..=256).contains(&t.brp)
                && (1..=tseg1_max).contains(&t.tseg1)
                && (1..=tseg2_max).contains(&t.tseg2)
                && (1..=t.tseg2).contains(&t.sjw)
        };
        if !valid(&nominal, 256, 128) || !valid(&data, 32, 16) {
            return Err(Error::InvalidConfiguration);
        }

        self.ll
            .c1nbtcfg()
            .write(|w| {
                w.brp((nominal.brp - 1) as u8)
                    .tseg1((nominal.tseg1 - 1) as u8)
                    .tseg2(nominal.tseg2 - 1)
                    .sjw(nominal.sjw - 1)
            })
            .await?;
        self.ll
            .c1dbtcfg()
            .write(|w| {
                w.brp((data.brp - 1) as u8)
                    .tseg1((data.tseg1 - 1) as u8)
                    .tseg2(data.tseg2 - 1)
                    .sjw(data.sjw - 1)
            })
            .await?;
        self.ll
            .c1tdc()
            .write(|w| w.tdcmod(TDCMOD_AUTO).tdco(data.tdc_offset()))
            .await?;

        Ok(())
    }

    /// Configure FIFO `fifo` (1 to 31)
    #[maybe_async_attr]
    pub async fn configure_fifo(&mut self, fifo: u8, config: FifoConfig) -> Result<(), Error<SPI>> {
        if !(1..FIFO_COUNT as u8).contains(&fifo)
            || !(1..=32).contains(&config.depth)
            || config.priority > 31
        {
            return Err(Error::InvalidConfiguration);
        }
        let transmit = config.direction == Direction::Transmit;

        self.ll
            .c1fifocon(fifo)
            .write(|w| {
                if transmit {
                    w.txen(1).txat(TXAT_UNLIMITED).txpri(config.priority);
                } else {
                    w.rxtsen(config.timestamps as u8);
                }
                w.fsize(config.depth - 1)
                    .plsize(config.payload_size as u8)
            })
            .await?;

        self.layouts[fifo as usize] = RxLayout {
            timestamps: !transmit && config.timestamps,
            payload_len: config.payload_size.len(),
        };
        self.directions[fifo as usize] = config.direction;

        Ok(())
    }

    /// Route frames matching `id` under `mask` into `fifo` through `filter`
    ///
    /// Bits set in `mask` have to match, in the format of `id`. A zero mask
    /// accepts every frame, standard and extended; any other mask only
    /// matches frames in the format of `id`.
    #[maybe_async_attr]
    pub async fn configure_filter(
        &mut self,
        filter: u8,
        id: Id,
        mask: u32,
        fifo: u8,
    ) -> Result<(), Error<SPI>> {
        if filter >= FILTER_COUNT || !(1..FIFO_COUNT as u8).contains(&fifo) {
            return Err(Error::InvalidConfiguration);
        }
        let control = ll::filter_control_address(filter);
        let mask = match id {
            Id::Standard(_) => Id::Standard(mask as u16),
            Id::Extended(_) => Id::Extended(mask),
        };

        // Filter objects can only be changed while the filter is disabled
        self.ll.write(control, &[0]).await?;
        self.ll
            .c1fltobj(filter)
            .write(|w| w.bits(id.object_word()).exide(id.is_extended() as u8))
            .await?;
        self.ll
            .c1mask(filter)
            .write(|w| w.bits(mask.object_word()).mide((mask.object_word() != 0) as u8))
            .await?;
        self.ll.write(control, &[FLTCON_ENABLE | fifo]).await?;

        Ok(())
    }

    /// Reset the controller and bring it on the bus
    ///
    /// Uses FIFO 1 for transmission and FIFO 2 for reception, both 8 deep
    /// with 64-byte payloads, and filter 0 accepting every frame into
    /// FIFO 2. The transmit queue and transmit event FIFO stay disabled.
    #[maybe_async_attr]
    pub async fn default_cfg(&mut self, config: Config) -> Result<(), Error<SPI>> {
        let nominal = BitTiming::calculate(
            config.sysclk_hz,
            config.nominal_bitrate,
            config.sample_point,
            Phase::Nominal,
        )
        .ok_or(Error::InvalidConfiguration)?;
        let data = BitTiming::calculate(
            config.sysclk_hz,
            config.data_bitrate,
            config.sample_point,
            Phase::Data,
        )
        .ok_or(Error::InvalidConfiguration)?;

        self.reset().await?;
        self.request_mode(OperationMode::Configuration).await?;

        self.ll
            .c1con()
            .modify(|_, w| w.isocrcen(1).brsdis(0).txqen(0).stef(0))
            .await?;
        self.configure_bit_timing(nominal, data).await?;

        self.configure_fifo(
            1,
            FifoConfig {
                direction: Direction::Transmit,
                ..FifoConfig::default()
            },
        )
        .await?;
        self.configure_fifo(2, FifoConfig::default()).await?;
        self.configure_filter(0, Id::Standard(0), 0, 2).await?;

        self.request_mode(OperationMode::NormalFd).await
    }

    /// Queue `frame` in transmit FIFO `fifo`, 0 being the transmit queue
    ///
    /// `fifo` has to be configured for transmission.
    #[maybe_async_attr]
    pub async fn transmit(&mut self, fifo: u8, frame: &Frame) -> nb::Result<(), Error<SPI>> {
        if fifo as usize >= FIFO_COUNT || self.directions[fifo as usize] != Direction::Transmit {
            return Err(nb::Error::Other(Error::InvalidConfiguration));
        }
        if frame.data().len() > self.layouts[fifo as usize].payload_len {
            return Err(nb::Error::Other(Error::PayloadTooLarge));
        }

        let status = self
            .ll
            .c1fifosta(fifo)
            .read()
            .await
            .map_err(Error::Spi)?;
        if status.tfnrfnif() == 0 {
            return Err(nb::Error::WouldBlock);
        }

        let user_address = self
            .ll
            .c1fifoua(fifo)
            .read()
            .await
            .map_err(Error::Spi)?
            .bits();

        let mut object = [0; MAX_OBJECT_LEN];
        let mut len = 0;
        object
            .write(&mut len, TxObject(frame))
            .map_err(Error::Frame)?;

        self.ll
            .write(ll::RAM_START + user_address as u16, &object[..len])
            .await
            .map_err(Error::Spi)?;

        let control = self.ll.c1fifocon(fifo).address() + 1;
        self.ll
            .write(control, &[FIFOCON_UINC | FIFOCON_TXREQ])
            .await
            .map_err(Error::Spi)?;

        Ok(())
    }

    /// Take the oldest frame out of receive FIFO `fifo`
    #[maybe_async_attr]
    pub async fn receive(&mut self, fifo: u8) -> nb::Result<Frame, Error<SPI>> {
        if !(1..FIFO_COUNT as u8).contains(&fifo)
            || self.directions[fifo as usize] != Direction::Receive
        {
            return Err(nb::Error::Other(Error::InvalidConfiguration));
        }

        let status = self
            .ll
            .c1fifosta(fifo)
            .read()
            .await
            .map_err(Error::Spi)?;
        if status.tfnrfnif() == 0 {
            return Err(nb::Error::WouldBlock);
        }
        if status.rxovif() == 1 {
            warn!("mcp2517fd fifo {=u8} overflowed", fifo);
        }

        let user_address = self
            .ll
            .c1fifoua(fifo)
            .read()
            .await
            .map_err(Error::Spi)?
            .bits();

        let layout = self.layouts[fifo as usize];
        let mut object = [0; MAX_OBJECT_LEN];
        let object = &mut object[..layout.object_len()];
        self.ll
            .read(ll::RAM_START + user_address as u16, object)
            .await
            .map_err(Error::Spi)?;

        let frame: Frame = object
            .read_with(&mut 0, layout)
            .map_err(Error::Frame)?;

        let control = self.ll.c1fifocon(fifo).address() + 1;
        self.ll
            .write(control, &[FIFOCON_UINC])
            .await
            .map_err(Error::Spi)?;

        Ok(frame)
    }

    /// Read the error counters
    #[maybe_async_attr]
    pub async fn error_counters(&mut self) -> Result<ErrorCounters, Error<SPI>> {
        let trec = self.ll.c1trec().read().await?;

        Ok(ErrorCounters {
            tec: trec.tec(),
            rec: trec.rec(),
            warning: trec.ewarn() == 1,
            rx_passive: trec.rxbp() == 1,
            tx_passive: trec.txbp() == 1,
            bus_off: trec.txbo() == 1,
        })
    }
}
