//! Low-level interface to the CC1120
//!
//! This module implements a register-level interface to the CC1120. Users of
//! this library should typically not need to use this. Please consider using
//! the [high-level interface] instead.
//!
//! Every access starts with a header byte: bit 7 selects read, bit 6 burst
//! access and bits 5..0 the address. Address `0x2F` is a prefix for the
//! extended register space, the extended address follows in a second byte.
//! Register addresses in this module are `u16`, extended registers are
//! written as `0x2Fxx`.
//!
//! The chip shifts out its [`Status`] byte while the header is clocked in.
//!
//! [high-level interface]: super::Cc1120

use core::{fmt, marker::PhantomData};

use embedded_hal::spi::{ErrorType, Operation};

use crate::{
    hal_type::spi::SpiDevice,
    maybe_async_attr,
    register::{Readable, Register, RegisterValue, Writable},
};

const READ: u8 = 0x80;
const BURST: u8 = 0x40;

/// Prefix of the extended register space
pub const EXTENDED_ADDRESS: u8 = 0x2F;

/// Address of the TX/RX FIFO
pub const FIFO: u16 = 0x3F;

/// Address of the first frequency register (`FREQ2`, followed by `FREQ1` and
/// `FREQ0`)
pub const FREQ2: u16 = 0x2F0C;

/// Command strobes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Strobe {
    /// Reset chip
    Sres = 0x30,
    /// Enable and calibrate the frequency synthesizer
    Sfstxon = 0x31,
    /// Turn off the crystal oscillator once CS goes high
    Sxoff = 0x32,
    /// Calibrate the frequency synthesizer and turn it off
    Scal = 0x33,
    /// Enable RX
    Srx = 0x34,
    /// Enable TX
    Stx = 0x35,
    /// Exit RX/TX, turn off the frequency synthesizer
    Sidle = 0x36,
    /// Automatic frequency compensation
    Safc = 0x37,
    /// Start the eWOR sequence
    Swor = 0x38,
    /// Enter sleep mode when CS goes high
    Spwd = 0x39,
    /// Flush the RX FIFO
    Sfrx = 0x3A,
    /// Flush the TX FIFO
    Sftx = 0x3B,
    /// Reset the eWOR timer
    Sworrst = 0x3C,
    /// No operation, returns the status byte
    Snop = 0x3D,
}

/// The status byte returned with every access
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Status(pub u8);

impl Status {
    /// `CHIP_RDYn` is low: the crystal is running and the chip is ready
    pub fn chip_ready(self) -> bool {
        self.0 & 0x80 == 0
    }

    /// Main radio control state
    pub fn state(self) -> State {
        match (self.0 >> 4) & 0x07 {
            0 => State::Idle,
            1 => State::Rx,
            2 => State::Tx,
            3 => State::FastTxReady,
            4 => State::Calibrate,
            5 => State::Settling,
            6 => State::RxFifoError,
            _ => State::TxFifoError,
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Status {{ chip_ready: {}, state: {:?} }}",
            self.chip_ready(),
            self.state()
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Status {{ chip_ready: {}, state: {} }}",
            self.chip_ready(),
            self.state()
        );
    }
}

/// Main radio control state, as reported by the status byte
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Idle
    Idle,
    /// Receive mode
    Rx,
    /// Transmit mode
    Tx,
    /// Fast TX ready (FSTXON)
    FastTxReady,
    /// Frequency synthesizer calibration running
    Calibrate,
    /// PLL settling
    Settling,
    /// RX FIFO overflow or underflow
    RxFifoError,
    /// TX FIFO overflow or underflow
    TxFifoError,
}

/// Entry point to the CC1120 driver's low-level API
///
/// Please consider using [Cc1120] instead.
///
/// [Cc1120]: super::Cc1120
pub struct Cc1120<SPI> {
    pub(crate) spi: SPI,
}

impl<SPI> Cc1120<SPI> {
    /// Create a new instance of `Cc1120`
    ///
    /// Requires the SPI device the CC1120 is connected to.
    pub fn new(spi: SPI) -> Self {
        Cc1120 { spi }
    }

    /// Allow access to the SPI bus
    pub fn bus(&mut self) -> &mut SPI {
        &mut self.spi
    }
}

fn header(address: u16, flags: u8) -> ([u8; 2], usize) {
    if address > 0xFF {
        ([EXTENDED_ADDRESS | flags, address as u8], 2)
    } else {
        ([(address as u8 & 0x3F) | flags, 0], 1)
    }
}

impl<SPI> Cc1120<SPI>
where
    SPI: SpiDevice<u8>,
{
    #[maybe_async_attr]
    async fn access(
        &mut self,
        address: u16,
        flags: u8,
        data: Operation<'_, u8>,
    ) -> Result<Status, Error<SPI>> {
        let (mut header, len) = header(address, flags);
        self.spi
            .transaction(&mut [Operation::TransferInPlace(&mut header[..len]), data])
            .await
            .map_err(|error| {
                if flags & READ != 0 {
                    Error::Transfer(error)
                } else {
                    Error::Write(error)
                }
            })?;

        Ok(Status(header[0]))
    }

    /// Read consecutive registers starting at `address`
    ///
    /// Uses a burst access when `buf` holds more than one byte.
    #[maybe_async_attr]
    pub async fn read_registers(
        &mut self,
        address: u16,
        buf: &mut [u8],
    ) -> Result<Status, Error<SPI>> {
        let flags = if buf.len() > 1 { READ | BURST } else { READ };
        self.access(address, flags, Operation::Read(buf)).await
    }

    /// Write consecutive registers starting at `address`
    #[maybe_async_attr]
    pub async fn write_registers(&mut self, address: u16, data: &[u8]) -> Result<Status, Error<SPI>> {
        let flags = if data.len() > 1 { BURST } else { 0 };
        self.access(address, flags, Operation::Write(data)).await
    }

    /// Read a single register
    #[maybe_async_attr]
    pub async fn read_register(&mut self, address: u16) -> Result<u8, Error<SPI>> {
        let mut buf = [0];
        self.read_registers(address, &mut buf).await?;

        Ok(buf[0])
    }

    /// Write a single register
    #[maybe_async_attr]
    pub async fn write_register(&mut self, address: u16, value: u8) -> Result<Status, Error<SPI>> {
        self.write_registers(address, &[value]).await
    }

    /// Issue a command strobe
    #[maybe_async_attr]
    pub async fn strobe(&mut self, strobe: Strobe) -> Result<Status, Error<SPI>> {
        let mut buf = [strobe as u8];
        self.spi
            .transfer_in_place(&mut buf)
            .await
            .map_err(Error::Transfer)?;

        Ok(Status(buf[0]))
    }

    /// Write data to the TX FIFO
    #[maybe_async_attr]
    pub async fn write_fifo(&mut self, data: &[u8]) -> Result<Status, Error<SPI>> {
        self.access(FIFO, BURST, Operation::Write(data)).await
    }

    /// Read data from the RX FIFO
    #[maybe_async_attr]
    pub async fn read_fifo(&mut self, buf: &mut [u8]) -> Result<Status, Error<SPI>> {
        self.access(FIFO, READ | BURST, Operation::Read(buf)).await
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`Cc1120`].
pub struct RegAccessor<'s, R, SPI>(&'s mut Cc1120<SPI>, PhantomData<R>);

impl<'s, R, SPI> RegAccessor<'s, R, SPI>
where
    SPI: SpiDevice<u8>,
    R: Register<Address = u16>,
{
    /// Read from the register
    #[inline]
    #[maybe_async_attr]
    pub async fn read(&mut self) -> Result<R::Read, Error<SPI>>
    where
        R: Readable,
    {
        let mut buf = [0; 4];
        let buf = &mut buf[..R::Raw::LEN];
        self.0.read_registers(R::ADDRESS, buf).await?;

        Ok(R::from_raw(R::Raw::from_be_slice(buf)))
    }

    /// Write to the register
    #[inline]
    #[maybe_async_attr]
    pub async fn write<F>(&mut self, f: F) -> Result<(), Error<SPI>>
    where
        R: Writable,
        F: FnOnce(&mut R::Write) -> &mut R::Write,
    {
        let mut w = R::write(R::Raw::default());
        f(&mut w);

        let mut buf = [0; 4];
        R::into_raw(&w).write_be(&mut buf);
        self.0
            .write_registers(R::ADDRESS, &buf[..R::Raw::LEN])
            .await?;

        Ok(())
    }

    /// Modify the register
    #[inline]
    #[maybe_async_attr]
    pub async fn modify<F>(&mut self, f: F) -> Result<(), Error<SPI>>
    where
        R: Readable + Writable,
        F: for<'r> FnOnce(&R::Read, &'r mut R::Write) -> &'r mut R::Write,
    {
        let r = self.read().await?;
        let mut w = R::write(R::raw(&r));
        f(&r, &mut w);

        let mut buf = [0; 4];
        R::into_raw(&w).write_be(&mut buf);
        self.0
            .write_registers(R::ADDRESS, &buf[..R::Raw::LEN])
            .await?;

        Ok(())
    }
}

/// An SPI error that can occur when communicating with the CC1120
pub enum Error<SPI>
where
    SPI: ErrorType,
{
    /// SPI error occured during a read transaction
    Transfer(SPI::Error),

    /// SPI error occured during a write transaction
    Write(SPI::Error),
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<SPI> fmt::Debug for Error<SPI>
where
    SPI: ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Transfer(error) => write!(f, "Transfer({:?})", error),
            Error::Write(error) => write!(f, "Write({:?})", error),
        }
    }
}

#[cfg(feature = "defmt")]
impl<SPI> defmt::Format for Error<SPI>
where
    SPI: ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Transfer(_) => defmt::write!(f, "Transfer()"),
            Error::Write(_) => defmt::write!(f, "Write()"),
        }
    }
}

impl_register! {
    Cc1120<SPI>, u16;

    0x0000, u8, RW, IOCFG3(iocfg3) { /// GPIO3 pin configuration
        gpio3_cfg, 0, 5, u8; /// Output selection
        gpio3_inv, 6, 6, u8; /// Invert output
        gpio3_atran, 7, 7, u8; /// Analog transfer enable
    }
    0x0001, u8, RW, IOCFG2(iocfg2) { /// GPIO2 pin configuration
        gpio2_cfg, 0, 5, u8; /// Output selection
        gpio2_inv, 6, 6, u8; /// Invert output
        gpio2_atran, 7, 7, u8; /// Analog transfer enable
    }
    0x0002, u8, RW, IOCFG1(iocfg1) { /// GPIO1 pin configuration
        gpio1_cfg, 0, 5, u8; /// Output selection
        gpio1_inv, 6, 6, u8; /// Invert output
        gpio1_atran, 7, 7, u8; /// Analog transfer enable
    }
    0x0003, u8, RW, IOCFG0(iocfg0) { /// GPIO0 pin configuration
        gpio0_cfg, 0, 5, u8; /// Output selection
        gpio0_inv, 6, 6, u8; /// Invert output
        gpio0_atran, 7, 7, u8; /// Analog transfer enable
    }
    0x0008, u8, RW, SYNC_CFG1(sync_cfg1) { /// Sync word detection configuration
        sync_thr,  0, 4, u8; /// Soft decision sync word threshold
        sync_mode, 5, 7, u8; /// Sync word length
    }
    0x001E, u8, RW, FIFO_CFG(fifo_cfg) { /// FIFO configuration
        fifo_thr,      0, 6, u8; /// FIFO threshold
        crc_autoflush, 7, 7, u8; /// Flush the RX FIFO on a CRC error
    }
    0x0021, u8, RW, FS_CFG(fs_cfg) { /// Frequency synthesizer configuration
        fsd_bandselect, 0, 3, u8; /// LO divider band selection
        fs_lock_en,     4, 4, u8; /// Out-of-lock detector enable
    }
    0x0026, u8, RW, PKT_CFG2(pkt_cfg2) { /// Packet configuration register 2
        pkt_format, 0, 1, u8; /// Packet format (0: normal FIFO mode)
        cca_mode,   2, 4, u8; /// Clear channel assessment mode
    }
    0x0027, u8, RW, PKT_CFG1(pkt_cfg1) { /// Packet configuration register 1
        append_status,  0, 0, u8; /// Append RSSI and LQI/CRC status to the payload
        byte_swap_en,   1, 1, u8; /// Swap bytes in TX and RX FIFO
        crc_cfg,        2, 3, u8; /// CRC configuration (0: off, 1: CRC16 init 0xFFFF)
        addr_check_cfg, 4, 5, u8; /// Address check configuration
        white_data,     6, 6, u8; /// Data whitening
    }
    0x0028, u8, RW, PKT_CFG0(pkt_cfg0) { /// Packet configuration register 0
        uart_swap_en,  0, 0, u8; /// Swap start and stop bits in UART mode
        uart_mode_en,  1, 1, u8; /// UART mode
        pkt_bit_len,   2, 4, u8; /// Bits in the last byte of fixed length packets
        length_config, 5, 6, u8; /// Packet length mode (1: variable)
    }
    0x002A, u8, RW, RFEND_CFG0(rfend_cfg0) { /// RFEND configuration register 0
        ant_div_rx_term_cfg,   0, 2, u8; /// Antenna diversity and termination
        term_on_bad_packet_en, 3, 3, u8; /// Terminate RX on a bad packet
        txoff_mode,            4, 5, u8; /// State after TX (0: IDLE)
        cal_end_wake_up_en,    6, 6, u8; /// Wake-up on end of calibration
    }
    0x002E, u8, RW, PKT_LEN(pkt_len) { /// Packet length configuration
        packet_length, 0, 7, u8; /// Maximum length in variable length mode
    }
    0x2F15, u8, RW, FS_CAL2(fs_cal2) { /// Frequency synthesizer calibration register 2
        vcdac_start, 0, 5, u8; /// VCDAC start value
    }
    0x2F18, u8, RW, FS_CHP(fs_chp) { /// Charge pump current calibration
        chp_cal_curr, 0, 5, u8; /// Charge pump current calibration result
    }
    0x2F23, u8, RW, FS_VCO4(fs_vco4) { /// VCO current calibration
        vco_cal_curr, 0, 4, u8; /// VCO current calibration result
    }
    0x2F25, u8, RW, FS_VCO2(fs_vco2) { /// VCO capacitor array calibration
        vco_cal_capdac, 0, 6, u8; /// VCO capacitor array calibration result
    }
    0x2F71, u16, RO, RSSI(rssi) { /// Received signal strength (RSSI1, RSSI0)
        rssi_valid,          0,  0, u8; /// RSSI value is valid
        carrier_sense_valid, 1,  1, u8; /// Carrier sense is valid
        carrier_sense,       2,  2, u8; /// Carrier sense
        rssi_3_0,            3,  6, u8; /// RSSI fractional part
        rssi_11_4,           8, 15, u8; /// RSSI integer part, two's complement
    }
    0x2F73, u8, RO, MARCSTATE(marcstate) { /// Main radio control state machine state
        marc_state,      0, 4, u8; /// MARC state
        marc_2pin_state, 5, 6, u8; /// MARC 2-pin state
    }
    0x2F8F, u8, RO, PARTNUMBER(partnumber) { /// Part number
        partnum, 0, 7, u8; /// 0x48 for the CC1120
    }
    0x2F90, u8, RO, PARTVERSION(partversion) { /// Part revision
        partver, 0, 7, u8; /// Silicon revision
    }
    0x2FD6, u8, RO, NUM_TXBYTES(num_txbytes) { /// Bytes in the TX FIFO
        txbytes, 0, 7, u8; /// Number of bytes
    }
    0x2FD7, u8, RO, NUM_RXBYTES(num_rxbytes) { /// Bytes in the RX FIFO
        rxbytes, 0, 7, u8; /// Number of bytes
    }
}
