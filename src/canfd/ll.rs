//! Low-level interface to the MCP2517FD/MCP2518FD
//!
//! Every SPI transaction starts with a 16-bit instruction, sent MSB first:
//! a 4-bit command followed by a 12-bit address. Special function registers
//! are 32 bits wide and little-endian. Message RAM starts at [`RAM_START`]
//! and is accessed with the same instructions.
//!
//! FIFO and filter registers repeat with a fixed stride. They are declared
//! once, at their first instance, and reached through the indexed accessors
//! ([`Mcp2517fd::c1fifocon`] and friends).
//!
//! Please consider using the [high-level interface] instead.
//!
//! [high-level interface]: super::CanFd

use core::{fmt, marker::PhantomData};

use embedded_hal::spi::{ErrorType, Operation};

use crate::{
    hal_type::spi::SpiDevice,
    maybe_async_attr,
    register::{Readable, Register, RegisterValue, Writable},
};

const INSTRUCTION_RESET: u16 = 0x0;
const INSTRUCTION_WRITE: u16 = 0x2;
const INSTRUCTION_READ: u16 = 0x3;

/// First address of message RAM
pub const RAM_START: u16 = 0x400;

/// Size of message RAM in bytes
pub const RAM_LEN: u16 = 2048;

const FIFO_STRIDE: u16 = 12;
const FILTER_STRIDE: u16 = 8;

/// Address of `C1FLTCONm` byte controlling `filter`
pub const fn filter_control_address(filter: u8) -> u16 {
    0x1D0 + filter as u16
}

/// Entry point to the MCP2517FD driver's low-level API
///
/// Please consider using [CanFd] instead.
///
/// [CanFd]: super::CanFd
pub struct Mcp2517fd<SPI> {
    pub(crate) spi: SPI,
}

impl<SPI> Mcp2517fd<SPI> {
    /// Create a new instance of `Mcp2517fd`
    ///
    /// Requires the SPI device the controller is connected to. The chip
    /// expects SPI mode 0 or 3.
    pub fn new(spi: SPI) -> Self {
        Mcp2517fd { spi }
    }

    /// Allow access to the SPI bus
    pub fn bus(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// `C1FIFOCONm`, `fifo` 0 being the transmit queue
    pub fn c1fifocon(&mut self, fifo: u8) -> IndexedAccessor<'_, C1FIFOCON1, SPI> {
        IndexedAccessor::new(self, C1TXQCON::ADDRESS + FIFO_STRIDE * fifo as u16)
    }

    /// `C1FIFOSTAm`, `fifo` 0 being the transmit queue
    pub fn c1fifosta(&mut self, fifo: u8) -> IndexedAccessor<'_, C1FIFOSTA1, SPI> {
        IndexedAccessor::new(self, C1TXQSTA::ADDRESS + FIFO_STRIDE * fifo as u16)
    }

    /// `C1FIFOUAm`, `fifo` 0 being the transmit queue
    pub fn c1fifoua(&mut self, fifo: u8) -> IndexedAccessor<'_, C1FIFOUA1, SPI> {
        IndexedAccessor::new(self, C1TXQUA::ADDRESS + FIFO_STRIDE * fifo as u16)
    }

    /// `C1FLTOBJm`
    pub fn c1fltobj(&mut self, filter: u8) -> IndexedAccessor<'_, C1FLTOBJ0, SPI> {
        IndexedAccessor::new(self, C1FLTOBJ0::ADDRESS + FILTER_STRIDE * filter as u16)
    }

    /// `C1MASKm`
    pub fn c1mask(&mut self, filter: u8) -> IndexedAccessor<'_, C1MASK0, SPI> {
        IndexedAccessor::new(self, C1MASK0::ADDRESS + FILTER_STRIDE * filter as u16)
    }
}

fn instruction(command: u16, address: u16) -> [u8; 2] {
    ((command << 12) | (address & 0x0FFF)).to_be_bytes()
}

impl<SPI> Mcp2517fd<SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Reset the controller
    ///
    /// All registers return to their reset values and the controller enters
    /// configuration mode.
    #[maybe_async_attr]
    pub async fn reset(&mut self) -> Result<(), Error<SPI>> {
        self.spi
            .write(&instruction(INSTRUCTION_RESET, 0))
            .await
            .map_err(Error::Write)
    }

    /// Read consecutive bytes starting at `address`
    #[maybe_async_attr]
    pub async fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), Error<SPI>> {
        let header = instruction(INSTRUCTION_READ, address);
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(buf)])
            .await
            .map_err(Error::Transfer)
    }

    /// Write consecutive bytes starting at `address`
    ///
    /// Writes to message RAM have to be a multiple of four bytes.
    #[maybe_async_attr]
    pub async fn write(&mut self, address: u16, data: &[u8]) -> Result<(), Error<SPI>> {
        let header = instruction(INSTRUCTION_WRITE, address);
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Write(data)])
            .await
            .map_err(Error::Write)
    }

    #[maybe_async_attr]
    async fn read_register<R>(&mut self, address: u16) -> Result<R::Read, Error<SPI>>
    where
        R: Readable,
    {
        let mut buf = [0; 4];
        let buf = &mut buf[..R::Raw::LEN];
        self.read(address, buf).await?;

        Ok(R::from_raw(R::Raw::from_le_slice(buf)))
    }

    #[maybe_async_attr]
    async fn write_register<R>(&mut self, address: u16, w: &R::Write) -> Result<(), Error<SPI>>
    where
        R: Writable,
    {
        let mut buf = [0; 4];
        R::into_raw(w).write_le(&mut buf);
        self.write(address, &buf[..R::Raw::LEN]).await
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`Mcp2517fd`].
pub struct RegAccessor<'s, R, SPI>(&'s mut Mcp2517fd<SPI>, PhantomData<R>);

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
        self.0.read_register::<R>(R::ADDRESS).await
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
        self.0.write_register::<R>(R::ADDRESS, &w).await
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
        self.0.write_register::<R>(R::ADDRESS, &w).await
    }
}

/// Provides access to one instance of a repeated register
///
/// `R` describes the layout, the address is computed from the instance.
pub struct IndexedAccessor<'s, R, SPI> {
    chip: &'s mut Mcp2517fd<SPI>,
    address: u16,
    _register: PhantomData<R>,
}

impl<'s, R, SPI> IndexedAccessor<'s, R, SPI> {
    fn new(chip: &'s mut Mcp2517fd<SPI>, address: u16) -> Self {
        IndexedAccessor {
            chip,
            address,
            _register: PhantomData,
        }
    }

    /// Address of this instance
    pub fn address(&self) -> u16 {
        self.address
    }
}

impl<'s, R, SPI> IndexedAccessor<'s, R, SPI>
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
        self.chip.read_register::<R>(self.address).await
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
        self.chip.write_register::<R>(self.address, &w).await
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
        self.chip.write_register::<R>(self.address, &w).await
    }
}

/// An SPI error that can occur when communicating with the MCP2517FD
pub enum Error<SPI>
where
    SPI: ErrorType,
{
    /// SPI error occured during a transfer transaction
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
    Mcp2517fd<SPI>, u16;

    0x000, u32, RW, C1CON(c1con) { /// CAN control
        dncnt,     0,  4, u8; /// DeviceNet filter bit number
        isocrcen,  5,  5, u8; /// ISO CRC in CAN FD frames
        pxedis,    6,  6, u8; /// Protocol exception event detection disabled
        wakfil,    8,  8, u8; /// Wake-up filter
        wft,       9, 10, u8; /// Wake-up filter time
        busy,     11, 11, u8; /// Module is busy
        brsdis,   12, 12, u8; /// Bit rate switching disabled
        rtxat,    16, 16, u8; /// Restrict retransmission attempts
        esigm,    17, 17, u8; /// Transmit ESI in gateway mode
        serr2lom, 18, 18, u8; /// Listen only mode on system error
        stef,     19, 19, u8; /// Store in transmit event FIFO
        txqen,    20, 20, u8; /// Enable transmit queue
        opmod,    21, 23, u8; /// Operation mode status
        reqop,    24, 26, u8; /// Request operation mode
        abat,     27, 27, u8; /// Abort all pending transmissions
        txbws,    28, 31, u8; /// Transmit bandwidth sharing
    }
    0x004, u32, RW, C1NBTCFG(c1nbtcfg) { /// Nominal bit time configuration
        sjw,    0,  6, u8; /// Synchronization jump width, minus one
        tseg2,  8, 14, u8; /// Time segment 2, minus one
        tseg1, 16, 23, u8; /// Time segment 1, minus one
        brp,   24, 31, u8; /// Baud rate prescaler, minus one
    }
    0x008, u32, RW, C1DBTCFG(c1dbtcfg) { /// Data bit time configuration
        sjw,    0,  3, u8; /// Synchronization jump width, minus one
        tseg2,  8, 11, u8; /// Time segment 2, minus one
        tseg1, 16, 20, u8; /// Time segment 1, minus one
        brp,   24, 31, u8; /// Baud rate prescaler, minus one
    }
    0x00C, u32, RW, C1TDC(c1tdc) { /// Transmitter delay compensation
        tdcv,     0,  5, u8; /// Measured delay value
        tdco,     8, 14, u8; /// Offset, two's complement, in system clocks
        tdcmod,  16, 17, u8; /// 0: disabled, 1: manual, 2: auto
        sid11en, 24, 24, u8; /// 12-bit SID in CAN FD base format
        edgflten, 25, 25, u8; /// Edge filtering during bus integration
    }
    0x014, u32, RW, C1TSCON(c1tscon) { /// Time base counter control
        tbcpre,  0,  9, u16; /// Time base counter prescaler, minus one
        tbcen,  16, 16, u8; /// Time base counter enable
        tseof,  17, 17, u8; /// Timestamp at end of frame
        tsres,  18, 18, u8; /// Timestamp FD frames at the res bit
    }
    0x01C, u32, RW, C1INT(c1int) { /// Interrupt flags and enables
        txif,      0,  0, u8; /// Transmit FIFO interrupt
        rxif,      1,  1, u8; /// Receive FIFO interrupt
        tbcif,     2,  2, u8; /// Time base counter overflow
        modif,     3,  3, u8; /// Operation mode changed
        tefif,     4,  4, u8; /// Transmit event FIFO interrupt
        eccif,     8,  8, u8; /// ECC error
        spicrcif,  9,  9, u8; /// SPI CRC error
        txatif,   10, 10, u8; /// Transmit attempts exhausted
        rxovif,   11, 11, u8; /// Receive FIFO overflow
        serrif,   12, 12, u8; /// System error
        cerrif,   13, 13, u8; /// CAN bus error
        wakif,    14, 14, u8; /// Bus wake-up
        ivmif,    15, 15, u8; /// Invalid message
        enables,  16, 31, u16; /// Interrupt enables, same order as the flags
    }
    0x034, u32, RO, C1TREC(c1trec) { /// Transmit and receive error counters
        rec,     0,  7, u8; /// Receive error counter
        tec,     8, 15, u8; /// Transmit error counter
        ewarn,  16, 16, u8; /// Error warning
        rxwarn, 17, 17, u8; /// Receiver in error warning state
        txwarn, 18, 18, u8; /// Transmitter in error warning state
        rxbp,   19, 19, u8; /// Receiver error passive
        txbp,   20, 20, u8; /// Transmitter error passive
        txbo,   21, 21, u8; /// Transmitter bus off
    }
    0x038, u32, RW, C1BDIAG0(c1bdiag0) { /// Bus diagnostics 0
        nrerrcnt,  0,  7, u8; /// Nominal bit rate receive error count
        nterrcnt,  8, 15, u8; /// Nominal bit rate transmit error count
        drerrcnt, 16, 23, u8; /// Data bit rate receive error count
        dterrcnt, 24, 31, u8; /// Data bit rate transmit error count
    }
    0x03C, u32, RW, C1BDIAG1(c1bdiag1) { /// Bus diagnostics 1
        efmsgcnt,  0, 15, u16; /// Error free message counter
        nbit0err, 16, 16, u8; /// Nominal bit 0 error
        nbit1err, 17, 17, u8; /// Nominal bit 1 error
        nackerr,  18, 18, u8; /// Acknowledge error
        nformerr, 19, 19, u8; /// Nominal form error
        nstuferr, 20, 20, u8; /// Nominal stuff error
        ncrcerr,  21, 21, u8; /// Nominal CRC error
        txboerr,  23, 23, u8; /// Bus off since last clear
        dbit0err, 24, 24, u8; /// Data bit 0 error
        dbit1err, 25, 25, u8; /// Data bit 1 error
        dformerr, 27, 27, u8; /// Data form error
        dstuferr, 28, 28, u8; /// Data stuff error
        dcrcerr,  29, 29, u8; /// Data CRC error
        esi,      30, 30, u8; /// ESI flag of a received FD frame was set
        dlcmm,    31, 31, u8; /// DLC mismatch
    }
    0x050, u32, RW, C1TXQCON(c1txqcon) { /// Transmit queue control
        txqnie,  0,  0, u8; /// Not full interrupt enable
        txqeie,  2,  2, u8; /// Empty interrupt enable
        txatie,  4,  4, u8; /// Attempts exhausted interrupt enable
        txen,    7,  7, u8; /// Always set, the queue only transmits
        uinc,    8,  8, u8; /// Increment head
        txreq,   9,  9, u8; /// Message send request
        freset, 10, 10, u8; /// Reset the queue
        txpri,  16, 20, u8; /// Message transmit priority
        txat,   21, 22, u8; /// Retransmission attempts
        fsize,  24, 28, u8; /// Queue depth, minus one
        plsize, 29, 31, u8; /// Payload size
    }
    0x054, u32, RW, C1TXQSTA(c1txqsta) { /// Transmit queue status
        txqnif,  0,  0, u8; /// Queue not full
        txqeif,  2,  2, u8; /// Queue empty
        txatif,  4,  4, u8; /// Attempts exhausted
        txerr,   5,  5, u8; /// Error during transmission
        txlarb,  6,  6, u8; /// Lost arbitration
        txabt,   7,  7, u8; /// Message aborted
        txqci,   8, 12, u8; /// Queue message index
    }
    0x058, u32, RO, C1TXQUA(c1txqua) { /// Transmit queue user address
    }
    0x05C, u32, RW, C1FIFOCON1(c1fifocon1) { /// FIFO control
        tfnrfnie,  0,  0, u8; /// Not full / not empty interrupt enable
        tfhrfhie,  1,  1, u8; /// Half empty / half full interrupt enable
        tferffie,  2,  2, u8; /// Empty / full interrupt enable
        rxovie,    3,  3, u8; /// Overflow interrupt enable
        txatie,    4,  4, u8; /// Attempts exhausted interrupt enable
        rxtsen,    5,  5, u8; /// Timestamp received messages
        rtren,     6,  6, u8; /// Auto remote transmission
        txen,      7,  7, u8; /// Transmit FIFO
        uinc,      8,  8, u8; /// Increment head/tail
        txreq,     9,  9, u8; /// Message send request
        freset,   10, 10, u8; /// Reset the FIFO
        txpri,    16, 20, u8; /// Message transmit priority
        txat,     21, 22, u8; /// Retransmission attempts
        fsize,    24, 28, u8; /// FIFO depth, minus one
        plsize,   29, 31, u8; /// Payload size
    }
    0x060, u32, RW, C1FIFOSTA1(c1fifosta1) { /// FIFO status
        tfnrfnif,  0,  0, u8; /// Not full (transmit) / not empty (receive)
        tfhrfhif,  1,  1, u8; /// Half empty / half full
        tferffif,  2,  2, u8; /// Empty / full
        rxovif,    3,  3, u8; /// Receive overflow
        txatif,    4,  4, u8; /// Attempts exhausted
        txerr,     5,  5, u8; /// Error during transmission
        txlarb,    6,  6, u8; /// Lost arbitration
        txabt,     7,  7, u8; /// Message aborted
        fifoci,    8, 12, u8; /// FIFO message index
    }
    0x064, u32, RO, C1FIFOUA1(c1fifoua1) { /// FIFO user address, relative to RAM start
    }
    0x1D0, u32, RW, C1FLTCON0(c1fltcon0) { /// Filter control for filters 0 to 3
        f0bp,    0,  4, u8; /// Filter 0 buffer pointer
        flten0,  7,  7, u8; /// Filter 0 enable
        f1bp,    8, 12, u8; /// Filter 1 buffer pointer
        flten1, 15, 15, u8; /// Filter 1 enable
        f2bp,   16, 20, u8; /// Filter 2 buffer pointer
        flten2, 23, 23, u8; /// Filter 2 enable
        f3bp,   24, 28, u8; /// Filter 3 buffer pointer
        flten3, 31, 31, u8; /// Filter 3 enable
    }
    0x1F0, u32, RW, C1FLTOBJ0(c1fltobj0) { /// Filter object
        sid,    0, 10, u16; /// Standard identifier
        eid,   11, 28, u32; /// Extended identifier
        sid11, 29, 29, u8; /// 12th SID bit in FD base format
        exide, 30, 30, u8; /// Match only extended frames
    }
    0x1F4, u32, RW, C1MASK0(c1mask0) { /// Filter mask
        msid,    0, 10, u16; /// Standard identifier mask
        meid,   11, 28, u32; /// Extended identifier mask
        msid11, 29, 29, u8; /// 12th SID bit mask
        mide,   30, 30, u8; /// Match the IDE bit
    }
    0xE00, u32, RW, OSC(osc) { /// Oscillator control
        pllen,    0,  0, u8; /// 10x PLL enable
        oscdis,   2,  2, u8; /// Clock disable, enters sleep
        lpmen,    3,  3, u8; /// Low power mode enable (MCP2518FD)
        sclkdiv,  4,  4, u8; /// System clock divisor
        clkodiv,  5,  6, u8; /// Clock output divisor
        pllrdy,   8,  8, u8; /// PLL ready
        oscrdy,  10, 10, u8; /// Clock ready
        sclkrdy, 12, 12, u8; /// Synchronized SCLKDIV
    }
    0xE04, u32, RW, IOCON(iocon) { /// Input/output control
        tris0,    0,  0, u8; /// GPIO0 direction, set for input
        tris1,    1,  1, u8; /// GPIO1 direction, set for input
        xstbyen,  6,  6, u8; /// Use GPIO0 as transceiver standby control
        lat0,     8,  8, u8; /// GPIO0 latch
        lat1,     9,  9, u8; /// GPIO1 latch
        gpio0,   16, 16, u8; /// GPIO0 status
        gpio1,   17, 17, u8; /// GPIO1 status
        pm0,     24, 24, u8; /// GPIO0 as GPIO instead of interrupt
        pm1,     25, 25, u8; /// GPIO1 as GPIO instead of interrupt
        txcanod, 28, 28, u8; /// TXCAN open drain
        sof,     29, 29, u8; /// Start of frame on CLKO
        intod,   30, 30, u8; /// Interrupt pins open drain
    }
}

#[cfg(all(test, feature = "async"))]
mod test {
    use super::*;

    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    #[tokio::test]
    async fn reset_is_instruction_only() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x00, 0x00]),
            SpiTransaction::transaction_end(),
        ]);

        let mut mcp = Mcp2517fd::new(spi);
        mcp.reset().await.unwrap();

        mcp.spi.done();
    }

    #[tokio::test]
    async fn registers_are_little_endian() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x30, 0x00]),
            SpiTransaction::read_vec(vec![0x60, 0x07, 0x98, 0x04]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x2E, 0x04]),
            SpiTransaction::write_vec(vec![0x01, 0x00, 0x00, 0x00]),
            SpiTransaction::transaction_end(),
        ]);

        let mut mcp = Mcp2517fd::new(spi);
        let con = mcp.c1con().read().await.unwrap();
        mcp.iocon().write(|w| w.tris0(1)).await.unwrap();

        assert_eq!(con.bits(), 0x0498_0760);
        assert_eq!(con.opmod(), 0b100);
        assert_eq!(con.reqop(), 0b100);

        mcp.spi.done();
    }

    #[tokio::test]
    async fn indexed_registers_follow_stride() {
        let spi = SpiMock::new(&[
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x30, 0x6C]),
            SpiTransaction::read_vec(vec![0x01, 0x00, 0x00, 0x00]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![0x32, 0x0C]),
            SpiTransaction::read_vec(vec![0x00, 0x00, 0x00, 0x40]),
            SpiTransaction::transaction_end(),
        ]);

        let mut mcp = Mcp2517fd::new(spi);
        assert_eq!(mcp.c1fifosta(2).address(), 0x06C);
        let status = mcp.c1fifosta(2).read().await.unwrap();
        let mask = mcp.c1mask(3).read().await.unwrap();

        assert_eq!(status.tfnrfnif(), 1);
        assert_eq!(mask.mide(), 1);
        assert_eq!(mcp.c1fifocon(0).address(), C1TXQCON::ADDRESS);
        assert_eq!(filter_control_address(5), 0x1D5);

        mcp.spi.done();
    }
}
