//! Low-level interface to the ST25R3916
//!
//! This module implements a register-level interface to the ST25R3916. Users
//! of this library should typically not need to use this. Please consider
//! using the [high-level interface] instead.
//!
//! Every SPI transaction starts with a mode byte:
//!
//! | Mode byte  | Operation                                  |
//! |------------|--------------------------------------------|
//! | `00aaaaaa` | register write, auto-incrementing address  |
//! | `01aaaaaa` | register read, auto-incrementing address   |
//! | `10000000` | FIFO load                                  |
//! | `10011111` | FIFO read                                  |
//! | `11cccccc` | direct command                             |
//!
//! [high-level interface]: super::Nfc4

use core::{fmt, marker::PhantomData};

use embedded_hal::spi::{ErrorType, Operation};

use super::Command;
use crate::{
    hal_type::spi::SpiDevice,
    maybe_async_attr,
    register::{Readable, Register, RegisterValue, Writable},
};

const MODE_REGISTER_READ: u8 = 0x40;
const MODE_FIFO_LOAD: u8 = 0x80;
const MODE_FIFO_READ: u8 = 0x9F;

/// Address of the first of the four interrupt registers
pub const IRQ_MAIN: u8 = 0x1A;

/// Address of the first of the four interrupt mask registers
pub const IRQ_MASK_MAIN: u8 = 0x16;

/// Address of the first no-response timer register (MSB)
pub const NO_RESPONSE_TIMER1: u8 = 0x10;

/// Address of the first transmitted-bits register
pub const NUM_TX_BYTES1: u8 = 0x22;

/// Address of the first FIFO status register
pub const FIFO_STATUS1: u8 = 0x1E;

/// Entry point to the ST25R3916 driver's low-level API
///
/// Please consider using [Nfc4] instead.
///
/// [Nfc4]: super::Nfc4
pub struct St25r3916<SPI> {
    pub(crate) spi: SPI,
}

impl<SPI> St25r3916<SPI> {
    /// Create a new instance of `St25r3916`
    ///
    /// Requires the SPI device the ST25R3916 is connected to. The chip
    /// expects SPI mode 1.
    pub fn new(spi: SPI) -> Self {
        St25r3916 { spi }
    }

    /// Allow access to the SPI bus
    pub fn bus(&mut self) -> &mut SPI {
        &mut self.spi
    }
}

/// Contents of the two FIFO status registers
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoStatus {
    /// Number of bytes in the FIFO
    pub bytes: usize,
    /// Number of bits in the last, incomplete byte (0 if complete)
    pub last_bits: u8,
    /// FIFO overflow
    pub overflow: bool,
    /// FIFO underflow
    pub underflow: bool,
}

impl FifoStatus {
    /// Decode `FIFO_STATUS1` and `FIFO_STATUS2`
    pub fn from_registers(status1: u8, status2: u8) -> Self {
        FifoStatus {
            bytes: (((status2 as usize) >> 6) << 8) | status1 as usize,
            last_bits: (status2 >> 1) & 0x07,
            overflow: status2 & 0x10 != 0,
            underflow: status2 & 0x20 != 0,
        }
    }
}

impl<SPI> St25r3916<SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Execute a direct command
    #[maybe_async_attr]
    pub async fn direct_command(&mut self, command: Command) -> Result<(), Error<SPI>> {
        self.spi
            .write(&[command as u8])
            .await
            .map_err(Error::Write)
    }

    /// Read consecutive registers starting at `address`
    #[maybe_async_attr]
    pub async fn read_registers(&mut self, address: u8, buf: &mut [u8]) -> Result<(), Error<SPI>> {
        let header = [MODE_REGISTER_READ | (address & 0x3F)];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(buf)])
            .await
            .map_err(Error::Transfer)
    }

    /// Write consecutive registers starting at `address`
    #[maybe_async_attr]
    pub async fn write_registers(&mut self, address: u8, data: &[u8]) -> Result<(), Error<SPI>> {
        let header = [address & 0x3F];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Write(data)])
            .await
            .map_err(Error::Write)
    }

    /// Load data into the FIFO
    #[maybe_async_attr]
    pub async fn load_fifo(&mut self, data: &[u8]) -> Result<(), Error<SPI>> {
        let header = [MODE_FIFO_LOAD];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Write(data)])
            .await
            .map_err(Error::Write)
    }

    /// Read data out of the FIFO
    #[maybe_async_attr]
    pub async fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), Error<SPI>> {
        let header = [MODE_FIFO_READ];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(buf)])
            .await
            .map_err(Error::Transfer)
    }

    /// Read and clear the four interrupt registers
    ///
    /// Returns `IRQ_MAIN | IRQ_TIMER_NFC << 8 | IRQ_ERROR_WUP << 16 |
    /// IRQ_TARGET << 24`.
    #[maybe_async_attr]
    pub async fn read_interrupts(&mut self) -> Result<u32, Error<SPI>> {
        let mut buf = [0; 4];
        self.read_registers(IRQ_MAIN, &mut buf).await?;

        Ok(u32::from_le_bytes(buf))
    }

    /// Write the four interrupt mask registers (1 = masked)
    #[maybe_async_attr]
    pub async fn write_interrupt_masks(&mut self, masks: u32) -> Result<(), Error<SPI>> {
        self.write_registers(IRQ_MASK_MAIN, &masks.to_le_bytes())
            .await
    }

    /// Read both FIFO status registers
    #[maybe_async_attr]
    pub async fn fifo_status(&mut self) -> Result<FifoStatus, Error<SPI>> {
        let mut buf = [0; 2];
        self.read_registers(FIFO_STATUS1, &mut buf).await?;

        Ok(FifoStatus::from_registers(buf[0], buf[1]))
    }

    /// Set the number of bits to transmit
    #[maybe_async_attr]
    pub async fn set_num_tx_bits(&mut self, bits: u16) -> Result<(), Error<SPI>> {
        self.write_registers(NUM_TX_BYTES1, &bits.to_be_bytes()).await
    }

    /// Set the no-response timer value
    ///
    /// The step is selected with `TIMER_EMV_CONTROL.nrt_step`. Zero disables
    /// the timer.
    #[maybe_async_attr]
    pub async fn set_no_response_timer(&mut self, value: u16) -> Result<(), Error<SPI>> {
        self.write_registers(NO_RESPONSE_TIMER1, &value.to_be_bytes())
            .await
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`St25r3916`].
pub struct RegAccessor<'s, R, SPI>(&'s mut St25r3916<SPI>, PhantomData<R>);

impl<'s, R, SPI> RegAccessor<'s, R, SPI>
where
    SPI: SpiDevice<u8>,
    R: Register<Address = u8>,
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
            .await
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
            .await
    }
}

/// An SPI error that can occur when communicating with the ST25R3916
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

// Registers used by the driver. Each register follows the syntax:
// <address>, <width>, <access>, <NAME>(<name>) { /// <doc>
//     <field>, <first-bit>, <last-bit>, <type>; /// <doc>
// }
impl_register! {
    St25r3916<SPI>, u8;

    0x00, u8, RW, IO_CONF1(io_conf1) { /// IO configuration register 1
        lf_clk_off, 0, 0, u8; /// Disable the 32 kHz LF clock on MCU_CLK
        out_cl,     1, 2, u8; /// MCU_CLK frequency selection
        i2c_thd,    4, 5, u8; /// I2C thresholds
        rfo2,       6, 6, u8; /// Antenna driver used in single driving
        single,     7, 7, u8; /// Single antenna driving
    }
    0x01, u8, RW, IO_CONF2(io_conf2) { /// IO configuration register 2
        slow_up,    0, 0, u8; /// Slow ramp of the field at power-up
        io_drv_lvl, 2, 2, u8; /// Increased IO driver strength
        miso_pd1,   3, 3, u8; /// Pull-down on MISO when MCU drives MOSI low
        miso_pd2,   4, 4, u8; /// Pull-down on MISO when MCU drives MOSI high
        aat_en,     5, 5, u8; /// Enable antenna auto-tuning
        vspd_off,   6, 6, u8; /// Disable the VDD_SPI regulator
        sup3v,      7, 7, u8; /// 3.3 V supply mode
    }
    0x02, u8, RW, OP_CONTROL(op_control) { /// Operation control
        en_fd_c, 0, 1, u8; /// External field detector control
        wu,      2, 2, u8; /// Wake-up mode
        tx_en,   3, 3, u8; /// Transmitter (field) enable
        rx_man,  4, 4, u8; /// Manual receive channel selection
        rx_chn,  5, 5, u8; /// Receive channel selection
        rx_en,   6, 6, u8; /// Receiver enable
        en,      7, 7, u8; /// Oscillator and regulator enable (ready mode)
    }
    0x03, u8, RW, MODE(mode) { /// Mode definition
        nfc_ar, 0, 1, u8; /// NFC automatic response
        tr_am,  2, 2, u8; /// AM modulation (OOK when 0)
        om,     3, 6, u8; /// Operation mode
        targ,   7, 7, u8; /// Target mode when set, initiator otherwise
    }
    0x04, u8, RW, BIT_RATE(bit_rate) { /// Bit rate definition
        rxrate, 0, 3, u8; /// Receive bit rate
        txrate, 4, 7, u8; /// Transmit bit rate
    }
    0x05, u8, RW, ISO14443A_NFC(iso14443a_nfc) { /// ISO14443-A and NFC 106 kbit/s settings
        antcl,     0, 0, u8; /// Anticollision frame mode (bit-oriented)
        p_len,     1, 4, u8; /// Modulation pulse width
        nfc_f0,    5, 5, u8; /// NFC-F0 framing
        no_rx_par, 6, 6, u8; /// Receive without parity
        no_tx_par, 7, 7, u8; /// Transmit without parity
    }
    0x0A, u8, RW, AUX(aux) { /// Auxiliary definition
        nfc_n,     0, 1, u8; /// Number of NFC-F slots
        dis_corr,  2, 2, u8; /// Disable correlator reception
        mfaz_cl90, 3, 3, u8; /// MIFARE-compatible classic 90 % modulation
        nfc_id,    4, 5, u8; /// NFCID length
        no_crc_rx, 7, 7, u8; /// Receive without CRC check
    }
    0x0B, u8, RW, RX_CONF1(rx_conf1) { /// Receiver configuration register 1
        hz,     0, 3, u8; /// High-pass filter zero
        lp,     4, 6, u8; /// Low-pass filter
        ch_sel, 7, 7, u8; /// Channel selection (AM/PM)
    }
    0x0C, u8, RW, RX_CONF2(rx_conf2) { /// Receiver configuration register 2
        pmix_cl,  0, 0, u8; /// PM mixer low-resistance mode
        sqm_dyn,  1, 1, u8; /// Automatic squelch
        agc_alg,  2, 2, u8; /// AGC algorithm
        agc_m,    3, 3, u8; /// AGC operation during the complete receive period
        agc_en,   4, 4, u8; /// AGC enable
        lf_en,    5, 5, u8; /// Low-frequency input
        lf_op,    6, 6, u8; /// Low-frequency operation
        demod_mode, 7, 7, u8; /// AM/PM demodulation
    }
    0x0D, u8, RW, RX_CONF3(rx_conf3) { /// Receiver configuration register 3
        rg_nfc,  0, 0, u8; /// NFC receive gain boost
        lim,     1, 1, u8; /// Limit the AGC
        rg1_pm,  2, 4, u8; /// PM channel first-stage gain reduction
        rg1_am,  5, 7, u8; /// AM channel first-stage gain reduction
    }
    0x0E, u8, RW, RX_CONF4(rx_conf4) { /// Receiver configuration register 4
        rg2_pm, 0, 3, u8; /// PM channel second/third-stage gain reduction
        rg2_am, 4, 7, u8; /// AM channel second/third-stage gain reduction
    }
    0x0F, u8, RW, MASK_RX_TIMER(mask_rx_timer) { /// Mask receive timer
        mrt, 0, 7, u8; /// Mask receive time
    }
    0x12, u8, RW, TIMER_EMV_CONTROL(timer_emv_control) { /// Timer and EMV control
        nrt_step, 0, 0, u8; /// No-response timer step (0: 64/fc, 1: 4096/fc)
        nrt_emv,  1, 1, u8; /// EMV mode of the no-response timer
        nrt_nfc,  2, 2, u8; /// No-response timer starts at end of NFC reception
        mrt_step, 3, 3, u8; /// Mask receive timer step
        gptc,     5, 7, u8; /// General purpose timer trigger source
    }
    0x1E, u8, RO, FIFO_STATUS_1(fifo_status_1) { /// Number of bytes in the FIFO, low part
        fifo_b, 0, 7, u8; /// Bits 7..0 of the FIFO byte count
    }
    0x1F, u8, RO, FIFO_STATUS_2(fifo_status_2) { /// FIFO status
        np_lb,    0, 0, u8; /// Parity of the last byte missing
        fifo_lb,  1, 3, u8; /// Bits in the last, incomplete byte
        fifo_ovr, 4, 4, u8; /// FIFO overflow
        fifo_unf, 5, 5, u8; /// FIFO underflow
        fifo_b,   6, 7, u8; /// Bits 9..8 of the FIFO byte count
    }
    0x20, u8, RO, COLLISION_STATUS(collision_status) { /// Collision position
        c_pb,   0, 0, u8; /// Collision in the parity bit
        c_bit,  1, 3, u8; /// Bit position of the collision within the byte
        c_byte, 4, 7, u8; /// Byte position of the collision within the frame
    }
    0x25, u8, RO, AD_RESULT(ad_result) { /// A/D converter output
        value, 0, 7, u8; /// Result of the last measurement
    }
    0x2C, u8, RW, REGULATOR_CONTROL(regulator_control) { /// Regulator voltage control
        mpsv,  0, 2, u8; /// Measured power supply selection
        rege,  3, 6, u8; /// Regulated voltage when set manually
        reg_s, 7, 7, u8; /// Manual regulator setting
    }
    0x3F, u8, RO, IC_IDENTITY(ic_identity) { /// IC identity
        ic_rev,  0, 2, u8; /// Silicon revision
        ic_type, 3, 7, u8; /// IC type code, 0b00101 for the ST25R3916
    }
}
