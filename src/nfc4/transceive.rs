//! FIFO-driven transmit and receive
//!
//! A transceive operation is started with [`Nfc4::start_transceive`] and
//! driven by calling [`Nfc4::transceive_worker`] until it stops returning
//! `WouldBlock`. Frames longer than the FIFO are refilled on the FIFO water
//! level interrupt while transmitting and drained on it while receiving.

use embedded_hal::digital::InputPin;

use super::{Awake, Command, Error, Interrupts, Nfc4};
use crate::{hal_type::spi::SpiDevice, maybe_async_attr};

/// Size of the ST25R3916 FIFO in bytes
pub const FIFO_DEPTH: usize = 512;

/// FIFO level at which the water level interrupt fires while transmitting
pub const TX_WATERMARK: usize = 200;

/// Worker calls without progress before the operation times out
///
/// Only guards against a chip that never answers. Frame waiting times are
/// enforced by the no-response timer.
pub const MAX_POLLS: u32 = 10_000;

/// No-response timer steps of 64/fc fit up to this many 1/fc
const NRT_64FC_MAX: u32 = 0xFFFF * 64;

/// Flags that control framing of a transceive operation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxRxFlags {
    /// Let the chip append a CRC to the transmitted frame
    pub tx_crc: bool,
    /// Let the chip check the CRC of the received frame
    pub rx_crc: bool,
    /// Keep the received CRC bytes in the rx buffer
    pub keep_crc: bool,
    /// Bit-oriented anticollision framing
    pub anticollision: bool,
    /// Transmit parity bits
    pub tx_parity: bool,
    /// Expect parity bits on reception
    pub rx_parity: bool,
}

impl Default for TxRxFlags {
    fn default() -> Self {
        TxRxFlags {
            tx_crc: true,
            rx_crc: true,
            keep_crc: false,
            anticollision: false,
            tx_parity: true,
            rx_parity: true,
        }
    }
}

impl TxRxFlags {
    /// No CRC in either direction, parity on
    pub fn no_crc() -> Self {
        TxRxFlags {
            tx_crc: false,
            rx_crc: false,
            ..Default::default()
        }
    }

    /// Framing for ISO14443-A anticollision frames
    pub fn bit_oriented() -> Self {
        TxRxFlags {
            anticollision: true,
            ..Self::no_crc()
        }
    }
}

/// ISO14443-A short frames, sent by dedicated direct commands
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShortFrame {
    /// REQA (0x26)
    Reqa,
    /// WUPA (0x52)
    Wupa,
}

/// Frame to transmit
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxFrame<'a> {
    /// The first `bits` bits of `data`, LSB first
    Bits {
        /// Frame data, the last byte may be incomplete
        data: &'a [u8],
        /// Number of bits to send
        bits: usize,
    },
    /// A short frame
    Short(ShortFrame),
}

impl<'a> TxFrame<'a> {
    /// All bits of `data`
    pub fn bytes(data: &'a [u8]) -> Self {
        TxFrame::Bits {
            data,
            bits: data.len() * 8,
        }
    }
}

/// Everything needed for one transceive operation
#[derive(Debug)]
pub struct TxRxContext<'a> {
    /// Frame to transmit
    pub tx: TxFrame<'a>,
    /// Buffer for the answer, empty if no answer is expected
    ///
    /// Received CRC bytes land here before being stripped, so it must have
    /// room for them.
    pub rx: &'a mut [u8],
    /// Framing
    pub flags: TxRxFlags,
    /// Frame waiting time in 1/fc, `None` to wait without limit
    pub fwt: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TxState {
    Init,
    WaitWatermark,
    ReloadFifo,
    WaitTxe,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RxState {
    Init,
    WaitRxs,
    WaitRxe,
    ReadData,
    ReadFifo,
    ErrCheck,
    Done,
    Failed,
}

/// An ongoing transceive operation
#[derive(Debug)]
pub struct Transceive<'a> {
    ctx: TxRxContext<'a>,
    tx_state: TxState,
    rx_state: RxState,
    tx_loaded: usize,
    rx_len: usize,
    rx_last_bits: u8,
    rx_bits: usize,
    polls_left: u32,
}

impl<'a> Transceive<'a> {
    /// `true` once the frame left the antenna
    pub fn is_tx_done(&self) -> bool {
        self.tx_state == TxState::Done
    }

    /// `true` once the operation finished, successfully or not
    pub fn is_done(&self) -> bool {
        matches!(self.rx_state, RxState::Done | RxState::Failed)
    }

    /// Received bits so far
    pub fn rx_bits(&self) -> usize {
        self.rx_bits
    }

    fn fail(&mut self) {
        self.tx_state = TxState::Failed;
        self.rx_state = RxState::Failed;
    }

    fn tick<T, E>(&mut self, timeout: E) -> nb::Result<T, E> {
        self.polls_left = self.polls_left.saturating_sub(1);
        if self.polls_left == 0 {
            return Err(nb::Error::Other(timeout));
        }

        Err(nb::Error::WouldBlock)
    }
}

impl<SPI, IRQ, State> Nfc4<SPI, IRQ, State>
where
    SPI: SpiDevice<u8>,
    IRQ: InputPin,
    State: Awake,
{
    /// Prepare a transceive operation
    ///
    /// Applies the framing flags and programs the no-response timer. Nothing
    /// is sent before the first call to [`Nfc4::transceive_worker`].
    #[maybe_async_attr]
    pub async fn start_transceive<'a>(
        &mut self,
        ctx: TxRxContext<'a>,
    ) -> Result<Transceive<'a>, Error<SPI>> {
        if let TxFrame::Bits { data, bits } = ctx.tx {
            if bits == 0 || (bits + 7) / 8 > data.len() || bits > u16::MAX as usize {
                return Err(Error::InvalidConfiguration);
            }
        }

        let flags = ctx.flags;
        self.ll
            .iso14443a_nfc()
            .modify(|_, w| {
                w.antcl(flags.anticollision as u8)
                    .no_tx_par(!flags.tx_parity as u8)
                    .no_rx_par(!flags.rx_parity as u8)
            })
            .await?;
        self.ll
            .aux()
            .modify(|_, w| w.no_crc_rx(!flags.rx_crc as u8))
            .await?;

        let (step, value) = match ctx.fwt {
            None => (0, 0),
            Some(fwt) if fwt <= NRT_64FC_MAX => (0, fwt.div_ceil(64) as u16),
            Some(fwt) => (1, fwt.div_ceil(4096).min(0xFFFF) as u16),
        };
        self.ll
            .timer_emv_control()
            .modify(|_, w| w.nrt_step(step))
            .await?;
        self.ll.set_no_response_timer(value).await?;

        Ok(Transceive {
            ctx,
            tx_state: TxState::Init,
            rx_state: RxState::Init,
            tx_loaded: 0,
            rx_len: 0,
            rx_last_bits: 0,
            rx_bits: 0,
            polls_left: MAX_POLLS,
        })
    }

    /// Advance a transceive operation
    ///
    /// Returns the number of received bits once the operation is complete.
    /// The received data is in the rx buffer of the operation's context. On
    /// [`Error::Collision`] the buffer holds the bits received up to the
    /// collision.
    ///
    /// After an error the operation is dead and further calls return
    /// [`Error::TransceiveFailed`].
    #[maybe_async_attr]
    pub async fn transceive_worker(
        &mut self,
        op: &mut Transceive<'_>,
    ) -> nb::Result<usize, Error<SPI>> {
        let result = match self.transceive_tx(op).await {
            Ok(()) => self.transceive_rx(op).await,
            Err(error) => Err(error),
        };

        if let Err(nb::Error::Other(error)) = &result {
            debug!("transceive failed: {}", error);
            op.fail();
        }

        result
    }

    /// Run the operation until the frame has been sent
    ///
    /// Reception is left to later calls of [`Nfc4::transceive_worker`].
    #[maybe_async_attr]
    pub async fn transceive_run_blocking_tx(
        &mut self,
        op: &mut Transceive<'_>,
    ) -> Result<(), Error<SPI>> {
        loop {
            match self.transceive_tx(op).await {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(error)) => {
                    op.fail();
                    return Err(error);
                }
            }
        }
    }

    /// Transmit a frame and wait for the answer
    ///
    /// Returns the number of received bits.
    #[maybe_async_attr]
    pub async fn transceive_blocking(&mut self, ctx: TxRxContext<'_>) -> Result<usize, Error<SPI>> {
        let mut op = self.start_transceive(ctx).await?;

        loop {
            match self.transceive_worker(&mut op).await {
                Ok(bits) => return Ok(bits),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(error)) => return Err(error),
            }
        }
    }

    #[maybe_async_attr]
    async fn transceive_tx(&mut self, op: &mut Transceive<'_>) -> nb::Result<(), Error<SPI>> {
        loop {
            match op.tx_state {
                TxState::Init => {
                    self.ll.direct_command(Command::Stop).await.map_err(Error::Spi)?;
                    self.ll.direct_command(Command::ClearFifo).await.map_err(Error::Spi)?;
                    self.ll.direct_command(Command::ResetRxGain).await.map_err(Error::Spi)?;

                    self.clear_interrupts().await?;
                    self.enable_interrupts(Interrupts::TRANSCEIVE).await?;

                    match op.ctx.tx {
                        TxFrame::Short(frame) => {
                            let command = match frame {
                                ShortFrame::Reqa => Command::TransmitReqa,
                                ShortFrame::Wupa => Command::TransmitWupa,
                            };
                            self.ll.direct_command(command).await.map_err(Error::Spi)?;
                            op.tx_state = TxState::WaitTxe;
                        }
                        TxFrame::Bits { data, bits } => {
                            let len = (bits + 7) / 8;
                            self.ll.set_num_tx_bits(bits as u16).await.map_err(Error::Spi)?;

                            let first = len.min(FIFO_DEPTH);
                            self.ll.load_fifo(&data[..first]).await.map_err(Error::Spi)?;
                            op.tx_loaded = first;

                            let command = if op.ctx.flags.tx_crc {
                                Command::TransmitWithCrc
                            } else {
                                Command::TransmitWithoutCrc
                            };
                            self.ll.direct_command(command).await.map_err(Error::Spi)?;
                            trace!("tx {=usize} bits", bits);

                            op.tx_state = if first < len {
                                TxState::WaitWatermark
                            } else {
                                TxState::WaitTxe
                            };
                        }
                    }
                    op.polls_left = MAX_POLLS;
                }
                TxState::WaitWatermark => {
                    let raised = self
                        .get_interrupt(Interrupts::FWL | Interrupts::TXE)
                        .await?;

                    if raised.contains(Interrupts::FWL) {
                        op.tx_state = TxState::ReloadFifo;
                    } else if raised.contains(Interrupts::TXE) {
                        return Err(nb::Error::Other(Error::FifoUnderflow));
                    } else {
                        return op.tick(Error::Timeout);
                    }
                }
                TxState::ReloadFifo => {
                    let TxFrame::Bits { data, bits } = op.ctx.tx else {
                        return Err(nb::Error::Other(Error::InvalidConfiguration));
                    };
                    let len = (bits + 7) / 8;
                    let chunk = (len - op.tx_loaded).min(FIFO_DEPTH - TX_WATERMARK);

                    self.ll
                        .load_fifo(&data[op.tx_loaded..op.tx_loaded + chunk])
                        .await
                        .map_err(Error::Spi)?;
                    op.tx_loaded += chunk;

                    op.tx_state = if op.tx_loaded < len {
                        TxState::WaitWatermark
                    } else {
                        TxState::WaitTxe
                    };
                    op.polls_left = MAX_POLLS;
                }
                TxState::WaitTxe => {
                    let raised = self.get_interrupt(Interrupts::TXE).await?;

                    if raised.is_empty() {
                        return op.tick(Error::Timeout);
                    }
                    op.tx_state = TxState::Done;
                    op.polls_left = MAX_POLLS;
                }
                TxState::Done => return Ok(()),
                TxState::Failed => return Err(nb::Error::Other(Error::TransceiveFailed)),
            }
        }
    }

    #[maybe_async_attr]
    async fn transceive_rx(&mut self, op: &mut Transceive<'_>) -> nb::Result<usize, Error<SPI>> {
        loop {
            match op.rx_state {
                RxState::Init => {
                    op.rx_len = 0;
                    op.rx_last_bits = 0;
                    op.rx_bits = 0;

                    op.rx_state = if op.ctx.rx.is_empty() {
                        RxState::Done
                    } else {
                        RxState::WaitRxs
                    };
                }
                RxState::WaitRxs => {
                    let raised = self
                        .get_interrupt(Interrupts::RXS | Interrupts::NRE)
                        .await?;

                    if raised.contains(Interrupts::RXS) {
                        op.rx_state = RxState::WaitRxe;
                        op.polls_left = MAX_POLLS;
                    } else if raised.contains(Interrupts::NRE) {
                        return Err(nb::Error::Other(Error::Timeout));
                    } else {
                        return op.tick(Error::Timeout);
                    }
                }
                RxState::WaitRxe => {
                    let raised = self
                        .get_interrupt(Interrupts::RXE | Interrupts::FWL)
                        .await?;

                    if raised.contains(Interrupts::RXE) {
                        op.rx_state = RxState::ReadFifo;
                    } else if raised.contains(Interrupts::FWL) {
                        op.rx_state = RxState::ReadData;
                    } else {
                        return op.tick(Error::Timeout);
                    }
                }
                RxState::ReadData => {
                    let status = self.ll.fifo_status().await.map_err(Error::Spi)?;
                    self.read_rx_bytes(op, status.bytes).await?;

                    op.rx_state = RxState::WaitRxe;
                    op.polls_left = MAX_POLLS;
                }
                RxState::ReadFifo => {
                    let status = self.ll.fifo_status().await.map_err(Error::Spi)?;
                    if status.overflow {
                        return Err(nb::Error::Other(Error::Overrun));
                    }

                    self.read_rx_bytes(op, status.bytes).await?;
                    op.rx_last_bits = status.last_bits;
                    op.rx_state = RxState::ErrCheck;
                }
                RxState::ErrCheck => {
                    let raised = self.get_interrupt(Interrupts::RX_ERRORS).await?;

                    op.rx_bits = match op.rx_last_bits {
                        0 => op.rx_len * 8,
                        bits => (op.rx_len.saturating_sub(1)) * 8 + bits as usize,
                    };

                    if raised.contains(Interrupts::COL) {
                        let collision = self
                            .ll
                            .collision_status()
                            .read()
                            .await
                            .map_err(Error::Spi)?;
                        return Err(nb::Error::Other(Error::Collision {
                            byte: collision.c_byte(),
                            bit: collision.c_bit(),
                        }));
                    }
                    if raised.contains(Interrupts::CRC) && op.ctx.flags.rx_crc {
                        return Err(nb::Error::Other(Error::Crc));
                    }
                    if raised.contains(Interrupts::PAR) {
                        return Err(nb::Error::Other(Error::Parity));
                    }
                    if raised.intersects(Interrupts::ERR1 | Interrupts::ERR2) {
                        return Err(nb::Error::Other(Error::Framing));
                    }

                    if op.ctx.flags.rx_crc && !op.ctx.flags.keep_crc {
                        if op.rx_len < 2 || op.rx_last_bits != 0 {
                            return Err(nb::Error::Other(Error::Framing));
                        }
                        op.rx_len -= 2;
                        op.rx_bits = op.rx_len * 8;
                    }

                    trace!("rx {=usize} bits", op.rx_bits);
                    op.rx_state = RxState::Done;
                }
                RxState::Done => return Ok(op.rx_bits),
                RxState::Failed => return Err(nb::Error::Other(Error::TransceiveFailed)),
            }
        }
    }

    #[maybe_async_attr]
    async fn read_rx_bytes(
        &mut self,
        op: &mut Transceive<'_>,
        count: usize,
    ) -> Result<(), Error<SPI>> {
        let required_len = op.rx_len + count;
        if required_len > op.ctx.rx.len() {
            return Err(Error::BufferTooSmall { required_len });
        }

        if count > 0 {
            self.ll
                .read_fifo(&mut op.ctx.rx[op.rx_len..required_len])
                .await?;
            op.rx_len = required_len;
        }

        Ok(())
    }
}

#[cfg(all(test, feature = "async"))]
mod test {
    use super::*;

    use crate::nfc4::{
        sim::{nfca_poller, Card, Sim},
        FWT_T2T,
    };

    #[tokio::test]
    async fn long_frames_refill_and_drain_the_fifo() {
        let mut sim = Sim::new(Vec::new());
        sim.echo = true;
        let mut nfc4 = nfca_poller(sim).await;

        let tx: Vec<u8> = (0..600).map(|i| (i * 7) as u8).collect();
        let mut rx = [0u8; 600];
        let bits = nfc4
            .transceive_blocking(TxRxContext {
                tx: TxFrame::bytes(&tx),
                rx: &mut rx,
                flags: TxRxFlags::no_crc(),
                fwt: Some(FWT_T2T),
            })
            .await
            .unwrap();

        assert_eq!(bits, 600 * 8);
        assert_eq!(&rx[..], &tx[..]);

        let (sim, _) = nfc4.free();
        assert_eq!(sim.frames.last().map(|frame| frame.len()), Some(600));
    }

    #[tokio::test]
    async fn small_buffer_fails_the_operation() {
        let mut sim = Sim::new(Vec::new());
        sim.echo = true;
        let mut nfc4 = nfca_poller(sim).await;

        let tx = [0xA5; 10];
        let mut rx = [0u8; 4];
        let mut op = nfc4
            .start_transceive(TxRxContext {
                tx: TxFrame::bytes(&tx),
                rx: &mut rx,
                flags: TxRxFlags::no_crc(),
                fwt: Some(FWT_T2T),
            })
            .await
            .unwrap();

        let error = loop {
            match nfc4.transceive_worker(&mut op).await {
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(error)) => break error,
                Ok(bits) => panic!("received {} bits", bits),
            }
        };

        assert!(matches!(error, Error::BufferTooSmall { required_len: 10 }));
        assert!(op.is_done());
        assert!(matches!(
            nfc4.transceive_worker(&mut op).await,
            Err(nb::Error::Other(Error::TransceiveFailed))
        ));
    }

    #[tokio::test]
    async fn missing_answer_is_a_timeout() {
        let mut nfc4 = nfca_poller(Sim::new(Vec::new())).await;

        let mut rx = [0u8; 18];
        let result = nfc4
            .transceive_blocking(TxRxContext {
                tx: TxFrame::bytes(&[0x30, 0x00]),
                rx: &mut rx,
                flags: TxRxFlags::default(),
                fwt: Some(FWT_T2T),
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));

        // 67800/fc in steps of 64/fc
        let (sim, _) = nfc4.free();
        assert_eq!(sim.reg(0x10), 0x04);
        assert_eq!(sim.reg(0x11), 0x24);
        assert_eq!(sim.reg(0x12) & 0x01, 0);
    }

    #[tokio::test]
    async fn silent_chip_is_a_timeout() {
        let mut nfc4 = nfca_poller(Sim::new(Vec::new())).await;

        let mut rx = [0u8; 18];
        let result = nfc4
            .transceive_blocking(TxRxContext {
                tx: TxFrame::bytes(&[0x30, 0x00]),
                rx: &mut rx,
                flags: TxRxFlags::default(),
                fwt: None,
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn long_frame_waiting_time_uses_coarse_steps() {
        let mut nfc4 = nfca_poller(Sim::new(Vec::new())).await;

        let mut rx = [0u8; 4];
        nfc4.start_transceive(TxRxContext {
            tx: TxFrame::bytes(&[0x30, 0x00]),
            rx: &mut rx,
            flags: TxRxFlags::default(),
            fwt: Some(5_000_000),
        })
        .await
        .unwrap();

        let (sim, _) = nfc4.free();
        assert_eq!(sim.reg(0x12) & 0x01, 1);
        assert_eq!(u16::from_be_bytes([sim.reg(0x10), sim.reg(0x11)]), 1221);
    }

    #[tokio::test]
    async fn transmission_completes_before_reception() {
        let mut sim = Sim::new(Vec::new());
        sim.echo = true;
        let mut nfc4 = nfca_poller(sim).await;

        let tx = [0x01, 0x02, 0x03];
        let mut rx = [0u8; 3];
        let mut op = nfc4
            .start_transceive(TxRxContext {
                tx: TxFrame::bytes(&tx),
                rx: &mut rx,
                flags: TxRxFlags::no_crc(),
                fwt: Some(FWT_T2T),
            })
            .await
            .unwrap();

        nfc4.transceive_run_blocking_tx(&mut op).await.unwrap();
        assert!(op.is_tx_done());
        assert!(!op.is_done());

        let bits = loop {
            match nfc4.transceive_worker(&mut op).await {
                Ok(bits) => break bits,
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(error)) => panic!("{:?}", error),
            }
        };
        assert_eq!(bits, 24);
        drop(op);
        assert_eq!(rx, tx);
    }

    #[tokio::test]
    async fn corrupted_crc_is_reported() {
        let mut sim = Sim::new(vec![Card::new(&[0x11, 0x22, 0x33, 0x44], 0x00)]);
        sim.corrupt_crc = true;
        let mut nfc4 = nfca_poller(sim).await;

        nfc4.wupa().await.unwrap();
        let uid_part = nfc4
            .anticollision(crate::nfc4::CascadeLevel::One)
            .await
            .unwrap();
        let result = nfc4.select(crate::nfc4::CascadeLevel::One, &uid_part).await;

        assert!(matches!(result, Err(Error::Crc)));
    }

    async fn echo_with_faults(mut sim: Sim) -> Result<usize, Error<Sim>> {
        sim.echo = true;
        let mut nfc4 = nfca_poller(sim).await;

        let mut rx = [0u8; 3];
        nfc4.transceive_blocking(TxRxContext {
            tx: TxFrame::bytes(&[0x01, 0x02, 0x03]),
            rx: &mut rx,
            flags: TxRxFlags::no_crc(),
            fwt: Some(FWT_T2T),
        })
        .await
    }

    #[tokio::test]
    async fn fifo_overflow_is_reported() {
        let mut sim = Sim::new(Vec::new());
        sim.fifo_overflow = true;

        assert!(matches!(echo_with_faults(sim).await, Err(Error::Overrun)));
    }

    #[tokio::test]
    async fn parity_error_is_reported() {
        let mut sim = Sim::new(Vec::new());
        sim.rx_errors = Interrupts::PAR;

        assert!(matches!(echo_with_faults(sim).await, Err(Error::Parity)));
    }

    #[tokio::test]
    async fn framing_errors_are_reported() {
        let mut sim = Sim::new(Vec::new());
        sim.rx_errors = Interrupts::ERR1;
        assert!(matches!(echo_with_faults(sim).await, Err(Error::Framing)));

        let mut sim = Sim::new(Vec::new());
        sim.rx_errors = Interrupts::ERR2;
        assert!(matches!(echo_with_faults(sim).await, Err(Error::Framing)));
    }
}
