//! 868 MHz RF Click: CC1120 sub-GHz transceiver
//!
//! The entry point to this driver is the [Cc1120] struct. After
//! [`Cc1120::reset`] and [`Cc1120::default_cfg`] the radio is calibrated and
//! idle, ready to send and receive variable length packets:
//!
//! - [`Cc1120::transmit`] loads the TX FIFO and starts the transmission,
//!   [`Cc1120::wait_transmitted`] reports when it is done.
//! - [`Cc1120::start_receive`] enters RX, [`Cc1120::receive`] returns the
//!   packet once the radio left RX.
//!
//! The [register-level interface] can be reached through [`Cc1120::ll`].
//!
//! [register-level interface]: ll

pub use config::Config;
pub use error::Error;
pub use ll::{State, Status, Strobe};

pub mod ll;

mod config;
mod error;

use config::{Synthesizer, REGISTER_DEFAULTS};

use crate::{
    hal_type::{delay::DelayNs, spi::SpiDevice},
    maybe_async_attr,
    register::Register,
};

/// `PARTNUMBER` of the CC1120
pub const PART_NUMBER: u8 = 0x48;

/// Largest payload of a variable length packet that fits the 128 byte FIFO
/// together with its length byte
pub const MAX_PAYLOAD_LEN: usize = 127;

/// `MARCSTATE` value in IDLE
pub const MARCSTATE_IDLE: u8 = 0x41;

/// Offset between the RSSI registers and dBm at the antenna
pub const RSSI_OFFSET_DBM: i16 = -102;

/// `FS_CAL2` offset for the first calibration run
const VCDAC_START_OFFSET: u8 = 2;

/// Reads of MARCSTATE before giving up on a calibration run
const CALIBRATION_POLLS: u32 = 1000;

/// Status reads before giving up on the chip after a reset
const RESET_POLLS: u32 = 10;

/// A received packet
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    /// Payload length
    pub len: usize,
    /// Signal strength during reception, in dBm
    pub rssi_dbm: i16,
    /// Link quality indicator, lower is better
    pub lqi: u8,
    /// CRC passed, or CRC disabled
    pub crc_ok: bool,
}

/// Results of one synthesizer calibration run
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Calibration {
    fs_vco2: u8,
    fs_vco4: u8,
    fs_chp: u8,
}

/// Entry point to the CC1120 driver API
pub struct Cc1120<SPI> {
    ll: ll::Cc1120<SPI>,
    config: Config,
}

impl<SPI> Cc1120<SPI>
where
    SPI: SpiDevice<u8>,
{
    /// Create a new instance of `Cc1120`
    ///
    /// Requires the SPI device connected to the CC1120.
    pub fn new(spi: SPI) -> Self {
        Cc1120 {
            ll: ll::Cc1120::new(spi),
            config: Config::default(),
        }
    }

    /// Returns the register-level interface
    pub fn ll(&mut self) -> &mut ll::Cc1120<SPI> {
        &mut self.ll
    }

    /// The configuration applied by the last [`Cc1120::default_cfg`]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Release the SPI device
    pub fn free(self) -> SPI {
        self.ll.spi
    }

    /// Reset the chip and wait until it reports ready
    #[maybe_async_attr]
    pub async fn reset<D>(&mut self, delay: &mut D) -> Result<(), Error<SPI>>
    where
        D: DelayNs,
    {
        self.ll.strobe(Strobe::Sres).await?;

        for _ in 0..RESET_POLLS {
            delay.delay_ms(1).await;
            if self.ll.strobe(Strobe::Snop).await?.chip_ready() {
                return Ok(());
            }
        }

        Err(Error::ChipNotReady)
    }

    /// Read the part number, `0x48` for the CC1120
    #[maybe_async_attr]
    pub async fn part_number(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.partnumber().read().await?.partnum())
    }

    /// Read the silicon revision
    #[maybe_async_attr]
    pub async fn part_version(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.partversion().read().await?.partver())
    }

    /// Write the default configuration and calibrate the synthesizer
    ///
    /// Checks the part number, writes the register table, applies `config`
    /// and runs [`Cc1120::manual_calibration`]. The radio is idle afterwards.
    #[maybe_async_attr]
    pub async fn default_cfg(&mut self, config: Config) -> Result<(), Error<SPI>> {
        let part = self.part_number().await?;
        if part != PART_NUMBER {
            return Err(Error::WrongChip(part));
        }

        for &(address, value) in REGISTER_DEFAULTS {
            self.ll.write_register(address, value).await?;
        }

        self.set_frequency(config.frequency_hz).await?;
        self.ll
            .pkt_cfg1()
            .modify(|_, w| w.crc_cfg(config.crc as u8))
            .await?;
        self.ll
            .pkt_len()
            .write(|w| w.packet_length(config.max_packet_len))
            .await?;
        self.config = config;

        self.manual_calibration().await
    }

    /// Calibrate the frequency synthesizer
    ///
    /// Runs the calibration twice, once with the VCDAC start value raised,
    /// and keeps the result with the higher VCO capacitor setting, as the
    /// CC1120 errata note requires.
    #[maybe_async_attr]
    pub async fn manual_calibration(&mut self) -> Result<(), Error<SPI>> {
        self.ll.fs_vco2().write(|w| w.bits(0)).await?;
        let fs_cal2 = self.ll.fs_cal2().read().await?.bits();
        self.ll
            .fs_cal2()
            .write(|w| w.bits(fs_cal2.wrapping_add(VCDAC_START_OFFSET)))
            .await?;

        self.ll.strobe(Strobe::Scal).await?;
        self.wait_calibrated().await?;
        let high = self.read_calibration().await?;

        self.ll.fs_vco2().write(|w| w.bits(0)).await?;
        self.ll.fs_cal2().write(|w| w.bits(fs_cal2)).await?;

        self.ll.strobe(Strobe::Scal).await?;
        self.wait_calibrated().await?;
        let mid = self.read_calibration().await?;

        let best = if high.fs_vco2 > mid.fs_vco2 { high } else { mid };
        debug!("synthesizer calibrated: {}", best);

        self.ll.fs_vco2().write(|w| w.bits(best.fs_vco2)).await?;
        self.ll.fs_vco4().write(|w| w.bits(best.fs_vco4)).await?;
        self.ll.fs_chp().write(|w| w.bits(best.fs_chp)).await?;

        Ok(())
    }

    #[maybe_async_attr]
    async fn wait_calibrated(&mut self) -> Result<(), Error<SPI>> {
        for _ in 0..CALIBRATION_POLLS {
            if self.marc_state().await? == MARCSTATE_IDLE {
                return Ok(());
            }
        }

        Err(Error::CalibrationTimeout)
    }

    #[maybe_async_attr]
    async fn read_calibration(&mut self) -> Result<Calibration, Error<SPI>> {
        Ok(Calibration {
            fs_vco2: self.ll.fs_vco2().read().await?.bits(),
            fs_vco4: self.ll.fs_vco4().read().await?.bits(),
            fs_chp: self.ll.fs_chp().read().await?.bits(),
        })
    }

    /// Set the carrier frequency
    ///
    /// Selects the LO divider band for `hz` and writes the frequency word.
    /// Frequencies outside the supported bands are rejected with
    /// [`Error::InvalidConfiguration`]. Call [`Cc1120::manual_calibration`]
    /// afterwards.
    #[maybe_async_attr]
    pub async fn set_frequency(&mut self, hz: u32) -> Result<(), Error<SPI>> {
        let synth = Synthesizer::for_frequency(hz).ok_or(Error::InvalidConfiguration)?;

        self.ll
            .fs_cfg()
            .modify(|_, w| w.fsd_bandselect(synth.bandselect))
            .await?;
        self.ll
            .write_registers(ll::FREQ2, &synth.freq_bytes())
            .await?;

        Ok(())
    }

    /// Load a packet into the TX FIFO and start transmitting it
    ///
    /// The payload is sent as a variable length packet. Use
    /// [`Cc1120::wait_transmitted`] to wait for completion.
    #[maybe_async_attr]
    pub async fn transmit(&mut self, payload: &[u8]) -> Result<(), Error<SPI>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge);
        }

        self.ll.strobe(Strobe::Sidle).await?;
        self.ll.strobe(Strobe::Sftx).await?;
        self.ll.write_fifo(&[payload.len() as u8]).await?;
        if !payload.is_empty() {
            self.ll.write_fifo(payload).await?;
        }
        self.ll.strobe(Strobe::Stx).await?;

        Ok(())
    }

    /// Wait for the transmission to finish
    ///
    /// Completes when the radio is back in IDLE with an empty TX FIFO. The
    /// FIFO check covers the first polls after STX, where MARCSTATE may still
    /// read IDLE. A TX FIFO error flushes the FIFO and returns
    /// [`Error::TxUnderflow`].
    #[maybe_async_attr]
    pub async fn wait_transmitted(&mut self) -> nb::Result<(), Error<SPI>> {
        let mut marcstate = [0];
        let status = self
            .ll
            .read_registers(ll::MARCSTATE::ADDRESS, &mut marcstate)
            .await
            .map_err(Error::Spi)?;

        if status.state() == State::TxFifoError {
            self.ll.strobe(Strobe::Sftx).await.map_err(Error::Spi)?;
            return Err(nb::Error::Other(Error::TxUnderflow));
        }
        if marcstate[0] != MARCSTATE_IDLE {
            return Err(nb::Error::WouldBlock);
        }

        let tx_bytes = self
            .ll
            .num_txbytes()
            .read()
            .await
            .map_err(Error::Spi)?
            .txbytes();
        if tx_bytes != 0 {
            return Err(nb::Error::WouldBlock);
        }

        Ok(())
    }

    /// Flush the RX FIFO and enter RX
    #[maybe_async_attr]
    pub async fn start_receive(&mut self) -> Result<(), Error<SPI>> {
        self.ll.strobe(Strobe::Sidle).await?;
        self.ll.strobe(Strobe::Sfrx).await?;
        self.ll.strobe(Strobe::Srx).await?;

        Ok(())
    }

    /// Wait for a packet and read it into `buf`
    ///
    /// Returns `WouldBlock` while the radio is still in RX. The payload is
    /// written to `buf[..packet.len]`. An RX FIFO error flushes the FIFO and
    /// returns [`Error::RxOverflow`].
    #[maybe_async_attr]
    pub async fn receive(&mut self, buf: &mut [u8]) -> nb::Result<Packet, Error<SPI>> {
        let status = self.ll.strobe(Strobe::Snop).await.map_err(Error::Spi)?;
        match status.state() {
            State::RxFifoError => {
                self.ll.strobe(Strobe::Sfrx).await.map_err(Error::Spi)?;
                return Err(nb::Error::Other(Error::RxOverflow));
            }
            State::Rx | State::Settling => return Err(nb::Error::WouldBlock),
            _ => {}
        }

        let rx_bytes = self
            .ll
            .num_rxbytes()
            .read()
            .await
            .map_err(Error::Spi)?
            .rxbytes();
        if rx_bytes == 0 {
            return Err(nb::Error::WouldBlock);
        }

        let mut len = [0];
        self.ll.read_fifo(&mut len).await.map_err(Error::Spi)?;
        let len = len[0] as usize;
        if len > buf.len() {
            self.ll.strobe(Strobe::Sfrx).await.map_err(Error::Spi)?;
            return Err(nb::Error::Other(Error::BufferTooSmall { required_len: len }));
        }
        if len > 0 {
            self.ll
                .read_fifo(&mut buf[..len])
                .await
                .map_err(Error::Spi)?;
        }

        let mut appended = [0; 2];
        self.ll
            .read_fifo(&mut appended)
            .await
            .map_err(Error::Spi)?;

        let crc_ok = !self.config.crc || appended[1] & 0x80 != 0;
        if !crc_ok {
            return Err(nb::Error::Other(Error::CrcMismatch));
        }

        Ok(Packet {
            len,
            rssi_dbm: appended[0] as i8 as i16 + RSSI_OFFSET_DBM,
            lqi: appended[1] & 0x7F,
            crc_ok,
        })
    }

    /// Current signal strength in dBm, rounded down
    #[maybe_async_attr]
    pub async fn rssi(&mut self) -> Result<i16, Error<SPI>> {
        let rssi = self.ll.rssi().read().await?;
        let raw = ((rssi.rssi_11_4() as i8 as i16) << 4) | rssi.rssi_3_0() as i16;

        Ok((raw >> 4) + RSSI_OFFSET_DBM)
    }

    /// Exit RX/TX and enter IDLE
    #[maybe_async_attr]
    pub async fn idle(&mut self) -> Result<(), Error<SPI>> {
        self.ll.strobe(Strobe::Sidle).await?;
        Ok(())
    }

    /// Enter sleep mode
    ///
    /// Any SPI access wakes the chip up again.
    #[maybe_async_attr]
    pub async fn sleep(&mut self) -> Result<(), Error<SPI>> {
        self.ll.strobe(Strobe::Sidle).await?;
        self.ll.strobe(Strobe::Spwd).await?;
        Ok(())
    }

    /// Read the status byte
    #[maybe_async_attr]
    pub async fn status(&mut self) -> Result<Status, Error<SPI>> {
        Ok(self.ll.strobe(Strobe::Snop).await?)
    }

    /// Read the `MARCSTATE` register
    #[maybe_async_attr]
    pub async fn marc_state(&mut self) -> Result<u8, Error<SPI>> {
        Ok(self.ll.marcstate().read().await?.bits())
    }
}

#[cfg(all(test, feature = "async"))]
mod test {
    use super::*;

    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        spi::{Mock as SpiMock, Transaction as SpiTransaction},
    };

    fn header(address: u16, flags: u8) -> Vec<u8> {
        if address > 0xFF {
            vec![0x2F | flags, address as u8]
        } else {
            vec![address as u8 | flags]
        }
    }

    fn strobe(strobe: Strobe, status: u8) -> Vec<SpiTransaction<u8>> {
        vec![
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer_in_place(vec![strobe as u8], vec![status]),
            SpiTransaction::transaction_end(),
        ]
    }

    fn access(address: u16, flags: u8, status: u8, data: SpiTransaction<u8>) -> Vec<SpiTransaction<u8>> {
        let header = header(address, flags);
        let mut response = vec![0; header.len()];
        response[0] = status;
        vec![
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer_in_place(header, response),
            data,
            SpiTransaction::transaction_end(),
        ]
    }

    fn read(address: u16, value: u8) -> Vec<SpiTransaction<u8>> {
        access(address, 0x80, 0x00, SpiTransaction::read_vec(vec![value]))
    }

    fn write(address: u16, data: &[u8]) -> Vec<SpiTransaction<u8>> {
        let flags = if data.len() > 1 { 0x40 } else { 0x00 };
        access(address, flags, 0x00, SpiTransaction::write_vec(data.to_vec()))
    }

    fn read_fifo(data: &[u8]) -> Vec<SpiTransaction<u8>> {
        access(0x3F, 0xC0, 0x00, SpiTransaction::read_vec(data.to_vec()))
    }

    fn calibration() -> Vec<SpiTransaction<u8>> {
        [
            write(0x2F25, &[0x00]),
            read(0x2F15, 0x20),
            write(0x2F15, &[0x22]),
            strobe(Strobe::Scal, 0x40),
            read(0x2F73, 0x11),
            read(0x2F73, MARCSTATE_IDLE),
            read(0x2F25, 0x30),
            read(0x2F23, 0x11),
            read(0x2F18, 0x22),
            write(0x2F25, &[0x00]),
            write(0x2F15, &[0x20]),
            strobe(Strobe::Scal, 0x40),
            read(0x2F73, MARCSTATE_IDLE),
            read(0x2F25, 0x28),
            read(0x2F23, 0x12),
            read(0x2F18, 0x23),
            write(0x2F25, &[0x30]),
            write(0x2F23, &[0x11]),
            write(0x2F18, &[0x22]),
        ]
        .concat()
    }

    #[tokio::test]
    async fn reset_waits_for_chip_ready() {
        let expectations = [
            strobe(Strobe::Sres, 0x80),
            strobe(Strobe::Snop, 0x80),
            strobe(Strobe::Snop, 0x00),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        cc1120.reset(&mut NoopDelay).await.unwrap();

        cc1120.free().done();
    }

    #[tokio::test]
    async fn reset_gives_up_eventually() {
        let mut expectations = strobe(Strobe::Sres, 0x80);
        for _ in 0..RESET_POLLS {
            expectations.extend(strobe(Strobe::Snop, 0x80));
        }
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        let result = cc1120.reset(&mut NoopDelay).await;

        assert!(matches!(result, Err(Error::ChipNotReady)));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn calibration_keeps_higher_capdac() {
        let mut cc1120 = Cc1120::new(SpiMock::new(&calibration()));

        cc1120.manual_calibration().await.unwrap();

        cc1120.free().done();
    }

    #[tokio::test]
    async fn calibration_times_out() {
        let mut expectations = [
            write(0x2F25, &[0x00]),
            read(0x2F15, 0x20),
            write(0x2F15, &[0x22]),
            strobe(Strobe::Scal, 0x40),
        ]
        .concat();
        for _ in 0..CALIBRATION_POLLS {
            expectations.extend(read(0x2F73, 0x11));
        }
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        let result = cc1120.manual_calibration().await;

        assert!(matches!(result, Err(Error::CalibrationTimeout)));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn default_cfg_writes_table_then_calibrates() {
        let mut expectations = read(0x2F8F, PART_NUMBER);
        for &(address, value) in REGISTER_DEFAULTS {
            expectations.extend(write(address, &[value]));
        }
        expectations.extend(read(0x21, 0x12));
        expectations.extend(write(0x21, &[0x12]));
        expectations.extend(write(0x2F0C, &[0x6C, 0x80, 0x00]));
        expectations.extend(read(0x27, 0x05));
        expectations.extend(write(0x27, &[0x05]));
        expectations.extend(write(0x2E, &[127]));
        expectations.extend(calibration());
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        cc1120.default_cfg(Config::default()).await.unwrap();

        assert_eq!(cc1120.config(), &Config::default());
        cc1120.free().done();
    }

    #[tokio::test]
    async fn default_cfg_checks_part_number() {
        let expectations = read(0x2F8F, 0x58);
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        let result = cc1120.default_cfg(Config::default()).await;

        assert!(matches!(result, Err(Error::WrongChip(0x58))));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn set_frequency_selects_band() {
        let expectations = [
            read(0x21, 0x12),
            write(0x21, &[0x14]),
            write(0x2F0C, &[0x6C, 0x80, 0x00]),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        cc1120.set_frequency(434_000_000).await.unwrap();
        let result = cc1120.set_frequency(600_000_000).await;

        assert!(matches!(result, Err(Error::InvalidConfiguration)));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn transmit_loads_length_and_payload() {
        let expectations = [
            strobe(Strobe::Sidle, 0x00),
            strobe(Strobe::Sftx, 0x00),
            access(0x3F, 0x40, 0x00, SpiTransaction::write_vec(vec![3])),
            access(0x3F, 0x40, 0x00, SpiTransaction::write_vec(vec![1, 2, 3])),
            strobe(Strobe::Stx, 0x00),
            read(0x2F73, 0x33),
            read(0x2F73, MARCSTATE_IDLE),
            read(0x2FD6, 0),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        cc1120.transmit(&[1, 2, 3]).await.unwrap();
        assert!(matches!(
            cc1120.wait_transmitted().await,
            Err(nb::Error::WouldBlock)
        ));
        cc1120.wait_transmitted().await.unwrap();

        cc1120.free().done();
    }

    #[tokio::test]
    async fn idle_before_tx_starts_is_not_completion() {
        let expectations = [
            // Still IDLE right after STX, packet in the FIFO
            read(0x2F73, MARCSTATE_IDLE),
            read(0x2FD6, 4),
            read(0x2F73, 0x33),
            read(0x2F73, MARCSTATE_IDLE),
            read(0x2FD6, 0),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        assert!(matches!(
            cc1120.wait_transmitted().await,
            Err(nb::Error::WouldBlock)
        ));
        assert!(matches!(
            cc1120.wait_transmitted().await,
            Err(nb::Error::WouldBlock)
        ));
        cc1120.wait_transmitted().await.unwrap();

        cc1120.free().done();
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let mut cc1120 = Cc1120::new(SpiMock::new(&[]));

        let result = cc1120.transmit(&[0; MAX_PAYLOAD_LEN + 1]).await;

        assert!(matches!(result, Err(Error::PayloadTooLarge)));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn tx_fifo_error_is_flushed() {
        let expectations = [
            access(0x2F73, 0x80, 0x70, SpiTransaction::read_vec(vec![0x36])),
            strobe(Strobe::Sftx, 0x70),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        let result = cc1120.wait_transmitted().await;

        assert!(matches!(
            result,
            Err(nb::Error::Other(Error::TxUnderflow))
        ));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn receive_reads_packet_and_status() {
        let expectations = [
            strobe(Strobe::Sidle, 0x00),
            strobe(Strobe::Sfrx, 0x00),
            strobe(Strobe::Srx, 0x00),
            strobe(Strobe::Snop, 0x10),
            strobe(Strobe::Snop, 0x00),
            read(0x2FD7, 6),
            read_fifo(&[3]),
            read_fifo(&[0xAA, 0xBB, 0xCC]),
            read_fifo(&[0x2A, 0x80 | 0x15]),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));
        let mut buf = [0; 16];

        cc1120.start_receive().await.unwrap();
        assert!(matches!(
            cc1120.receive(&mut buf).await,
            Err(nb::Error::WouldBlock)
        ));
        let packet = cc1120.receive(&mut buf).await.unwrap();

        assert_eq!(
            packet,
            Packet {
                len: 3,
                rssi_dbm: -60,
                lqi: 0x15,
                crc_ok: true,
            }
        );
        assert_eq!(&buf[..3], &[0xAA, 0xBB, 0xCC]);
        cc1120.free().done();
    }

    #[tokio::test]
    async fn receive_reports_crc_mismatch() {
        let expectations = [
            strobe(Strobe::Snop, 0x00),
            read(0x2FD7, 4),
            read_fifo(&[1]),
            read_fifo(&[0x55]),
            read_fifo(&[0x2A, 0x15]),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));
        let mut buf = [0; 16];

        let result = cc1120.receive(&mut buf).await;

        assert!(matches!(
            result,
            Err(nb::Error::Other(Error::CrcMismatch))
        ));
        cc1120.free().done();
    }

    #[tokio::test]
    async fn receive_checks_buffer_and_overflow() {
        let expectations = [
            strobe(Strobe::Snop, 0x00),
            read(0x2FD7, 12),
            read_fifo(&[10]),
            strobe(Strobe::Sfrx, 0x00),
            strobe(Strobe::Snop, 0x60),
            strobe(Strobe::Sfrx, 0x60),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));
        let mut buf = [0; 4];

        let result = cc1120.receive(&mut buf).await;
        assert!(matches!(
            result,
            Err(nb::Error::Other(Error::BufferTooSmall { required_len: 10 }))
        ));

        let result = cc1120.receive(&mut buf).await;
        assert!(matches!(
            result,
            Err(nb::Error::Other(Error::RxOverflow))
        ));

        cc1120.free().done();
    }

    #[tokio::test]
    async fn rssi_applies_offset() {
        let expectations = access(
            0x2F71,
            0xC0,
            0x10,
            SpiTransaction::read_vec(vec![0x2A, 0x49]),
        );
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        assert_eq!(cc1120.rssi().await.unwrap(), -60);

        cc1120.free().done();
    }

    #[tokio::test]
    async fn sleep_goes_through_idle() {
        let expectations = [
            strobe(Strobe::Sidle, 0x10),
            strobe(Strobe::Spwd, 0x00),
            strobe(Strobe::Snop, 0x80),
        ]
        .concat();
        let mut cc1120 = Cc1120::new(SpiMock::new(&expectations));

        cc1120.sleep().await.unwrap();
        let status = cc1120.status().await.unwrap();

        assert!(!status.chip_ready());
        assert_eq!(status.state(), State::Idle);
        cc1120.free().done();
    }
}
