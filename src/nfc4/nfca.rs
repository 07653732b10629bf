//! ISO14443-A poller
//!
//! Card detection, anticollision and selection over up to three cascade
//! levels, HLTA and Type 2 Tag page reads.

use embedded_hal::digital::InputPin;

use super::{Error, Nfc4, NfcA, Ready, ShortFrame, TxFrame, TxRxContext, TxRxFlags};
use crate::{hal_type::spi::SpiDevice, maybe_async_attr};

/// Frame waiting time for anticollision and SELECT, in 1/fc
pub const FWT_ANTICOLLISION: u32 = 1236 + 576;

/// Frame waiting time after HLTA, in 1/fc (1 ms)
pub const FWT_HLTA: u32 = 13560;

/// Frame waiting time for Type 2 Tag commands, in 1/fc (5 ms)
pub const FWT_T2T: u32 = 67800;

/// Cascade tag, first UID byte of a cascade level that is not the last one
pub const CASCADE_TAG: u8 = 0x88;

/// SAK bit set while the UID is not complete
const SAK_CASCADE: u8 = 0x04;

/// SAK bits that encode the supported protocols
const SAK_PROTOCOL_MASK: u8 = 0x60;

/// ATQA bits announcing bit frame anticollision support
const ATQA_ANTICOLLISION_MASK: u8 = 0x1F;

const SEL_CMD: [u8; 3] = [0x93, 0x95, 0x97];
const NVB_SELECT: u8 = 0x70;
const HLTA: [u8; 2] = [0x50, 0x00];
const T2T_READ: u8 = 0x30;

/// SEL + NVB + four UID bytes + BCC
const SDD_FRAME_BITS: usize = 7 * 8;

/// Compute the ISO14443-A CRC of `data`
///
/// Returns the two CRC bytes in transmission order.
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x8408
            } else {
                crc >> 1
            };
        }
    }

    crc.to_le_bytes()
}

/// XOR check byte over a UID part
pub fn bcc(uid_part: &[u8]) -> u8 {
    uid_part.iter().fold(0, |acc, b| acc ^ b)
}

/// Cascade level of the anticollision/select sequence
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CascadeLevel {
    /// First level, SEL 0x93
    One,
    /// Second level, SEL 0x95
    Two,
    /// Third level, SEL 0x97
    Three,
}

impl CascadeLevel {
    const ALL: [CascadeLevel; 3] = [CascadeLevel::One, CascadeLevel::Two, CascadeLevel::Three];

    /// SEL command byte of this level
    pub fn sel(self) -> u8 {
        SEL_CMD[self as usize]
    }
}

/// What a card supports, derived from its SAK and ATQA
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// Type 1 Tag, no anticollision support
    T1T,
    /// Type 2 Tag
    #[default]
    T2T,
    /// Type 4 Tag (ISO-DEP)
    T4T,
    /// NFC-DEP
    NfcDep,
    /// ISO-DEP and NFC-DEP
    NfcDepT4T,
}

impl DeviceKind {
    /// Classify a card
    pub fn from_response(atqa: [u8; 2], sak: u8) -> Self {
        if atqa[0] & ATQA_ANTICOLLISION_MASK == 0 {
            return DeviceKind::T1T;
        }

        match sak & SAK_PROTOCOL_MASK {
            0x00 => DeviceKind::T2T,
            0x20 => DeviceKind::T4T,
            0x40 => DeviceKind::NfcDep,
            _ => DeviceKind::NfcDepT4T,
        }
    }
}

/// A card found in the field
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NfcaDevice {
    /// Answer to REQA/WUPA
    pub atqa: [u8; 2],
    /// Select acknowledge of the last cascade level
    pub sak: u8,
    /// UID storage, only the first `uid_len` bytes are valid
    pub uid: [u8; 10],
    /// UID length: 4, 7 or 10, 0 for Type 1 Tags
    pub uid_len: usize,
    /// Card type
    pub kind: DeviceKind,
}

impl NfcaDevice {
    /// The UID bytes
    pub fn uid(&self) -> &[u8] {
        &self.uid[..self.uid_len]
    }
}

impl<SPI, IRQ> Nfc4<SPI, IRQ, NfcA>
where
    SPI: SpiDevice<u8>,
    IRQ: InputPin,
{
    /// Switch the field off and leave the poller mode
    #[maybe_async_attr]
    pub async fn into_ready(mut self) -> Result<Nfc4<SPI, IRQ, Ready>, Error<SPI>> {
        self.field_off().await?;

        Ok(Nfc4 {
            ll: self.ll,
            irq: self.irq,
            irq_status: self.irq_status,
            irq_mask: self.irq_mask,
            state: Ready,
        })
    }

    /// Send REQA
    ///
    /// Returns the ATQA, or `None` if no card answered. Colliding answers
    /// still mean a card is present and are returned as received.
    #[maybe_async_attr]
    pub async fn reqa(&mut self) -> Result<Option<[u8; 2]>, Error<SPI>> {
        self.short_frame(ShortFrame::Reqa).await
    }

    /// Send WUPA, which also wakes halted cards
    #[maybe_async_attr]
    pub async fn wupa(&mut self) -> Result<Option<[u8; 2]>, Error<SPI>> {
        self.short_frame(ShortFrame::Wupa).await
    }

    /// Returns `true` if any card answers REQA
    #[maybe_async_attr]
    pub async fn detect_presence(&mut self) -> Result<bool, Error<SPI>> {
        match self.reqa().await {
            Ok(atqa) => Ok(atqa.is_some()),
            // A garbled answer is still an answer
            Err(Error::Crc | Error::Parity | Error::Framing) => Ok(true),
            Err(error) => Err(error),
        }
    }

    /// Run the anticollision loop of one cascade level
    ///
    /// Returns the four UID bytes of the level followed by their BCC. On a
    /// collision the card with a 1 at the colliding bit wins.
    #[maybe_async_attr]
    pub async fn anticollision(&mut self, level: CascadeLevel) -> Result<[u8; 5], Error<SPI>> {
        let mut frame = [0u8; 7];
        frame[0] = level.sel();

        // Bits of the frame fixed so far, SEL and NVB included
        let mut known = 16;

        for _ in 0..=32 {
            let bytes = known / 8;
            let bits = known % 8;
            frame[1] = ((bytes as u8) << 4) | bits as u8;

            let mut rx = [0u8; 7];
            let result = self
                .transceive_blocking(TxRxContext {
                    tx: TxFrame::Bits {
                        data: &frame[..bytes + (bits > 0) as usize],
                        bits: known,
                    },
                    rx: &mut rx[..7 - bytes],
                    flags: TxRxFlags::bit_oriented(),
                    fwt: Some(FWT_ANTICOLLISION),
                })
                .await;

            match result {
                Ok(rx_bits) => {
                    if bytes * 8 + rx_bits != SDD_FRAME_BITS {
                        return Err(Error::Protocol);
                    }
                    merge_sdd_response(&mut frame, &rx, known, 7);

                    let mut uid_part = [0u8; 5];
                    uid_part.copy_from_slice(&frame[2..7]);
                    if bcc(&uid_part[..4]) != uid_part[4] {
                        return Err(Error::Bcc);
                    }

                    return Ok(uid_part);
                }
                Err(Error::Collision { byte, bit }) => {
                    let position = byte as usize * 8 + bit as usize;
                    if position < known || position >= SDD_FRAME_BITS {
                        return Err(Error::Protocol);
                    }
                    trace!("collision at bit {=usize}", position);

                    merge_sdd_response(&mut frame, &rx, known, position / 8 + 1);

                    let index = position / 8;
                    let mask = (1u8 << (position % 8)) - 1;
                    frame[index] = (frame[index] & mask) | (1 << (position % 8));
                    frame[index + 1..].fill(0);
                    known = position + 1;

                    // All UID bits fixed, the check byte follows from them
                    if known >= SDD_FRAME_BITS - 8 {
                        frame[6] = bcc(&frame[2..6]);

                        let mut uid_part = [0u8; 5];
                        uid_part.copy_from_slice(&frame[2..7]);
                        return Ok(uid_part);
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Err(Error::Protocol)
    }

    /// Select the card with the given UID part and BCC
    ///
    /// Returns the SAK.
    #[maybe_async_attr]
    pub async fn select(&mut self, level: CascadeLevel, uid_part: &[u8; 5]) -> Result<u8, Error<SPI>> {
        let mut frame = [0u8; 7];
        frame[0] = level.sel();
        frame[1] = NVB_SELECT;
        frame[2..].copy_from_slice(uid_part);

        let mut rx = [0u8; 3];
        let rx_bits = self
            .transceive_blocking(TxRxContext {
                tx: TxFrame::bytes(&frame),
                rx: &mut rx,
                flags: TxRxFlags::default(),
                fwt: Some(FWT_ANTICOLLISION),
            })
            .await?;

        if rx_bits != 8 {
            return Err(Error::Protocol);
        }

        Ok(rx[0])
    }

    /// Activate one card after REQA/WUPA
    ///
    /// Walks the cascade levels until the SAK reports a complete UID.
    #[maybe_async_attr]
    pub async fn single_collision_resolution(&mut self) -> Result<NfcaDevice, Error<SPI>> {
        let atqa = self.state.atqa.ok_or(Error::Protocol)?;
        let mut device = NfcaDevice {
            atqa,
            ..Default::default()
        };

        for level in CascadeLevel::ALL {
            let uid_part = self.anticollision(level).await?;
            let sak = self.select(level, &uid_part).await?;

            if sak & SAK_CASCADE != 0 {
                if uid_part[0] != CASCADE_TAG || level == CascadeLevel::Three {
                    return Err(Error::Protocol);
                }
                device.uid[device.uid_len..device.uid_len + 3].copy_from_slice(&uid_part[1..4]);
                device.uid_len += 3;
                continue;
            }

            device.uid[device.uid_len..device.uid_len + 4].copy_from_slice(&uid_part[..4]);
            device.uid_len += 4;
            device.sak = sak;
            device.kind = DeviceKind::from_response(atqa, sak);
            debug!("nfca device, uid len {=usize}", device.uid_len);

            return Ok(device);
        }

        Err(Error::Protocol)
    }

    /// Put the selected card to sleep
    #[maybe_async_attr]
    pub async fn hlta(&mut self) -> Result<(), Error<SPI>> {
        let result = self
            .transceive_blocking(TxRxContext {
                tx: TxFrame::bytes(&HLTA),
                rx: &mut [],
                flags: TxRxFlags::default(),
                fwt: Some(FWT_HLTA),
            })
            .await;

        // A halted card does not answer
        match result {
            Ok(_) | Err(Error::Timeout) => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Find and activate every card in the field
    ///
    /// Each card is halted after activation so the next one can answer.
    /// Returns the number of devices written to `devices`.
    #[maybe_async_attr]
    pub async fn poll_devices(&mut self, devices: &mut [NfcaDevice]) -> Result<usize, Error<SPI>> {
        let mut found = 0;

        while found < devices.len() {
            let atqa = if found == 0 {
                self.wupa().await?
            } else {
                self.reqa().await?
            };
            let Some(atqa) = atqa else {
                break;
            };

            if DeviceKind::from_response(atqa, 0) == DeviceKind::T1T {
                devices[found] = NfcaDevice {
                    atqa,
                    kind: DeviceKind::T1T,
                    ..Default::default()
                };
                found += 1;
                break;
            }

            devices[found] = self.single_collision_resolution().await?;
            self.hlta().await?;
            found += 1;
        }

        Ok(found)
    }

    /// Read four pages (16 bytes) of a Type 2 Tag starting at `page`
    #[maybe_async_attr]
    pub async fn t2t_read(&mut self, page: u8, buf: &mut [u8; 16]) -> Result<(), Error<SPI>> {
        let mut rx = [0u8; 18];
        let rx_bits = self
            .transceive_blocking(TxRxContext {
                tx: TxFrame::bytes(&[T2T_READ, page]),
                rx: &mut rx,
                flags: TxRxFlags::default(),
                fwt: Some(FWT_T2T),
            })
            .await?;

        if rx_bits != 16 * 8 {
            return Err(Error::Protocol);
        }
        buf.copy_from_slice(&rx[..16]);

        Ok(())
    }

    #[maybe_async_attr]
    async fn short_frame(&mut self, frame: ShortFrame) -> Result<Option<[u8; 2]>, Error<SPI>> {
        let mut rx = [0u8; 2];
        let result = self
            .transceive_blocking(TxRxContext {
                tx: TxFrame::Short(frame),
                rx: &mut rx,
                flags: TxRxFlags::no_crc(),
                fwt: Some(FWT_ANTICOLLISION),
            })
            .await;

        let atqa = match result {
            Ok(16) | Err(Error::Collision { .. }) => Some(rx),
            Ok(_) => return Err(Error::Protocol),
            Err(Error::Timeout) => None,
            Err(error) => return Err(error),
        };
        self.state.atqa = atqa;

        Ok(atqa)
    }
}

/// Copy the received part of an SDD frame behind the `known` bits
///
/// The first received byte shares its position with the last, incomplete
/// transmitted byte. Its low bits are the transmitted ones.
fn merge_sdd_response(frame: &mut [u8; 7], rx: &[u8; 7], known: usize, end: usize) {
    let first = known / 8;
    let keep = (1u8 << (known % 8)) - 1;

    for (i, index) in (first..end.min(frame.len())).enumerate() {
        frame[index] = if i == 0 {
            (frame[index] & keep) | (rx[0] & !keep)
        } else {
            rx[i]
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[cfg(feature = "async")]
    use crate::nfc4::sim::{nfca_poller, Card, Sim};

    #[test]
    fn crc_a_of_hlta() {
        assert_eq!(crc_a(&HLTA), [0x57, 0xCD]);
    }

    #[test]
    fn device_kind_from_sak() {
        assert_eq!(DeviceKind::from_response([0x44, 0x00], 0x00), DeviceKind::T2T);
        assert_eq!(DeviceKind::from_response([0x04, 0x00], 0x20), DeviceKind::T4T);
        assert_eq!(DeviceKind::from_response([0x04, 0x00], 0x40), DeviceKind::NfcDep);
        assert_eq!(DeviceKind::from_response([0x04, 0x00], 0x60), DeviceKind::NfcDepT4T);
        assert_eq!(DeviceKind::from_response([0x00, 0x0C], 0x00), DeviceKind::T1T);
    }

    #[test]
    fn merge_keeps_transmitted_low_bits() {
        let mut frame = [0x93, 0x25, 0x11, 0x0A, 0, 0, 0];
        let rx = [0xF0, 0x33, 0x44, 0x55, 0, 0, 0];

        merge_sdd_response(&mut frame, &rx, 3 * 8 + 4, 7);

        assert_eq!(frame, [0x93, 0x25, 0x11, 0xFA, 0x33, 0x44, 0x55]);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn single_card_with_short_uid() {
        let mut nfc4 = nfca_poller(Sim::new(vec![Card::new(&[0x04, 0xA1, 0xB2, 0xC3], 0x00)])).await;

        let mut devices = [NfcaDevice::default(); 4];
        let found = nfc4.poll_devices(&mut devices).await.unwrap();

        assert_eq!(found, 1);
        assert_eq!(devices[0].uid(), &[0x04, 0xA1, 0xB2, 0xC3]);
        assert_eq!(devices[0].atqa, [0x04, 0x00]);
        assert_eq!(devices[0].sak, 0x00);
        assert_eq!(devices[0].kind, DeviceKind::T2T);

        // WUPA first, REQA once the card is halted
        let (sim, _) = nfc4.free();
        assert_eq!(sim.frames[0], [0x52]);
        assert!(sim.frames.contains(&vec![0x50, 0x00]));
        assert_eq!(sim.frames.last(), Some(&vec![0x26]));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn double_size_uid_uses_two_cascade_levels() {
        let uid = [0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        let mut nfc4 = nfca_poller(Sim::new(vec![Card::new(&uid, 0x00)])).await;

        assert_eq!(nfc4.wupa().await.unwrap(), Some([0x44, 0x00]));
        let device = nfc4.single_collision_resolution().await.unwrap();

        assert_eq!(device.uid(), &uid);
        assert_eq!(device.uid_len, 7);

        let (sim, _) = nfc4.free();
        let selects: Vec<u8> = sim
            .frames
            .iter()
            .filter(|frame| frame.len() == 7 && frame[1] == NVB_SELECT)
            .map(|frame| frame[0])
            .collect();
        assert_eq!(selects, [0x93, 0x95]);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn triple_size_uid_iso_dep_card() {
        let uid = [0x08, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        let mut nfc4 = nfca_poller(Sim::new(vec![Card::new(&uid, 0x20)])).await;

        nfc4.wupa().await.unwrap();
        let device = nfc4.single_collision_resolution().await.unwrap();

        assert_eq!(device.uid(), &uid);
        assert_eq!(device.sak, 0x20);
        assert_eq!(device.kind, DeviceKind::T4T);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn colliding_cards_are_resolved_one_by_one() {
        let mut nfc4 = nfca_poller(Sim::new(vec![
            Card::new(&[0x01, 0x02, 0x03, 0x04], 0x00),
            Card::new(&[0x01, 0x02, 0x03, 0x05], 0x00),
        ]))
        .await;

        let mut devices = [NfcaDevice::default(); 4];
        let found = nfc4.poll_devices(&mut devices).await.unwrap();

        assert_eq!(found, 2);
        // The colliding bit is resolved towards 1 first
        assert_eq!(devices[0].uid(), &[0x01, 0x02, 0x03, 0x05]);
        assert_eq!(devices[1].uid(), &[0x01, 0x02, 0x03, 0x04]);

        let (sim, _) = nfc4.free();
        assert!(sim.frames.iter().any(|frame| frame.len() == 6 && frame[1] == 0x51));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn collision_inside_first_uid_byte() {
        let mut nfc4 = nfca_poller(Sim::new(vec![
            Card::new(&[0x10, 0xAA, 0xBB, 0xCC], 0x00),
            Card::new(&[0x30, 0xAA, 0xBB, 0xCC], 0x00),
        ]))
        .await;

        nfc4.wupa().await.unwrap();
        let uid_part = nfc4.anticollision(CascadeLevel::One).await.unwrap();

        assert_eq!(uid_part, [0x30, 0xAA, 0xBB, 0xCC, 0x30 ^ 0xAA ^ 0xBB ^ 0xCC]);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn buffer_limits_number_of_devices() {
        let mut nfc4 = nfca_poller(Sim::new(vec![
            Card::new(&[0x01, 0x02, 0x03, 0x04], 0x00),
            Card::new(&[0x81, 0x02, 0x03, 0x04], 0x00),
        ]))
        .await;

        let mut devices = [NfcaDevice::default(); 1];
        let found = nfc4.poll_devices(&mut devices).await.unwrap();

        assert_eq!(found, 1);
        assert_eq!(devices[0].uid(), &[0x81, 0x02, 0x03, 0x04]);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn type_1_tag_stops_polling() {
        let mut card = Card::new(&[0x01, 0x02, 0x03, 0x04], 0x00);
        card.atqa = [0x00, 0x0C];
        let mut nfc4 = nfca_poller(Sim::new(vec![card])).await;

        let mut devices = [NfcaDevice::default(); 4];
        let found = nfc4.poll_devices(&mut devices).await.unwrap();

        assert_eq!(found, 1);
        assert_eq!(devices[0].kind, DeviceKind::T1T);
        assert!(devices[0].uid().is_empty());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn presence_and_halt() {
        let mut nfc4 = nfca_poller(Sim::new(vec![Card::new(&[0x01, 0x02, 0x03, 0x04], 0x00)])).await;

        assert!(nfc4.detect_presence().await.unwrap());
        let device = nfc4.single_collision_resolution().await.unwrap();
        assert_eq!(device.uid(), &[0x01, 0x02, 0x03, 0x04]);

        nfc4.hlta().await.unwrap();
        assert!(!nfc4.detect_presence().await.unwrap());
        assert_eq!(nfc4.wupa().await.unwrap(), Some([0x04, 0x00]));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn corrupted_check_byte_is_rejected() {
        let mut sim = Sim::new(vec![Card::new(&[0x01, 0x02, 0x03, 0x04], 0x00)]);
        sim.corrupt_bcc = true;
        let mut nfc4 = nfca_poller(sim).await;

        assert_eq!(nfc4.wupa().await.unwrap(), Some([0x04, 0x00]));
        assert!(matches!(
            nfc4.anticollision(CascadeLevel::One).await,
            Err(Error::Bcc)
        ));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn garbled_answer_counts_as_presence() {
        let mut sim = Sim::new(vec![Card::new(&[0x01, 0x02, 0x03, 0x04], 0x00)]);
        sim.rx_errors = crate::nfc4::Interrupts::PAR;
        let mut nfc4 = nfca_poller(sim).await;

        assert!(nfc4.detect_presence().await.unwrap());
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn empty_field() {
        let mut nfc4 = nfca_poller(Sim::new(Vec::new())).await;

        assert_eq!(nfc4.reqa().await.unwrap(), None);

        let mut devices = [NfcaDevice::default(); 2];
        assert_eq!(nfc4.poll_devices(&mut devices).await.unwrap(), 0);
        assert!(matches!(
            nfc4.single_collision_resolution().await,
            Err(Error::Protocol)
        ));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn read_type_2_tag_pages() {
        let mut nfc4 = nfca_poller(Sim::new(vec![Card::new(&[0x04, 0x01, 0x02, 0x03], 0x00)])).await;

        nfc4.wupa().await.unwrap();
        nfc4.single_collision_resolution().await.unwrap();

        let mut page = [0u8; 16];
        nfc4.t2t_read(4, &mut page).await.unwrap();

        let expected: Vec<u8> = (16..32).collect();
        assert_eq!(&page[..], &expected[..]);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn leaving_the_poller_switches_the_field_off() {
        let nfc4 = nfca_poller(Sim::new(Vec::new())).await;
        assert!(nfc4.state.atqa.is_none());

        let mut nfc4 = nfc4.into_ready().await.unwrap();
        assert!(!nfc4.is_field_on().await.unwrap());

        let (sim, _) = nfc4.free();
        assert!(!sim.field_on());
        assert_eq!(sim.reg(0x03), 0x08);
    }
}
