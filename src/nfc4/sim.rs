//! Register-level simulation of an ST25R3916 with ISO14443-A cards in its field
//!
//! Implements `SpiDevice` in both flavours, so the driver runs against it
//! unchanged. Only what the driver uses is modelled: the register file, the
//! interrupt registers with their masks, both FIFO directions including the
//! water level interrupts, the no-response timer as "fires when programmed"
//! and bit-exact card answers with collisions. Reception faults can be
//! injected through the public switches of [`Sim`].

use std::{collections::VecDeque, convert::Infallible};

use embedded_hal::{
    digital,
    spi::{self, Operation},
};

use super::{
    ll::{IRQ_MASK_MAIN, NO_RESPONSE_TIMER1, NUM_TX_BYTES1},
    nfca::{bcc, crc_a, CASCADE_TAG},
    Interrupts,
};
#[cfg(feature = "async")]
use super::{Nfc4, NfcA};

const OP_CONTROL: usize = 0x02;
const ISO14443A_NFC: usize = 0x05;
const AUX: usize = 0x0A;
const COLLISION_STATUS: usize = 0x20;
const AD_RESULT: usize = 0x25;

const IC_IDENTITY_VALUE: u8 = 0x2A;

/// Bytes moved into the rx FIFO at once
const RX_CHUNK: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CardState {
    Idle,
    Ready(usize),
    Active,
    Halt,
}

/// An ISO14443-A card
#[derive(Clone, Debug)]
pub struct Card {
    pub uid: Vec<u8>,
    pub atqa: [u8; 2],
    pub sak: u8,
    pub memory: [u8; 64],
    pub state: CardState,
}

impl Card {
    pub fn new(uid: &[u8], sak: u8) -> Self {
        let atqa = match uid.len() {
            4 => [0x04, 0x00],
            7 => [0x44, 0x00],
            _ => [0x84, 0x00],
        };

        let mut memory = [0; 64];
        for (i, byte) in memory.iter_mut().enumerate() {
            *byte = i as u8;
        }

        Card {
            uid: uid.to_vec(),
            atqa,
            sak,
            memory,
            state: CardState::Idle,
        }
    }

    fn levels(&self) -> usize {
        match self.uid.len() {
            4 => 1,
            7 => 2,
            _ => 3,
        }
    }

    fn is_last_level(&self, level: usize) -> bool {
        level + 1 == self.levels()
    }

    /// UID bytes of a cascade level followed by their BCC
    fn uid_part(&self, level: usize) -> [u8; 5] {
        let mut part = [0; 5];
        if self.is_last_level(level) {
            part[..4].copy_from_slice(&self.uid[level * 3..level * 3 + 4]);
        } else {
            part[0] = CASCADE_TAG;
            part[1..4].copy_from_slice(&self.uid[level * 3..level * 3 + 3]);
        }
        part[4] = bcc(&part[..4]);

        part
    }
}

/// One card's answer
struct Answer {
    data: Vec<u8>,
    bits: usize,
    crc: bool,
}

impl Answer {
    fn bytes(data: Vec<u8>, crc: bool) -> Self {
        let bits = data.len() * 8;
        Answer { data, bits, crc }
    }

    fn with_crc(mut data: Vec<u8>) -> Self {
        let crc = crc_a(&data);
        data.extend_from_slice(&crc);
        Answer::bytes(data, true)
    }
}

fn bit(data: &[u8], index: usize) -> bool {
    data[index / 8] & (1 << (index % 8)) != 0
}

fn set_bit(data: &mut [u8], index: usize) {
    data[index / 8] |= 1 << (index % 8);
}

/// The simulated reader
pub struct Sim {
    regs: [u8; 64],
    irq: u32,
    tx_fifo: Vec<u8>,
    tx_waiting: Option<bool>,
    rx_fifo: VecDeque<u8>,
    rx_pending: VecDeque<u8>,
    rx_last_bits: u8,
    rx_end_irqs: u32,
    pub cards: Vec<Card>,
    /// Direct commands in the order they were issued
    pub commands: Vec<u8>,
    /// Frames as the cards received them
    pub frames: Vec<Vec<u8>>,
    /// Answer every frame with its own content
    pub echo: bool,
    /// Corrupt the CRC of every card answer
    pub corrupt_crc: bool,
    /// Corrupt the check byte of every anticollision answer
    pub corrupt_bcc: bool,
    /// Report a FIFO overflow once a card answered
    pub fifo_overflow: bool,
    /// Error interrupts raised at the end of every card answer
    pub rx_errors: Interrupts,
}

impl Sim {
    pub fn new(cards: Vec<Card>) -> Self {
        Sim {
            regs: [0; 64],
            irq: 0,
            tx_fifo: Vec::new(),
            tx_waiting: None,
            rx_fifo: VecDeque::new(),
            rx_pending: VecDeque::new(),
            rx_last_bits: 0,
            rx_end_irqs: 0,
            cards,
            commands: Vec::new(),
            frames: Vec::new(),
            echo: false,
            corrupt_crc: false,
            corrupt_bcc: false,
            fifo_overflow: false,
            rx_errors: Interrupts::NONE,
        }
    }

    pub fn reg(&self, address: u8) -> u8 {
        self.regs[address as usize]
    }

    pub fn field_on(&self) -> bool {
        self.regs[OP_CONTROL] & 0x08 != 0
    }

    fn masks(&self) -> u32 {
        let base = IRQ_MASK_MAIN as usize;
        u32::from_le_bytes([
            self.regs[base],
            self.regs[base + 1],
            self.regs[base + 2],
            self.regs[base + 3],
        ])
    }

    fn raise(&mut self, irqs: Interrupts) {
        self.irq |= irqs.bits() & !self.masks();
    }

    fn nrt_running(&self) -> bool {
        let base = NO_RESPONSE_TIMER1 as usize;
        self.regs[base] != 0 || self.regs[base + 1] != 0
    }

    fn tx_bits(&self) -> usize {
        let base = NUM_TX_BYTES1 as usize;
        u16::from_be_bytes([self.regs[base], self.regs[base + 1]]) as usize
    }

    fn clear_fifos(&mut self) {
        self.tx_fifo.clear();
        self.tx_waiting = None;
        self.rx_fifo.clear();
        self.rx_pending.clear();
        self.rx_last_bits = 0;
    }

    fn execute(&mut self, operations: &mut [Operation<'_, u8>]) {
        let mut header = None;
        let mut address = 0;

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(data) => {
                    let mut data: &[u8] = *data;
                    if header.is_none() {
                        let mode = data[0];
                        data = &data[1..];
                        header = Some(mode);
                        address = (mode & 0x3F) as usize;

                        if mode >= 0xC0 {
                            self.command(mode);
                        }
                    }

                    for &byte in data {
                        match header {
                            Some(mode) if mode & 0xC0 == 0x00 => {
                                self.write_reg(address, byte);
                                address += 1;
                            }
                            Some(0x80) => self.tx_fifo.push(byte),
                            _ => {}
                        }
                    }
                }
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = match header {
                            Some(mode) if mode & 0xC0 == 0x40 => {
                                let value = self.read_reg(address);
                                address += 1;
                                value
                            }
                            Some(0x9F) => self.rx_fifo.pop_front().unwrap_or(0),
                            _ => 0,
                        };
                    }
                }
                _ => {}
            }
        }

        match header {
            Some(0x80) => self.fifo_loaded(),
            Some(0x9F) => {
                if self.rx_fifo.is_empty() && !self.rx_pending.is_empty() {
                    self.deliver_chunk();
                }
            }
            _ => {}
        }
    }

    fn read_reg(&mut self, address: usize) -> u8 {
        match address {
            0x1A..=0x1D => {
                let shift = (address - 0x1A) * 8;
                let value = (self.irq >> shift) as u8;
                self.irq &= !(0xFF << shift);
                value
            }
            0x1E => (self.rx_fifo.len() & 0xFF) as u8,
            0x1F => {
                let mut status = ((self.rx_fifo.len() >> 8) as u8) << 6;
                if self.rx_pending.is_empty() {
                    status |= self.rx_last_bits << 1;
                }
                if self.fifo_overflow && !self.rx_fifo.is_empty() {
                    status |= 0x10;
                }
                status
            }
            0x3F => IC_IDENTITY_VALUE,
            _ => self.regs[address],
        }
    }

    fn write_reg(&mut self, address: usize, value: u8) {
        let old = self.regs[address];
        self.regs[address] = value;

        if address == OP_CONTROL && old & 0x80 == 0 && value & 0x80 != 0 {
            self.raise(Interrupts::OSC);
        }
    }

    fn command(&mut self, command: u8) {
        self.commands.push(command);

        match command {
            // SET_DEFAULT
            0xC1 => {
                self.regs = [0; 64];
                self.irq = 0;
                self.clear_fifos();
            }
            // STOP, CLEAR_FIFO
            0xC2 | 0xDB => self.clear_fifos(),
            // TRANSMIT_WITH_CRC, TRANSMIT_WITHOUT_CRC
            0xC4 | 0xC5 => {
                let crc = command == 0xC4;
                if self.tx_fifo.len() < self.tx_bits().div_ceil(8) {
                    self.tx_waiting = Some(crc);
                    self.raise(Interrupts::FWL);
                } else {
                    self.transmit(crc);
                }
            }
            // TRANSMIT_REQA, TRANSMIT_WUPA
            0xC6 | 0xC7 => self.short_frame(command == 0xC7),
            // MEASURE_AMPLITUDE
            0xD3 => {
                self.regs[AD_RESULT] = if self.field_on() { 0x6B } else { 0x00 };
                self.raise(Interrupts::DCT);
            }
            // ADJUST_REGULATORS
            0xD6 => {
                self.regs[AD_RESULT] = 0x5C;
                self.raise(Interrupts::DCT);
            }
            _ => {}
        }
    }

    fn fifo_loaded(&mut self) {
        if let Some(crc) = self.tx_waiting {
            if self.tx_fifo.len() >= self.tx_bits().div_ceil(8) {
                self.tx_waiting = None;
                self.transmit(crc);
            } else {
                self.raise(Interrupts::FWL);
            }
        }
    }

    fn transmit(&mut self, crc: bool) {
        let bits = self.tx_bits();
        let frame: Vec<u8> = self.tx_fifo.drain(..bits.div_ceil(8)).collect();
        self.raise(Interrupts::TXE);

        let answers = self.answer(&frame, crc);
        self.frames.push(frame);
        self.receive(answers, bits);
    }

    fn short_frame(&mut self, wakeup: bool) {
        self.raise(Interrupts::TXE);
        self.frames.push(vec![if wakeup { 0x52 } else { 0x26 }]);

        let mut answers = Vec::new();
        for card in self.cards.iter_mut() {
            match card.state {
                CardState::Idle => {}
                CardState::Halt if wakeup => {}
                CardState::Halt => continue,
                _ => {
                    card.state = CardState::Idle;
                    continue;
                }
            }
            card.state = CardState::Ready(0);
            answers.push(Answer::bytes(card.atqa.to_vec(), false));
        }

        self.receive(answers, 7);
    }

    fn answer(&mut self, frame: &[u8], crc: bool) -> Vec<Answer> {
        if self.echo {
            return vec![Answer::bytes(frame.to_vec(), false)];
        }

        match *frame {
            [sel @ (0x93 | 0x95 | 0x97), 0x70, ..] if crc && frame.len() == 7 => {
                let level = ((sel - 0x93) / 2) as usize;
                let mut answers = Vec::new();

                for card in self.cards.iter_mut() {
                    if card.state != CardState::Ready(level) {
                        continue;
                    }
                    if card.uid_part(level)[..] != frame[2..7] {
                        card.state = CardState::Idle;
                        continue;
                    }

                    let sak = if card.is_last_level(level) {
                        card.state = CardState::Active;
                        card.sak
                    } else {
                        card.state = CardState::Ready(level + 1);
                        0x04
                    };
                    answers.push(Answer::with_crc(vec![sak]));
                }

                answers
            }
            [sel @ (0x93 | 0x95 | 0x97), nvb, ..] if !crc => {
                let level = ((sel - 0x93) / 2) as usize;
                let known = (nvb >> 4) as usize * 8 + (nvb & 0x0F) as usize;
                let corrupt_bcc = self.corrupt_bcc;
                let mut answers = Vec::new();

                for card in self.cards.iter() {
                    if card.state != CardState::Ready(level) {
                        continue;
                    }

                    let mut part = card.uid_part(level);
                    if corrupt_bcc {
                        part[4] ^= 0xFF;
                    }
                    if (16..known).any(|i| bit(frame, i) != bit(&part, i - 16)) {
                        continue;
                    }

                    let bits = 56 - known;
                    let mut data = vec![0; bits.div_ceil(8)];
                    for i in 0..bits {
                        if bit(&part, known - 16 + i) {
                            set_bit(&mut data, i);
                        }
                    }
                    answers.push(Answer {
                        data,
                        bits,
                        crc: false,
                    });
                }

                answers
            }
            [0x50, 0x00] if crc => {
                for card in self.cards.iter_mut() {
                    if card.state == CardState::Active {
                        card.state = CardState::Halt;
                    }
                }

                Vec::new()
            }
            [0x30, page] if crc => self
                .cards
                .iter()
                .filter(|card| card.state == CardState::Active)
                .map(|card| {
                    let start = page as usize * 4;
                    let data = (0..16)
                        .map(|i| card.memory[(start + i) % card.memory.len()])
                        .collect();
                    Answer::with_crc(data)
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Merge the answers bit by bit into the rx FIFO
    fn receive(&mut self, mut answers: Vec<Answer>, tx_bits: usize) {
        if answers.is_empty() {
            if self.nrt_running() {
                self.raise(Interrupts::NRE);
            }
            return;
        }

        let anticollision = self.regs[ISO14443A_NFC] & 0x01 != 0;
        let crc_check = self.regs[AUX] & 0x80 == 0;
        let mut end_irqs = Interrupts::RXE | self.rx_errors;

        if self.corrupt_crc {
            for answer in answers.iter_mut().filter(|answer| answer.crc) {
                if let Some(last) = answer.data.last_mut() {
                    *last ^= 0xFF;
                }
                if crc_check {
                    end_irqs |= Interrupts::CRC;
                }
            }
        }

        let offset = if anticollision { tx_bits % 8 } else { 0 };
        let bits = answers[0].bits;
        let mut data = vec![0u8; (offset + bits).div_ceil(8)];
        let mut received = bits;

        for i in 0..bits {
            let ones = answers.iter().filter(|answer| bit(&answer.data, i)).count();
            if ones > 0 {
                set_bit(&mut data, offset + i);
            }

            if ones > 0 && ones < answers.len() && !end_irqs.contains(Interrupts::COL) {
                end_irqs |= Interrupts::COL;

                let position = if anticollision { tx_bits + i } else { i };
                self.regs[COLLISION_STATUS] =
                    (((position / 8) as u8) << 4) | (((position % 8) as u8) << 1);

                if anticollision {
                    received = i + 1;
                    break;
                }
            }
        }

        let total = offset + received;
        data.truncate(total.div_ceil(8));

        self.rx_pending = data.into();
        self.rx_last_bits = (total % 8) as u8;
        self.rx_end_irqs = end_irqs.bits();
        self.raise(Interrupts::RXS);
        self.deliver_chunk();
    }

    fn deliver_chunk(&mut self) {
        let count = self.rx_pending.len().min(RX_CHUNK);
        let chunk: Vec<u8> = self.rx_pending.drain(..count).collect();
        self.rx_fifo.extend(chunk);

        if self.rx_pending.is_empty() {
            self.raise(Interrupts(self.rx_end_irqs));
        } else {
            self.raise(Interrupts::FWL);
        }
    }
}

impl spi::ErrorType for Sim {
    type Error = Infallible;
}

impl spi::SpiDevice<u8> for Sim {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        self.execute(operations);
        Ok(())
    }
}

impl embedded_hal_async::spi::SpiDevice<u8> for Sim {
    async fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Infallible> {
        self.execute(operations);
        Ok(())
    }
}

/// IRQ line with a fixed level
pub struct IrqLine(pub bool);

impl digital::ErrorType for IrqLine {
    type Error = Infallible;
}

impl digital::InputPin for IrqLine {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0)
    }
}

/// Initialize a driver on top of `sim` and enter the NFC-A poller state
#[cfg(feature = "async")]
pub async fn nfca_poller(sim: Sim) -> Nfc4<Sim, IrqLine, NfcA> {
    use embedded_hal_mock::eh1::delay::NoopDelay;

    let nfc4 = Nfc4::new(sim, IrqLine(true)).init().await.unwrap();

    nfc4.into_nfca_poller(&mut NoopDelay::new()).await.unwrap()
}
