//! CAN and CAN FD frames, and their message object encoding

use byte::{
    ctx::{Bytes, LE},
    BytesExt as _, TryRead, TryWrite,
};
use heapless::Vec;

/// Largest CAN FD payload
pub const MAX_DATA_LEN: usize = 64;

/// Payload lengths of DLC 9 to 15
const FD_LENGTHS: [usize; 7] = [12, 16, 20, 24, 32, 48, 64];

/// Payload length of a CAN FD data length code
///
/// Classic CAN frames carry at most 8 bytes whatever the code.
pub fn dlc_to_len(dlc: u8) -> usize {
    match dlc & 0x0F {
        dlc @ 0..=8 => dlc as usize,
        dlc => FD_LENGTHS[dlc as usize - 9],
    }
}

/// Data length code of a payload, `None` if no code matches `len` exactly
pub fn len_to_dlc(len: usize) -> Option<u8> {
    match len {
        0..=8 => Some(len as u8),
        _ => FD_LENGTHS
            .iter()
            .position(|&l| l == len)
            .map(|i| i as u8 + 9),
    }
}

/// A CAN identifier
///
/// Values wider than the identifier format are truncated when encoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Id {
    /// 11-bit base format identifier
    Standard(u16),
    /// 29-bit extended format identifier
    Extended(u32),
}

impl Id {
    /// First word of a message object: SID in bits 0..=10, EID in 11..=28
    pub(crate) fn object_word(self) -> u32 {
        match self {
            Id::Standard(sid) => u32::from(sid) & 0x7FF,
            Id::Extended(id) => ((id >> 18) & 0x7FF) | ((id & 0x3FFFF) << 11),
        }
    }

    pub(crate) fn from_object_word(word: u32, extended: bool) -> Self {
        let sid = word & 0x7FF;
        let eid = (word >> 11) & 0x3FFFF;

        if extended {
            Id::Extended((sid << 18) | eid)
        } else {
            Id::Standard(sid as u16)
        }
    }

    pub(crate) fn is_extended(self) -> bool {
        matches!(self, Id::Extended(_))
    }
}

const FLAG_IDE: u32 = 1 << 4;
const FLAG_RTR: u32 = 1 << 5;
const FLAG_BRS: u32 = 1 << 6;
const FLAG_FDF: u32 = 1 << 7;
const FLAG_ESI: u32 = 1 << 8;

/// A CAN or CAN FD frame
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    /// Identifier
    pub id: Id,
    /// CAN FD format
    pub fd: bool,
    /// Data phase at the data bit rate (CAN FD only)
    pub brs: bool,
    /// Remote transmission request (classic CAN only)
    pub rtr: bool,
    /// Error state indicator of the transmitter
    pub esi: bool,
    /// Time base counter value at reception, if timestamps are enabled
    pub timestamp: Option<u32>,
    dlc: u8,
    data: Vec<u8, MAX_DATA_LEN>,
}

impl Frame {
    /// Create a classic CAN data frame, `None` if `data` is longer than 8
    pub fn new(id: Id, data: &[u8]) -> Option<Self> {
        if data.len() > 8 {
            return None;
        }

        Self::with_flags(id, data, false, false)
    }

    /// Create a CAN FD frame
    ///
    /// Returns `None` if no data length code matches `data.len()`.
    pub fn new_fd(id: Id, data: &[u8], brs: bool) -> Option<Self> {
        Self::with_flags(id, data, true, brs)
    }

    /// Create a classic CAN remote frame requesting `len` bytes
    pub fn new_remote(id: Id, len: usize) -> Option<Self> {
        if len > 8 {
            return None;
        }

        let mut frame = Self::with_flags(id, &[], false, false)?;
        frame.rtr = true;
        frame.dlc = len as u8;

        Some(frame)
    }

    fn with_flags(id: Id, data: &[u8], fd: bool, brs: bool) -> Option<Self> {
        Some(Frame {
            id,
            fd,
            brs,
            rtr: false,
            esi: false,
            timestamp: None,
            dlc: len_to_dlc(data.len())?,
            data: Vec::from_slice(data).ok()?,
        })
    }

    /// Data length code
    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// Payload, empty for remote frames
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Transmit message object: two header words followed by the padded payload
pub(crate) struct TxObject<'f>(pub &'f Frame);

impl TryWrite for TxObject<'_> {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let frame = self.0;
        let offset = &mut 0;

        let mut flags = u32::from(frame.dlc & 0x0F);
        if frame.id.is_extended() {
            flags |= FLAG_IDE;
        }
        if frame.rtr {
            flags |= FLAG_RTR;
        }
        if frame.fd {
            flags |= FLAG_FDF;
            if frame.brs {
                flags |= FLAG_BRS;
            }
        }
        if frame.esi {
            flags |= FLAG_ESI;
        }

        bytes.write_with(offset, frame.id.object_word(), LE)?;
        bytes.write_with(offset, flags, LE)?;
        bytes.write(offset, frame.data())?;
        while *offset % 4 != 0 {
            bytes.write_with(offset, 0u8, LE)?;
        }

        Ok(*offset)
    }
}

/// Layout of a receive FIFO's message objects
#[derive(Clone, Copy, Debug)]
pub(crate) struct RxLayout {
    /// A timestamp word follows the header
    pub timestamps: bool,
    /// Payload bytes reserved per object
    pub payload_len: usize,
}

impl RxLayout {
    pub(crate) fn object_len(&self) -> usize {
        8 + if self.timestamps { 4 } else { 0 } + self.payload_len
    }
}

impl<'a> TryRead<'a, RxLayout> for Frame {
    fn try_read(bytes: &'a [u8], layout: RxLayout) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;

        let id_word: u32 = bytes.read_with(offset, LE)?;
        let flags: u32 = bytes.read_with(offset, LE)?;
        let timestamp = if layout.timestamps {
            let timestamp: u32 = bytes.read_with(offset, LE)?;
            Some(timestamp)
        } else {
            None
        };

        let dlc = (flags & 0x0F) as u8;
        let fd = flags & FLAG_FDF != 0;
        let rtr = !fd && flags & FLAG_RTR != 0;

        let len = match (fd, rtr) {
            (_, true) => 0,
            (true, false) => dlc_to_len(dlc),
            (false, false) => dlc_to_len(dlc).min(8),
        };
        // The controller truncates payloads that do not fit the FIFO
        let len = len.min(layout.payload_len);
        let data: &[u8] = bytes.read_with(offset, Bytes::Len(len))?;

        let frame = Frame {
            id: Id::from_object_word(id_word, flags & FLAG_IDE != 0),
            fd,
            brs: fd && flags & FLAG_BRS != 0,
            rtr,
            esi: flags & FLAG_ESI != 0,
            timestamp,
            dlc,
            data: Vec::from_slice(data).map_err(|_| byte::Error::BadInput {
                err: "payload longer than 64 bytes",
            })?,
        };

        Ok((frame, *offset))
    }
}
