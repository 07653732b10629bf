//! Radio configuration
//!
//! [`Config`] holds the few settings [`Cc1120::default_cfg`] applies on top of
//! the register table exported from SmartRF Studio for 868 MHz, 1.2 kbit/s
//! 2-FSK with variable packet length.
//!
//! [`Cc1120::default_cfg`]: super::Cc1120::default_cfg

/// Crystal oscillator frequency of the Click board
pub const XOSC_HZ: u64 = 32_000_000;

/// Configuration applied by [`Cc1120::default_cfg`]
///
/// [`Cc1120::default_cfg`]: super::Cc1120::default_cfg
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Carrier frequency in Hz
    ///
    /// Defaults to 868 MHz.
    pub frequency_hz: u32,
    /// Largest packet accepted in variable length mode
    ///
    /// Defaults to 127, the largest payload [`Cc1120::transmit`] sends.
    ///
    /// [`Cc1120::transmit`]: super::Cc1120::transmit
    pub max_packet_len: u8,
    /// Append and check a CRC16
    ///
    /// Defaults to `true`.
    pub crc: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            frequency_hz: 868_000_000,
            max_packet_len: 127,
            crc: true,
        }
    }
}

/// Register values written by `default_cfg`, in write order
pub(crate) const REGISTER_DEFAULTS: &[(u16, u8)] = &[
    (0x0000, 0xB0), // IOCFG3
    (0x0001, 0x06), // IOCFG2: PKT_SYNC_RXTX
    (0x0002, 0xB0), // IOCFG1
    (0x0003, 0x40), // IOCFG0
    (0x0008, 0x0B), // SYNC_CFG1
    (0x000C, 0x1C), // DCFILT_CFG
    (0x0010, 0xC6), // IQIC
    (0x0011, 0x08), // CHAN_BW
    (0x0013, 0x05), // MDMCFG0
    (0x0017, 0x20), // AGC_REF
    (0x0018, 0x19), // AGC_CS_THR
    (0x001C, 0xA9), // AGC_CFG1
    (0x001D, 0xCF), // AGC_CFG0
    (0x001E, 0x00), // FIFO_CFG
    (0x0020, 0x03), // SETTLING_CFG
    (0x0021, 0x12), // FS_CFG: LO divider 4
    (0x0027, 0x05), // PKT_CFG1: CRC16, append status
    (0x0028, 0x20), // PKT_CFG0: variable length
    (0x002E, 0xFF), // PKT_LEN
    (0x2F00, 0x00), // IF_MIX_CFG
    (0x2F01, 0x22), // FREQOFF_CFG
    (0x2F0C, 0x6C), // FREQ2
    (0x2F0D, 0x80), // FREQ1
    (0x2F0E, 0x00), // FREQ0
    (0x2F12, 0x00), // FS_DIG1
    (0x2F13, 0x5F), // FS_DIG0
    (0x2F16, 0x40), // FS_CAL1
    (0x2F17, 0x0E), // FS_CAL0
    (0x2F19, 0x03), // FS_DIVTWO
    (0x2F1B, 0x33), // FS_DSM0
    (0x2F1D, 0x17), // FS_DVC0
    (0x2F1F, 0x50), // FS_PFD
    (0x2F20, 0x6E), // FS_PRE
    (0x2F21, 0x14), // FS_REG_DIV_CML
    (0x2F22, 0xAC), // FS_SPARE
    (0x2F27, 0xB4), // FS_VCO0
    (0x2F32, 0x0E), // XOSC5
    (0x2F36, 0x03), // XOSC1
];

/// LO divider bands: lowest and highest frequency in Hz, divider, and
/// `FS_CFG.fsd_bandselect`
const BANDS: [(u32, u32, u8, u8); 6] = [
    (820_000_000, 960_000_000, 4, 0b0010),
    (410_000_000, 480_000_000, 8, 0b0100),
    (273_000_000, 320_000_000, 12, 0b0110),
    (205_000_000, 240_000_000, 16, 0b1000),
    (164_000_000, 192_000_000, 20, 0b1010),
    (136_000_000, 160_000_000, 24, 0b1011),
];

/// A carrier frequency translated to synthesizer settings
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Synthesizer {
    pub bandselect: u8,
    /// 24-bit `FREQ2..FREQ0` value
    pub freq: u32,
}

impl Synthesizer {
    /// Returns `None` if `hz` is outside every LO divider band
    pub fn for_frequency(hz: u32) -> Option<Self> {
        let (_, _, divider, bandselect) = BANDS
            .iter()
            .find(|(low, high, _, _)| (*low..=*high).contains(&hz))?;

        let freq = (hz as u64 * *divider as u64 * (1 << 16)) / XOSC_HZ;

        Some(Synthesizer {
            bandselect: *bandselect,
            freq: freq as u32,
        })
    }

    /// `FREQ2`, `FREQ1` and `FREQ0`
    pub fn freq_bytes(&self) -> [u8; 3] {
        let bytes = self.freq.to_be_bytes();
        [bytes[1], bytes[2], bytes[3]]
    }
}
