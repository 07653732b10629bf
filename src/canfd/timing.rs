//! Bit timing calculation

/// Bit phase a timing is computed for
///
/// The data phase registers are narrower than the nominal ones.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Arbitration phase and classic CAN frames
    Nominal,
    /// Data phase of CAN FD frames with bit rate switching
    Data,
}

struct Limits {
    tseg1: u32,
    tseg2: u32,
}

impl Phase {
    fn limits(self) -> Limits {
        match self {
            Phase::Nominal => Limits {
                tseg1: 256,
                tseg2: 128,
            },
            Phase::Data => Limits {
                tseg1: 32,
                tseg2: 16,
            },
        }
    }
}

/// Largest baud rate prescaler
const MAX_BRP: u32 = 256;

/// Bit timing in time quanta
///
/// The values are the actual lengths; the registers hold them minus one.
/// One bit is `1 + tseg1 + tseg2` time quanta of `brp` system clocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitTiming {
    /// Baud rate prescaler
    pub brp: u16,
    /// Propagation and phase 1 segment
    pub tseg1: u16,
    /// Phase 2 segment
    pub tseg2: u8,
    /// Synchronization jump width
    pub sjw: u8,
}

impl BitTiming {
    /// Compute the timing for `bitrate` from a `sysclk_hz` system clock
    ///
    /// `sample_point` is in per mille of the bit time. The smallest prescaler
    /// that divides the clock exactly and fits the segment limits of `phase`
    /// is chosen, for the highest resolution. The jump width is set to the
    /// phase 2 segment.
    ///
    /// Returns `None` if the clock can't be divided down to `bitrate`.
    pub fn calculate(
        sysclk_hz: u32,
        bitrate: u32,
        sample_point: u16,
        phase: Phase,
    ) -> Option<Self> {
        if bitrate == 0 || !(500..1000).contains(&sample_point) {
            return None;
        }
        let limits = phase.limits();

        for brp in 1..=MAX_BRP {
            let divisor = brp.checked_mul(bitrate)?;
            if divisor > sysclk_hz {
                break;
            }
            if sysclk_hz % divisor != 0 {
                continue;
            }

            let quanta = sysclk_hz / divisor;
            // Sync segment plus at least one quantum per phase segment
            if quanta < 3 {
                break;
            }

            let sample_quanta = quanta * u32::from(sample_point) / 1000;
            let tseg1 = sample_quanta.saturating_sub(1).max(1);
            let tseg2 = quanta - 1 - tseg1;

            if tseg1 > limits.tseg1 || tseg2 > limits.tseg2 {
                continue;
            }
            if tseg2 == 0 {
                break;
            }

            return Some(BitTiming {
                brp: brp as u16,
                tseg1: tseg1 as u16,
                tseg2: tseg2 as u8,
                sjw: tseg2 as u8,
            });
        }

        None
    }

    /// Number of time quanta per bit
    pub fn quanta(&self) -> u32 {
        1 + u32::from(self.tseg1) + u32::from(self.tseg2)
    }

    /// Sample point in per mille of the bit time
    pub fn sample_point(&self) -> u16 {
        ((1 + u32::from(self.tseg1)) * 1000 / self.quanta()) as u16
    }

    /// Bit rate resulting from a `sysclk_hz` system clock
    pub fn bitrate(&self, sysclk_hz: u32) -> u32 {
        sysclk_hz / (u32::from(self.brp) * self.quanta())
    }

    /// Transmitter delay compensation offset in system clocks
    ///
    /// Places the secondary sample point one quantum before the data phase
    /// sample point.
    pub(crate) fn tdc_offset(&self) -> u8 {
        (u32::from(self.tseg1) * u32::from(self.brp)).min(63) as u8
    }
}
