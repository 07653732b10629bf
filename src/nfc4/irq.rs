//! Interrupt bits of the ST25R3916
//!
//! The four interrupt registers are combined into one 32-bit word:
//! `IRQ_MAIN | IRQ_TIMER_NFC << 8 | IRQ_ERROR_WUP << 16 | IRQ_TARGET << 24`.

use core::{fmt, ops};

use embedded_hal::digital::{Error as _, InputPin};

use super::{Error, Nfc4};
use crate::{hal_type::spi::SpiDevice, maybe_async_attr};

/// A set of interrupt bits
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct Interrupts(pub u32);

impl Interrupts {
    /// No interrupts
    pub const NONE: Self = Interrupts(0);
    /// Every interrupt
    pub const ALL: Self = Interrupts(0xFFFF_FFFF);

    /// Oscillator frequency stable
    pub const OSC: Self = Interrupts(0x0000_0080);
    /// FIFO water level
    pub const FWL: Self = Interrupts(0x0000_0040);
    /// Start of receive
    pub const RXS: Self = Interrupts(0x0000_0020);
    /// End of receive
    pub const RXE: Self = Interrupts(0x0000_0010);
    /// End of transmission
    pub const TXE: Self = Interrupts(0x0000_0008);
    /// Bit collision
    pub const COL: Self = Interrupts(0x0000_0004);
    /// Automatic reception restart
    pub const RX_REST: Self = Interrupts(0x0000_0002);

    /// Termination of direct command
    pub const DCT: Self = Interrupts(0x0000_8000);
    /// No-response timer expired
    pub const NRE: Self = Interrupts(0x0000_4000);
    /// General purpose timer expired
    pub const GPE: Self = Interrupts(0x0000_2000);
    /// External field on
    pub const EON: Self = Interrupts(0x0000_1000);
    /// External field off
    pub const EOF: Self = Interrupts(0x0000_0800);
    /// Collision during RF collision avoidance
    pub const CAC: Self = Interrupts(0x0000_0400);
    /// Minimum guard time after RF collision avoidance expired
    pub const CAT: Self = Interrupts(0x0000_0200);
    /// Initiator bit rate recognised
    pub const NFCT: Self = Interrupts(0x0000_0100);

    /// CRC error
    pub const CRC: Self = Interrupts(0x0080_0000);
    /// Parity error
    pub const PAR: Self = Interrupts(0x0040_0000);
    /// Soft framing error
    pub const ERR2: Self = Interrupts(0x0020_0000);
    /// Hard framing error
    pub const ERR1: Self = Interrupts(0x0010_0000);
    /// Wake-up timer
    pub const WT: Self = Interrupts(0x0008_0000);
    /// Wake-up due to amplitude
    pub const WAM: Self = Interrupts(0x0004_0000);
    /// Wake-up due to phase
    pub const WPH: Self = Interrupts(0x0002_0000);
    /// Wake-up due to capacitance
    pub const WCAP: Self = Interrupts(0x0001_0000);

    /// Reception errors checked after the end of a frame
    pub const RX_ERRORS: Self =
        Interrupts(Self::CRC.0 | Self::PAR.0 | Self::ERR1.0 | Self::ERR2.0 | Self::COL.0);

    /// Every interrupt the transceive engine listens to
    pub const TRANSCEIVE: Self = Interrupts(
        Self::FWL.0 | Self::TXE.0 | Self::RXS.0 | Self::RXE.0 | Self::NRE.0 | Self::RX_ERRORS.0,
    );

    /// Raw bits
    pub fn bits(self) -> u32 {
        self.0
    }

    /// `true` if no bit is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` if every bit in `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// `true` if any bit in `other` is set
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl ops::BitOr for Interrupts {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Interrupts(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Interrupts {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl ops::BitAnd for Interrupts {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Interrupts(self.0 & rhs.0)
    }
}

impl ops::Not for Interrupts {
    type Output = Self;

    fn not(self) -> Self {
        Interrupts(!self.0)
    }
}

impl fmt::Debug for Interrupts {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Interrupts({:#010x})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Interrupts {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Interrupts({=u32:#010x})", self.0)
    }
}

impl<SPI, IRQ, State> Nfc4<SPI, IRQ, State>
where
    SPI: SpiDevice<u8>,
    IRQ: InputPin,
{
    /// Fetch pending interrupts into the cache
    ///
    /// The chip is only read while the IRQ line is high. Reading clears the
    /// interrupt registers, which is why the bits are kept until consumed by
    /// [`Nfc4::get_interrupt`].
    #[maybe_async_attr]
    pub async fn check_interrupts(&mut self) -> Result<(), Error<SPI>> {
        let pending = self.irq.is_high().map_err(|error| Error::Irq(error.kind()))?;

        if pending {
            let irqs = Interrupts(self.ll.read_interrupts().await?);
            trace!("irq: {=u32:#x}", irqs.0);
            self.irq_status |= irqs;
        }

        Ok(())
    }

    /// Return and clear the cached interrupts in `mask`
    #[maybe_async_attr]
    pub async fn get_interrupt(&mut self, mask: Interrupts) -> Result<Interrupts, Error<SPI>> {
        self.check_interrupts().await?;

        let raised = self.irq_status & mask;
        self.irq_status = self.irq_status & !mask;

        Ok(raised)
    }

    /// Clear the interrupt registers and the cache
    #[maybe_async_attr]
    pub async fn clear_interrupts(&mut self) -> Result<(), Error<SPI>> {
        self.ll.read_interrupts().await?;
        self.irq_status = Interrupts::NONE;

        Ok(())
    }

    /// Unmask the interrupts in `mask`
    #[maybe_async_attr]
    pub async fn enable_interrupts(&mut self, mask: Interrupts) -> Result<(), Error<SPI>> {
        self.irq_mask = self.irq_mask & !mask;
        self.ll.write_interrupt_masks(self.irq_mask.0).await?;

        Ok(())
    }

    /// Mask the interrupts in `mask`
    #[maybe_async_attr]
    pub async fn disable_interrupts(&mut self, mask: Interrupts) -> Result<(), Error<SPI>> {
        self.irq_mask |= mask;
        self.ll.write_interrupt_masks(self.irq_mask.0).await?;

        Ok(())
    }

    /// Poll until one of the interrupts in `mask` is raised
    ///
    /// Returns the raised subset of `mask`, which is empty if none arrived
    /// within `max_polls` reads.
    #[maybe_async_attr]
    pub async fn wait_for_interrupt(
        &mut self,
        mask: Interrupts,
        max_polls: u32,
    ) -> Result<Interrupts, Error<SPI>> {
        for _ in 0..max_polls {
            let raised = self.get_interrupt(mask).await?;
            if !raised.is_empty() {
                return Ok(raised);
            }
        }

        Ok(Interrupts::NONE)
    }
}
