use embedded_hal::digital::InputPin;

use super::{ll, Command, Error, Interrupts, Nfc4, Ready, Uninitialized};
use crate::{hal_type::spi::SpiDevice, maybe_async_attr};

/// `IC_IDENTITY.ic_type` of the ST25R3916
const IC_TYPE_ST25R3916: u8 = 0b00101;

/// Reads of the interrupt registers before giving up on the oscillator
const OSC_POLLS: u32 = 1000;

impl<SPI, IRQ> Nfc4<SPI, IRQ, Uninitialized>
where
    SPI: SpiDevice<u8>,
    IRQ: InputPin,
{
    /// Create a new instance of `Nfc4`
    ///
    /// Requires the SPI device connected to the ST25R3916 and the input pin
    /// wired to its IRQ output.
    pub fn new(spi: SPI, irq: IRQ) -> Self {
        Nfc4 {
            ll: ll::St25r3916::new(spi),
            irq,
            irq_status: Interrupts::NONE,
            irq_mask: Interrupts::ALL,
            state: Uninitialized,
        }
    }

    /// Initialize the ST25R3916
    ///
    /// Restores the default configuration, checks the chip identity, starts
    /// the oscillator and adjusts the regulators. The field stays off.
    #[maybe_async_attr]
    pub async fn init(mut self) -> Result<Nfc4<SPI, IRQ, Ready>, Error<SPI>> {
        self.ll.direct_command(Command::SetDefault).await?;

        let identity = self.ll.ic_identity().read().await?;
        if identity.ic_type() != IC_TYPE_ST25R3916 {
            return Err(Error::WrongChip(identity.bits()));
        }
        debug!("st25r3916 rev {=u8}", identity.ic_rev());

        self.disable_interrupts(Interrupts::ALL).await?;
        self.clear_interrupts().await?;

        self.enable_interrupts(Interrupts::OSC).await?;
        self.ll.op_control().modify(|_, w| w.en(1)).await?;
        let raised = self
            .wait_for_interrupt(Interrupts::OSC, OSC_POLLS)
            .await?;
        self.disable_interrupts(Interrupts::OSC).await?;
        if raised.is_empty() {
            return Err(Error::OscillatorTimeout);
        }

        let mut nfc4 = Nfc4 {
            ll: self.ll,
            irq: self.irq,
            irq_status: self.irq_status,
            irq_mask: self.irq_mask,
            state: Ready,
        };
        nfc4.adjust_regulators().await?;

        Ok(nfc4)
    }
}
