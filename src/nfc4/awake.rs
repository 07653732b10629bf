use embedded_hal::digital::InputPin;

use super::{ll, Awake, Command, Error, Interrupts, Nfc4};
use crate::{hal_type::spi::SpiDevice, maybe_async_attr};

/// Reads of the interrupt registers before a direct command counts as hung
const DCT_POLLS: u32 = 1000;

impl<SPI, IRQ, State> Nfc4<SPI, IRQ, State>
where
    SPI: SpiDevice<u8>,
    IRQ: InputPin,
    State: Awake,
{
    /// Adjust the supply regulators
    ///
    /// Returns the A/D converter result the chip settled on.
    #[maybe_async_attr]
    pub async fn adjust_regulators(&mut self) -> Result<u8, Error<SPI>> {
        self.ll.regulator_control().modify(|_, w| w.reg_s(0)).await?;

        self.run_timed_command(Command::AdjustRegulators).await?;

        Ok(self.ll.ad_result().read().await?.value())
    }

    /// Measure the amplitude of the RF signal on the RFI inputs
    #[maybe_async_attr]
    pub async fn measure_amplitude(&mut self) -> Result<u8, Error<SPI>> {
        self.run_timed_command(Command::MeasureAmplitude).await?;

        Ok(self.ll.ad_result().read().await?.value())
    }

    /// Switch on the field and the receiver
    #[maybe_async_attr]
    pub async fn field_on(&mut self) -> Result<(), Error<SPI>> {
        self.ll
            .op_control()
            .modify(|_, w| w.tx_en(1).rx_en(1))
            .await?;

        Ok(())
    }

    /// Switch off the field and the receiver
    #[maybe_async_attr]
    pub async fn field_off(&mut self) -> Result<(), Error<SPI>> {
        self.ll
            .op_control()
            .modify(|_, w| w.tx_en(0).rx_en(0))
            .await?;

        Ok(())
    }

    /// Returns `true` while the field is on
    #[maybe_async_attr]
    pub async fn is_field_on(&mut self) -> Result<bool, Error<SPI>> {
        Ok(self.ll.op_control().read().await?.tx_en() == 1)
    }

    /// Provides direct access to the register-level API
    ///
    /// Be aware that by using the register-level API, you can invalidate
    /// various assumptions that the high-level API makes about the operation of
    /// the ST25R3916. Don't use the register-level and high-level APIs in
    /// tandem, unless you know what you're doing.
    pub fn ll(&mut self) -> &mut ll::St25r3916<SPI> {
        &mut self.ll
    }

    /// Release the SPI device and the IRQ pin
    pub fn free(self) -> (SPI, IRQ) {
        (self.ll.spi, self.irq)
    }

    /// Run a direct command that signals completion with DCT
    #[maybe_async_attr]
    async fn run_timed_command(&mut self, command: Command) -> Result<(), Error<SPI>> {
        self.get_interrupt(Interrupts::DCT).await?;
        self.enable_interrupts(Interrupts::DCT).await?;

        self.ll.direct_command(command).await?;
        let raised = self.wait_for_interrupt(Interrupts::DCT, DCT_POLLS).await?;

        self.disable_interrupts(Interrupts::DCT).await?;
        if raised.is_empty() {
            return Err(Error::Timeout);
        }

        Ok(())
    }
}
