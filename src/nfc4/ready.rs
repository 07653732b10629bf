use embedded_hal::digital::InputPin;

use super::{Error, NfcA, Nfc4, Ready};
use crate::{
    hal_type::{delay::DelayNs, spi::SpiDevice},
    maybe_async_attr,
};

/// `MODE.om` for an ISO14443-A initiator
const OM_ISO14443A: u8 = 0b0001;

/// Guard time between field on and the first NFC-A command
const GUARD_TIME_NFCA_MS: u32 = 5;

impl<SPI, IRQ> Nfc4<SPI, IRQ, Ready>
where
    SPI: SpiDevice<u8>,
    IRQ: InputPin,
{
    /// Configure the chip as ISO14443-A poller and switch the field on
    ///
    /// Sets 106 kbit/s in both directions and waits for the NFC-A guard time
    /// before returning.
    #[maybe_async_attr]
    pub async fn into_nfca_poller<D>(
        mut self,
        delay: &mut D,
    ) -> Result<Nfc4<SPI, IRQ, NfcA>, Error<SPI>>
    where
        D: DelayNs,
    {
        self.ll
            .mode()
            .write(|w| w.targ(0).om(OM_ISO14443A).tr_am(0))
            .await?;
        self.ll.bit_rate().write(|w| w.txrate(0).rxrate(0)).await?;
        self.ll.iso14443a_nfc().write(|w| w).await?;
        self.ll.aux().modify(|_, w| w.no_crc_rx(0)).await?;

        self.field_on().await?;
        delay.delay_ms(GUARD_TIME_NFCA_MS).await;

        Ok(Nfc4 {
            ll: self.ll,
            irq: self.irq,
            irq_status: self.irq_status,
            irq_mask: self.irq_mask,
            state: NfcA::default(),
        })
    }
}
