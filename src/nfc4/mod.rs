//! NFC 4 Click: ST25R3916 NFC reader
//!
//! The entry point to this driver is the [Nfc4] struct. It is generic over the
//! SPI device the chip is connected to, the input pin wired to the chip's IRQ
//! output, and a typestate:
//!
//! - [`Uninitialized`] right after [`Nfc4::new`],
//! - [`Ready`] after [`Nfc4::init`], field off,
//! - [`NfcA`] while polling for ISO14443-A cards with the field on.
//!
//! The transceive engine ([`Nfc4::start_transceive`] and
//! [`Nfc4::transceive_worker`]) is available in every awake state. The
//! [register-level interface] can be reached through [`Nfc4::ll`].
//!
//! [register-level interface]: ll

use core::fmt;

pub use command::Command;
pub use error::Error;
pub use irq::Interrupts;
pub use nfca::*;
pub use state_impls::*;
pub use transceive::*;

pub mod ll;

mod awake;
mod command;
mod error;
mod irq;
mod nfca;
mod ready;
mod state_impls;
mod transceive;
mod uninitialized;

#[cfg(test)]
mod sim;

/// Entry point to the NFC 4 driver API
pub struct Nfc4<SPI, IRQ, State> {
    ll: ll::St25r3916<SPI>,
    irq: IRQ,
    /// Interrupts read from the chip but not yet consumed
    irq_status: Interrupts,
    /// Interrupts currently masked on the chip
    irq_mask: Interrupts,
    state: State,
}

// Can't be derived without putting requirements on `SPI` and `IRQ`.
impl<SPI, IRQ, State> fmt::Debug for Nfc4<SPI, IRQ, State>
where
    State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Nfc4 {{ state: ")?;
        self.state.fmt(f)?;
        write!(f, ", irq_status: {:?}, .. }}", self.irq_status)?;

        Ok(())
    }
}
