//! Driver crate for MikroElektronika Click boards
//!
//! Every board lives in its own module and owns its bus:
//!
//! - [`cc1120`]: CC1120 sub-GHz transceiver (SPI)
//! - [`nfc4`]: ST25R3916 NFC reader with an ISO14443-A poller (SPI)
//! - [`gnss`]: NMEA 0183 GNSS receivers (UART)
//! - [`vcpmonitor`]: INA260 voltage/current/power monitor (I2C)
//! - [`lightranger4`]: VL53L1X time-of-flight ranging sensor (I2C)
//! - [`canfd`]: MCP2517FD/MCP2518FD CAN FD controller (SPI)
//! - [`hallcurrent`]: Hall-effect current sensor behind an MCP3221 ADC (I2C)
//!
//! Drivers with a register map split it into a register-level `ll` module
//! and a high-level interface on top of it.
//!
//! This crate is built on top of [`embedded-hal`], which means it is portable
//! and can be used on any platform that implements the `embedded-hal` API.
//! With the `async` feature (enabled by default) all bus operations are
//! `async` and use [`embedded-hal-async`] instead.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//! [`embedded-hal-async`]: https://crates.io/crates/embedded-hal-async
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "async")]
use maybe_async::must_be_async as maybe_async_attr;
#[cfg(not(feature = "async"))]
use maybe_async::must_be_sync as maybe_async_attr;

#[cfg(not(feature = "async"))]
use embedded_hal as hal_type;
#[cfg(feature = "async")]
use embedded_hal_async as hal_type;

#[cfg(not(feature = "async"))]
use embedded_io as io_type;
#[cfg(feature = "async")]
use embedded_io_async as io_type;

#[macro_use]
mod fmt;
#[macro_use]
pub mod register;

pub mod canfd;
pub mod cc1120;
pub mod gnss;
pub mod hallcurrent;
pub mod lightranger4;
pub mod nfc4;
pub mod vcpmonitor;

/// Redirection of nb::block
pub mod block {
    pub use nb::block;
}

pub use crate::{
    canfd::CanFd, cc1120::Cc1120, gnss::Gnss, hallcurrent::HallCurrent,
    lightranger4::LightRanger4, nfc4::Nfc4, vcpmonitor::VcpMonitor,
};
