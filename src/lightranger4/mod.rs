//! LightRanger 4 Click: VL53L1X time-of-flight ranging sensor
//!
//! The sensor is brought up with [`LightRanger4::wait_boot`] and
//! [`LightRanger4::default_cfg`], after which it ranges continuously between
//! [`LightRanger4::start_ranging`] and [`LightRanger4::stop_ranging`].
//! Results are signalled through the interrupt status and have to be
//! acknowledged with [`LightRanger4::clear_interrupt`] before the next one is
//! reported.
//!
//! The timing budget is computed from the measured oscillator frequency
//! instead of looked up from a table, so any budget above
//! [`timing::TIMING_GUARD_US`] can be programmed.

use core::fmt;
use core::fmt::{Display, Formatter};

use embedded_hal::i2c;
use fixed::types::{U14F2, U9F7};

use crate::{
    hal_type::{delay::DelayNs, i2c::I2c},
    maybe_async_attr,
    register::Register,
};

pub mod ll;
pub mod timing;

/// Default 7-bit I2C address
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// `IDENTIFICATION__MODEL_ID` of the VL53L1X
pub const MODEL_ID: u16 = 0xEACC;

/// First register written by the default configuration
const DEFAULT_CONFIGURATION_START: u16 = 0x002D;

/// Register values for 0x2D..=0x87
const DEFAULT_CONFIGURATION: [u8; 91] = [
    0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x02, 0x08, 0x00, 0x08, 0x10, 0x01, 0x01, 0x00, 0x00,
    0x00, 0x00, 0xFF, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x0B, 0x00, 0x00, 0x02,
    0x0A, 0x21, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0xC8, 0x00, 0x00, 0x38, 0xFF, 0x01,
    0x00, 0x08, 0x00, 0x00, 0x01, 0xCC, 0x0F, 0x01, 0xF1, 0x0D, 0x01, 0x68, 0x00, 0x80, 0x08,
    0xB8, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x89, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
    0x0F, 0x0D, 0x0E, 0x0E, 0x00, 0x00, 0x02, 0xC7, 0xFF, 0x9B, 0x00, 0x00, 0x00, 0x01, 0x00,
    0x00,
];

const BOOT_POLLS: u32 = 100;
const DATA_READY_POLLS: u32 = 1000;

const MODE_START_CONTINUOUS: u8 = 0x40;
const MODE_STOP: u8 = 0x00;

const VHV_LOOP_BOUND: u8 = 0x09;

/// Number of bytes in the result block starting at `RESULT__RANGE_STATUS`
const RESULT_LEN: usize = 17;

/// Device range status to reported range status
const RANGE_STATUS: [u8; 24] = [
    255, 255, 255, 5, 2, 4, 1, 7, 3, 0, 255, 255, 9, 13, 255, 255, 255, 255, 10, 6, 255, 255,
    11, 12,
];

/// ROI centre used for regions wider or taller than 10 SPADs
const ROI_WIDE_CENTRE: u8 = 199;

/// Inter-measurement period correction, in thousandths
const INTER_MEASUREMENT_FACTOR: u64 = 1075;

/// Distance mode
///
/// Long mode reaches up to 4 m in the dark but is more sensitive to ambient
/// light than short mode, which reaches about 1.3 m.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceMode {
    Short,
    #[default]
    Long,
}

struct ModeRegisters {
    phasecal_timeout: u8,
    vcsel_period_a: u8,
    vcsel_period_b: u8,
    valid_phase_high: u8,
    woi_sd0: u16,
    initial_phase_sd0: u16,
}

impl DistanceMode {
    fn registers(self) -> ModeRegisters {
        match self {
            DistanceMode::Short => ModeRegisters {
                phasecal_timeout: 0x14,
                vcsel_period_a: 0x07,
                vcsel_period_b: 0x05,
                valid_phase_high: 0x38,
                woi_sd0: 0x0705,
                initial_phase_sd0: 0x0606,
            },
            DistanceMode::Long => ModeRegisters {
                phasecal_timeout: 0x0A,
                vcsel_period_a: 0x0F,
                vcsel_period_b: 0x0D,
                valid_phase_high: 0xB8,
                woi_sd0: 0x0F0D,
                initial_phase_sd0: 0x0E0E,
            },
        }
    }
}

/// Result of one measurement
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangingData {
    /// Range status: 0 valid, 1 sigma failure, 2 signal failure, 4 phase out
    /// of bounds, 7 wrap-around, 255 unknown device status
    pub status: u8,
    /// Distance in mm
    pub distance_mm: u16,
    /// Return signal rate in kcps
    pub signal_rate_kcps: u32,
    /// Ambient rate in kcps
    pub ambient_rate_kcps: u32,
    /// Number of enabled SPADs
    pub spad_count: u8,
}

impl RangingData {
    /// Whether the distance can be trusted
    pub fn is_valid(&self) -> bool {
        self.status == 0
    }
}

/// Entry point to the LightRanger 4 driver API
pub struct LightRanger4<I2C> {
    ll: ll::Vl53l1x<I2C>,
}

impl<I2C> LightRanger4<I2C>
where
    I2C: I2c,
{
    /// Create a new instance of `LightRanger4` at [`DEFAULT_ADDRESS`]
    pub fn new(i2c: I2C) -> Self {
        LightRanger4 {
            ll: ll::Vl53l1x::new(i2c, DEFAULT_ADDRESS),
        }
    }

    /// Returns the register-level interface
    pub fn ll(&mut self) -> &mut ll::Vl53l1x<I2C> {
        &mut self.ll
    }

    /// Release the I2C bus
    pub fn free(self) -> I2C {
        self.ll.i2c
    }

    /// Move the sensor to another 7-bit I2C address
    ///
    /// The address is lost when the sensor is powered down or XSHUT is
    /// pulled low.
    #[maybe_async_attr]
    pub async fn set_address(&mut self, address: u8) -> Result<(), Error<I2C>> {
        self.ll
            .i2c_slave_device_address()
            .write(|w| w.address(address))
            .await?;
        self.ll.address = address;

        Ok(())
    }

    /// Wait for the firmware to finish booting
    #[maybe_async_attr]
    pub async fn wait_boot<D>(&mut self, delay: &mut D) -> Result<(), Error<I2C>>
    where
        D: DelayNs,
    {
        for _ in 0..BOOT_POLLS {
            if self.ll.firmware_system_status().read().await?.booted() == 1 {
                return Ok(());
            }
            delay.delay_ms(1).await;
        }

        Err(Error::BootTimeout)
    }

    /// Read `IDENTIFICATION__MODEL_ID`, [`MODEL_ID`] for a VL53L1X
    #[maybe_async_attr]
    pub async fn sensor_id(&mut self) -> Result<u16, Error<I2C>> {
        Ok(self.ll.identification_model_id().read().await?.bits())
    }

    /// Load the default configuration and run the VHV calibration
    ///
    /// Leaves the sensor in long distance mode with a 77 ms timing budget,
    /// ranging stopped.
    #[maybe_async_attr]
    pub async fn default_cfg(&mut self) -> Result<(), Error<I2C>> {
        self.ll
            .write_registers(DEFAULT_CONFIGURATION_START, &DEFAULT_CONFIGURATION)
            .await?;

        // One measurement runs the VHV calibration
        self.start_ranging().await?;
        let mut ready = false;
        for _ in 0..DATA_READY_POLLS {
            if self.data_ready().await? {
                ready = true;
                break;
            }
        }
        if !ready {
            return Err(Error::Timeout);
        }
        self.clear_interrupt().await?;
        self.stop_ranging().await?;

        self.ll
            .vhv_config_timeout_macrop_loop_bound()
            .write(|w| w.bits(VHV_LOOP_BOUND))
            .await?;
        self.ll.vhv_config_init().write(|w| w.bits(0)).await?;

        debug!("VL53L1X configured");

        Ok(())
    }

    /// Start continuous ranging
    #[maybe_async_attr]
    pub async fn start_ranging(&mut self) -> Result<(), Error<I2C>> {
        self.ll
            .system_mode_start()
            .write(|w| w.bits(MODE_START_CONTINUOUS))
            .await?;
        Ok(())
    }

    /// Stop ranging
    #[maybe_async_attr]
    pub async fn stop_ranging(&mut self) -> Result<(), Error<I2C>> {
        self.ll
            .system_mode_start()
            .write(|w| w.bits(MODE_STOP))
            .await?;
        Ok(())
    }

    /// Whether a new measurement is available
    #[maybe_async_attr]
    pub async fn data_ready(&mut self) -> Result<bool, Error<I2C>> {
        let active_high = self.ll.gpio_hv_mux_ctrl().read().await?.polarity() == 0;
        let level = self.ll.gpio_tio_hv_status().read().await?.status() == 1;

        Ok(level == active_high)
    }

    /// Acknowledge the last measurement
    #[maybe_async_attr]
    pub async fn clear_interrupt(&mut self) -> Result<(), Error<I2C>> {
        self.ll.system_interrupt_clear().write(|w| w.clear(1)).await?;
        Ok(())
    }

    /// Distance of the last measurement in mm
    #[maybe_async_attr]
    pub async fn distance_mm(&mut self) -> Result<u16, Error<I2C>> {
        Ok(self
            .ll
            .result_final_crosstalk_corrected_range_mm_sd0()
            .read()
            .await?
            .bits())
    }

    /// Full result of the last measurement
    #[maybe_async_attr]
    pub async fn ranging_data(&mut self) -> Result<RangingData, Error<I2C>> {
        let mut buf = [0; RESULT_LEN];
        self.ll
            .read_registers(ll::RESULT_RANGE_STATUS::ADDRESS, &mut buf)
            .await?;

        let status = RANGE_STATUS
            .get(usize::from(buf[0] & 0x1F))
            .copied()
            .unwrap_or(255);

        Ok(RangingData {
            status,
            distance_mm: u16::from_be_bytes([buf[13], buf[14]]),
            signal_rate_kcps: u32::from(u16::from_be_bytes([buf[15], buf[16]])) * 8,
            ambient_rate_kcps: u32::from(u16::from_be_bytes([buf[7], buf[8]])) * 8,
            spad_count: buf[3],
        })
    }

    /// Switch the distance mode, keeping the timing budget
    #[maybe_async_attr]
    pub async fn set_distance_mode(&mut self, mode: DistanceMode) -> Result<(), Error<I2C>> {
        let budget_us = self.timing_budget_us().await?;
        let registers = mode.registers();

        self.ll
            .phasecal_config_timeout_macrop()
            .write(|w| w.bits(registers.phasecal_timeout))
            .await?;
        self.ll
            .range_config_vcsel_period_a()
            .write(|w| w.bits(registers.vcsel_period_a))
            .await?;
        self.ll
            .range_config_vcsel_period_b()
            .write(|w| w.bits(registers.vcsel_period_b))
            .await?;
        self.ll
            .range_config_valid_phase_high()
            .write(|w| w.bits(registers.valid_phase_high))
            .await?;
        self.ll
            .sd_config_woi_sd0()
            .write(|w| w.bits(registers.woi_sd0))
            .await?;
        self.ll
            .sd_config_initial_phase_sd0()
            .write(|w| w.bits(registers.initial_phase_sd0))
            .await?;

        self.set_timing_budget_us(budget_us).await
    }

    /// Current distance mode
    ///
    /// Returns `None` if the VCSEL period matches neither mode.
    #[maybe_async_attr]
    pub async fn distance_mode(&mut self) -> Result<Option<DistanceMode>, Error<I2C>> {
        let vcsel_period_a = self.ll.range_config_vcsel_period_a().read().await?.bits();

        Ok(match vcsel_period_a {
            p if p == DistanceMode::Short.registers().vcsel_period_a => Some(DistanceMode::Short),
            p if p == DistanceMode::Long.registers().vcsel_period_a => Some(DistanceMode::Long),
            _ => None,
        })
    }

    #[maybe_async_attr]
    async fn macro_period(&mut self, vcsel_period: u8) -> Result<u32, Error<I2C>> {
        let fast_osc = self.ll.osc_measured_fast_osc_frequency().read().await?.bits();
        timing::macro_period(fast_osc, vcsel_period).ok_or(Error::InvalidConfiguration)
    }

    /// Set the time one measurement may take
    ///
    /// The budget has to exceed [`timing::TIMING_GUARD_US`] and leaves at most
    /// [`timing::MAX_RANGE_TIMEOUT_US`] for ranging.
    #[maybe_async_attr]
    pub async fn set_timing_budget_us(&mut self, budget_us: u32) -> Result<(), Error<I2C>> {
        if budget_us <= timing::TIMING_GUARD_US {
            return Err(Error::InvalidConfiguration);
        }
        let range_timeout_us = budget_us - timing::TIMING_GUARD_US;
        if range_timeout_us > timing::MAX_RANGE_TIMEOUT_US {
            return Err(Error::InvalidConfiguration);
        }
        // Split between the two VCSEL periods
        let range_timeout_us = range_timeout_us / 2;

        let vcsel_period_a = self.ll.range_config_vcsel_period_a().read().await?.bits();
        let period_a = self.macro_period(vcsel_period_a).await?;

        let phasecal = timing::us_to_mclks(1000, period_a).min(0xFF) as u8;
        self.ll
            .phasecal_config_timeout_macrop()
            .write(|w| w.bits(phasecal))
            .await?;
        self.ll
            .mm_config_timeout_macrop_a()
            .write(|w| w.bits(timing::encode_timeout(timing::us_to_mclks(1, period_a))))
            .await?;
        self.ll
            .range_config_timeout_macrop_a()
            .write(|w| {
                w.bits(timing::encode_timeout(timing::us_to_mclks(
                    range_timeout_us,
                    period_a,
                )))
            })
            .await?;

        let vcsel_period_b = self.ll.range_config_vcsel_period_b().read().await?.bits();
        let period_b = self.macro_period(vcsel_period_b).await?;

        self.ll
            .mm_config_timeout_macrop_b()
            .write(|w| w.bits(timing::encode_timeout(timing::us_to_mclks(1, period_b))))
            .await?;
        self.ll
            .range_config_timeout_macrop_b()
            .write(|w| {
                w.bits(timing::encode_timeout(timing::us_to_mclks(
                    range_timeout_us,
                    period_b,
                )))
            })
            .await?;

        Ok(())
    }

    /// Time one measurement takes, in µs
    #[maybe_async_attr]
    pub async fn timing_budget_us(&mut self) -> Result<u32, Error<I2C>> {
        let vcsel_period_a = self.ll.range_config_vcsel_period_a().read().await?.bits();
        let period_a = self.macro_period(vcsel_period_a).await?;
        let range_a = self.ll.range_config_timeout_macrop_a().read().await?.bits();

        let range_timeout_us = timing::decode_timeout(range_a)
            .and_then(|mclks| timing::mclks_to_us(mclks, period_a))
            .ok_or(Error::InvalidConfiguration)?;

        range_timeout_us
            .checked_mul(2)
            .and_then(|us| us.checked_add(timing::TIMING_GUARD_US))
            .ok_or(Error::InvalidConfiguration)
    }

    /// Set the time between the start of two measurements
    ///
    /// Has to be at least the timing budget.
    #[maybe_async_attr]
    pub async fn set_inter_measurement_ms(&mut self, period_ms: u32) -> Result<(), Error<I2C>> {
        let clock_pll = u64::from(self.ll.result_osc_calibrate_val().read().await?.value());
        let ticks = clock_pll * u64::from(period_ms) * INTER_MEASUREMENT_FACTOR / 1000;
        let ticks = u32::try_from(ticks).map_err(|_| Error::InvalidConfiguration)?;

        self.ll
            .system_intermeasurement_period()
            .write(|w| w.bits(ticks))
            .await?;

        Ok(())
    }

    /// Time between the start of two measurements, in ms
    ///
    /// Returns 0 while the oscillator is not calibrated.
    #[maybe_async_attr]
    pub async fn inter_measurement_ms(&mut self) -> Result<u32, Error<I2C>> {
        let ticks = u64::from(self.ll.system_intermeasurement_period().read().await?.bits());
        let clock_pll = u64::from(self.ll.result_osc_calibrate_val().read().await?.value());
        if clock_pll == 0 {
            return Ok(0);
        }

        let divisor = clock_pll * INTER_MEASUREMENT_FACTOR;
        Ok(((ticks * 1000 + divisor / 2) / divisor) as u32)
    }

    /// Restrict ranging to a `width` × `height` SPAD region
    ///
    /// Both dimensions have to be in `4..=16`. Regions larger than 10 SPADs in
    /// either direction are centred on the array, smaller ones on the
    /// factory-calibrated optical centre.
    #[maybe_async_attr]
    pub async fn set_roi(&mut self, width: u8, height: u8) -> Result<(), Error<I2C>> {
        if !(4..=16).contains(&width) || !(4..=16).contains(&height) {
            return Err(Error::InvalidConfiguration);
        }

        let mut centre = self.ll.roi_config_mode_roi_centre_spad().read().await?.bits();
        if width > 10 || height > 10 {
            centre = ROI_WIDE_CENTRE;
        }

        self.ll
            .roi_config_user_roi_centre_spad()
            .write(|w| w.bits(centre))
            .await?;
        self.ll
            .roi_config_user_roi_requested_global_xy_size()
            .write(|w| w.width(width - 1).height(height - 1))
            .await?;

        Ok(())
    }

    /// Current region of interest as `(width, height)`
    #[maybe_async_attr]
    pub async fn roi(&mut self) -> Result<(u8, u8), Error<I2C>> {
        let size = self
            .ll
            .roi_config_user_roi_requested_global_xy_size()
            .read()
            .await?;

        Ok((size.width() + 1, size.height() + 1))
    }

    /// Set the minimum return signal rate, in MCPS
    #[maybe_async_attr]
    pub async fn set_signal_threshold(&mut self, rate: U9F7) -> Result<(), Error<I2C>> {
        self.ll
            .range_config_min_count_rate_rtn_limit_mcps()
            .write(|w| w.bits(rate.to_bits()))
            .await?;
        Ok(())
    }

    /// Minimum return signal rate, in MCPS
    #[maybe_async_attr]
    pub async fn signal_threshold(&mut self) -> Result<U9F7, Error<I2C>> {
        let raw = self
            .ll
            .range_config_min_count_rate_rtn_limit_mcps()
            .read()
            .await?
            .bits();
        Ok(U9F7::from_bits(raw))
    }

    /// Set the maximum sigma estimate of a valid measurement, in mm
    #[maybe_async_attr]
    pub async fn set_sigma_threshold(&mut self, sigma: U14F2) -> Result<(), Error<I2C>> {
        self.ll
            .range_config_sigma_thresh()
            .write(|w| w.bits(sigma.to_bits()))
            .await?;
        Ok(())
    }

    /// Maximum sigma estimate of a valid measurement, in mm
    #[maybe_async_attr]
    pub async fn sigma_threshold(&mut self) -> Result<U14F2, Error<I2C>> {
        let raw = self.ll.range_config_sigma_thresh().read().await?.bits();
        Ok(U14F2::from_bits(raw))
    }
}

/// An error that can occur when talking to the VL53L1X
pub enum Error<I2C>
where
    I2C: i2c::ErrorType,
{
    /// Error occured while using I2C bus
    I2c(ll::Error<I2C>),

    /// The firmware did not report booted
    BootTimeout,

    /// No measurement arrived in time
    Timeout,

    /// A parameter is outside of what the sensor supports
    InvalidConfiguration,
}

impl<I2C> From<ll::Error<I2C>> for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn from(error: ll::Error<I2C>) -> Self {
        Error::I2c(error)
    }
}

impl<I2C> Display for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<I2C> std::error::Error for Error<I2C> where I2C: i2c::ErrorType {}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::I2c(error) => write!(f, "I2c({:?})", error),
            Error::BootTimeout => write!(f, "BootTimeout"),
            Error::Timeout => write!(f, "Timeout"),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<I2C> defmt::Format for Error<I2C>
where
    I2C: i2c::ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::I2c(error) => defmt::write!(f, "I2c({})", error),
            Error::BootTimeout => defmt::write!(f, "BootTimeout"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
        }
    }
}

#[cfg(all(test, feature = "async"))]
mod test {
    use super::*;

    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        i2c::{Mock as I2cMock, Transaction as I2cTransaction},
    };

    const ADDR: u8 = DEFAULT_ADDRESS;
    const FAST_OSC: u16 = 0xD000;

    fn read_bytes(register: u16, data: &[u8]) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, register.to_be_bytes().to_vec(), data.to_vec())
    }

    fn read8(register: u16, value: u8) -> I2cTransaction {
        read_bytes(register, &[value])
    }

    fn read16(register: u16, value: u16) -> I2cTransaction {
        read_bytes(register, &value.to_be_bytes())
    }

    fn write_bytes(register: u16, data: &[u8]) -> I2cTransaction {
        let mut bytes = register.to_be_bytes().to_vec();
        bytes.extend_from_slice(data);
        I2cTransaction::write(ADDR, bytes)
    }

    fn write8(register: u16, value: u8) -> I2cTransaction {
        write_bytes(register, &[value])
    }

    fn write16(register: u16, value: u16) -> I2cTransaction {
        write_bytes(register, &value.to_be_bytes())
    }

    /// Interrupt polarity and level reads of `data_ready`
    fn poll(level: u8) -> [I2cTransaction; 2] {
        [read8(0x0030, 0x01), read8(0x0031, level)]
    }

    #[tokio::test]
    async fn wait_boot_polls_firmware_status() {
        let i2c = I2cMock::new(&[
            read8(0x00E5, 0x00),
            read8(0x00E5, 0x00),
            read8(0x00E5, 0x01),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        ranger.wait_boot(&mut NoopDelay).await.unwrap();

        ranger.free().done();
    }

    #[tokio::test]
    async fn wait_boot_gives_up() {
        let expectations: Vec<_> = (0..BOOT_POLLS).map(|_| read8(0x00E5, 0x00)).collect();
        let i2c = I2cMock::new(&expectations);

        let mut ranger = LightRanger4::new(i2c);
        let result = ranger.wait_boot(&mut NoopDelay).await;

        assert!(matches!(result, Err(Error::BootTimeout)));

        ranger.free().done();
    }

    #[tokio::test]
    async fn sensor_id() {
        let i2c = I2cMock::new(&[read16(0x010F, MODEL_ID)]);

        let mut ranger = LightRanger4::new(i2c);
        assert_eq!(ranger.sensor_id().await.unwrap(), MODEL_ID);

        ranger.free().done();
    }

    #[tokio::test]
    async fn default_cfg_runs_vhv_calibration() {
        let mut expectations = vec![
            write_bytes(0x002D, &DEFAULT_CONFIGURATION[..32]),
            write_bytes(0x004D, &DEFAULT_CONFIGURATION[32..64]),
            write_bytes(0x006D, &DEFAULT_CONFIGURATION[64..]),
            write8(0x0087, 0x40),
        ];
        expectations.extend(poll(0x00));
        expectations.extend(poll(0x01));
        expectations.extend([
            write8(0x0086, 0x01),
            write8(0x0087, 0x00),
            write8(0x0008, 0x09),
            write8(0x000B, 0x00),
        ]);
        let i2c = I2cMock::new(&expectations);

        let mut ranger = LightRanger4::new(i2c);
        ranger.default_cfg().await.unwrap();

        ranger.free().done();
    }

    #[tokio::test]
    async fn data_ready_honours_polarity() {
        let i2c = I2cMock::new(&[
            read8(0x0030, 0x11),
            read8(0x0031, 0x00),
            read8(0x0030, 0x11),
            read8(0x0031, 0x01),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        assert!(ranger.data_ready().await.unwrap());
        assert!(!ranger.data_ready().await.unwrap());

        ranger.free().done();
    }

    #[tokio::test]
    async fn ranging_data_decodes_result_block() {
        let mut block = [0u8; RESULT_LEN];
        block[0] = 0x09;
        block[3] = 0x2C;
        block[7..9].copy_from_slice(&0x0010u16.to_be_bytes());
        block[13..15].copy_from_slice(&1234u16.to_be_bytes());
        block[15..17].copy_from_slice(&0x0200u16.to_be_bytes());

        let i2c = I2cMock::new(&[
            read_bytes(0x0089, &block),
            read_bytes(0x0089, &[0x1F; RESULT_LEN]),
            read16(0x0096, 1234),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        let data = ranger.ranging_data().await.unwrap();
        assert_eq!(
            data,
            RangingData {
                status: 0,
                distance_mm: 1234,
                signal_rate_kcps: 0x0200 * 8,
                ambient_rate_kcps: 0x0010 * 8,
                spad_count: 0x2C,
            }
        );
        assert!(data.is_valid());

        let data = ranger.ranging_data().await.unwrap();
        assert_eq!(data.status, 255);
        assert!(!data.is_valid());

        assert_eq!(ranger.distance_mm().await.unwrap(), 1234);

        ranger.free().done();
    }

    #[tokio::test]
    async fn timing_budget_in_long_mode() {
        let i2c = I2cMock::new(&[
            // Default configuration
            read8(0x0060, 0x0F),
            read16(0x0006, FAST_OSC),
            read16(0x005E, 0x01CC),
            // Set 50 ms
            read8(0x0060, 0x0F),
            read16(0x0006, FAST_OSC),
            write8(0x004B, 11),
            write16(0x005A, 0x0000),
            write16(0x005E, 0x0180),
            read8(0x0063, 0x0D),
            read16(0x0006, FAST_OSC),
            write16(0x005C, 0x0000),
            write16(0x0061, 0x0192),
            // Read back
            read8(0x0060, 0x0F),
            read16(0x0006, FAST_OSC),
            read16(0x005E, 0x0180),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        assert_eq!(ranger.timing_budget_us().await.unwrap(), 77012);
        ranger.set_timing_budget_us(50_000).await.unwrap();
        assert_eq!(ranger.timing_budget_us().await.unwrap(), 50074);

        ranger.free().done();
    }

    #[tokio::test]
    async fn corrupt_timeout_register_is_rejected() {
        let i2c = I2cMock::new(&[
            // Exponent past 32 bits
            read8(0x0060, 0x0F),
            read16(0x0006, FAST_OSC),
            read16(0x005E, 0x2001),
            // Range timeout fits, the doubled budget doesn't
            read8(0x0060, 0x0F),
            read16(0x0006, FAST_OSC),
            read16(0x005E, 0x1901),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        assert!(matches!(
            ranger.timing_budget_us().await,
            Err(Error::InvalidConfiguration)
        ));
        assert!(matches!(
            ranger.timing_budget_us().await,
            Err(Error::InvalidConfiguration)
        ));

        ranger.free().done();
    }

    #[tokio::test]
    async fn timing_budget_limits() {
        let i2c = I2cMock::new(&[]);

        let mut ranger = LightRanger4::new(i2c);
        assert!(matches!(
            ranger.set_timing_budget_us(timing::TIMING_GUARD_US).await,
            Err(Error::InvalidConfiguration)
        ));
        assert!(matches!(
            ranger
                .set_timing_budget_us(timing::TIMING_GUARD_US + 1_100_001)
                .await,
            Err(Error::InvalidConfiguration)
        ));

        ranger.free().done();
    }

    #[tokio::test]
    async fn uncalibrated_oscillator_is_rejected() {
        let i2c = I2cMock::new(&[read8(0x0060, 0x0F), read16(0x0006, 0x0000)]);

        let mut ranger = LightRanger4::new(i2c);
        assert!(matches!(
            ranger.timing_budget_us().await,
            Err(Error::InvalidConfiguration)
        ));

        ranger.free().done();
    }

    #[tokio::test]
    async fn short_distance_mode_keeps_budget() {
        let i2c = I2cMock::new(&[
            // Budget before the switch, 50.074 ms in long mode
            read8(0x0060, 0x0F),
            read16(0x0006, FAST_OSC),
            read16(0x005E, 0x0180),
            // Mode registers
            write8(0x004B, 0x14),
            write8(0x0060, 0x07),
            write8(0x0063, 0x05),
            write8(0x0069, 0x38),
            write16(0x0078, 0x0705),
            write16(0x007A, 0x0606),
            // Budget restored for the new VCSEL periods
            read8(0x0060, 0x07),
            read16(0x0006, FAST_OSC),
            write8(0x004B, 23),
            write16(0x005A, 0x0000),
            write16(0x005E, 0x0280),
            read8(0x0063, 0x05),
            read16(0x0006, FAST_OSC),
            write16(0x005C, 0x0000),
            write16(0x0061, 0x02AB),
            // Detected from the VCSEL period
            read8(0x0060, 0x07),
            read8(0x0060, 0x0B),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        ranger
            .set_distance_mode(DistanceMode::Short)
            .await
            .unwrap();
        assert_eq!(
            ranger.distance_mode().await.unwrap(),
            Some(DistanceMode::Short)
        );
        assert_eq!(ranger.distance_mode().await.unwrap(), None);

        ranger.free().done();
    }

    #[tokio::test]
    async fn inter_measurement_period() {
        let i2c = I2cMock::new(&[
            read16(0x00DE, 0xFC00 | 512),
            write_bytes(0x006C, &55_040u32.to_be_bytes()),
            read_bytes(0x006C, &55_040u32.to_be_bytes()),
            read16(0x00DE, 512),
            read_bytes(0x006C, &55_040u32.to_be_bytes()),
            read16(0x00DE, 0),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        ranger.set_inter_measurement_ms(100).await.unwrap();
        assert_eq!(ranger.inter_measurement_ms().await.unwrap(), 100);
        assert_eq!(ranger.inter_measurement_ms().await.unwrap(), 0);

        ranger.free().done();
    }

    #[tokio::test]
    async fn roi_bounds_and_centre() {
        let i2c = I2cMock::new(&[
            read8(0x013E, 0xC7),
            write8(0x007F, 0xC7),
            write8(0x0080, 0x33),
            read8(0x013E, 0xC8),
            write8(0x007F, 199),
            write8(0x0080, 0xF3),
            read8(0x0080, 0xF3),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        ranger.set_roi(4, 4).await.unwrap();
        ranger.set_roi(4, 16).await.unwrap();
        assert_eq!(ranger.roi().await.unwrap(), (4, 16));
        assert!(matches!(
            ranger.set_roi(3, 8).await,
            Err(Error::InvalidConfiguration)
        ));
        assert!(matches!(
            ranger.set_roi(8, 17).await,
            Err(Error::InvalidConfiguration)
        ));

        ranger.free().done();
    }

    #[tokio::test]
    async fn thresholds_are_fixed_point() {
        let i2c = I2cMock::new(&[
            write16(0x0066, 0x0080),
            write16(0x0064, 0x003C),
            read16(0x0066, 0x00C0),
            read16(0x0064, 0x0006),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        ranger
            .set_signal_threshold(U9F7::from_num(1))
            .await
            .unwrap();
        ranger
            .set_sigma_threshold(U14F2::from_num(15))
            .await
            .unwrap();
        assert_eq!(
            ranger.signal_threshold().await.unwrap(),
            U9F7::from_num(1.5)
        );
        assert_eq!(
            ranger.sigma_threshold().await.unwrap(),
            U14F2::from_num(1.5)
        );

        ranger.free().done();
    }

    #[tokio::test]
    async fn set_address_moves_the_sensor() {
        let i2c = I2cMock::new(&[
            I2cTransaction::write(ADDR, vec![0x00, 0x01, 0x30]),
            I2cTransaction::write_read(0x30, vec![0x01, 0x0F], vec![0xEA, 0xCC]),
        ]);

        let mut ranger = LightRanger4::new(i2c);
        ranger.set_address(0x30).await.unwrap();
        assert_eq!(ranger.sensor_id().await.unwrap(), MODEL_ID);

        ranger.free().done();
    }
}
