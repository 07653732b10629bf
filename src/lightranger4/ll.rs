//! Low-level interface to the VL53L1X
//!
//! Register addresses are 16 bits wide and sent MSB first, followed by the
//! data, also MSB first. The address auto-increments, so multi-byte
//! registers and the default configuration block are single transfers.
//!
//! Please consider using the [high-level interface] instead.
//!
//! [high-level interface]: super::LightRanger4

use core::{fmt, marker::PhantomData};

use embedded_hal::i2c::ErrorType;

use crate::{
    hal_type::i2c::I2c,
    maybe_async_attr,
    register::{Readable, Register, RegisterValue, Writable},
};

/// Largest payload sent in one write transfer
const MAX_WRITE_LEN: usize = 32;

/// Entry point to the VL53L1X driver's low-level API
///
/// Please consider using [LightRanger4] instead.
///
/// [LightRanger4]: super::LightRanger4
pub struct Vl53l1x<I2C> {
    pub(crate) i2c: I2C,
    pub(crate) address: u8,
}

impl<I2C> Vl53l1x<I2C> {
    /// Create a new instance of `Vl53l1x`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Vl53l1x { i2c, address }
    }

    /// Allow access to the I2C bus
    pub fn bus(&mut self) -> &mut I2C {
        &mut self.i2c
    }
}

impl<I2C> Vl53l1x<I2C>
where
    I2C: I2c,
{
    /// Read consecutive registers starting at `register`
    #[maybe_async_attr]
    pub async fn read_registers(&mut self, register: u16, buf: &mut [u8]) -> Result<(), Error<I2C>> {
        self.i2c
            .write_read(self.address, &register.to_be_bytes(), buf)
            .await
            .map_err(Error::Read)
    }

    /// Write consecutive registers starting at `register`
    ///
    /// Long writes are split into several transfers.
    #[maybe_async_attr]
    pub async fn write_registers(&mut self, register: u16, data: &[u8]) -> Result<(), Error<I2C>> {
        let mut buf = [0; 2 + MAX_WRITE_LEN];

        for (i, chunk) in data.chunks(MAX_WRITE_LEN).enumerate() {
            let address = register + (i * MAX_WRITE_LEN) as u16;
            buf[..2].copy_from_slice(&address.to_be_bytes());
            buf[2..2 + chunk.len()].copy_from_slice(chunk);

            self.i2c
                .write(self.address, &buf[..2 + chunk.len()])
                .await
                .map_err(Error::Write)?;
        }

        Ok(())
    }
}

/// Provides access to a register
///
/// You can get an instance for a given register using one of the methods on
/// [`Vl53l1x`].
pub struct RegAccessor<'s, R, I2C>(&'s mut Vl53l1x<I2C>, PhantomData<R>);

impl<'s, R, I2C> RegAccessor<'s, R, I2C>
where
    I2C: I2c,
    R: Register<Address = u16>,
{
    /// Read from the register
    #[inline]
    #[maybe_async_attr]
    pub async fn read(&mut self) -> Result<R::Read, Error<I2C>>
    where
        R: Readable,
    {
        let mut buf = [0; 4];
        let buf = &mut buf[..R::Raw::LEN];
        self.0.read_registers(R::ADDRESS, buf).await?;

        Ok(R::from_raw(R::Raw::from_be_slice(buf)))
    }

    /// Write to the register
    #[inline]
    #[maybe_async_attr]
    pub async fn write<F>(&mut self, f: F) -> Result<(), Error<I2C>>
    where
        R: Writable,
        F: FnOnce(&mut R::Write) -> &mut R::Write,
    {
        let mut w = R::write(R::Raw::default());
        f(&mut w);

        let mut buf = [0; 4];
        R::into_raw(&w).write_be(&mut buf);
        self.0
            .write_registers(R::ADDRESS, &buf[..R::Raw::LEN])
            .await
    }

    /// Modify the register
    #[inline]
    #[maybe_async_attr]
    pub async fn modify<F>(&mut self, f: F) -> Result<(), Error<I2C>>
    where
        R: Readable + Writable,
        F: for<'r> FnOnce(&R::Read, &'r mut R::Write) -> &'r mut R::Write,
    {
        let r = self.read().await?;
        let mut w = R::write(R::raw(&r));
        f(&r, &mut w);

        let mut buf = [0; 4];
        R::into_raw(&w).write_be(&mut buf);
        self.0
            .write_registers(R::ADDRESS, &buf[..R::Raw::LEN])
            .await
    }
}

/// An I2C error that can occur when communicating with the VL53L1X
pub enum Error<I2C>
where
    I2C: ErrorType,
{
    /// I2C error occured during a read transaction
    Read(I2C::Error),

    /// I2C error occured during a write transaction
    Write(I2C::Error),
}

// We can't derive this implementation, as the compiler will complain that the
// associated error type doesn't implement `Debug`.
impl<I2C> fmt::Debug for Error<I2C>
where
    I2C: ErrorType,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Read(error) => write!(f, "Read({:?})", error),
            Error::Write(error) => write!(f, "Write({:?})", error),
        }
    }
}

#[cfg(feature = "defmt")]
impl<I2C> defmt::Format for Error<I2C>
where
    I2C: ErrorType,
{
    fn format(&self, f: defmt::Formatter) {
        use embedded_hal::i2c::Error as _;

        match self {
            Error::Read(error) => defmt::write!(f, "Read({})", error.kind()),
            Error::Write(error) => defmt::write!(f, "Write({})", error.kind()),
        }
    }
}

impl_register! {
    Vl53l1x<I2C>, u16;

    0x0000, u8, RW, SOFT_RESET(soft_reset) { /// Software reset, active low
    }
    0x0001, u8, RW, I2C_SLAVE_DEVICE_ADDRESS(i2c_slave_device_address) { /// I2C address
        address, 0, 6, u8; /// 7-bit device address
    }
    0x0006, u16, RO, OSC_MEASURED_FAST_OSC_FREQUENCY(osc_measured_fast_osc_frequency) { /// Fast oscillator frequency, 4.12 MHz
    }
    0x0008, u8, RW, VHV_CONFIG_TIMEOUT_MACROP_LOOP_BOUND(vhv_config_timeout_macrop_loop_bound) { /// VHV timeout and loop bound
    }
    0x000B, u8, RW, VHV_CONFIG_INIT(vhv_config_init) { /// VHV start value
    }
    0x0030, u8, RW, GPIO_HV_MUX_CTRL(gpio_hv_mux_ctrl) { /// Interrupt pin configuration
        select,   0, 3, u8; /// Output selection
        polarity, 4, 4, u8; /// Set for active low
    }
    0x0031, u8, RO, GPIO_TIO_HV_STATUS(gpio_tio_hv_status) { /// Interrupt pin state
        status, 0, 0, u8; /// Level of the interrupt output
    }
    0x0046, u8, RW, SYSTEM_INTERRUPT_CONFIG_GPIO(system_interrupt_config_gpio) { /// Interrupt source
        mode,     0, 1, u8; /// Threshold mode
        new_ready, 5, 5, u8; /// Interrupt on new sample ready
    }
    0x004B, u8, RW, PHASECAL_CONFIG_TIMEOUT_MACROP(phasecal_config_timeout_macrop) { /// Phase calibration timeout
    }
    0x005A, u16, RW, MM_CONFIG_TIMEOUT_MACROP_A(mm_config_timeout_macrop_a) { /// MM timeout, VCSEL period A
    }
    0x005C, u16, RW, MM_CONFIG_TIMEOUT_MACROP_B(mm_config_timeout_macrop_b) { /// MM timeout, VCSEL period B
    }
    0x005E, u16, RW, RANGE_CONFIG_TIMEOUT_MACROP_A(range_config_timeout_macrop_a) { /// Range timeout, VCSEL period A
    }
    0x0060, u8, RW, RANGE_CONFIG_VCSEL_PERIOD_A(range_config_vcsel_period_a) { /// VCSEL period A
    }
    0x0061, u16, RW, RANGE_CONFIG_TIMEOUT_MACROP_B(range_config_timeout_macrop_b) { /// Range timeout, VCSEL period B
    }
    0x0063, u8, RW, RANGE_CONFIG_VCSEL_PERIOD_B(range_config_vcsel_period_b) { /// VCSEL period B
    }
    0x0064, u16, RW, RANGE_CONFIG_SIGMA_THRESH(range_config_sigma_thresh) { /// Sigma threshold, 14.2 mm
    }
    0x0066, u16, RW, RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT_MCPS(range_config_min_count_rate_rtn_limit_mcps) { /// Minimum signal rate, 9.7 MCPS
    }
    0x0069, u8, RW, RANGE_CONFIG_VALID_PHASE_HIGH(range_config_valid_phase_high) { /// Upper limit of the valid phase
    }
    0x006C, u32, RW, SYSTEM_INTERMEASUREMENT_PERIOD(system_intermeasurement_period) { /// Inter-measurement period, oscillator ticks
    }
    0x0078, u16, RW, SD_CONFIG_WOI_SD0(sd_config_woi_sd0) { /// Window of interest, SD0 and SD1
    }
    0x007A, u16, RW, SD_CONFIG_INITIAL_PHASE_SD0(sd_config_initial_phase_sd0) { /// Initial phase, SD0 and SD1
    }
    0x007F, u8, RW, ROI_CONFIG_USER_ROI_CENTRE_SPAD(roi_config_user_roi_centre_spad) { /// ROI centre SPAD
    }
    0x0080, u8, RW, ROI_CONFIG_USER_ROI_REQUESTED_GLOBAL_XY_SIZE(roi_config_user_roi_requested_global_xy_size) { /// ROI size
        width,  0, 3, u8; /// Width in SPADs, minus one
        height, 4, 7, u8; /// Height in SPADs, minus one
    }
    0x0086, u8, WO, SYSTEM_INTERRUPT_CLEAR(system_interrupt_clear) { /// Interrupt clear
        clear, 0, 0, u8; /// Clear the range interrupt
    }
    0x0087, u8, RW, SYSTEM_MODE_START(system_mode_start) { /// Ranging start and stop
    }
    0x0089, u8, RO, RESULT_RANGE_STATUS(result_range_status) { /// Range status of the last measurement
        status, 0, 4, u8; /// Device range status
    }
    0x0096, u16, RO, RESULT_FINAL_CROSSTALK_CORRECTED_RANGE_MM_SD0(result_final_crosstalk_corrected_range_mm_sd0) { /// Distance in mm
    }
    0x00DE, u16, RO, RESULT_OSC_CALIBRATE_VAL(result_osc_calibrate_val) { /// Oscillator calibration
        value, 0, 9, u16; /// PLL ticks per ms
    }
    0x00E5, u8, RO, FIRMWARE_SYSTEM_STATUS(firmware_system_status) { /// Firmware state
        booted, 0, 0, u8; /// Firmware finished booting
    }
    0x010F, u16, RO, IDENTIFICATION_MODEL_ID(identification_model_id) { /// Model and module type
    }
    0x013E, u8, RO, ROI_CONFIG_MODE_ROI_CENTRE_SPAD(roi_config_mode_roi_centre_spad) { /// Factory optical centre
    }
}
