//! Timeout encoding used by the ranging sequence configuration
//!
//! Timeouts are programmed in macro periods, whose length depends on the
//! fast oscillator frequency and the VCSEL period. Macro periods are kept in
//! 12.12 fixed point microseconds, like the measured oscillator frequency.

/// Fixed overhead of one measurement, in microseconds
pub const TIMING_GUARD_US: u32 = 4528;

/// Longest range timeout accepted for each of the two VCSEL periods
pub const MAX_RANGE_TIMEOUT_US: u32 = 1_100_000;

/// Length of one macro period in 12.12 microseconds
///
/// `fast_osc_frequency` is the measured oscillator frequency in 4.12 MHz,
/// `vcsel_period` the raw `RANGE_CONFIG__VCSEL_PERIOD_x` value. Returns
/// `None` if the oscillator frequency has not been measured yet or is too
/// low to give a period that fits.
pub fn macro_period(fast_osc_frequency: u16, vcsel_period: u8) -> Option<u32> {
    if fast_osc_frequency == 0 {
        return None;
    }

    let pll_period_us = (1u64 << 30) / u64::from(fast_osc_frequency);
    let vcsel_period_pclks = (u64::from(vcsel_period) + 1) << 1;

    let mut period = 2304 * pll_period_us;
    period >>= 6;
    period *= vcsel_period_pclks;
    period >>= 6;

    u32::try_from(period).ok()
}

/// Convert microseconds to macro periods, rounding to nearest
pub fn us_to_mclks(us: u32, macro_period: u32) -> u32 {
    (((u64::from(us) << 12) + u64::from(macro_period >> 1)) / u64::from(macro_period)) as u32
}

/// Convert macro periods to microseconds, rounding to nearest
///
/// `None` if the result does not fit 32 bits.
pub fn mclks_to_us(mclks: u32, macro_period: u32) -> Option<u32> {
    let us = u64::from(mclks)
        .checked_mul(u64::from(macro_period))?
        .checked_add(0x800)?
        >> 12;

    u32::try_from(us).ok()
}

/// Encode a timeout in macro periods as `(LSByte * 2^MSByte) + 1`
pub fn encode_timeout(mclks: u32) -> u16 {
    if mclks == 0 {
        return 0;
    }

    let mut ls_byte = mclks - 1;
    let mut ms_byte = 0u16;
    while ls_byte > 0xFF {
        ls_byte >>= 1;
        ms_byte += 1;
    }

    (ms_byte << 8) | (ls_byte as u16 & 0xFF)
}

/// Decode a timeout register value to macro periods
///
/// `None` if the exponent is too large for 32 bits.
pub fn decode_timeout(value: u16) -> Option<u32> {
    let mclks = u64::from(value & 0xFF).checked_shl(u32::from(value >> 8))?;
    if mclks > u64::from(u32::MAX) - 1 {
        return None;
    }

    Some(mclks as u32 + 1)
}
