//! Clock divider planning for the PIO I2S programs.
//!
//! The PIO clock divider is a Q8 fixed-point value (16-bit integer part, 8-bit fraction).
//! [`plan_clocks`] turns a requested sample rate into dividers for the optional system
//! (oversampling) clock and the bit clock, and reports the sample rate those dividers actually
//! produce. Downstream timing must use [`ClockPlan::actual_sample_rate_hz`], never the request.
//!
//! When the system clock is enabled the bit clock divider is derived from the system clock
//! divider by an exact integer factor, so the two clocks stay phase locked.
//!
//! # Example
//!
//! ```
//! use dalek_voice::clock_plan::{BitDepth, ClockRequest, plan_clocks};
//!
//! let request = ClockRequest::new(22_050, BitDepth::Bits16, 256, true);
//! let plan = plan_clocks(&request, 125_000_000).expect("22.05 kHz is reachable");
//! assert!((plan.actual_sample_rate_hz() - 22_050.0).abs() < 22.05);
//! ```

use fixed::FixedU32;
use fixed::types::extra::U8;

use crate::{ClockError, Result};

/// PIO cycles per system clock period (`set pins 1` / `set pins 0`).
pub const SYSTEM_CLOCK_PIO_CYCLES: u32 = 2;

/// PIO cycles per bit clock period in the output program (one `out` and one `jmp` per bit).
pub const BIT_CLOCK_PIO_CYCLES: u32 = 2;

/// Largest allowed relative difference between the requested and achieved sample rate.
pub const MAX_RATE_DEVIATION: f32 = 0.001;

/// Tolerance used when checking that the system/bit clock ratio is an integer.
pub const SYNC_TOLERANCE: f32 = 0.001;

const Q8_ONE: u64 = 256;
const Q8_MAX: u64 = 0xFFFF_FF; // 65535 + 255/256

/// Sample word width on the I2S bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum BitDepth {
    /// 16 bits per channel.
    Bits16,
    /// 24 bits per channel.
    Bits24,
    /// 32 bits per channel.
    Bits32,
}

impl BitDepth {
    /// Number of bits per channel slot.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits16 => 16,
            Self::Bits24 => 24,
            Self::Bits32 => 32,
        }
    }

    /// Parse a bit count. Only 16, 24 and 32 are supported.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(Self::Bits16),
            24 => Some(Self::Bits24),
            32 => Some(Self::Bits32),
            _ => None,
        }
    }
}

/// A PIO clock divider: integer part plus an 8-bit binary fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct ClockDivider {
    integer: u16,
    fraction: u8,
}

impl ClockDivider {
    /// Build a divider from its Q8 representation (`integer * 256 + fraction`).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::DividerOutOfRange`] when the value is below 1.0 or above the
    /// 16-bit integer range. `target_hz` is only used to describe the failure.
    pub fn from_q8(q8: u64, target_hz: u32) -> Result<Self> {
        if !(Q8_ONE..=Q8_MAX).contains(&q8) {
            return Err(ClockError::DividerOutOfRange { target_hz }.into());
        }
        let integer = u16::try_from(q8 >> 8)
            .map_err(|_| ClockError::DividerOutOfRange { target_hz })?;
        #[expect(clippy::cast_possible_truncation, reason = "masked to 8 bits")]
        let fraction = (q8 & 0xFF) as u8;
        Ok(Self { integer, fraction })
    }

    /// Integer part of the divider.
    #[must_use]
    pub const fn integer(self) -> u16 {
        self.integer
    }

    /// Fractional part in 1/256 steps.
    #[must_use]
    pub const fn fraction(self) -> u8 {
        self.fraction
    }

    /// The divider as `integer * 256 + fraction`.
    #[must_use]
    pub const fn to_q8(self) -> u64 {
        ((self.integer as u64) << 8) | self.fraction as u64
    }

    /// The divider in the fixed-point form the PIO config takes.
    #[must_use]
    pub fn to_fixed(self) -> FixedU32<U8> {
        #[expect(clippy::cast_possible_truncation, reason = "Q8 divider fits in 24 bits")]
        FixedU32::<U8>::from_bits(self.to_q8() as u32)
    }

    /// Frequency of the PIO state machine clock produced from `base_clock_hz`.
    #[must_use]
    pub fn state_machine_hz(self, base_clock_hz: u32) -> f64 {
        f64::from(base_clock_hz) * 256.0 / self.to_q8() as f64
    }
}

/// What the caller wants from the I2S clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct ClockRequest {
    /// Requested sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Bits per channel slot.
    pub bit_depth: BitDepth,
    /// System clock as a multiple of the sample rate (commonly 256 or 384).
    pub oversampling_multiplier: u32,
    /// Whether the oversampling system clock is generated.
    pub system_clock: bool,
}

impl ClockRequest {
    /// Create a request.
    #[must_use]
    pub const fn new(
        sample_rate_hz: u32,
        bit_depth: BitDepth,
        oversampling_multiplier: u32,
        system_clock: bool,
    ) -> Self {
        Self {
            sample_rate_hz,
            bit_depth,
            oversampling_multiplier,
            system_clock,
        }
    }

    const fn bit_clock_pio_cycles_per_frame(&self) -> u64 {
        // Two channels per frame.
        self.bit_depth.bits() as u64 * 2 * BIT_CLOCK_PIO_CYCLES as u64
    }

    const fn system_clock_pio_cycles_per_frame(&self) -> u64 {
        self.oversampling_multiplier as u64 * SYSTEM_CLOCK_PIO_CYCLES as u64
    }
}

/// Dividers and the sample rate they achieve.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct ClockPlan {
    base_clock_hz: u32,
    request: ClockRequest,
    actual_sample_rate_hz: f32,
    system_clock_divider: Option<ClockDivider>,
    bit_clock_divider: ClockDivider,
}

impl ClockPlan {
    /// The sample rate the dividers really produce.
    #[must_use]
    pub const fn actual_sample_rate_hz(&self) -> f32 {
        self.actual_sample_rate_hz
    }

    /// Divider for the system clock state machine, if that clock is generated.
    #[must_use]
    pub const fn system_clock_divider(&self) -> Option<ClockDivider> {
        self.system_clock_divider
    }

    /// Divider for the I2S output state machine.
    #[must_use]
    pub const fn bit_clock_divider(&self) -> ClockDivider {
        self.bit_clock_divider
    }

    /// The request this plan was computed for.
    #[must_use]
    pub const fn request(&self) -> &ClockRequest {
        &self.request
    }

    /// Base clock the dividers apply to.
    #[must_use]
    pub const fn base_clock_hz(&self) -> u32 {
        self.base_clock_hz
    }

    /// Achieved system clock frequency on its pin.
    #[must_use]
    pub fn system_clock_hz(&self) -> Option<f32> {
        self.system_clock_divider.map(|divider| {
            (divider.state_machine_hz(self.base_clock_hz) / f64::from(SYSTEM_CLOCK_PIO_CYCLES))
                as f32
        })
    }

    /// Achieved bit clock frequency.
    #[must_use]
    pub fn bit_clock_hz(&self) -> f32 {
        (self
            .bit_clock_divider
            .state_machine_hz(self.base_clock_hz)
            / f64::from(BIT_CLOCK_PIO_CYCLES)) as f32
    }

    /// Time hardware needs to drain `frames` stereo frames, in microseconds.
    #[must_use]
    pub fn buffer_period_us(&self, frames: usize) -> u64 {
        #[expect(clippy::cast_precision_loss, reason = "buffer sizes are small")]
        let frames = frames as f32;
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "positive and bounded"
        )]
        let period_us = (frames * 1_000_000.0 / self.actual_sample_rate_hz) as u64;
        period_us
    }
}

/// Compute PIO dividers for `request` from a base clock of `base_clock_hz`.
///
/// With the system clock enabled, the system clock divider is chosen first and the bit clock
/// divider is the same divider scaled by `multiplier * 2 / (bits * 2 * 2)`; that factor must be
/// a whole number or the clocks could not stay in phase.
///
/// # Errors
///
/// - [`ClockError::ZeroSampleRate`] / [`ClockError::ZeroMultiplier`] for zero inputs.
/// - [`ClockError::NotPhaseLocked`] when the system/bit clock ratio is not an integer.
/// - [`ClockError::DividerOutOfRange`] when a divider does not fit the PIO register.
/// - [`ClockError::RateDeviation`] when the achieved rate is more than 0.1% off.
pub fn plan_clocks(request: &ClockRequest, base_clock_hz: u32) -> Result<ClockPlan> {
    if request.sample_rate_hz == 0 {
        return Err(ClockError::ZeroSampleRate.into());
    }
    if request.oversampling_multiplier == 0 {
        return Err(ClockError::ZeroMultiplier.into());
    }
    let base_q8 = u64::from(base_clock_hz) << 8;
    let sample_rate = u64::from(request.sample_rate_hz);

    let (system_clock_divider, bit_clock_divider, pio_cycles_per_frame, frame_divider_q8) =
        if request.system_clock {
            let system_cycles = request.system_clock_pio_cycles_per_frame();
            let bit_cycles = request.bit_clock_pio_cycles_per_frame();
            if system_cycles % bit_cycles != 0 {
                return Err(ClockError::NotPhaseLocked.into());
            }
            let ratio = system_cycles / bit_cycles;

            let target_hz = sample_rate * system_cycles;
            let system_q8 = div_round(base_q8, target_hz);
            let system = ClockDivider::from_q8(system_q8, saturate_hz(target_hz))?;
            let bit = ClockDivider::from_q8(
                system_q8.saturating_mul(ratio),
                saturate_hz(sample_rate * bit_cycles / BIT_CLOCK_PIO_CYCLES as u64),
            )?;
            (Some(system), bit, system_cycles, system_q8)
        } else {
            let bit_cycles = request.bit_clock_pio_cycles_per_frame();
            let target_hz = sample_rate * bit_cycles;
            let bit_q8 = div_round(base_q8, target_hz);
            let bit = ClockDivider::from_q8(bit_q8, saturate_hz(target_hz))?;
            (None, bit, bit_cycles, bit_q8)
        };

    #[expect(clippy::cast_precision_loss, reason = "divider products stay well below 2^52")]
    let actual_sample_rate_hz =
        (base_q8 as f64 / (frame_divider_q8 as f64 * pio_cycles_per_frame as f64)) as f32;

    #[expect(clippy::cast_precision_loss, reason = "sample rates are far below 2^24")]
    let requested = request.sample_rate_hz as f32;
    if ((actual_sample_rate_hz - requested) / requested).abs() > MAX_RATE_DEVIATION {
        return Err(ClockError::RateDeviation.into());
    }

    let plan = ClockPlan {
        base_clock_hz,
        request: *request,
        actual_sample_rate_hz,
        system_clock_divider,
        bit_clock_divider,
    };
    validate_sync(&plan)?;
    Ok(plan)
}

/// Check that the system clock is an integer multiple of the bit clock.
///
/// Plans without a system clock always pass.
///
/// # Errors
///
/// Returns [`ClockError::NotPhaseLocked`] when the ratio is more than [`SYNC_TOLERANCE`]
/// away from a whole number.
pub fn validate_sync(plan: &ClockPlan) -> Result<()> {
    let Some(system_clock_hz) = plan.system_clock_hz() else {
        return Ok(());
    };
    let bit_clock_hz = plan.bit_clock_hz();
    if system_clock_hz <= 0.0 || bit_clock_hz <= 0.0 {
        return Err(ClockError::NotPhaseLocked.into());
    }
    let ratio = system_clock_hz / bit_clock_hz;
    let fraction = ratio - libm::floorf(ratio);
    if fraction < SYNC_TOLERANCE || (1.0 - fraction) < SYNC_TOLERANCE {
        Ok(())
    } else {
        Err(ClockError::NotPhaseLocked.into())
    }
}

const fn div_round(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}

fn saturate_hz(hz: u64) -> u32 {
    u32::try_from(hz).unwrap_or(u32::MAX)
}
