//! Loudness of the audio just handed to hardware, as a scalar in `[0, 1]`.
//!
//! The drain interrupt only does integer work: [`mean_square`] of the window it produced,
//! stored in a [`DrainTap`](crate::transport::DrainTap). Task context turns that into a
//! normalized RMS with [`AudioIntensityAnalyzer`], smooths it with [`IntensityState`] and
//! publishes the result through [`SharedIntensity`] and any [`IntensityListener`].

use portable_atomic::{AtomicU32, Ordering};

use crate::transport::Frame;

/// Fixed gain applied to the normalized RMS before clipping.
pub const DEFAULT_GAIN: f32 = 3.0;

/// Weight kept from the previous smoothed value on each new window.
pub const SMOOTHING_KEEP: f32 = 0.7;

/// Smoothed values below this are snapped to zero.
pub const SILENCE_FLOOR: f32 = 1.0e-4;

const FULL_SCALE: f32 = 32_768.0;

/// Mean of the squared left channel, in 16-bit sample units.
///
/// Each 32-bit word is reduced to its top 16 bits first, so the result is at most `2^30`.
/// An empty window has a mean square of zero.
#[must_use]
pub fn mean_square(frames: &[Frame]) -> u32 {
    if frames.is_empty() {
        return 0;
    }
    let sum = frames.iter().fold(0_u64, |sum, frame| {
        let sample = i64::from(frame.left >> 16);
        sum.saturating_add(sample.unsigned_abs().saturating_mul(sample.unsigned_abs()))
    });
    let count = u64::try_from(frames.len()).unwrap_or(u64::MAX);
    u32::try_from(sum / count).unwrap_or(u32::MAX)
}

/// Converts a window's mean square into a clipped intensity.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct AudioIntensityAnalyzer {
    gain: f32,
}

impl AudioIntensityAnalyzer {
    /// Analyzer with [`DEFAULT_GAIN`].
    pub const DEFAULT: Self = Self { gain: DEFAULT_GAIN };

    /// Analyzer with a custom gain. Gains at or below zero always give zero intensity.
    #[must_use]
    pub const fn with_gain(gain: f32) -> Self {
        Self { gain }
    }

    /// `sqrt(mean_square) / 32768 * gain`, clipped to `[0, 1]`.
    #[must_use]
    pub fn intensity_from_mean_square(&self, mean_square: u32) -> f32 {
        #[expect(clippy::cast_precision_loss, reason = "loudness needs no exact integers")]
        let rms = libm::sqrtf(mean_square as f32) / FULL_SCALE;
        clip_unit(rms * self.gain)
    }

    /// Intensity of a window of frames.
    #[must_use]
    pub fn analyze(&self, frames: &[Frame]) -> f32 {
        self.intensity_from_mean_square(mean_square(frames))
    }
}

impl Default for AudioIntensityAnalyzer {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Raw and smoothed intensity, updated once per analysis window.
#[derive(Clone, Copy, Debug, Default, PartialEq, defmt::Format)]
pub struct IntensityState {
    raw: f32,
    smoothed: f32,
}

impl IntensityState {
    /// Silent state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: 0.0,
            smoothed: 0.0,
        }
    }

    /// Fold in a new raw reading: `smoothed * 0.7 + raw * 0.3`.
    ///
    /// Inputs are clipped to `[0, 1]`, so the smoothed value stays there too.
    pub fn update(&mut self, raw: f32) -> f32 {
        self.raw = clip_unit(raw);
        self.smoothed = snap(
            self.smoothed * SMOOTHING_KEEP + self.raw * (1.0 - SMOOTHING_KEEP),
        );
        self.smoothed
    }

    /// No new window arrived: decay toward zero.
    pub fn decay(&mut self) -> f32 {
        self.raw = 0.0;
        self.smoothed = snap(self.smoothed * SMOOTHING_KEEP);
        self.smoothed
    }

    /// Playback stopped: intensity is exactly zero.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Last clipped reading.
    #[must_use]
    pub const fn raw(&self) -> f32 {
        self.raw
    }

    /// Smoothed intensity.
    #[must_use]
    pub const fn smoothed(&self) -> f32 {
        self.smoothed
    }
}

/// An `f32` readable from any context, stored as its bit pattern.
pub struct SharedIntensity(AtomicU32);

impl SharedIntensity {
    /// Zero intensity.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Publish a value.
    pub fn store(&self, intensity: f32) {
        self.0.store(intensity.to_bits(), Ordering::Release);
    }

    /// Latest published value.
    #[must_use]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
}

impl Default for SharedIntensity {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives each newly published intensity, in task context.
pub trait IntensityListener: Sync {
    /// Called with a value in `[0, 1]`.
    fn on_intensity(&self, intensity: f32);
}

impl IntensityListener for SharedIntensity {
    fn on_intensity(&self, intensity: f32) {
        self.store(intensity);
    }
}

fn clip_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn snap(value: f32) -> f32 {
    if value < SILENCE_FLOOR { 0.0 } else { value }
}
