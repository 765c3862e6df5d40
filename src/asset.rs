//! Read-only PCM assets compiled into the firmware.
//!
//! An [`AssetTable`] is a `'static` slice of [`AudioAsset`]s looked up by index. Samples are
//! signed 16- or 32-bit PCM, mono or interleaved stereo. The `const` helpers build sample
//! arrays at compile time, either from raw little-endian bytes (`include_bytes!`) or as a sine
//! tone.
//!
//! ```
//! use dalek_voice::asset::{AssetTable, AudioAsset, samples_for_duration_ms, tone};
//!
//! const BEEP_LEN: usize = samples_for_duration_ms(100, 22_050);
//! static BEEP: [i16; BEEP_LEN] = tone(22_050, 440);
//! static ASSETS: [AudioAsset; 1] = [AudioAsset::mono_i16("beep", 22_050, &BEEP)];
//!
//! let table = AssetTable::new(&ASSETS);
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.info(0).expect("asset 0 exists").duration_ms, 100);
//! assert!(table.get(1).is_err());
//! ```

use crate::clock_plan::BitDepth;
use crate::{Error, Result};

/// Sample storage of an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Samples {
    /// 16-bit PCM; widened to 32 bits on output.
    I16(&'static [i16]),
    /// 32-bit PCM; used as is.
    I32(&'static [i32]),
}

impl Samples {
    /// Number of samples (all channels).
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::I16(samples) => samples.len(),
            Self::I32(samples) => samples.len(),
        }
    }

    /// Whether there are no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit depth of the stored samples.
    #[must_use]
    pub const fn bit_depth(&self) -> BitDepth {
        match self {
            Self::I16(_) => BitDepth::Bits16,
            Self::I32(_) => BitDepth::Bits32,
        }
    }
}

/// One immutable PCM asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioAsset {
    name: &'static str,
    sample_rate_hz: u32,
    channels: u8,
    samples: Samples,
}

impl AudioAsset {
    /// Create an asset. `channels` must be 1 or 2; stereo samples are interleaved.
    #[must_use]
    pub const fn new(name: &'static str, sample_rate_hz: u32, channels: u8, samples: Samples) -> Self {
        assert!(channels == 1 || channels == 2, "channels must be 1 or 2");
        assert!(sample_rate_hz > 0, "sample_rate_hz must be > 0");
        Self {
            name,
            sample_rate_hz,
            channels,
            samples,
        }
    }

    /// Mono 16-bit asset.
    #[must_use]
    pub const fn mono_i16(name: &'static str, sample_rate_hz: u32, samples: &'static [i16]) -> Self {
        Self::new(name, sample_rate_hz, 1, Samples::I16(samples))
    }

    /// Mono 32-bit asset.
    #[must_use]
    pub const fn mono_i32(name: &'static str, sample_rate_hz: u32, samples: &'static [i32]) -> Self {
        Self::new(name, sample_rate_hz, 1, Samples::I32(samples))
    }

    /// Interleaved stereo 16-bit asset.
    #[must_use]
    pub const fn stereo_i16(name: &'static str, sample_rate_hz: u32, samples: &'static [i16]) -> Self {
        Self::new(name, sample_rate_hz, 2, Samples::I16(samples))
    }

    /// Asset name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Sample rate the asset was recorded at.
    #[must_use]
    pub const fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// 1 (mono) or 2 (stereo).
    #[must_use]
    pub const fn channels(&self) -> u8 {
        self.channels
    }

    /// The raw samples.
    #[must_use]
    pub const fn samples(&self) -> Samples {
        self.samples
    }

    /// Number of playable frames (samples per channel).
    #[must_use]
    pub const fn frame_count(&self) -> usize {
        if self.channels == 2 {
            self.samples.len() / 2
        } else {
            self.samples.len()
        }
    }

    /// Playing time in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u32 {
        let ms = self.frame_count() as u64 * 1_000 / self.sample_rate_hz as u64;
        if ms > u32::MAX as u64 { u32::MAX } else { ms as u32 }
    }
}

/// What [`AssetTable::info`] reports about an asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetInfo {
    /// Asset name.
    pub name: &'static str,
    /// Recorded sample rate.
    pub sample_rate_hz: u32,
    /// Samples across all channels.
    pub sample_count: usize,
    /// Frames (samples per channel).
    pub frame_count: usize,
    /// 1 or 2.
    pub channels: u8,
    /// 16 or 32 bit samples.
    pub bit_depth: BitDepth,
    /// Playing time.
    pub duration_ms: u32,
}

/// Index-addressed set of assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetTable {
    assets: &'static [AudioAsset],
}

impl AssetTable {
    /// Table with no assets.
    pub const EMPTY: Self = Self { assets: &[] };

    /// Wrap a static slice of assets.
    #[must_use]
    pub const fn new(assets: &'static [AudioAsset]) -> Self {
        Self { assets }
    }

    /// Look up an asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`] for an index past the end.
    pub fn get(&self, index: usize) -> Result<&'static AudioAsset> {
        self.assets
            .get(index)
            .ok_or(Error::AssetNotFound { index })
    }

    /// Number of assets.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Describe an asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`] for an index past the end.
    pub fn info(&self, index: usize) -> Result<AssetInfo> {
        let asset = self.get(index)?;
        Ok(AssetInfo {
            name: asset.name,
            sample_rate_hz: asset.sample_rate_hz,
            sample_count: asset.samples.len(),
            frame_count: asset.frame_count(),
            channels: asset.channels,
            bit_depth: asset.samples.bit_depth(),
            duration_ms: asset.duration_ms(),
        })
    }
}

// ============================================================================
// Const sample builders
// ============================================================================

/// Samples needed for `duration_ms` at `sample_rate_hz`. Usable to size static arrays.
#[must_use]
pub const fn samples_for_duration_ms(duration_ms: u32, sample_rate_hz: u32) -> usize {
    assert!(sample_rate_hz > 0, "sample_rate_hz must be > 0");
    ((duration_ms as u64 * sample_rate_hz as u64) / 1_000) as usize
}

/// Decode little-endian signed 16-bit PCM bytes.
///
/// `BYTES` must be exactly `SAMPLE_COUNT * 2`.
#[must_use]
pub const fn from_s16le_bytes<const SAMPLE_COUNT: usize, const BYTES: usize>(
    bytes: &[u8; BYTES],
) -> [i16; SAMPLE_COUNT] {
    assert!(BYTES == SAMPLE_COUNT * 2, "byte length must equal sample_count * 2");
    let mut samples = [0_i16; SAMPLE_COUNT];
    let mut index = 0;
    while index < SAMPLE_COUNT {
        samples[index] = i16::from_le_bytes([bytes[index * 2], bytes[index * 2 + 1]]);
        index += 1;
    }
    samples
}

/// A full-scale sine tone of `frequency_hz`.
#[must_use]
pub const fn tone<const SAMPLE_COUNT: usize>(sample_rate_hz: u32, frequency_hz: u32) -> [i16; SAMPLE_COUNT] {
    assert!(sample_rate_hz > 0, "sample_rate_hz must be > 0");
    let mut samples = [0_i16; SAMPLE_COUNT];
    let phase_step = (((frequency_hz as u64) << 32) / sample_rate_hz as u64) as u32;
    let mut phase = 0_u32;
    let mut index = 0;
    while index < SAMPLE_COUNT {
        samples[index] = sine_from_phase(phase);
        phase = phase.wrapping_add(phase_step);
        index += 1;
    }
    samples
}

// Bhaskara's approximation on a half cycle: sin(pi t) ~= 16 t (1 - t) / (5 - 4 t (1 - t)).
const fn sine_from_phase(phase: u32) -> i16 {
    const HALF: u64 = 1 << 31;
    let phase = phase as u64;
    let (half_phase, negative) = if phase < HALF {
        (phase, false)
    } else {
        (phase - HALF, true)
    };
    let product = (half_phase * (HALF - half_phase)) >> 31;
    let denominator = 5 * HALF - 4 * product;
    let sine_q31 = ((16 * product as u128) << 31) / denominator as u128;
    let magnitude = sine_q31 >> 16;
    let magnitude = if magnitude > i16::MAX as u128 { i16::MAX } else { magnitude as i16 };
    if negative { -magnitude } else { magnitude }
}
