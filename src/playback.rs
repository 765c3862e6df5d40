//! The playback session: which asset is playing, where, and how loud.
//!
//! A [`PlaybackSession`] is shared between task context (play/stop/pause/resume/volume) and
//! the drain interrupt, which calls it as a [`FillSource`]. State, asset index and read cursor
//! live in a single atomic word, so the interrupt can never observe a state that disagrees
//! with the cursor. Each fill computes the next word and publishes it with a compare-and-swap;
//! if a control call changed the session meanwhile, that chunk is played as silence instead.
//!
//! Volume is a separate atomic Q16 gain. It is independent of the cursor, so reading it
//! separately cannot tear.

use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::asset::{AssetTable, AudioAsset, Samples};
use crate::transport::{FillOutcome, FillSource, Frame};
use crate::{Error, Result};

/// Where a session is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum PlaybackState {
    /// Nothing is playing.
    Stopped,
    /// Fills read from the asset and advance the cursor.
    Playing,
    /// Fills emit silence; the cursor is kept.
    Paused,
}

impl PlaybackState {
    const fn to_bits(self) -> u64 {
        match self {
            Self::Stopped => 0,
            Self::Playing => 1,
            Self::Paused => 2,
        }
    }

    const fn from_bits(bits: u64) -> Self {
        match bits & STATE_MASK {
            1 => Self::Playing,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

// ============================================================================
// Volume
// ============================================================================

/// Linear gain in Q16: `0` is mute, [`Volume::UNITY`] is bit-exact passthrough.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, defmt::Format)]
pub struct Volume(u32);

impl Volume {
    /// Silence.
    pub const MUTE: Self = Self(0);
    /// Unity gain.
    pub const UNITY: Self = Self(1 << 16);

    /// Gain from a fraction. Values are clamped to `[0, 1]`; NaN is mute.
    #[must_use]
    pub fn from_f32(volume: f32) -> Self {
        if volume.is_nan() {
            return Self::MUTE;
        }
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "clamped to 0..=65536 first"
        )]
        let gain = libm::roundf(volume.clamp(0.0, 1.0) * 65_536.0) as u32;
        Self(gain.min(Self::UNITY.0))
    }

    /// Gain from raw Q16 bits, clamped to unity.
    #[must_use]
    pub const fn from_q16(gain: u32) -> Self {
        if gain > Self::UNITY.0 { Self::UNITY } else { Self(gain) }
    }

    /// Raw Q16 gain.
    #[must_use]
    pub const fn q16(self) -> u32 {
        self.0
    }

    /// Gain as a fraction.
    #[must_use]
    pub fn to_f32(self) -> f32 {
        #[expect(clippy::cast_precision_loss, reason = "at most 2^16")]
        let gain = self.0 as f32;
        gain / 65_536.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Scale one sample linearly, truncating toward zero.
///
/// Mute gives exactly zero, unity gives `sample` unchanged, and because the gain never exceeds
/// unity the result always fits the source's range.
#[must_use]
pub const fn apply_volume(sample: i32, volume: Volume) -> i32 {
    match volume.0 {
        0 => 0,
        65_536 => sample,
        gain => {
            let scaled = (sample as i64 * gain as i64) / 65_536;
            if scaled > i32::MAX as i64 {
                i32::MAX
            } else if scaled < i32::MIN as i64 {
                i32::MIN
            } else {
                scaled as i32
            }
        }
    }
}

/// Scale a 16-bit sample and left-justify it in a 32-bit word.
#[must_use]
pub const fn widen_16(sample: i16, volume: Volume) -> i32 {
    // The gain never exceeds unity, so the scaled value is still a valid i16.
    apply_volume(sample as i32, volume) << 16
}

// ============================================================================
// Session
// ============================================================================

const STATE_MASK: u64 = 0b11;
const INDEX_SHIFT: u32 = 2;
const INDEX_MASK: u64 = 0xFFFF;
const CURSOR_SHIFT: u32 = 18;

/// Largest asset index a session can address.
pub const MAX_ASSET_INDEX: usize = 0xFFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Snapshot {
    state: PlaybackState,
    index: usize,
    cursor: usize,
}

impl Snapshot {
    const STOPPED: Self = Self {
        state: PlaybackState::Stopped,
        index: 0,
        cursor: 0,
    };

    fn pack(self) -> u64 {
        let index = u64::try_from(self.index).unwrap_or(INDEX_MASK) & INDEX_MASK;
        let cursor = u64::try_from(self.cursor).unwrap_or(u64::MAX >> CURSOR_SHIFT);
        self.state.to_bits() | (index << INDEX_SHIFT) | (cursor << CURSOR_SHIFT)
    }

    fn unpack(word: u64) -> Self {
        Self {
            state: PlaybackState::from_bits(word),
            index: usize::try_from((word >> INDEX_SHIFT) & INDEX_MASK).unwrap_or(usize::MAX),
            cursor: usize::try_from(word >> CURSOR_SHIFT).unwrap_or(usize::MAX),
        }
    }
}

/// At most one active playback over an [`AssetTable`].
pub struct PlaybackSession {
    assets: AssetTable,
    word: AtomicU64,
    volume: AtomicU32,
}

impl PlaybackSession {
    /// Stopped session at unity volume.
    #[must_use]
    pub const fn new(assets: AssetTable) -> Self {
        Self {
            assets,
            word: AtomicU64::new(0),
            volume: AtomicU32::new(Volume::UNITY.0),
        }
    }

    /// The asset table this session plays from.
    #[must_use]
    pub const fn assets(&self) -> &AssetTable {
        &self.assets
    }

    /// Start `index` from its first sample, replacing whatever was playing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`] for an invalid index; the current session is left
    /// untouched.
    pub fn play(&self, index: usize) -> Result<()> {
        self.assets.get(index)?;
        if index > MAX_ASSET_INDEX {
            return Err(Error::AssetNotFound { index });
        }
        let next = Snapshot {
            state: PlaybackState::Playing,
            index,
            cursor: 0,
        };
        self.word.store(next.pack(), Ordering::Release);
        Ok(())
    }

    /// Stop and forget the position.
    pub fn stop(&self) {
        self.word.store(Snapshot::STOPPED.pack(), Ordering::Release);
    }

    /// Freeze the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless playing.
    pub fn pause(&self) -> Result<()> {
        self.transition(PlaybackState::Playing, PlaybackState::Paused)
    }

    /// Continue from the frozen cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless paused.
    pub fn resume(&self) -> Result<()> {
        self.transition(PlaybackState::Paused, PlaybackState::Playing)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.snapshot().state
    }

    /// Frames of the current asset already played.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.snapshot().cursor
    }

    /// Index of the asset being played or paused.
    #[must_use]
    pub fn asset_index(&self) -> Option<usize> {
        let snapshot = self.snapshot();
        (snapshot.state != PlaybackState::Stopped).then_some(snapshot.index)
    }

    /// Whether fills are reading from an asset.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Set the gain from a fraction; see [`Volume::from_f32`].
    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(Volume::from_f32(volume).0, Ordering::Relaxed);
    }

    /// Current gain.
    #[must_use]
    pub fn volume(&self) -> Volume {
        Volume(self.volume.load(Ordering::Relaxed))
    }

    /// Produce the next `output.len()` frames. Same as [`FillSource::fill`].
    pub fn fill_next_chunk(&self, output: &mut [Frame]) -> FillOutcome {
        let word = self.word.load(Ordering::Acquire);
        let snapshot = Snapshot::unpack(word);
        if snapshot.state != PlaybackState::Playing {
            output.fill(Frame::SILENCE);
            return FillOutcome::Silence;
        }
        let Ok(asset) = self.assets.get(snapshot.index) else {
            output.fill(Frame::SILENCE);
            return FillOutcome::Silence;
        };

        let volume = self.volume();
        let total = asset.frame_count();
        let count = total.saturating_sub(snapshot.cursor).min(output.len());
        let (head, tail) = output.split_at_mut(count);
        for (offset, frame) in head.iter_mut().enumerate() {
            *frame = frame_at(asset, snapshot.cursor.saturating_add(offset), volume);
        }
        tail.fill(Frame::SILENCE);

        let cursor = snapshot.cursor.saturating_add(count);
        let ended = cursor >= total;
        let next = Snapshot {
            state: if ended {
                PlaybackState::Stopped
            } else {
                PlaybackState::Playing
            },
            index: snapshot.index,
            cursor,
        };
        if self
            .word
            .compare_exchange(word, next.pack(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A control call won the race; its state applies from the next chunk.
            output.fill(Frame::SILENCE);
            return FillOutcome::Silence;
        }
        if ended {
            FillOutcome::EndOfStream { frames: count }
        } else {
            FillOutcome::Filled
        }
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> Result<()> {
        self.word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let snapshot = Snapshot::unpack(word);
                (snapshot.state == from).then(|| Snapshot { state: to, ..snapshot }.pack())
            })
            .map(|_| ())
            .map_err(|_| Error::InvalidState)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::unpack(self.word.load(Ordering::Acquire))
    }
}

impl FillSource for PlaybackSession {
    fn fill(&self, _captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome {
        self.fill_next_chunk(output)
    }
}

fn frame_at(asset: &AudioAsset, frame: usize, volume: Volume) -> Frame {
    let word = |index: usize| match asset.samples() {
        Samples::I16(samples) => samples
            .get(index)
            .map_or(0, |&sample| widen_16(sample, volume)),
        Samples::I32(samples) => samples
            .get(index)
            .map_or(0, |&sample| apply_volume(sample, volume)),
    };
    if asset.channels() == 2 {
        let left = frame.saturating_mul(2);
        Frame::new(word(left), word(left.saturating_add(1)))
    } else {
        Frame::mono(word(frame))
    }
}
