//! Two buffer halves shared with DMA.
//!
//! Words are stored in atomics so the interrupt handler can write them through a shared
//! reference while DMA reads the other half. The layout is one contiguous run of
//! `2 * FRAMES` interleaved stereo frames; half A comes first.

use core::ops::Range;

use portable_atomic::{AtomicU32, Ordering};

use super::Frame;

/// One of the two halves of a [`DoubleBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum BufferHalf {
    /// First half.
    A,
    /// Second half.
    B,
}

impl BufferHalf {
    /// The opposite half.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// `0` for A, `1` for B.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// `FRAMES` stereo frames stored as atomic words.
pub struct FrameCells<const FRAMES: usize> {
    words: [[AtomicU32; 2]; FRAMES],
}

impl<const FRAMES: usize> FrameCells<FRAMES> {
    /// All-silent cells.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [const { [const { AtomicU32::new(0) }, const { AtomicU32::new(0) }] }; FRAMES],
        }
    }

    /// Store `frames`; cells past the end of `frames` are set to silence.
    pub fn store(&self, frames: &[Frame]) {
        let mut frames = frames.iter();
        for [left, right] in &self.words {
            let frame = frames.next().copied().unwrap_or(Frame::SILENCE);
            left.store(frame.left.cast_unsigned(), Ordering::Relaxed);
            right.store(frame.right.cast_unsigned(), Ordering::Relaxed);
        }
    }

    /// Copy the cells into `out` (up to `out.len()` frames).
    pub fn load(&self, out: &mut [Frame]) {
        for (frame, [left, right]) in out.iter_mut().zip(&self.words) {
            *frame = Frame::new(
                left.load(Ordering::Relaxed).cast_signed(),
                right.load(Ordering::Relaxed).cast_signed(),
            );
        }
    }

    /// Address of the first word.
    #[must_use]
    pub fn address(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// Size in bytes.
    #[must_use]
    pub const fn byte_len() -> usize {
        FRAMES * 2 * size_of::<u32>()
    }
}

impl<const FRAMES: usize> Default for FrameCells<FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}

/// Start addresses of both halves, read by a DMA control channel in a ring.
///
/// The 8-byte alignment lets the control channel wrap with a 3-bit address ring.
#[repr(C, align(8))]
pub struct ControlBlocks {
    addresses: [AtomicU32; 2],
}

impl ControlBlocks {
    const fn new() -> Self {
        Self {
            addresses: [const { AtomicU32::new(0) }, const { AtomicU32::new(0) }],
        }
    }

    /// Address of the first control word, for the control channel's read pointer.
    #[must_use]
    pub fn address(&self) -> usize {
        self.addresses.as_ptr() as usize
    }
}

/// Two halves of `FRAMES` frames plus their control blocks.
///
/// Place it in a `static` so DMA addresses stay valid.
#[repr(C)]
pub struct DoubleBuffer<const FRAMES: usize> {
    halves: [FrameCells<FRAMES>; 2],
    control: ControlBlocks,
}

impl<const FRAMES: usize> DoubleBuffer<FRAMES> {
    /// Silent buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            halves: [FrameCells::new(), FrameCells::new()],
            control: ControlBlocks::new(),
        }
    }

    /// Write the start addresses of both halves into the control blocks.
    pub fn prepare_control_blocks(&self) {
        for (slot, half) in self.control.addresses.iter().zip(&self.halves) {
            #[expect(clippy::cast_possible_truncation, reason = "bus addresses are 32-bit")]
            slot.store(half.address() as u32, Ordering::Relaxed);
        }
    }

    /// Control blocks for the DMA control channel.
    #[must_use]
    pub const fn control_blocks(&self) -> &ControlBlocks {
        &self.control
    }

    /// Address range covered by `half`.
    #[must_use]
    pub fn half_address_range(&self, half: BufferHalf) -> Range<usize> {
        let start = self.cells(half).address();
        start..start.saturating_add(FrameCells::<FRAMES>::byte_len())
    }

    /// The half software may fill, given the address hardware is reading from.
    ///
    /// An address inside half A means hardware owns A, so B is free. The end of B also frees
    /// B: hardware has finished it and the control channel has not yet re-armed A. Anything
    /// else (including the end of A, which is the start of B) frees A.
    #[must_use]
    pub fn free_half(&self, hardware_address: usize) -> BufferHalf {
        let end_of_b = self.half_address_range(BufferHalf::B).end;
        if self.half_address_range(BufferHalf::A).contains(&hardware_address)
            || hardware_address == end_of_b
        {
            BufferHalf::B
        } else {
            BufferHalf::A
        }
    }

    /// Store `frames` into `half`.
    pub fn write_half(&self, half: BufferHalf, frames: &[Frame]) {
        self.cells(half).store(frames);
    }

    /// Copy `half` into `out`.
    pub fn read_half(&self, half: BufferHalf, out: &mut [Frame]) {
        self.cells(half).load(out);
    }

    /// Zero both halves.
    pub fn clear(&self) {
        for half in &self.halves {
            half.store(&[]);
        }
    }

    const fn cells(&self, half: BufferHalf) -> &FrameCells<FRAMES> {
        match half {
            BufferHalf::A => &self.halves[0],
            BufferHalf::B => &self.halves[1],
        }
    }
}

impl<const FRAMES: usize> Default for DoubleBuffer<FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}
