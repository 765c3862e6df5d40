//! A lock-free single-producer/single-consumer pool of prepared buffers.
//!
//! The pool lets samples be produced outside the drain interrupt. A producer (a timer tick or
//! a dedicated worker loop) fills free slots ahead of time; the interrupt side takes one
//! prepared slot per drained half through [`PooledPump`]. When nothing is ready the pump
//! substitutes silence and counts an underrun.
//!
//! ```
//! use dalek_voice::transport::pool::{BufferPool, PooledPump, pump_tick};
//! use dalek_voice::transport::{BufferPump, DrainTap, Frame, SilenceSource};
//!
//! let pool: BufferPool<8, 2> = BufferPool::new();
//! let tap = DrainTap::new();
//! let (producer, consumer) = pool.split().expect("first split");
//! let pump = PooledPump::new(consumer, &tap);
//!
//! assert_eq!(pump_tick(&producer, &SilenceSource, &tap, 2), 2);
//! let mut half = [Frame::new(1, 1); 8];
//! pump.refill(None, &mut half);
//! assert_eq!(half, [Frame::SILENCE; 8]);
//! ```

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use super::double_buffer::FrameCells;
use super::{BufferPump, DrainTap, FillOutcome, FillSource, Frame};
use crate::{Error, Result};

/// `SLOTS` buffers of `FRAMES` frames each.
pub struct BufferPool<const FRAMES: usize, const SLOTS: usize> {
    slots: [FrameCells<FRAMES>; SLOTS],
    // Both counters only grow (wrapping); `written - read` is the number of ready slots.
    read: AtomicUsize,
    written: AtomicUsize,
    split: AtomicBool,
}

impl<const FRAMES: usize, const SLOTS: usize> BufferPool<FRAMES, SLOTS> {
    /// Empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { FrameCells::new() }; SLOTS],
            read: AtomicUsize::new(0),
            written: AtomicUsize::new(0),
            split: AtomicBool::new(false),
        }
    }

    /// Hand out the producer and consumer ends. Works once per pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the pool was already split.
    pub fn split(&self) -> Result<(PoolProducer<'_, FRAMES, SLOTS>, PoolConsumer<'_, FRAMES, SLOTS>)> {
        if self.split.swap(true, Ordering::AcqRel) {
            return Err(Error::ResourceExhausted);
        }
        Ok((PoolProducer { pool: self }, PoolConsumer { pool: self }))
    }

    /// Buffers ready for the consumer.
    #[must_use]
    pub fn ready(&self) -> usize {
        self.written
            .load(Ordering::Acquire)
            .wrapping_sub(self.read.load(Ordering::Acquire))
    }

    /// Total number of slots.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        SLOTS
    }

    fn slot(&self, counter: usize) -> Option<&FrameCells<FRAMES>> {
        self.slots.get(counter.checked_rem(SLOTS)?)
    }
}

impl<const FRAMES: usize, const SLOTS: usize> Default for BufferPool<FRAMES, SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills free slots. Owned by exactly one task.
pub struct PoolProducer<'p, const FRAMES: usize, const SLOTS: usize> {
    pool: &'p BufferPool<FRAMES, SLOTS>,
}

impl<const FRAMES: usize, const SLOTS: usize> PoolProducer<'_, FRAMES, SLOTS> {
    /// Whether every slot holds a buffer the consumer has not taken yet.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.pool.ready() >= SLOTS
    }

    /// Fill the next free slot with `fill` and publish it.
    ///
    /// Returns `None` without calling `fill` when the pool is full.
    pub fn try_fill(
        &self,
        fill: impl FnOnce(&mut [Frame; FRAMES]) -> FillOutcome,
    ) -> Option<FillOutcome> {
        let written = self.pool.written.load(Ordering::Relaxed);
        let read = self.pool.read.load(Ordering::Acquire);
        if written.wrapping_sub(read) >= SLOTS {
            return None;
        }
        let slot = self.pool.slot(written)?;
        let mut scratch = [Frame::SILENCE; FRAMES];
        let outcome = fill(&mut scratch);
        slot.store(&scratch);
        self.pool
            .written
            .store(written.wrapping_add(1), Ordering::Release);
        Some(outcome)
    }
}

/// Takes prepared slots. Used only from the drain interrupt.
pub struct PoolConsumer<'p, const FRAMES: usize, const SLOTS: usize> {
    pool: &'p BufferPool<FRAMES, SLOTS>,
}

impl<const FRAMES: usize, const SLOTS: usize> PoolConsumer<'_, FRAMES, SLOTS> {
    /// Copy the oldest prepared slot into `out` and release it. Returns `false` if none is
    /// ready; `out` is left untouched.
    pub fn take_into(&self, out: &mut [Frame]) -> bool {
        let read = self.pool.read.load(Ordering::Relaxed);
        let written = self.pool.written.load(Ordering::Acquire);
        if read == written {
            return false;
        }
        let Some(slot) = self.pool.slot(read) else {
            return false;
        };
        slot.load(out);
        self.pool.read.store(read.wrapping_add(1), Ordering::Release);
        true
    }
}

/// A [`BufferPump`] that hands hardware the buffers a producer prepared earlier.
pub struct PooledPump<'p, const FRAMES: usize, const SLOTS: usize> {
    consumer: PoolConsumer<'p, FRAMES, SLOTS>,
    tap: &'p DrainTap,
}

impl<'p, const FRAMES: usize, const SLOTS: usize> PooledPump<'p, FRAMES, SLOTS> {
    /// Create a pump over the consumer end of a pool.
    #[must_use]
    pub const fn new(consumer: PoolConsumer<'p, FRAMES, SLOTS>, tap: &'p DrainTap) -> Self {
        Self { consumer, tap }
    }
}

impl<const FRAMES: usize, const SLOTS: usize> BufferPump for PooledPump<'_, FRAMES, SLOTS> {
    fn refill(&self, _captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome {
        let outcome = if self.consumer.take_into(output) {
            FillOutcome::Filled
        } else {
            output.fill(Frame::SILENCE);
            FillOutcome::Underrun
        };
        self.tap.record_window(output);
        self.tap.record_outcome(outcome);
        outcome
    }
}

/// Fill up to `max_buffers` free slots from `source`. Returns how many were filled.
///
/// End-of-stream outcomes are reported to `tap` here, in the producer's context; the pump
/// only reports what hardware actually received.
pub fn pump_tick<const FRAMES: usize, const SLOTS: usize>(
    producer: &PoolProducer<'_, FRAMES, SLOTS>,
    source: &dyn FillSource,
    tap: &DrainTap,
    max_buffers: usize,
) -> usize {
    let mut filled = 0;
    while filled < max_buffers {
        let Some(outcome) = producer.try_fill(|frames| source.fill(None, frames)) else {
            break;
        };
        if matches!(outcome, FillOutcome::EndOfStream { .. }) {
            tap.record_outcome(outcome);
        }
        filled += 1;
    }
    filled
}

// ============================================================================
// Producer loops
// ============================================================================

/// How a pool producer is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum PumpSchedule {
    /// Wake every `period` and fill at most `max_per_tick` buffers.
    Ticked {
        /// Time between ticks.
        period: embassy_time::Duration,
        /// Buffers filled per tick at most.
        max_per_tick: usize,
    },
    /// Fill continuously, sleeping for `idle` whenever the pool is full.
    Worker {
        /// Back-off while no slot is free.
        idle: embassy_time::Duration,
    },
}

impl PumpSchedule {
    /// Every 5 ms, at most two buffers.
    pub const TICKED_DEFAULT: Self = Self::Ticked {
        period: embassy_time::Duration::from_millis(5),
        max_per_tick: 2,
    };

    /// Continuous, backing off 1 ms when full.
    pub const WORKER_DEFAULT: Self = Self::Worker {
        idle: embassy_time::Duration::from_millis(1),
    };
}

/// Run a pool producer forever according to `schedule`.
#[cfg(not(feature = "host"))]
pub async fn pump_loop<const FRAMES: usize, const SLOTS: usize>(
    producer: PoolProducer<'_, FRAMES, SLOTS>,
    source: &dyn FillSource,
    tap: &DrainTap,
    schedule: PumpSchedule,
) -> ! {
    use embassy_time::{Ticker, Timer};

    match schedule {
        PumpSchedule::Ticked {
            period,
            max_per_tick,
        } => {
            let mut ticker = Ticker::every(period);
            loop {
                pump_tick(&producer, source, tap, max_per_tick);
                ticker.next().await;
            }
        }
        PumpSchedule::Worker { idle } => loop {
            if pump_tick(&producer, source, tap, 1) == 0 {
                Timer::after(idle).await;
            } else {
                embassy_futures::yield_now().await;
            }
        },
    }
}
