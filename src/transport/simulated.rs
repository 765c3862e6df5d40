//! A software transport for host tests.
//!
//! [`SimulatedTransport`] models the hardware read pointer: each [`drain_next`] call stands
//! for "hardware finished a half". The half the pump fills is chosen from the simulated read
//! address exactly as the DMA interrupt chooses it, so the half-ownership rule can be checked
//! from tests.
//!
//! [`drain_next`]: SimulatedTransport::drain_next

use super::double_buffer::{BufferHalf, DoubleBuffer};
use super::{
    FillOutcome, FillSource as _, Frame, PassthroughSource, PumpSlot, StreamHandle, Transport,
};
use crate::clock_plan::ClockPlan;
use crate::{Error, Result};

/// One simulated "half drained" event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrainEvent {
    /// Half hardware moved on to and is now reading.
    pub hardware: BufferHalf,
    /// Half the pump wrote.
    pub filled: BufferHalf,
    /// What the pump reported.
    pub outcome: FillOutcome,
}

/// Transport that alternates half A / half B drain events on demand.
pub struct SimulatedTransport<const FRAMES: usize> {
    buffer: DoubleBuffer<FRAMES>,
    pump: Option<&'static PumpSlot>,
    handle: Option<StreamHandle>,
    reading: BufferHalf,
    running: bool,
    drained: usize,
}

impl<const FRAMES: usize> SimulatedTransport<FRAMES> {
    /// Stopped, unconfigured transport.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: DoubleBuffer::new(),
            pump: None,
            handle: None,
            reading: BufferHalf::A,
            running: false,
            drained: 0,
        }
    }

    /// Simulate hardware finishing the half it was reading.
    ///
    /// Hardware moves on to the other half; the pump then refills the half that was just
    /// drained. Returns `None` while stopped.
    pub fn drain_next(&mut self) -> Option<DrainEvent> {
        if !self.running {
            return None;
        }
        self.reading = self.reading.other();
        let read_address = self.buffer.half_address_range(self.reading).start;
        let filled = self.buffer.free_half(read_address);
        let outcome = self.refill(filled);
        self.drained = self.drained.wrapping_add(1);
        Some(DrainEvent {
            hardware: self.reading,
            filled,
            outcome,
        })
    }

    /// Copy the contents of `half` into `out`.
    pub fn read_half(&self, half: BufferHalf, out: &mut [Frame]) {
        self.buffer.read_half(half, out);
    }

    /// Half the simulated hardware is reading.
    #[must_use]
    pub const fn reading(&self) -> BufferHalf {
        self.reading
    }

    /// Drain events delivered since creation.
    #[must_use]
    pub const fn drained(&self) -> usize {
        self.drained
    }

    /// The handle returned by the last successful `configure`.
    #[must_use]
    pub const fn handle(&self) -> Option<StreamHandle> {
        self.handle
    }

    fn refill(&mut self, half: BufferHalf) -> FillOutcome {
        let mut frames = [Frame::SILENCE; FRAMES];
        let outcome = match self.pump {
            Some(slot) => slot.pump().refill(None, &mut frames),
            // Without capture the default passthrough yields silence.
            None => PassthroughSource.fill(None, &mut frames),
        };
        self.buffer.write_half(half, &frames);
        outcome
    }
}

impl<const FRAMES: usize> Default for SimulatedTransport<FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FRAMES: usize> Transport for SimulatedTransport<FRAMES> {
    fn configure(&mut self, plan: &ClockPlan) -> Result<StreamHandle> {
        if self.running {
            return Err(Error::InvalidState);
        }
        let handle = StreamHandle::new(plan, FRAMES);
        self.handle = Some(handle);
        Ok(handle)
    }

    fn on_buffer_drained(&mut self, pump: &'static PumpSlot) {
        self.pump = Some(pump);
    }

    fn start(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Err(Error::InvalidState);
        }
        if self.running {
            return Ok(());
        }
        self.buffer.clear();
        self.buffer.prepare_control_blocks();
        self.refill(BufferHalf::A);
        self.refill(BufferHalf::B);
        self.reading = BufferHalf::A;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
        self.buffer.clear();
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
