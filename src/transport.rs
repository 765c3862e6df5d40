//! Buffer hand-off between sample producers and the streaming hardware.
//!
//! Hardware drains one [`BufferHalf`](double_buffer::BufferHalf) while software fills the
//! other. Whenever a half has been drained, the transport asks its [`BufferPump`] for the next
//! half's worth of [`Frame`]s. Three pumping strategies deliver those frames:
//!
//! - [`InterruptPump`] runs a [`FillSource`] directly inside the drain interrupt.
//! - [`PooledPump`](pool::PooledPump) copies a buffer that a timer tick ([`pool::pump_tick`])
//!   prepared ahead of time.
//! - The same pool fed by a dedicated worker loop that yields while the pool is full.
//!
//! The [`Transport`] trait is the seam between that logic and the PIO/DMA hardware
//! (`crate::i2s`) or the [`simulated`] transport used in host tests.

use core::ptr;

use embassy_time::Duration;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

use crate::clock_plan::{BitDepth, ClockPlan, ClockRequest};
use crate::{ConfigError, Result};

// ============================================================================
// Submodules
// ============================================================================

pub mod double_buffer;
pub mod pool;
pub mod registry;
pub mod simulated;

pub use double_buffer::{BufferHalf, DoubleBuffer, FrameCells};
pub use pool::{BufferPool, PooledPump};
pub use registry::{
    DrainHandler, HANDLERS, HandlerRegistry, HandlerSlot, Registration, ReusableSlot, SlotClaim,
};
pub use simulated::SimulatedTransport;

/// Number of GPIOs on the selected chip.
#[cfg(feature = "pico2")]
pub const GPIO_COUNT: u8 = 48;
/// Number of GPIOs on the selected chip.
#[cfg(not(feature = "pico2"))]
pub const GPIO_COUNT: u8 = 30;

/// Largest supported buffer half, in frames.
pub const MAX_BUFFER_FRAMES: usize = 1024;

// ============================================================================
// Frames and fill results
// ============================================================================

/// One interleaved stereo frame, left-justified in 32-bit words.
///
/// 16-bit sources are widened with `<< 16`; the PIO shifts out the top `bit_depth` bits of
/// each word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, defmt::Format)]
pub struct Frame {
    /// Left channel word.
    pub left: i32,
    /// Right channel word.
    pub right: i32,
}

impl Frame {
    /// All-zero frame.
    pub const SILENCE: Self = Self::new(0, 0);

    /// Create a frame from both channels.
    #[must_use]
    pub const fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    /// Duplicate one sample into both channels.
    #[must_use]
    pub const fn mono(sample: i32) -> Self {
        Self::new(sample, sample)
    }
}

/// What a fill produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum FillOutcome {
    /// Every frame carries source data.
    Filled,
    /// The source ended after `frames` frames; the rest is silence.
    EndOfStream {
        /// Frames of real data before the silence.
        frames: usize,
    },
    /// Nothing is playing; the whole buffer is silence.
    Silence,
    /// No prepared data was available in time; the whole buffer is silence.
    Underrun,
}

/// Produces output frames on demand.
///
/// Implementations are called from interrupt context: they must not block, allocate or take a
/// lock that normal-context code may hold.
pub trait FillSource: Sync {
    /// Fill `output` completely. `captured` holds the frames just recorded by the capture
    /// direction, when one is configured.
    fn fill(&self, captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome;
}

/// Emits silence. The default source of a transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilenceSource;

impl FillSource for SilenceSource {
    fn fill(&self, _captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome {
        output.fill(Frame::SILENCE);
        FillOutcome::Silence
    }
}

/// Copies captured frames to the output, or emits silence without a capture direction.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughSource;

impl FillSource for PassthroughSource {
    fn fill(&self, captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome {
        let Some(captured) = captured else {
            output.fill(Frame::SILENCE);
            return FillOutcome::Silence;
        };
        let copied = captured.len().min(output.len());
        let (head, tail) = output.split_at_mut(copied);
        head.copy_from_slice(captured.get(..copied).unwrap_or_default());
        tail.fill(Frame::SILENCE);
        FillOutcome::Filled
    }
}

// ============================================================================
// Drain tap
// ============================================================================

/// Single-word results handed from the fill path to task context.
///
/// Every field is an independent atomic so the interrupt side never waits.
pub struct DrainTap {
    latest_mean_square: AtomicU32,
    windows: AtomicU32,
    underruns: AtomicU32,
    end_of_stream: AtomicBool,
}

impl DrainTap {
    /// Create an empty tap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest_mean_square: AtomicU32::new(0),
            windows: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
            end_of_stream: AtomicBool::new(false),
        }
    }

    /// Record the loudness of the frames just handed to hardware.
    pub fn record_window(&self, frames: &[Frame]) {
        self.latest_mean_square
            .store(crate::intensity::mean_square(frames), Ordering::Release);
        self.windows.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how a fill ended.
    pub fn record_outcome(&self, outcome: FillOutcome) {
        match outcome {
            FillOutcome::Underrun => {
                self.underruns.fetch_add(1, Ordering::Relaxed);
            }
            FillOutcome::EndOfStream { .. } => self.end_of_stream.store(true, Ordering::Release),
            FillOutcome::Filled | FillOutcome::Silence => {}
        }
    }

    /// Mean square of the most recent window, in 16-bit sample units.
    #[must_use]
    pub fn latest_mean_square(&self) -> u32 {
        self.latest_mean_square.load(Ordering::Acquire)
    }

    /// Number of windows recorded so far (wraps).
    #[must_use]
    pub fn windows(&self) -> u32 {
        self.windows.load(Ordering::Relaxed)
    }

    /// Underruns since the last call.
    pub fn take_underruns(&self) -> u32 {
        self.underruns.swap(0, Ordering::Relaxed)
    }

    /// Whether a source reached its end since the last call.
    pub fn take_end_of_stream(&self) -> bool {
        self.end_of_stream.swap(false, Ordering::AcqRel)
    }
}

impl Default for DrainTap {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Buffer pumps
// ============================================================================

/// Delivers the next buffer half to hardware. Called from interrupt context.
pub trait BufferPump: Sync {
    /// Write a complete half into `output`.
    fn refill(&self, captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome;
}

/// Fills straight from a [`FillSource`] inside the drain interrupt.
pub struct InterruptPump<'a> {
    source: &'a dyn FillSource,
    tap: &'a DrainTap,
}

impl<'a> InterruptPump<'a> {
    /// Create a pump over `source`, reporting into `tap`.
    #[must_use]
    pub const fn new(source: &'a dyn FillSource, tap: &'a DrainTap) -> Self {
        Self { source, tap }
    }
}

impl BufferPump for InterruptPump<'_> {
    fn refill(&self, captured: Option<&[Frame]>, output: &mut [Frame]) -> FillOutcome {
        let outcome = self.source.fill(captured, output);
        self.tap.record_window(output);
        self.tap.record_outcome(outcome);
        outcome
    }
}

/// A `'static` home for a pump reference, so transports can publish it as a thin pointer.
///
/// ```rust
/// use dalek_voice::transport::{DrainTap, InterruptPump, PumpSlot, SilenceSource};
///
/// static TAP: DrainTap = DrainTap::new();
/// static PUMP: InterruptPump<'static> = InterruptPump::new(&SilenceSource, &TAP);
/// static PUMP_SLOT: PumpSlot = PumpSlot::new(&PUMP);
/// ```
pub struct PumpSlot {
    pump: &'static dyn BufferPump,
}

impl PumpSlot {
    /// Wrap `pump`.
    #[must_use]
    pub const fn new(pump: &'static dyn BufferPump) -> Self {
        Self { pump }
    }

    /// The wrapped pump.
    #[must_use]
    pub const fn pump(&self) -> &'static dyn BufferPump {
        self.pump
    }
}

/// Single-slot hand-off of the current pump from task context to the drain interrupt.
///
/// Readers take no lock: [`Self::get`] is one `Acquire` load.
pub struct PumpCell {
    slot: AtomicPtr<PumpSlot>,
}

impl PumpCell {
    /// No pump selected.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish `slot`, or clear the selection with `None`.
    pub fn set(&self, slot: Option<&'static PumpSlot>) {
        let raw = slot.map_or(ptr::null_mut(), |slot| ptr::from_ref(slot).cast_mut());
        self.slot.store(raw, Ordering::Release);
    }

    /// The pump most recently published.
    #[must_use]
    pub fn get(&self) -> Option<&'static dyn BufferPump> {
        let raw = self.slot.load(Ordering::Acquire);
        // SAFETY: only `&'static PumpSlot` references are ever stored.
        #[expect(unsafe_code, reason = "thin pointer back to a 'static reference")]
        let slot = unsafe { raw.as_ref() };
        slot.map(PumpSlot::pump)
    }
}

impl Default for PumpCell {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Transport capability
// ============================================================================

/// What a configured transport reports back to its user.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct StreamHandle {
    /// Sample rate the clocks actually run at.
    pub actual_sample_rate_hz: f32,
    /// Frames per buffer half.
    pub frames_per_half: usize,
    /// Time hardware needs to drain one half.
    pub buffer_period: Duration,
}

impl StreamHandle {
    /// Derive the handle for `frames_per_half` from a clock plan.
    #[must_use]
    pub fn new(plan: &ClockPlan, frames_per_half: usize) -> Self {
        Self {
            actual_sample_rate_hz: plan.actual_sample_rate_hz(),
            frames_per_half,
            buffer_period: Duration::from_micros(plan.buffer_period_us(frames_per_half)),
        }
    }
}

/// Continuous double-buffered output.
pub trait Transport {
    /// Apply clock dividers. Only legal while stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) while running.
    fn configure(&mut self, plan: &ClockPlan) -> Result<StreamHandle>;

    /// Select the pump asked to refill each drained half.
    fn on_buffer_drained(&mut self, pump: &'static PumpSlot);

    /// Prime both halves and begin draining.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) before `configure`.
    fn start(&mut self) -> Result<()>;

    /// Stop the clocks, then abort in-flight transfers.
    fn stop(&mut self);

    /// Whether hardware is currently draining.
    fn is_running(&self) -> bool;
}

// ============================================================================
// Configuration
// ============================================================================

/// Pins, clocks and buffer geometry of one transport.
///
/// See [`TransportConfig::DEFAULT`] for the robot's wiring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct TransportConfig {
    /// Output data pin.
    pub data_pin: u8,
    /// Bit clock pin; frame select is the next pin.
    pub clock_base_pin: u8,
    /// Oversampling system clock pin, if that clock is generated.
    pub system_clock_pin: Option<u8>,
    /// Capture data pin, which must be `clock_base_pin - 1`.
    pub capture_pin: Option<u8>,
    /// Requested sample rate.
    pub sample_rate_hz: u32,
    /// Bits per channel slot.
    pub bit_depth: BitDepth,
    /// System clock as a multiple of the sample rate.
    pub oversampling_multiplier: u32,
    /// Frames per buffer half.
    pub buffer_frame_count: usize,
    /// Buffers in the pump pool (at least two).
    pub buffer_count: usize,
}

impl TransportConfig {
    /// 22.05 kHz, 16-bit, data on GPIO 6, clocks on GPIO 8/9, system clock on GPIO 10.
    pub const DEFAULT: Self = Self {
        data_pin: 6,
        clock_base_pin: 8,
        system_clock_pin: Some(10),
        capture_pin: None,
        sample_rate_hz: 22_050,
        bit_depth: BitDepth::Bits16,
        oversampling_multiplier: 256,
        buffer_frame_count: 64,
        buffer_count: 2,
    };

    /// Frame select (word clock) pin.
    #[must_use]
    pub const fn frame_select_pin(&self) -> u8 {
        self.clock_base_pin.saturating_add(1)
    }

    /// The clock request implied by this configuration.
    #[must_use]
    pub const fn clock_request(&self) -> ClockRequest {
        ClockRequest::new(
            self.sample_rate_hz,
            self.bit_depth,
            self.oversampling_multiplier,
            self.system_clock_pin.is_some(),
        )
    }

    /// Check pins and buffer geometry. Clock feasibility is checked by
    /// [`plan_clocks`](crate::clock_plan::plan_clocks).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) describing the first
    /// problem found.
    pub fn validate(&self) -> Result<()> {
        if self.clock_base_pin >= GPIO_COUNT.saturating_sub(1) {
            return Err(ConfigError::PinOutOfRange {
                pin: self.frame_select_pin(),
            }
            .into());
        }
        let pins = [
            Some(self.data_pin),
            Some(self.clock_base_pin),
            Some(self.frame_select_pin()),
            self.system_clock_pin,
            self.capture_pin,
        ];
        for (index, pin) in pins.iter().enumerate() {
            let Some(pin) = *pin else { continue };
            if pin >= GPIO_COUNT {
                return Err(ConfigError::PinOutOfRange { pin }.into());
            }
            let later = pins.get(index.saturating_add(1)..).unwrap_or_default();
            if later.contains(&Some(pin)) {
                return Err(ConfigError::PinConflict { pin }.into());
            }
        }
        if let Some(capture_pin) = self.capture_pin
            && capture_pin.checked_add(1) != Some(self.clock_base_pin)
        {
            return Err(ConfigError::CapturePinNotAdjacent.into());
        }
        if self.buffer_frame_count == 0
            || self.buffer_frame_count > MAX_BUFFER_FRAMES
            || self.buffer_count < 2
        {
            return Err(ConfigError::BufferGeometry.into());
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
