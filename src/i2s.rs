//! A device abstraction for an I2S bus driven by PIO state machines and chained DMA.
//!
//! See [`I2sTransport`] for usage.
//!
//! One PIO block runs up to three state machines:
//!
//! - SM0 shifts out data and generates the bit clock and frame select through side-set.
//! - SM1 toggles the oversampling system clock, when one is enabled.
//! - SM2 samples capture data on the rising bit clock, when capture is enabled.
//!
//! Each direction uses a pair of DMA channels. The data channel moves one buffer half between
//! memory and the PIO FIFO. When it finishes it chains to a control channel, which writes the
//! next half's start address into the data channel's trigger register. The control channel
//! reads the two half addresses in a ring, so the data channel alternates A, B, A, ... with no
//! CPU work. The data channel's completion interrupt (`DMA_IRQ_1`) only refills the half
//! hardware has just left.

use defmt::info;
use embassy_rp::dma::{AnyChannel, Channel};
use embassy_rp::gpio::Level;
use embassy_rp::interrupt::typelevel::{Binding, DMA_IRQ_1, Handler, Interrupt as _};
use embassy_rp::pac;
use embassy_rp::pio::{
    Common, Config as PioConfig, Direction, FifoJoin, Instance, InterruptHandler, Pin, Pio,
    PioPin, ShiftConfig, ShiftDirection, StateMachine,
};
use embassy_rp::{Peri, bind_interrupts};
use portable_atomic::{AtomicU8, Ordering};

use crate::clock_plan::ClockPlan;
use crate::transport::{
    BufferHalf, DoubleBuffer, DrainHandler, FillSource as _, Frame, HANDLERS, PassthroughSource,
    PumpCell, PumpSlot, Registration, ReusableSlot, SlotClaim, StreamHandle, Transport,
    TransportConfig,
};
use crate::{ConfigError, Error, Result};

const NO_CHANNEL: u8 = u8::MAX;
// The control channel reads two 4-byte addresses: an 8-byte ring.
const CONTROL_RING_BITS: u8 = 3;
const OUTPUT_SM: u8 = 0;
const CAPTURE_SM: u8 = 2;

// ============================================================================
// Interrupt plumbing
// ============================================================================

/// Dispatches DMA completions to the handlers registered in [`HANDLERS`].
pub struct DmaDrainInterruptHandler;

impl Handler<DMA_IRQ_1> for DmaDrainInterruptHandler {
    #[expect(unsafe_code, reason = "interrupt handler entry point")]
    unsafe fn on_interrupt() {
        let pending = pac::DMA.ints(1).read();
        pac::DMA.ints(1).write_value(pending);
        HANDLERS.dispatch_mask(pending);
    }
}

bind_interrupts!(pub struct I2sDmaIrqs {
    DMA_IRQ_1 => DmaDrainInterruptHandler;
});

/// A PIO block that can run the I2S programs.
pub trait I2sPio: Instance {
    /// Block index, for DREQ selection.
    const NUMBER: u8;

    /// Interrupt binding type for this PIO resource.
    type Irqs: Binding<<Self as Instance>::Interrupt, InterruptHandler<Self>>;

    /// Returns interrupt bindings for this PIO resource.
    fn irqs() -> Self::Irqs;

    /// Raw registers, for FIFO addresses.
    fn regs() -> pac::pio::Pio;
}

impl I2sPio for embassy_rp::peripherals::PIO0 {
    const NUMBER: u8 = 0;
    type Irqs = crate::pio_irqs::Pio0Irqs;

    fn irqs() -> Self::Irqs {
        crate::pio_irqs::Pio0Irqs
    }

    fn regs() -> pac::pio::Pio {
        pac::PIO0
    }
}

impl I2sPio for embassy_rp::peripherals::PIO1 {
    const NUMBER: u8 = 1;
    type Irqs = crate::pio_irqs::Pio1Irqs;

    fn irqs() -> Self::Irqs {
        crate::pio_irqs::Pio1Irqs
    }

    fn regs() -> pac::pio::Pio {
        pac::PIO1
    }
}

#[cfg(feature = "pico2")]
impl I2sPio for embassy_rp::peripherals::PIO2 {
    const NUMBER: u8 = 2;
    type Irqs = crate::pio_irqs::Pio2Irqs;

    fn irqs() -> Self::Irqs {
        crate::pio_irqs::Pio2Irqs
    }

    fn regs() -> pac::pio::Pio {
        pac::PIO2
    }
}

// ============================================================================
// Static resources
// ============================================================================

/// Buffers and interrupt-side state of one [`I2sTransport`]. Must live in a `static`.
pub struct I2sStatic<const FRAMES: usize> {
    output: DoubleBuffer<FRAMES>,
    capture: DoubleBuffer<FRAMES>,
    pump: PumpCell,
    output_channel: AtomicU8,
    capture_channel: AtomicU8,
    capture_shift: AtomicU8,
    slot: ReusableSlot,
}

impl<const FRAMES: usize> I2sStatic<FRAMES> {
    /// Create static resources.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            output: DoubleBuffer::new(),
            capture: DoubleBuffer::new(),
            pump: PumpCell::new(),
            output_channel: AtomicU8::new(NO_CHANNEL),
            capture_channel: AtomicU8::new(NO_CHANNEL),
            capture_shift: AtomicU8::new(0),
            slot: ReusableSlot::new(),
        }
    }

    /// One half of output: from the pump when one is selected, otherwise captured audio
    /// passed straight through (silence without capture).
    fn produce(&self, captured: Option<&[Frame]>, frames: &mut [Frame; FRAMES]) {
        match self.pump.get() {
            Some(pump) => {
                pump.refill(captured, frames);
            }
            None => {
                PassthroughSource.fill(captured, frames);
            }
        }
    }

    /// Capture half hardware just finished writing, shifted down to sample units.
    fn take_captured(&self, captured: &mut [Frame; FRAMES]) -> bool {
        let channel = self.capture_channel.load(Ordering::Acquire);
        if channel == NO_CHANNEL {
            return false;
        }
        let write_address = dma_channel(channel).write_addr().read() as usize;
        let completed = self.capture.free_half(write_address);
        self.capture.read_half(completed, captured);
        let shift = u32::from(self.capture_shift.load(Ordering::Relaxed));
        for frame in captured.iter_mut() {
            // The PIO shifts in `bits` bits from the right; left-justify them.
            *frame = Frame::new(frame.left.wrapping_shl(shift), frame.right.wrapping_shl(shift));
        }
        true
    }
}

impl<const FRAMES: usize> Default for I2sStatic<FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const FRAMES: usize> DrainHandler for I2sStatic<FRAMES> {
    fn on_drained(&self) {
        let channel = self.output_channel.load(Ordering::Acquire);
        if channel == NO_CHANNEL {
            return;
        }
        let read_address = dma_channel(channel).read_addr().read() as usize;
        let free = self.output.free_half(read_address);

        let mut captured = [Frame::SILENCE; FRAMES];
        let has_capture = self.take_captured(&mut captured);

        let mut frames = [Frame::SILENCE; FRAMES];
        self.produce(has_capture.then_some(captured.as_slice()), &mut frames);
        self.output.write_half(free, &frames);
    }
}

// ============================================================================
// Raw DMA helpers
// ============================================================================

fn dma_channel(number: u8) -> pac::dma::Channel {
    pac::DMA.ch(usize::from(number))
}

fn channel_bit(number: u8) -> u32 {
    1_u32.checked_shl(u32::from(number)).unwrap_or(0)
}

fn set_transfer_count(channel: pac::dma::Channel, count: u32) {
    #[cfg(feature = "pico1")]
    channel.trans_count().write_value(count);
    #[cfg(feature = "pico2")]
    channel.trans_count().write(|w| {
        w.set_mode(0.into());
        w.set_count(count);
    });
}

/// Control word of a data channel paced by `dreq` that chains to `chain_to` when done.
fn data_control_word(dreq: u8, chain_to: u8, from_memory: bool) -> pac::dma::regs::CtrlTrig {
    let mut word = pac::dma::regs::CtrlTrig(0);
    word.set_en(true);
    word.set_data_size(pac::dma::vals::DataSize::SIZE_WORD);
    word.set_incr_read(from_memory);
    word.set_incr_write(!from_memory);
    word.set_treq_sel(pac::dma::vals::TreqSel::from(dreq));
    word.set_chain_to(chain_to);
    word.set_irq_quiet(false);
    word
}

/// Control word of a control channel: one word per trigger, reading the address ring.
fn ring_control_word(own_number: u8) -> pac::dma::regs::CtrlTrig {
    let mut word = pac::dma::regs::CtrlTrig(0);
    word.set_en(true);
    word.set_data_size(pac::dma::vals::DataSize::SIZE_WORD);
    word.set_incr_read(true);
    word.set_incr_write(false);
    word.set_ring_size(CONTROL_RING_BITS);
    word.set_ring_sel(false);
    word.set_treq_sel(pac::dma::vals::TreqSel::PERMANENT);
    // Chaining to itself disables chaining.
    word.set_chain_to(own_number);
    word.set_irq_quiet(true);
    word
}

/// A data channel and the control channel that re-arms it.
struct DmaPair {
    data: Peri<'static, AnyChannel>,
    control: Peri<'static, AnyChannel>,
}

impl DmaPair {
    fn new<D: Channel, C: Channel>(data: Peri<'static, D>, control: Peri<'static, C>) -> Self {
        Self {
            data: data.into(),
            control: control.into(),
        }
    }

    fn data_number(&self) -> u8 {
        self.data.number()
    }

    fn control_number(&self) -> u8 {
        self.control.number()
    }

    fn mask(&self) -> u32 {
        channel_bit(self.data_number()) | channel_bit(self.control_number())
    }

    /// Memory to FIFO, alternating the halves of `buffer`.
    #[expect(clippy::cast_possible_truncation, reason = "bus addresses are 32-bit")]
    fn arm_output<const FRAMES: usize>(&self, buffer: &DoubleBuffer<FRAMES>, fifo: u32, dreq: u8) {
        let data = dma_channel(self.data_number());
        let control = dma_channel(self.control_number());
        data.read_addr()
            .write_value(buffer.half_address_range(BufferHalf::A).start as u32);
        data.write_addr().write_value(fifo);
        set_transfer_count(data, words_per_half::<FRAMES>());
        data.al1_ctrl()
            .write_value(data_control_word(dreq, self.control_number(), true).0);

        control
            .write_addr()
            .write_value(data.al3_read_addr_trig().as_ptr() as u32);
        set_transfer_count(control, 1);
        control
            .al1_ctrl()
            .write_value(ring_control_word(self.control_number()).0);
    }

    /// FIFO to memory, alternating the halves of `buffer`.
    #[expect(clippy::cast_possible_truncation, reason = "bus addresses are 32-bit")]
    fn arm_capture<const FRAMES: usize>(&self, buffer: &DoubleBuffer<FRAMES>, fifo: u32, dreq: u8) {
        let data = dma_channel(self.data_number());
        let control = dma_channel(self.control_number());
        data.read_addr().write_value(fifo);
        data.write_addr()
            .write_value(buffer.half_address_range(BufferHalf::A).start as u32);
        set_transfer_count(data, words_per_half::<FRAMES>());
        data.al1_ctrl()
            .write_value(data_control_word(dreq, self.control_number(), false).0);

        control
            .write_addr()
            .write_value(data.al2_write_addr_trig().as_ptr() as u32);
        set_transfer_count(control, 1);
        control
            .al1_ctrl()
            .write_value(ring_control_word(self.control_number()).0);
    }

    /// Start the chain by loading the first ring entry into the control channel.
    #[expect(clippy::cast_possible_truncation, reason = "bus addresses are 32-bit")]
    fn trigger<const FRAMES: usize>(&self, buffer: &DoubleBuffer<FRAMES>) {
        dma_channel(self.control_number())
            .al3_read_addr_trig()
            .write_value(buffer.control_blocks().address() as u32);
    }

    /// Disable both channels, abort anything in flight and wait for the abort to finish.
    fn abort(&self) {
        dma_channel(self.control_number()).al1_ctrl().write_value(0);
        dma_channel(self.data_number()).al1_ctrl().write_value(0);
        let mask = self.mask();
        #[expect(clippy::cast_possible_truncation, reason = "at most 16 channels")]
        pac::DMA
            .chan_abort()
            .write(|w| w.set_chan_abort(mask as u16));
        while pac::DMA.chan_abort().read().chan_abort() != 0 {}
        pac::DMA.ints(1).write_value(mask);
    }
}

#[expect(clippy::cast_possible_truncation, reason = "FRAMES is at most 1024")]
const fn words_per_half<const FRAMES: usize>() -> u32 {
    FRAMES.saturating_mul(2) as u32
}

// ============================================================================
// PIO programs
// ============================================================================

/// Two cycles per bit. Side-set bit 0 is the bit clock, bit 1 is frame select. Frame select
/// changes one bit before the slot it marks.
fn output_program(bits: u8) -> ::pio::Program<32> {
    use ::pio::{JmpCondition, OutDestination, SetDestination};

    let mut assembler = ::pio::Assembler::<32>::new_with_side_set(::pio::SideSet::new(false, 2, false));
    let mut wrap_target = assembler.label();
    let mut wrap_source = assembler.label();
    let mut left = assembler.label();
    let mut right = assembler.label();
    let count = bits.saturating_sub(2);

    assembler.bind(&mut wrap_target);
    assembler.set_with_side_set(SetDestination::X, count, 0b01);
    assembler.bind(&mut left);
    assembler.out_with_side_set(OutDestination::PINS, 1, 0b00);
    assembler.jmp_with_side_set(JmpCondition::XDecNonZero, &mut left, 0b01);
    assembler.out_with_side_set(OutDestination::PINS, 1, 0b10);
    assembler.set_with_side_set(SetDestination::X, count, 0b11);
    assembler.bind(&mut right);
    assembler.out_with_side_set(OutDestination::PINS, 1, 0b10);
    assembler.jmp_with_side_set(JmpCondition::XDecNonZero, &mut right, 0b11);
    assembler.bind(&mut wrap_source);
    assembler.out_with_side_set(OutDestination::PINS, 1, 0b00);
    assembler.assemble_with_wrap(wrap_source, wrap_target)
}

/// A square wave at half the state machine clock.
fn system_clock_program() -> ::pio::Program<32> {
    let mut assembler = ::pio::Assembler::<32>::new();
    let mut wrap_target = assembler.label();
    let mut wrap_source = assembler.label();
    assembler.bind(&mut wrap_target);
    assembler.set(::pio::SetDestination::PINS, 1);
    assembler.bind(&mut wrap_source);
    assembler.set(::pio::SetDestination::PINS, 0);
    assembler.assemble_with_wrap(wrap_source, wrap_target)
}

/// Pin 0 is capture data, pin 1 the bit clock, pin 2 frame select.
///
/// Waits for the start of a left slot, then samples on every rising bit clock.
fn capture_program() -> ::pio::Program<32> {
    use ::pio::{InSource, WaitSource};

    let mut assembler = ::pio::Assembler::<32>::new();
    let mut wrap_target = assembler.label();
    let mut wrap_source = assembler.label();
    assembler.wait(1, WaitSource::PIN, 2, false);
    assembler.wait(0, WaitSource::PIN, 2, false);
    assembler.wait(0, WaitSource::PIN, 1, false);
    assembler.wait(1, WaitSource::PIN, 1, false);
    assembler.bind(&mut wrap_target);
    assembler.wait(0, WaitSource::PIN, 1, false);
    assembler.wait(1, WaitSource::PIN, 1, false);
    assembler.bind(&mut wrap_source);
    assembler.r#in(InSource::PINS, 1);
    assembler.assemble_with_wrap(wrap_source, wrap_target)
}

// ============================================================================
// Transport
// ============================================================================

struct SystemClock<PIO: I2sPio> {
    config: PioConfig<'static, PIO>,
    pin: Pin<'static, PIO>,
}

struct CaptureDirection<PIO: I2sPio> {
    _pin: Pin<'static, PIO>,
    dma: DmaPair,
}

/// Continuous I2S output (and optional capture) on one PIO block.
///
/// Build it once, call [`Transport::configure`] with a [`ClockPlan`], choose a pump with
/// [`Transport::on_buffer_drained`], then [`Transport::start`]. Most applications use it
/// through [`audio_player!`](crate::audio_player!) instead.
///
/// Frame select is always the pin right after the bit clock.
pub struct I2sTransport<PIO: I2sPio, const FRAMES: usize> {
    i2s_static: &'static I2sStatic<FRAMES>,
    claim: SlotClaim,
    common: Common<'static, PIO>,
    output_sm: StateMachine<'static, PIO, 0>,
    system_clock_sm: StateMachine<'static, PIO, 1>,
    capture_sm: StateMachine<'static, PIO, 2>,
    output_config: PioConfig<'static, PIO>,
    data_pin: Pin<'static, PIO>,
    bit_clock_pin: Pin<'static, PIO>,
    frame_select_pin: Pin<'static, PIO>,
    system_clock: Option<SystemClock<PIO>>,
    capture: Option<CaptureDirection<PIO>>,
    output_dma: DmaPair,
    config: TransportConfig,
    handle: Option<StreamHandle>,
    registration: Registration<'static>,
    running: bool,
}

impl<PIO: I2sPio, const FRAMES: usize> I2sTransport<PIO, FRAMES> {
    /// Claim a PIO block and a DMA pair for output.
    ///
    /// Pin numbers in `config` are replaced by the pins passed in, and the buffer length by
    /// `FRAMES`. The system clock and capture start disabled; see
    /// [`Self::enable_system_clock`] and [`Self::enable_capture`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ClockPinsNotConsecutive`] if frame select does not follow the bit
    /// clock, another [`Error::InvalidConfig`] for bad geometry, or
    /// [`Error::ResourceExhausted`] if `i2s_static` or the DMA channel is already in use.
    #[expect(clippy::too_many_arguments, reason = "one argument per hardware resource")]
    pub fn new<D: Channel, C: Channel>(
        i2s_static: &'static I2sStatic<FRAMES>,
        pio: Peri<'static, PIO>,
        config: TransportConfig,
        data_pin: Peri<'static, impl PioPin>,
        bit_clock_pin: Peri<'static, impl PioPin>,
        frame_select_pin: Peri<'static, impl PioPin>,
        data_dma: Peri<'static, D>,
        control_dma: Peri<'static, C>,
    ) -> Result<Self> {
        let Pio {
            mut common,
            sm0,
            sm1,
            sm2,
            ..
        } = Pio::new(pio, PIO::irqs());
        let data_pin = common.make_pio_pin(data_pin);
        let bit_clock_pin = common.make_pio_pin(bit_clock_pin);
        let frame_select_pin = common.make_pio_pin(frame_select_pin);
        if bit_clock_pin.pin().checked_add(1) != Some(frame_select_pin.pin()) {
            return Err(ConfigError::ClockPinsNotConsecutive.into());
        }

        let config = TransportConfig {
            data_pin: data_pin.pin(),
            clock_base_pin: bit_clock_pin.pin(),
            system_clock_pin: None,
            capture_pin: None,
            buffer_frame_count: FRAMES,
            ..config
        };
        config.validate()?;

        let output_dma = DmaPair::new(data_dma, control_dma);
        // Both claims are released on drop, including when registration fails here.
        let claim = i2s_static.slot.claim(i2s_static)?;
        let registration = HANDLERS.register(output_dma.data_number(), claim.slot())?;
        i2s_static
            .output_channel
            .store(output_dma.data_number(), Ordering::Release);

        let program = output_program(config.bit_depth.bits().try_into().unwrap_or(32));
        let loaded = common.load_program(&program);
        let mut output_config = PioConfig::default();
        output_config.use_program(&loaded, &[&bit_clock_pin, &frame_select_pin]);
        output_config.set_out_pins(&[&data_pin]);
        output_config.shift_out = ShiftConfig {
            threshold: config.bit_depth.bits().try_into().unwrap_or(32),
            direction: ShiftDirection::Left,
            auto_fill: true,
        };
        output_config.fifo_join = FifoJoin::TxOnly;

        let mut output_sm = sm0;
        output_sm.set_pin_dirs(Direction::Out, &[&data_pin, &bit_clock_pin, &frame_select_pin]);
        output_sm.set_pins(Level::Low, &[&data_pin, &bit_clock_pin, &frame_select_pin]);

        info!(
            "i2s: data GPIO {}, clocks GPIO {}/{}, dma {}/{}",
            config.data_pin,
            config.clock_base_pin,
            config.frame_select_pin(),
            output_dma.data_number(),
            output_dma.control_number()
        );

        Ok(Self {
            i2s_static,
            claim,
            common,
            output_sm,
            system_clock_sm: sm1,
            capture_sm: sm2,
            output_config,
            data_pin,
            bit_clock_pin,
            frame_select_pin,
            system_clock: None,
            capture: None,
            output_dma,
            config,
            handle: None,
            registration,
            running: false,
        })
    }

    /// Generate the oversampling system clock on `pin`.
    ///
    /// Takes effect from the next [`Transport::configure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while running or [`Error::InvalidConfig`] if the pin is
    /// already used.
    pub fn enable_system_clock(&mut self, pin: Peri<'static, impl PioPin>) -> Result<()> {
        if self.running || self.system_clock.is_some() {
            return Err(Error::InvalidState);
        }
        let pin = self.common.make_pio_pin(pin);
        let config = TransportConfig {
            system_clock_pin: Some(pin.pin()),
            ..self.config
        };
        config.validate()?;

        let loaded = self.common.load_program(&system_clock_program());
        let mut pio_config = PioConfig::default();
        pio_config.use_program(&loaded, &[]);
        pio_config.set_set_pins(&[&pin]);
        self.system_clock_sm.set_pin_dirs(Direction::Out, &[&pin]);
        self.system_clock_sm.set_pins(Level::Low, &[&pin]);

        self.config = config;
        self.handle = None;
        self.system_clock = Some(SystemClock {
            config: pio_config,
            pin,
        });
        Ok(())
    }

    /// Record from `pin` (the GPIO right below the bit clock) through a second DMA pair.
    ///
    /// Captured frames reach the pump on every drain, left-justified like output frames.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while running, [`ConfigError::CapturePinNotAdjacent`]
    /// for a misplaced pin, or [`Error::ResourceExhausted`] if the DMA channel is claimed.
    pub fn enable_capture<D: Channel, C: Channel>(
        &mut self,
        pin: Peri<'static, impl PioPin>,
        data_dma: Peri<'static, D>,
        control_dma: Peri<'static, C>,
    ) -> Result<()> {
        if self.running || self.capture.is_some() {
            return Err(Error::InvalidState);
        }
        let pin = self.common.make_pio_pin(pin);
        let config = TransportConfig {
            capture_pin: Some(pin.pin()),
            ..self.config
        };
        config.validate()?;

        let dma = DmaPair::new(data_dma, control_dma);
        // The capture channel finishes after the output channel, so it drives the interrupt.
        self.registration = HANDLERS.register(dma.data_number(), self.claim.slot())?;
        self.i2s_static
            .capture_channel
            .store(dma.data_number(), Ordering::Release);
        let bits = config.bit_depth.bits();
        self.i2s_static.capture_shift.store(
            32_u32.saturating_sub(bits).try_into().unwrap_or(0),
            Ordering::Relaxed,
        );

        let loaded = self.common.load_program(&capture_program());
        let mut pio_config = PioConfig::default();
        pio_config.use_program(&loaded, &[]);
        pio_config.set_in_pins(&[&pin]);
        pio_config.shift_in = ShiftConfig {
            threshold: bits.try_into().unwrap_or(32),
            direction: ShiftDirection::Left,
            auto_fill: true,
        };
        pio_config.fifo_join = FifoJoin::RxOnly;
        self.capture_sm.set_pin_dirs(Direction::In, &[&pin]);
        self.capture_sm.set_config(&pio_config);

        info!("i2s: capture on GPIO {}", pin.pin());
        self.config = config;
        self.capture = Some(CaptureDirection { _pin: pin, dma });
        Ok(())
    }

    /// Pins and format currently in use.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn tx_fifo_address() -> u32 {
        PIO::regs().txf(usize::from(OUTPUT_SM)).as_ptr() as u32
    }

    fn rx_fifo_address() -> u32 {
        PIO::regs().rxf(usize::from(CAPTURE_SM)).as_ptr() as u32
    }

    fn dreq(sm: u8, receive: bool) -> u8 {
        let base = PIO::NUMBER.saturating_mul(8).saturating_add(sm);
        if receive { base.saturating_add(4) } else { base }
    }

    fn irq_channel(&self) -> u8 {
        self.capture
            .as_ref()
            .map_or(self.output_dma.data_number(), |capture| {
                capture.dma.data_number()
            })
    }

    fn prime(&self) {
        let i2s_static = self.i2s_static;
        let mut frames = [Frame::SILENCE; FRAMES];
        for half in [BufferHalf::A, BufferHalf::B] {
            i2s_static.produce(None, &mut frames);
            i2s_static.output.write_half(half, &frames);
        }
    }
}

impl<PIO: I2sPio, const FRAMES: usize> Transport for I2sTransport<PIO, FRAMES> {
    fn configure(&mut self, plan: &ClockPlan) -> Result<StreamHandle> {
        if self.running {
            return Err(Error::InvalidState);
        }
        let request = plan.request();
        if request.bit_depth != self.config.bit_depth
            || plan.system_clock_divider().is_some() != self.system_clock.is_some()
        {
            return Err(ConfigError::PlanMismatch.into());
        }

        self.output_config.clock_divider = plan.bit_clock_divider().to_fixed();
        self.output_sm.set_config(&self.output_config);
        if let (Some(system_clock), Some(divider)) =
            (self.system_clock.as_mut(), plan.system_clock_divider())
        {
            system_clock.config.clock_divider = divider.to_fixed();
            self.system_clock_sm.set_config(&system_clock.config);
        }

        let handle = StreamHandle::new(plan, FRAMES);
        info!(
            "i2s configured: bit clock divider {}, system clock divider {}, {} us per half",
            plan.bit_clock_divider(),
            plan.system_clock_divider(),
            handle.buffer_period.as_micros()
        );
        self.handle = Some(handle);
        Ok(handle)
    }

    fn on_buffer_drained(&mut self, pump: &'static PumpSlot) {
        self.i2s_static.pump.set(Some(pump));
    }

    fn start(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Err(Error::InvalidState);
        }
        if self.running {
            return Ok(());
        }
        let i2s_static = self.i2s_static;
        i2s_static.capture.clear();
        self.prime();
        i2s_static.output.prepare_control_blocks();
        i2s_static.capture.prepare_control_blocks();

        self.output_sm.clear_fifos();
        self.output_sm.restart();
        self.system_clock_sm.restart();
        self.capture_sm.clear_fifos();
        self.capture_sm.restart();

        if let Some(capture) = &self.capture {
            capture.dma.arm_capture(
                &i2s_static.capture,
                Self::rx_fifo_address(),
                Self::dreq(CAPTURE_SM, true),
            );
        }
        self.output_dma.arm_output(
            &i2s_static.output,
            Self::tx_fifo_address(),
            Self::dreq(OUTPUT_SM, false),
        );

        let irq_bit = channel_bit(self.irq_channel());
        pac::DMA.ints(1).write_value(irq_bit);
        pac::DMA.inte(1).modify(|w| *w |= irq_bit);
        DMA_IRQ_1::unpend();
        // SAFETY: the handler only touches 'static registry state.
        #[expect(unsafe_code, reason = "enabling an interrupt with a bound handler")]
        unsafe {
            DMA_IRQ_1::enable();
        }

        if let Some(capture) = &self.capture {
            capture.dma.trigger(&i2s_static.capture);
        }
        self.output_dma.trigger(&i2s_static.output);

        let has_system_clock = self.system_clock.is_some();
        let has_capture = self.capture.is_some();
        self.common.apply_sm_batch(|batch| {
            batch.set_enable(&mut self.output_sm, true);
            if has_system_clock {
                batch.set_enable(&mut self.system_clock_sm, true);
            }
            if has_capture {
                batch.set_enable(&mut self.capture_sm, true);
            }
        });
        self.running = true;
        info!("i2s started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.common.apply_sm_batch(|batch| {
            batch.set_enable(&mut self.output_sm, false);
            batch.set_enable(&mut self.system_clock_sm, false);
            batch.set_enable(&mut self.capture_sm, false);
        });

        let irq_bit = channel_bit(self.irq_channel());
        pac::DMA.inte(1).modify(|w| *w &= !irq_bit);
        self.output_dma.abort();
        if let Some(capture) = &self.capture {
            capture.dma.abort();
        }

        self.output_sm.clear_fifos();
        self.capture_sm.clear_fifos();
        self.output_sm.set_pins(
            Level::Low,
            &[&self.data_pin, &self.bit_clock_pin, &self.frame_select_pin],
        );
        if let Some(system_clock) = &self.system_clock {
            self.system_clock_sm.set_pins(Level::Low, &[&system_clock.pin]);
        }
        self.i2s_static.output.clear();
        self.i2s_static.capture.clear();
        self.running = false;
        info!("i2s stopped");
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl<PIO: I2sPio, const FRAMES: usize> Drop for I2sTransport<PIO, FRAMES> {
    fn drop(&mut self) {
        self.stop();
        self.i2s_static
            .output_channel
            .store(NO_CHANNEL, Ordering::Release);
        self.i2s_static
            .capture_channel
            .store(NO_CHANNEL, Ordering::Release);
        self.i2s_static.pump.set(None);
    }
}
