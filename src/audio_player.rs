//! A device abstraction that plays [`AudioAsset`](crate::asset::AudioAsset)s through I2S and
//! reports how loud they are.
//!
//! See [`audio_player!`] for the generated device type and [`AudioController`] for the
//! hardware-independent logic it runs.
//!
//! Control calls ([`AudioPlayer::play`], [`AudioPlayer::stop`], ...) act on the shared
//! [`PlaybackSession`] at once, so their `Result` is immediate. The drain interrupt reads that
//! session as its fill source. A background task owns the transport: it starts the hardware
//! when something is playing, stops it once an asset has ended and its tail has drained, and
//! publishes the intensity of each new window.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::Result;
use crate::asset::{AssetInfo, AssetTable};
use crate::clock_plan::ClockPlan;
use crate::intensity::{AudioIntensityAnalyzer, IntensityListener, IntensityState, SharedIntensity};
use crate::playback::{PlaybackSession, PlaybackState, Volume};
use crate::transport::{DrainTap, InterruptPump, PumpSlot, StreamHandle, Transport};

/// Drain windows to let through after the end of an asset before stopping the transport.
///
/// The window carrying the last samples has been handed to hardware when end of stream is
/// reported; two more windows cover both halves that may still hold them.
pub const END_OF_STREAM_DRAIN_WINDOWS: u32 = 2;

// ============================================================================
// Shared state
// ============================================================================

/// State shared between task context and the drain interrupt.
pub struct SharedPlayback {
    session: PlaybackSession,
    tap: DrainTap,
    intensity: SharedIntensity,
}

impl SharedPlayback {
    /// Stopped playback over `assets`.
    #[must_use]
    pub const fn new(assets: AssetTable) -> Self {
        Self {
            session: PlaybackSession::new(assets),
            tap: DrainTap::new(),
            intensity: SharedIntensity::new(),
        }
    }

    /// The session the interrupt fills from.
    #[must_use]
    pub const fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Per-window results from the fill path.
    #[must_use]
    pub const fn tap(&self) -> &DrainTap {
        &self.tap
    }

    /// Latest published intensity.
    #[must_use]
    pub const fn intensity(&self) -> &SharedIntensity {
        &self.intensity
    }

    /// A pump that fills from the session inside the drain interrupt.
    #[must_use]
    pub const fn interrupt_pump(&'static self) -> InterruptPump<'static> {
        InterruptPump::new(&self.session, &self.tap)
    }
}

/// What one [`AudioController::service`] pass observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, defmt::Format)]
pub struct ServiceReport {
    /// Intensity published by this pass.
    pub intensity: f32,
    /// Underruns since the previous pass.
    pub underruns: u32,
    /// An asset reached its end since the previous pass.
    pub ended: bool,
    /// The transport was stopped because the ended asset has drained.
    pub stopped_transport: bool,
}

// ============================================================================
// Controller
// ============================================================================

/// Plays assets over a [`Transport`] and turns drained windows into an intensity.
///
/// The controller is the task-context side of the player. It is generic over the transport
/// so host tests can drive it with a
/// [`SimulatedTransport`](crate::transport::SimulatedTransport).
pub struct AudioController<T: Transport> {
    transport: T,
    shared: &'static SharedPlayback,
    analyzer: AudioIntensityAnalyzer,
    intensity: IntensityState,
    listener: Option<&'static dyn IntensityListener>,
    handle: StreamHandle,
    last_window: u32,
    end_of_stream_at: Option<u32>,
    ended_unreported: bool,
    published: f32,
}

impl<T: Transport> AudioController<T> {
    /// Configure `transport` with `plan` and make `pump` its refill path.
    ///
    /// # Errors
    ///
    /// Returns whatever [`Transport::configure`] rejects.
    pub fn new(
        mut transport: T,
        plan: &ClockPlan,
        shared: &'static SharedPlayback,
        pump: &'static PumpSlot,
    ) -> Result<Self> {
        let handle = transport.configure(plan)?;
        transport.on_buffer_drained(pump);
        Ok(Self {
            transport,
            shared,
            analyzer: AudioIntensityAnalyzer::DEFAULT,
            intensity: IntensityState::new(),
            listener: None,
            handle,
            last_window: shared.tap.windows(),
            end_of_stream_at: None,
            ended_unreported: false,
            published: 0.0,
        })
    }

    /// Start `index` from the beginning and make sure hardware is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`](crate::Error::AssetNotFound) for a bad index, or a
    /// transport start failure, after which playback is stopped.
    pub fn play(&mut self, index: usize) -> Result<()> {
        self.shared.session.play(index)?;
        self.end_of_stream_at = None;
        self.start_or_stop()
    }

    /// Stop playback and the hardware. Intensity drops to zero.
    pub fn stop(&mut self) {
        self.shared.session.stop();
        self.transport.stop();
        self.end_of_stream_at = None;
        self.intensity.clear();
        self.publish(0.0);
    }

    /// Freeze playback; hardware keeps running and plays silence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) unless playing.
    pub fn pause(&mut self) -> Result<()> {
        self.shared.session.pause()
    }

    /// Continue a paused asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) unless paused, or a
    /// transport start failure, after which playback is stopped.
    pub fn resume(&mut self) -> Result<()> {
        self.shared.session.resume()?;
        self.start_or_stop()
    }

    // A session left playing without hardware would never end.
    fn start_or_stop(&mut self) -> Result<()> {
        self.sync_transport().inspect_err(|_| self.stop())
    }

    /// Set the gain; clamped to `[0, 1]`, NaN is mute.
    pub fn set_volume(&self, volume: f32) {
        self.shared.session.set_volume(volume);
    }

    /// Current gain.
    #[must_use]
    pub fn volume(&self) -> Volume {
        self.shared.session.volume()
    }

    /// Whether an asset is playing (not paused).
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.shared.session.is_playing()
    }

    /// Latest published intensity in `[0, 1]`.
    #[must_use]
    pub fn audio_intensity(&self) -> f32 {
        self.shared.intensity.load()
    }

    /// Number of playable assets.
    #[must_use]
    pub const fn asset_count(&self) -> usize {
        self.shared.session.assets().len()
    }

    /// Describe an asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`](crate::Error::AssetNotFound) for a bad index.
    pub fn asset_info(&self, index: usize) -> Result<AssetInfo> {
        self.shared.session.assets().info(index)
    }

    /// Receive every published intensity from now on.
    pub fn set_intensity_listener(&mut self, listener: &'static dyn IntensityListener) {
        self.listener = Some(listener);
    }

    /// What the transport reported at configuration.
    #[must_use]
    pub const fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    /// The owned transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The owned transport, for driving a simulated one.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The shared session.
    #[must_use]
    pub const fn session(&self) -> &PlaybackSession {
        &self.shared.session
    }

    /// Bring the transport in line with the session: running while an asset is active,
    /// stopped once nothing is playing and no ended asset is still draining.
    ///
    /// # Errors
    ///
    /// Returns a transport start failure.
    pub fn sync_transport(&mut self) -> Result<()> {
        self.note_end_of_stream();
        match self.shared.session.state() {
            PlaybackState::Playing | PlaybackState::Paused => {
                if !self.transport.is_running() {
                    self.last_window = self.shared.tap.windows();
                    self.transport.start()?;
                }
            }
            PlaybackState::Stopped => {
                if self.transport.is_running() && self.end_of_stream_at.is_none() {
                    self.transport.stop();
                }
            }
        }
        Ok(())
    }

    /// Task-context housekeeping. Call it at least once per buffer period.
    ///
    /// Publishes the intensity of the newest window, stops the transport once an ended asset
    /// has drained, and collects the underrun count.
    pub fn service(&mut self) -> ServiceReport {
        self.note_end_of_stream();
        let ended = core::mem::take(&mut self.ended_unreported);
        let windows = self.shared.tap.windows();
        let new_window = windows != self.last_window;

        let mut stopped_transport = false;
        if let Some(ended_at) = self.end_of_stream_at {
            if self.shared.session.state() != PlaybackState::Stopped {
                self.end_of_stream_at = None;
            } else if windows.wrapping_sub(ended_at) >= END_OF_STREAM_DRAIN_WINDOWS
                || !self.transport.is_running()
            {
                self.end_of_stream_at = None;
                if self.transport.is_running() {
                    self.transport.stop();
                    stopped_transport = true;
                }
            }
        }

        let intensity = if !self.shared.session.is_playing() {
            self.intensity.clear();
            0.0
        } else if new_window {
            let raw = self
                .analyzer
                .intensity_from_mean_square(self.shared.tap.latest_mean_square());
            self.intensity.update(raw)
        } else {
            self.intensity.smoothed()
        };
        self.last_window = windows;

        if new_window || intensity.to_bits() != self.published.to_bits() {
            self.publish(intensity);
        }

        ServiceReport {
            intensity,
            underruns: self.shared.tap.take_underruns(),
            ended,
            stopped_transport,
        }
    }

    fn note_end_of_stream(&mut self) {
        if self.shared.tap.take_end_of_stream() {
            self.end_of_stream_at = Some(self.shared.tap.windows());
            self.ended_unreported = true;
        }
    }

    fn publish(&mut self, intensity: f32) {
        self.published = intensity;
        self.shared.intensity.store(intensity);
        if let Some(listener) = self.listener {
            listener.on_intensity(intensity);
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Static resources for [`AudioPlayer`].
pub struct AudioPlayerStatic {
    playback: SharedPlayback,
    wake: Signal<CriticalSectionRawMutex, ()>,
    listener: Signal<CriticalSectionRawMutex, &'static dyn IntensityListener>,
}

impl AudioPlayerStatic {
    /// Shared playback state, for building a pump and a controller.
    #[must_use]
    pub const fn playback(&'static self) -> &'static SharedPlayback {
        &self.playback
    }

    /// Wait until a control call needs the background task.
    pub async fn wait_wake(&self) {
        self.wake.wait().await;
    }

    /// A listener handed to [`AudioPlayer::set_intensity_listener`], if one is pending.
    pub fn take_listener(&self) -> Option<&'static dyn IntensityListener> {
        self.listener.try_take()
    }

    /// Wait for a listener handed to [`AudioPlayer::set_intensity_listener`].
    pub async fn wait_listener(&self) -> &'static dyn IntensityListener {
        self.listener.wait().await
    }
}

/// Handle to a running player. Usually reached through the type [`audio_player!`] generates.
pub struct AudioPlayer {
    audio_player_static: &'static AudioPlayerStatic,
}

impl AudioPlayer {
    /// Create static resources over `assets`.
    #[must_use]
    pub const fn new_static(assets: AssetTable) -> AudioPlayerStatic {
        AudioPlayerStatic {
            playback: SharedPlayback::new(assets),
            wake: Signal::new(),
            listener: Signal::new(),
        }
    }

    /// Wrap static resources whose background task is running (or driven by hand).
    #[must_use]
    pub const fn new(audio_player_static: &'static AudioPlayerStatic) -> Self {
        Self {
            audio_player_static,
        }
    }

    fn shared(&self) -> &'static SharedPlayback {
        &self.audio_player_static.playback
    }

    fn wake(&self) {
        self.audio_player_static.wake.signal(());
    }

    /// Start asset `index` from its beginning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`](crate::Error::AssetNotFound) for a bad index; the
    /// current playback is left untouched.
    pub fn play(&self, index: usize) -> Result<()> {
        self.shared().session.play(index)?;
        self.wake();
        Ok(())
    }

    /// Stop playback. Intensity drops to zero.
    pub fn stop(&self) {
        self.shared().session.stop();
        self.wake();
    }

    /// Freeze playback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) unless playing.
    pub fn pause(&self) -> Result<()> {
        self.shared().session.pause()?;
        self.wake();
        Ok(())
    }

    /// Continue a paused asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`](crate::Error::InvalidState) unless paused.
    pub fn resume(&self) -> Result<()> {
        self.shared().session.resume()?;
        self.wake();
        Ok(())
    }

    /// Set the gain; clamped to `[0, 1]`, NaN is mute.
    pub fn set_volume(&self, volume: f32) {
        self.shared().session.set_volume(volume);
    }

    /// Current gain.
    #[must_use]
    pub fn volume(&self) -> Volume {
        self.shared().session.volume()
    }

    /// Whether an asset is playing (not paused).
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.shared().session.is_playing()
    }

    /// Current playback state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.shared().session.state()
    }

    /// Latest published intensity in `[0, 1]`.
    #[must_use]
    pub fn audio_intensity(&self) -> f32 {
        self.shared().intensity.load()
    }

    /// Number of playable assets.
    #[must_use]
    pub const fn asset_count(&self) -> usize {
        self.audio_player_static.playback.session.assets().len()
    }

    /// Describe an asset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetNotFound`](crate::Error::AssetNotFound) for a bad index.
    pub fn asset_info(&self, index: usize) -> Result<AssetInfo> {
        self.shared().session.assets().info(index)
    }

    /// Send every published intensity to `listener` (for example an LED player's inbox).
    pub fn set_intensity_listener(&self, listener: &'static dyn IntensityListener) {
        self.audio_player_static.listener.signal(listener);
    }
}

// ============================================================================
// Device loop
// ============================================================================

/// Housekeeping period of the background task; shorter than any buffer period in use.
#[cfg(not(feature = "host"))]
const SERVICE_PERIOD: embassy_time::Duration = embassy_time::Duration::from_millis(10);

// Called by macro-generated code in downstream crates; must be public.
#[cfg(not(feature = "host"))]
#[doc(hidden)]
pub use paste;

/// Build the hardware transport and controller for a generated player.
// Called by macro-generated code in downstream crates; must be public.
#[cfg(not(feature = "host"))]
#[doc(hidden)]
#[expect(clippy::too_many_arguments, reason = "one argument per hardware resource")]
pub fn new_device<
    PIO: crate::i2s::I2sPio,
    const FRAMES: usize,
    D: embassy_rp::dma::Channel,
    C: embassy_rp::dma::Channel,
>(
    audio_player_static: &'static AudioPlayerStatic,
    i2s_static: &'static crate::i2s::I2sStatic<FRAMES>,
    pump: &'static PumpSlot,
    config: crate::transport::TransportConfig,
    pio: embassy_rp::Peri<'static, PIO>,
    data_pin: embassy_rp::Peri<'static, impl embassy_rp::pio::PioPin>,
    bit_clock_pin: embassy_rp::Peri<'static, impl embassy_rp::pio::PioPin>,
    frame_select_pin: embassy_rp::Peri<'static, impl embassy_rp::pio::PioPin>,
    system_clock_pin: embassy_rp::Peri<'static, impl embassy_rp::pio::PioPin>,
    data_dma: embassy_rp::Peri<'static, D>,
    control_dma: embassy_rp::Peri<'static, C>,
) -> Result<AudioController<crate::i2s::I2sTransport<PIO, FRAMES>>> {
    let mut transport = crate::i2s::I2sTransport::new(
        i2s_static,
        pio,
        config,
        data_pin,
        bit_clock_pin,
        frame_select_pin,
        data_dma,
        control_dma,
    )?;
    transport.enable_system_clock(system_clock_pin)?;
    let request = transport.config().clock_request();
    let plan = crate::clock_plan::plan_clocks(&request, embassy_rp::clocks::clk_sys_freq())?;
    defmt::info!(
        "audio clock plan: {} Hz requested, {} Hz achieved",
        request.sample_rate_hz,
        plan.actual_sample_rate_hz()
    );
    AudioController::new(transport, &plan, audio_player_static.playback(), pump)
}

// Called by macro-generated code in downstream crates; must be public.
#[cfg(not(feature = "host"))]
#[doc(hidden)]
pub async fn device_loop<T: Transport>(
    audio_player_static: &'static AudioPlayerStatic,
    mut controller: AudioController<T>,
) -> ! {
    use defmt::{info, warn};
    use embassy_futures::select::{Either3, select3};
    use embassy_time::Timer;

    let mut was_playing = false;
    loop {
        match select3(
            audio_player_static.wait_wake(),
            audio_player_static.wait_listener(),
            Timer::after(SERVICE_PERIOD),
        )
        .await
        {
            Either3::First(()) => info!("audio state {}", controller.session().state()),
            Either3::Second(listener) => controller.set_intensity_listener(listener),
            Either3::Third(()) => {}
        }

        if let Err(err) = controller.sync_transport() {
            warn!("audio transport start failed: {}", err);
            controller.stop();
        }
        let report = controller.service();
        if report.underruns > 0 {
            warn!("audio underruns: {}", report.underruns);
        }
        if report.ended {
            info!("audio end of stream");
        }
        if report.stopped_transport {
            info!("audio transport idle");
        }
        let playing = controller.is_playing();
        if playing != was_playing {
            info!("audio playing: {}", playing);
            was_playing = playing;
        }
    }
}

// ============================================================================
// Macro
// ============================================================================

/// Generate an audio player type on a PIO block, with background task and static resources.
///
/// ```rust,no_run
/// # #![no_std]
/// # #![no_main]
/// # use panic_probe as _;
/// # use core::convert::Infallible;
/// use dalek_voice::Result;
/// use dalek_voice::asset::{AudioAsset, tone};
/// use dalek_voice::audio_player::audio_player;
///
/// static BEEP_SAMPLES: [i16; 11_025] = tone(22_050, 440);
/// static VOICE_ASSETS: [AudioAsset; 1] = [AudioAsset::mono_i16("beep", 22_050, &BEEP_SAMPLES)];
///
/// audio_player! {
///     DalekVoice {
///         assets: &VOICE_ASSETS,
///         data_pin: PIN_6,
///         bit_clock_pin: PIN_8,
///         frame_select_pin: PIN_9,
///         system_clock_pin: PIN_10,
///     }
/// }
///
/// async fn example(spawner: embassy_executor::Spawner) -> Result<Infallible> {
///     let p = embassy_rp::init(Default::default());
///     let voice = DalekVoice::new(
///         p.PIN_6, p.PIN_8, p.PIN_9, p.PIN_10, p.PIO0, p.DMA_CH0, p.DMA_CH1, spawner,
///     )?;
///     voice.set_volume(0.5);
///     voice.play(0)?;
///     core::future::pending().await
/// }
/// ```
///
/// Fields (all but `assets` are optional):
///
/// - `assets`: `&'static [AudioAsset]` expression.
/// - `data_pin` (`PIN_6`), `bit_clock_pin` (`PIN_8`), `frame_select_pin` (`PIN_9`, must be
///   the bit clock pin + 1), `system_clock_pin` (`PIN_10`).
/// - `pio` (`PIO0`), `data_dma` (`DMA_CH0`), `control_dma` (`DMA_CH1`).
/// - `sample_rate_hz` (`22_050`), `bit_depth` (`BitDepth::Bits16`),
///   `oversampling_multiplier` (`256`), `frames` per buffer half (`64`).
///
/// A visibility before the name (`pub(crate) DalekVoice { ... }`) applies to the generated
/// type; the default is `pub`.
#[cfg(not(feature = "host"))]
#[macro_export]
macro_rules! audio_player {
    ($($tt:tt)*) => { $crate::__audio_player_impl! { $($tt)* } };
}

/// Internal implementation macro for [`audio_player!`].
#[cfg(not(feature = "host"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __audio_player_impl {
    (
        $name:ident {
            $($fields:tt)*
        }
    ) => {
        $crate::__audio_player_impl! { pub $name { $($fields)* } }
    };

    (
        $vis:vis $name:ident {
            $($fields:tt)*
        }
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis,
            name: $name,
            assets: _UNSET_,
            data_pin: PIN_6,
            bit_clock_pin: PIN_8,
            frame_select_pin: PIN_9,
            system_clock_pin: PIN_10,
            pio: PIO0,
            data_dma: DMA_CH0,
            control_dma: DMA_CH1,
            sample_rate_hz: 22_050,
            bit_depth: $crate::clock_plan::BitDepth::Bits16,
            oversampling_multiplier: 256,
            frames: 64,
            fields: [ $($fields)* ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ assets: $assets_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets_value,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ data_pin: $data_pin_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin_value, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ bit_clock_pin: $bit_clock_pin_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin_value,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ frame_select_pin: $frame_select_pin_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin_value, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ system_clock_pin: $system_clock_pin_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin_value,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ pio: $pio_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio_value, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ data_dma: $data_dma_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma_value, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ control_dma: $control_dma_value:ident $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma_value,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ sample_rate_hz: $sample_rate_hz_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz_value, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ bit_depth: $bit_depth_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth_value,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ oversampling_multiplier: $oversampling_multiplier_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier_value, frames: $frames,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:tt,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ frames: $frames_value:expr $(, $($rest:tt)* )? ]
    ) => {
        $crate::__audio_player_impl! {
            @__fill_defaults
            vis: $vis, name: $name,
            assets: $assets,
            data_pin: $data_pin, bit_clock_pin: $bit_clock_pin,
            frame_select_pin: $frame_select_pin, system_clock_pin: $system_clock_pin,
            pio: $pio, data_dma: $data_dma, control_dma: $control_dma,
            sample_rate_hz: $sample_rate_hz, bit_depth: $bit_depth,
            oversampling_multiplier: $oversampling_multiplier, frames: $frames_value,
            fields: [ $($($rest)*)? ]
        }
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: _UNSET_,
        $($ignored:tt)*
    ) => {
        compile_error!("audio_player! requires `assets: <&'static [AudioAsset]>`");
    };

    (@__fill_defaults
        vis: $vis:vis,
        name: $name:ident,
        assets: $assets:expr,
        data_pin: $data_pin:ident,
        bit_clock_pin: $bit_clock_pin:ident,
        frame_select_pin: $frame_select_pin:ident,
        system_clock_pin: $system_clock_pin:ident,
        pio: $pio:ident,
        data_dma: $data_dma:ident,
        control_dma: $control_dma:ident,
        sample_rate_hz: $sample_rate_hz:expr,
        bit_depth: $bit_depth:expr,
        oversampling_multiplier: $oversampling_multiplier:expr,
        frames: $frames:expr,
        fields: [ ]
    ) => {
        $crate::audio_player::paste::paste! {
            static [<$name:upper _AUDIO_PLAYER_STATIC>]: $crate::audio_player::AudioPlayerStatic =
                $crate::audio_player::AudioPlayer::new_static(
                    $crate::asset::AssetTable::new($assets),
                );
            static [<$name:upper _I2S_STATIC>]: $crate::i2s::I2sStatic<{ $frames }> =
                $crate::i2s::I2sStatic::new();
            static [<$name:upper _PUMP>]: $crate::transport::InterruptPump<'static> =
                [<$name:upper _AUDIO_PLAYER_STATIC>].playback().interrupt_pump();
            static [<$name:upper _PUMP_SLOT>]: $crate::transport::PumpSlot =
                $crate::transport::PumpSlot::new(&[<$name:upper _PUMP>]);
            static [<$name:upper _AUDIO_PLAYER_CELL>]: ::static_cell::StaticCell<$name> =
                ::static_cell::StaticCell::new();

            $vis struct $name {
                player: $crate::audio_player::AudioPlayer,
            }

            impl $name {
                /// Frames per buffer half.
                pub const FRAMES: usize = $frames;

                /// Claim the I2S hardware, compute the clock plan and spawn the background task.
                ///
                /// # Errors
                ///
                /// Returns a configuration or clock planning error, or
                /// [`Error::TaskSpawn`]($crate::Error::TaskSpawn) if the player already exists.
                #[expect(clippy::too_many_arguments, reason = "one argument per hardware resource")]
                pub fn new(
                    data_pin: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$data_pin>>,
                    bit_clock_pin: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$bit_clock_pin>>,
                    frame_select_pin: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$frame_select_pin>>,
                    system_clock_pin: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$system_clock_pin>>,
                    pio: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$pio>>,
                    data_dma: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$data_dma>>,
                    control_dma: impl Into<::embassy_rp::Peri<'static, ::embassy_rp::peripherals::$control_dma>>,
                    spawner: ::embassy_executor::Spawner,
                ) -> $crate::Result<&'static Self> {
                    let config = $crate::transport::TransportConfig {
                        sample_rate_hz: $sample_rate_hz,
                        bit_depth: $bit_depth,
                        oversampling_multiplier: $oversampling_multiplier,
                        ..$crate::transport::TransportConfig::DEFAULT
                    };
                    let controller = $crate::audio_player::new_device(
                        &[<$name:upper _AUDIO_PLAYER_STATIC>],
                        &[<$name:upper _I2S_STATIC>],
                        &[<$name:upper _PUMP_SLOT>],
                        config,
                        pio.into(),
                        data_pin.into(),
                        bit_clock_pin.into(),
                        frame_select_pin.into(),
                        system_clock_pin.into(),
                        data_dma.into(),
                        control_dma.into(),
                    )?;
                    let token = [<$name:snake _audio_player_task>](
                        &[<$name:upper _AUDIO_PLAYER_STATIC>],
                        controller,
                    );
                    spawner.spawn(token)?;
                    let player = $crate::audio_player::AudioPlayer::new(&[<$name:upper _AUDIO_PLAYER_STATIC>]);
                    Ok([<$name:upper _AUDIO_PLAYER_CELL>].init(Self { player }))
                }
            }

            impl ::core::ops::Deref for $name {
                type Target = $crate::audio_player::AudioPlayer;

                fn deref(&self) -> &Self::Target {
                    &self.player
                }
            }

            #[::embassy_executor::task]
            async fn [<$name:snake _audio_player_task>](
                audio_player_static: &'static $crate::audio_player::AudioPlayerStatic,
                controller: $crate::audio_player::AudioController<
                    $crate::i2s::I2sTransport<::embassy_rp::peripherals::$pio, { $frames }>,
                >,
            ) -> ! {
                $crate::audio_player::device_loop(audio_player_static, controller).await
            }
        }
    };
}

#[cfg(not(feature = "host"))]
pub use audio_player;
