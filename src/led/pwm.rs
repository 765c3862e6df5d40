//! PWM hardware for the LED controller and the task that runs it.
//!
//! Each LED needs its own [PWM slice](crate#glossary): `slice = (pin / 2) % 8` on the first
//! 30 pins. GPIO 11 and 12 (the default head lights) use slices 5 and 6.
//!
//! ```rust,no_run
//! # #![no_std]
//! # #![no_main]
//! # use panic_probe as _;
//! # use core::convert::Infallible;
//! use dalek_voice::Result;
//! use dalek_voice::led::pwm::{LedPlayer, LedPlayerStatic, PwmLedChannel, PwmLedWriter};
//! use dalek_voice::led::{EffectPattern, LedConfig};
//!
//! async fn example(spawner: embassy_executor::Spawner) -> Result<Infallible> {
//!     let p = embassy_rp::init(Default::default());
//!     let mut writer = PwmLedWriter::new();
//!     writer.push(PwmLedChannel::new(p.PIN_11, p.PWM_SLICE5))?;
//!     writer.push(PwmLedChannel::new(p.PIN_12, p.PWM_SLICE6))?;
//!
//!     static LED_PLAYER_STATIC: LedPlayerStatic = LedPlayer::new_static();
//!     let leds = LedPlayer::new(&LED_PLAYER_STATIC, LedConfig::DEFAULT, writer, spawner)?;
//!     leds.set_effect(EffectPattern::Wave);
//!     core::future::pending().await
//! }
//! ```

use defmt::{info, warn};
use embassy_executor::Spawner;
use embassy_rp::pwm::{Config, Pwm};
use embassy_rp::{Peri, PeripheralType};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Instant, Ticker};
use fixed::FixedU16;
use fixed::types::extra::U4;
use heapless::Vec;

use super::{
    DutyWriter, EffectPattern, LedConfig, LedIntensityController, MAX_LED_CHANNELS,
    PWM_FREQUENCY_HZ, PWM_TOP, UPDATE_PERIOD,
};
use crate::intensity::{IntensityListener, SharedIntensity};
use crate::{Error, Result};

// ============================================================================
// Pin to slice mapping
// ============================================================================

// Public for use in generic bounds by callers; hidden from docs.
#[doc(hidden)]
pub trait LedPwmPin<S: PeripheralType>: PeripheralType {
    const IS_CHANNEL_A: bool;
    fn new_pwm<'d>(slice: Peri<'d, S>, pin: Peri<'d, Self>) -> Pwm<'d>;
}

macro_rules! led_pin_map {
    ($pin:ident, $slice:ident, A) => {
        impl LedPwmPin<embassy_rp::peripherals::$slice> for embassy_rp::peripherals::$pin {
            const IS_CHANNEL_A: bool = true;
            fn new_pwm<'d>(
                slice: Peri<'d, embassy_rp::peripherals::$slice>,
                pin: Peri<'d, Self>,
            ) -> Pwm<'d> {
                Pwm::new_output_a(slice, pin, Config::default())
            }
        }
    };
    ($pin:ident, $slice:ident, B) => {
        impl LedPwmPin<embassy_rp::peripherals::$slice> for embassy_rp::peripherals::$pin {
            const IS_CHANNEL_A: bool = false;
            fn new_pwm<'d>(
                slice: Peri<'d, embassy_rp::peripherals::$slice>,
                pin: Peri<'d, Self>,
            ) -> Pwm<'d> {
                Pwm::new_output_b(slice, pin, Config::default())
            }
        }
    };
}

led_pin_map!(PIN_0, PWM_SLICE0, A);
led_pin_map!(PIN_1, PWM_SLICE0, B);
led_pin_map!(PIN_2, PWM_SLICE1, A);
led_pin_map!(PIN_3, PWM_SLICE1, B);
led_pin_map!(PIN_4, PWM_SLICE2, A);
led_pin_map!(PIN_5, PWM_SLICE2, B);
led_pin_map!(PIN_6, PWM_SLICE3, A);
led_pin_map!(PIN_7, PWM_SLICE3, B);
led_pin_map!(PIN_8, PWM_SLICE4, A);
led_pin_map!(PIN_9, PWM_SLICE4, B);
led_pin_map!(PIN_10, PWM_SLICE5, A);
led_pin_map!(PIN_11, PWM_SLICE5, B);
led_pin_map!(PIN_12, PWM_SLICE6, A);
led_pin_map!(PIN_13, PWM_SLICE6, B);
led_pin_map!(PIN_14, PWM_SLICE7, A);
led_pin_map!(PIN_15, PWM_SLICE7, B);
led_pin_map!(PIN_16, PWM_SLICE0, A);
led_pin_map!(PIN_17, PWM_SLICE0, B);
led_pin_map!(PIN_18, PWM_SLICE1, A);
led_pin_map!(PIN_19, PWM_SLICE1, B);
led_pin_map!(PIN_20, PWM_SLICE2, A);
led_pin_map!(PIN_21, PWM_SLICE2, B);
led_pin_map!(PIN_22, PWM_SLICE3, A);
led_pin_map!(PIN_23, PWM_SLICE3, B);
led_pin_map!(PIN_24, PWM_SLICE4, A);
led_pin_map!(PIN_25, PWM_SLICE4, B);
led_pin_map!(PIN_26, PWM_SLICE5, A);
led_pin_map!(PIN_27, PWM_SLICE5, B);
led_pin_map!(PIN_28, PWM_SLICE6, A);
led_pin_map!(PIN_29, PWM_SLICE6, B);

// ============================================================================
// Duty writers
// ============================================================================

/// One LED on one PWM output, running at 1 kHz with a 16-bit counter.
pub struct PwmLedChannel<'d> {
    pwm: Pwm<'d>,
    config: Config,
    is_channel_a: bool,
}

impl<'d> PwmLedChannel<'d> {
    /// Claim `slice` for the LED on `pin`, starting dark and disabled.
    pub fn new<P, S>(pin: Peri<'d, P>, slice: Peri<'d, S>) -> Self
    where
        P: LedPwmPin<S>,
        S: PeripheralType,
    {
        let mut pwm = P::new_pwm(slice, pin);
        let clk = embassy_rp::clocks::clk_sys_freq();
        // clk / (1 kHz * 65536): about 1.9 at 125 MHz.
        #[expect(clippy::cast_precision_loss, reason = "clock rates fit f32 closely enough")]
        let divider = clk as f32 / (PWM_FREQUENCY_HZ as f32 * (f32::from(PWM_TOP) + 1.0));
        let mut config = Config::default();
        config.top = PWM_TOP;
        config.divider = FixedU16::<U4>::saturating_from_num(divider.max(1.0));
        config.compare_a = 0;
        config.compare_b = 0;
        config.enable = false;
        pwm.set_config(&config);
        info!("led pwm clk={}Hz div={}", clk, divider);
        Self {
            pwm,
            config,
            is_channel_a: P::IS_CHANNEL_A,
        }
    }
}

impl DutyWriter for PwmLedChannel<'_> {
    fn set_duty(&mut self, _channel: usize, duty: u16) {
        if self.is_channel_a {
            self.config.compare_a = duty;
        } else {
            self.config.compare_b = duty;
        }
        self.pwm.set_config(&self.config);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.config.enable = enabled;
        self.pwm.set_config(&self.config);
    }
}

/// Up to four [`PwmLedChannel`]s addressed by index.
pub struct PwmLedWriter<'d> {
    channels: Vec<PwmLedChannel<'d>, MAX_LED_CHANNELS>,
}

impl<'d> PwmLedWriter<'d> {
    /// No channels yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Add the next channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when four channels are already present.
    pub fn push(&mut self, channel: PwmLedChannel<'d>) -> Result<()> {
        self.channels
            .push(channel)
            .map_err(|_| Error::ResourceExhausted)
    }
}

impl Default for PwmLedWriter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl DutyWriter for PwmLedWriter<'_> {
    fn set_duty(&mut self, channel: usize, duty: u16) {
        if let Some(led) = self.channels.get_mut(channel) {
            led.set_duty(0, duty);
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        for led in &mut self.channels {
            led.set_enabled(enabled);
        }
    }
}

// ============================================================================
// LED task
// ============================================================================

enum LedCommand {
    Effect(EffectPattern),
    Brightness(f32),
    Channel {
        channel: usize,
        brightness: Option<u16>,
    },
    On,
    Off,
}

/// Static resources for [`LedPlayer`].
pub struct LedPlayerStatic {
    commands: Channel<CriticalSectionRawMutex, LedCommand, 8>,
    intensity: SharedIntensity,
}

impl LedPlayerStatic {
    const fn new() -> Self {
        Self {
            commands: Channel::new(),
            intensity: SharedIntensity::new(),
        }
    }
}

/// Handle to the LED task.
pub struct LedPlayer {
    led_player_static: &'static LedPlayerStatic,
}

impl LedPlayer {
    /// Create static resources for an LED player.
    #[must_use]
    pub const fn new_static() -> LedPlayerStatic {
        LedPlayerStatic::new()
    }

    /// Build the controller over `writer` and spawn the task that updates it every 20 ms.
    ///
    /// See the [module example](self) for usage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a bad `config` and [`Error::TaskSpawn`] if the
    /// task is already running.
    pub fn new(
        led_player_static: &'static LedPlayerStatic,
        config: LedConfig,
        writer: PwmLedWriter<'static>,
        spawner: Spawner,
    ) -> Result<Self> {
        let controller = LedIntensityController::new(config, writer)?;
        spawner.spawn(led_task(led_player_static, controller))?;
        Ok(Self { led_player_static })
    }

    /// Where the audio player should publish intensity for these LEDs.
    #[must_use]
    pub fn intensity_listener(&self) -> &'static dyn IntensityListener {
        &self.led_player_static.intensity
    }

    /// Switch effect.
    pub fn set_effect(&self, pattern: EffectPattern) {
        self.send(LedCommand::Effect(pattern));
    }

    /// Scale all effect output by `brightness` in `[0, 1]`.
    pub fn set_brightness(&self, brightness: f32) {
        self.send(LedCommand::Brightness(brightness));
    }

    /// Fix one channel's brightness, or hand it back to the effect with `None`.
    pub fn set_channel_brightness(&self, channel: usize, brightness: Option<u16>) {
        self.send(LedCommand::Channel {
            channel,
            brightness,
        });
    }

    /// Resume rendering.
    pub fn turn_on(&self) {
        self.send(LedCommand::On);
    }

    /// Go dark.
    pub fn turn_off(&self) {
        self.send(LedCommand::Off);
    }

    fn send(&self, command: LedCommand) {
        if self.led_player_static.commands.try_send(command).is_err() {
            warn!("led command queue full; command dropped");
        }
    }
}

#[embassy_executor::task]
async fn led_task(
    led_player_static: &'static LedPlayerStatic,
    controller: LedIntensityController<PwmLedWriter<'static>>,
) -> ! {
    device_loop(led_player_static, controller).await
}

async fn device_loop(
    led_player_static: &'static LedPlayerStatic,
    mut controller: LedIntensityController<PwmLedWriter<'static>>,
) -> ! {
    let mut ticker = Ticker::every(UPDATE_PERIOD);
    let mut last = Instant::now();
    loop {
        while let Ok(command) = led_player_static.commands.try_receive() {
            match command {
                LedCommand::Effect(pattern) => {
                    info!("led effect {}", pattern);
                    controller.set_effect(pattern);
                }
                LedCommand::Brightness(brightness) => controller.set_brightness(brightness),
                LedCommand::Channel {
                    channel,
                    brightness,
                } => {
                    if let Err(err) = controller.set_channel_brightness(channel, brightness) {
                        warn!("led channel {}: {}", channel, err);
                    }
                }
                LedCommand::On => controller.turn_on(),
                LedCommand::Off => controller.turn_off(),
            }
        }
        controller.update_audio_intensity(led_player_static.intensity.load());
        let now = Instant::now();
        controller.update(now - last);
        last = now;
        ticker.next().await;
    }
}
