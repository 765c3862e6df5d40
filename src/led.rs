//! Audio-reactive PWM LEDs.
//!
//! [`LedIntensityController`] turns the published audio intensity into per-channel duty
//! cycles for one to four LEDs:
//!
//! 1. [`update_audio_intensity`](LedIntensityController::update_audio_intensity) low-pass
//!    filters the raw value (`k = 0.15`), then applies a deadzone, a gamma curve and a
//!    peak-hold decay to get the display level.
//! 2. [`update`](LedIntensityController::update) evaluates the active [`EffectPattern`] per
//!    LED, fades each channel toward its target and writes the duty cycles through a
//!    [`DutyWriter`].
//!
//! The hardware writer and the LED task live in [`pwm`] (embedded builds only); host tests
//! drive the controller with a recording writer.
//!
//! # Effects
//!
//! Each pattern is a pure function of elapsed seconds, LED index and intensity, mapped into
//! `[min_brightness, max_brightness]`:
//!
//! | Pattern | Modulation |
//! | --- | --- |
//! | `Pulse` | `i * 0.8 + 0.2` |
//! | `Alternate` | `s(2t + n*pi) * i * 0.6 + i * 0.3 + 0.1` |
//! | `Wave` | `s(1.5t + n*pi/2) * i * 0.7 + i * 0.2 + 0.1` |
//! | `Breathe` | `s(0.5t) * 0.4 + i * 0.5 + 0.1` |
//!
//! where `s(x) = (sin x + 1) / 2`.

use core::f32::consts::PI;

use embassy_time::Duration;

use crate::transport::GPIO_COUNT;
use crate::{ConfigError, Result};

#[cfg(not(feature = "host"))]
pub mod pwm;

/// Most LED channels one controller drives.
pub const MAX_LED_CHANNELS: usize = 4;

/// PWM counter wrap value (16-bit resolution).
pub const PWM_TOP: u16 = 65_535;

/// PWM carrier frequency.
pub const PWM_FREQUENCY_HZ: u32 = 1_000;

/// Rate the LED task runs [`LedIntensityController::update`] at.
pub const UPDATE_PERIOD: Duration = Duration::from_millis(20);

/// Static LED settings.
#[derive(Clone, Copy, Debug, PartialEq, defmt::Format)]
pub struct LedConfig {
    /// Channels in use, `1..=4`.
    pub channel_count: u8,
    /// GPIO of each channel; entries past `channel_count` are ignored.
    pub pins: [u8; MAX_LED_CHANNELS],
    /// Brightest duty cycle.
    pub max_brightness: u16,
    /// Dimmest duty cycle while an effect is running.
    pub min_brightness: u16,
    /// Fraction (of 256) of the remaining distance covered per update.
    pub fade_speed: u8,
    /// Invert duty cycles for common-anode wiring.
    pub invert_output: bool,
    /// Low-pass factor for incoming intensity.
    pub smoothing: f32,
    /// Exponent of the display curve.
    pub gamma: f32,
    /// Smoothed intensities below this display as zero.
    pub deadzone: f32,
    /// Per-update factor the held peak decays by.
    pub peak_decay: f32,
}

impl LedConfig {
    /// The robot's two head lights on GPIO 11 and 12.
    pub const DEFAULT: Self = Self {
        channel_count: 2,
        pins: [11, 12, 13, 14],
        max_brightness: PWM_TOP,
        min_brightness: 1_000,
        fade_speed: 8,
        invert_output: false,
        smoothing: 0.15,
        gamma: 2.5,
        deadzone: 0.05,
        peak_decay: 0.92,
    };

    /// Channels in use as an index bound.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channel_count as usize
    }

    /// Check channel count, brightness range and pins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) for a channel count outside
    /// `1..=4`, a minimum above the maximum, or a missing/repeated pin.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LED_CHANNELS).contains(&self.channels()) {
            return Err(ConfigError::LedChannelCount.into());
        }
        if self.min_brightness > self.max_brightness {
            return Err(ConfigError::BrightnessRange.into());
        }
        let pins = self.pins.get(..self.channels()).unwrap_or_default();
        for (index, &pin) in pins.iter().enumerate() {
            if pin >= GPIO_COUNT {
                return Err(ConfigError::PinOutOfRange { pin }.into());
            }
            if pins.get(..index).unwrap_or_default().contains(&pin) {
                return Err(ConfigError::PinConflict { pin }.into());
            }
        }
        Ok(())
    }
}

impl Default for LedConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How the LEDs follow the audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum EffectPattern {
    /// All dark.
    Off,
    /// Every LED follows the intensity together.
    Pulse,
    /// Neighbouring LEDs swing in opposite phase.
    Alternate,
    /// A wave travels across the LEDs.
    Wave,
    /// Slow breathing with the intensity layered on top.
    Breathe,
}

/// Modulation of one LED in `[0, 1]` before mapping to brightness. `None` for [`EffectPattern::Off`].
#[must_use]
pub fn effect_modulation(
    pattern: EffectPattern,
    elapsed_s: f32,
    led_index: usize,
    intensity: f32,
) -> Option<f32> {
    #[expect(clippy::cast_precision_loss, reason = "at most four LEDs")]
    let led = led_index as f32;
    let modulation = match pattern {
        EffectPattern::Off => return None,
        EffectPattern::Pulse => intensity * 0.8 + 0.2,
        EffectPattern::Alternate => {
            let sine = unit_sine(elapsed_s * 2.0 + led * PI);
            sine * intensity * 0.6 + intensity * 0.3 + 0.1
        }
        EffectPattern::Wave => {
            let wave = unit_sine(elapsed_s * 1.5 + led * PI * 0.5);
            wave * intensity * 0.7 + intensity * 0.2 + 0.1
        }
        EffectPattern::Breathe => {
            let breath = unit_sine(elapsed_s * 0.5);
            breath * 0.4 + intensity * 0.5 + 0.1
        }
    };
    Some(modulation)
}

/// Brightness of one LED for `pattern`, clamped to the configured range. Off is zero.
#[must_use]
pub fn effect_brightness(
    config: &LedConfig,
    pattern: EffectPattern,
    elapsed_s: f32,
    led_index: usize,
    intensity: f32,
) -> u16 {
    let Some(modulation) = effect_modulation(pattern, elapsed_s, led_index, intensity) else {
        return 0;
    };
    let span = f32::from(config.max_brightness.saturating_sub(config.min_brightness));
    let level = f32::from(config.min_brightness) + span * modulation;
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped to the u16 brightness range"
    )]
    let brightness = level.clamp(
        f32::from(config.min_brightness),
        f32::from(config.max_brightness),
    ) as u16;
    brightness
}

/// One fade step from `current` toward `target`.
///
/// Moves `diff * fade_speed / 256`, at least one count, and never past the target.
#[must_use]
pub fn fade_toward(current: u16, target: u16, fade_speed: u8) -> u16 {
    let diff = i32::from(target) - i32::from(current);
    if diff == 0 {
        return current;
    }
    let mut step = diff * i32::from(fade_speed) / 256;
    if step == 0 {
        step = diff.signum();
    }
    let next = i32::from(current) + step;
    let next = if diff > 0 {
        next.min(i32::from(target))
    } else {
        next.max(i32::from(target))
    };
    u16::try_from(next).unwrap_or(target)
}

/// Deadzone, then gamma: `((x - dz) / (1 - dz))^gamma`, zero below the deadzone.
#[must_use]
pub fn display_curve(smoothed: f32, deadzone: f32, gamma: f32) -> f32 {
    if smoothed.is_nan() || smoothed <= deadzone {
        return 0.0;
    }
    let span = 1.0 - deadzone;
    let normalized = if span > 0.0 {
        ((smoothed - deadzone) / span).clamp(0.0, 1.0)
    } else {
        1.0
    };
    libm::powf(normalized, gamma).clamp(0.0, 1.0)
}

fn unit_sine(phase: f32) -> f32 {
    (libm::sinf(phase) + 1.0) * 0.5
}

// ============================================================================
// Controller
// ============================================================================

/// Writes duty cycles to the LED hardware.
pub trait DutyWriter {
    /// Set the compare value of `channel` (already inverted if configured).
    fn set_duty(&mut self, channel: usize, duty: u16);

    /// Enable or disable all PWM outputs.
    fn set_enabled(&mut self, enabled: bool);
}

/// Smooths audio intensity and renders it onto LEDs.
pub struct LedIntensityController<W: DutyWriter> {
    config: LedConfig,
    writer: W,
    pattern: EffectPattern,
    enabled: bool,
    smoothed: f32,
    display: f32,
    brightness_scale: f32,
    overrides: [Option<u16>; MAX_LED_CHANNELS],
    current: [u16; MAX_LED_CHANNELS],
    target: [u16; MAX_LED_CHANNELS],
    elapsed_s: f32,
}

impl<W: DutyWriter> LedIntensityController<W> {
    /// Validate `config`, switch all channels dark and enable the outputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if
    /// [`LedConfig::validate`] fails.
    pub fn new(config: LedConfig, writer: W) -> Result<Self> {
        config.validate()?;
        let mut controller = Self {
            config,
            writer,
            pattern: EffectPattern::Pulse,
            enabled: true,
            smoothed: 0.0,
            display: 0.0,
            brightness_scale: 1.0,
            overrides: [None; MAX_LED_CHANNELS],
            current: [0; MAX_LED_CHANNELS],
            target: [0; MAX_LED_CHANNELS],
            elapsed_s: 0.0,
        };
        controller.apply();
        controller.writer.set_enabled(true);
        Ok(controller)
    }

    /// Feed a new raw intensity in `[0, 1]`. Returns the new display level.
    ///
    /// `smoothed = smoothed * (1 - k) + raw * k`; the display level rises instantly to the
    /// curved value and otherwise decays by `peak_decay` per call.
    pub fn update_audio_intensity(&mut self, raw: f32) -> f32 {
        let raw = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
        let k = self.config.smoothing;
        self.smoothed = (self.smoothed * (1.0 - k) + raw * k).clamp(0.0, 1.0);
        let curved = display_curve(self.smoothed, self.config.deadzone, self.config.gamma);
        self.display = curved.max(self.display * self.config.peak_decay);
        self.display
    }

    /// Low-pass filtered intensity.
    #[must_use]
    pub const fn smoothed_intensity(&self) -> f32 {
        self.smoothed
    }

    /// Intensity after deadzone, gamma and peak hold; what the effects render.
    #[must_use]
    pub const fn display_level(&self) -> f32 {
        self.display
    }

    /// Advance effects by `elapsed`, fade toward the new targets and write the outputs.
    /// Does nothing while turned off.
    pub fn update(&mut self, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        #[expect(clippy::cast_precision_loss, reason = "update intervals are short")]
        let elapsed_s = elapsed.as_micros() as f32 / 1_000_000.0;
        self.elapsed_s += elapsed_s;

        let channels = self.config.channels();
        for (index, (target, manual)) in self
            .target
            .iter_mut()
            .zip(&self.overrides)
            .take(channels)
            .enumerate()
        {
            *target = manual.unwrap_or_else(|| {
                let level = effect_brightness(
                    &self.config,
                    self.pattern,
                    self.elapsed_s,
                    index,
                    self.display,
                );
                scale(level, self.brightness_scale)
            });
        }
        for (current, target) in self.current.iter_mut().zip(&self.target).take(channels) {
            *current = fade_toward(*current, *target, self.config.fade_speed);
        }
        self.apply();
    }

    /// Switch effect. Restarts its phase and clears manual channel overrides; `Off` also turns
    /// the LEDs off.
    pub fn set_effect(&mut self, pattern: EffectPattern) {
        self.pattern = pattern;
        self.elapsed_s = 0.0;
        self.overrides = [None; MAX_LED_CHANNELS];
        if pattern == EffectPattern::Off {
            self.turn_off();
        }
    }

    /// Active effect.
    #[must_use]
    pub const fn effect(&self) -> EffectPattern {
        self.pattern
    }

    /// Scale all effect output by `brightness` in `[0, 1]` (NaN is 0).
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness_scale = if brightness.is_nan() {
            0.0
        } else {
            brightness.clamp(0.0, 1.0)
        };
    }

    /// Pin `channel` to a fixed brightness (clamped to `max_brightness`), or return it to the
    /// effect with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) for a channel that is not
    /// configured.
    pub fn set_channel_brightness(&mut self, channel: usize, brightness: Option<u16>) -> Result<()> {
        if channel >= self.config.channels() {
            return Err(ConfigError::LedChannelCount.into());
        }
        let max = self.config.max_brightness;
        let slot = self
            .overrides
            .get_mut(channel)
            .ok_or(ConfigError::LedChannelCount)?;
        *slot = brightness.map(|level| level.min(max));
        Ok(())
    }

    /// Go dark immediately and stop updating.
    pub fn turn_off(&mut self) {
        self.enabled = false;
        self.current = [0; MAX_LED_CHANNELS];
        self.target = [0; MAX_LED_CHANNELS];
        self.apply();
        self.writer.set_enabled(false);
    }

    /// Resume updating; brightness fades in from dark.
    pub fn turn_on(&mut self) {
        self.enabled = true;
        self.writer.set_enabled(true);
    }

    /// Whether [`update`](Self::update) renders.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Brightness currently shown on `channel` (before inversion).
    #[must_use]
    pub fn channel_brightness(&self, channel: usize) -> Option<u16> {
        (channel < self.config.channels())
            .then(|| self.current.get(channel).copied())
            .flatten()
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &LedConfig {
        &self.config
    }

    /// The duty writer.
    #[must_use]
    pub const fn writer(&self) -> &W {
        &self.writer
    }

    fn apply(&mut self) {
        let invert = self.config.invert_output;
        for (channel, &level) in self.current.iter().enumerate().take(self.config.channels()) {
            let duty = if invert { PWM_TOP.saturating_sub(level) } else { level };
            self.writer.set_duty(channel, duty);
        }
    }
}

fn scale(level: u16, factor: f32) -> u16 {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "factor is within [0, 1]"
    )]
    let scaled = (f32::from(level) * factor) as u16;
    scaled
}
