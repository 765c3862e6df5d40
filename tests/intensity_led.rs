#![allow(missing_docs)]
//! Host-level tests for intensity analysis, the LED controller and the status LED.

use core::f32::consts::PI;

use dalek_voice::intensity::{
    AudioIntensityAnalyzer, IntensityListener, IntensityState, SharedIntensity, mean_square,
};
use dalek_voice::led::{
    DutyWriter, EffectPattern, LedConfig, LedIntensityController, PWM_TOP, display_curve,
    effect_brightness, effect_modulation, fade_toward,
};
use dalek_voice::status_led::{LedStatus, StatusLed, status_level};
use dalek_voice::transport::Frame;
use dalek_voice::{ConfigError, Error};
use embassy_time::{Duration, Instant};

fn close(actual: f32, expected: f32) -> bool {
    (actual - expected).abs() < 1e-4
}

#[derive(Default)]
struct RecordingWriter {
    duties: [u16; 4],
    enabled: bool,
    writes: usize,
}

impl DutyWriter for RecordingWriter {
    fn set_duty(&mut self, channel: usize, duty: u16) {
        self.duties[channel] = duty;
        self.writes += 1;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

// ============================================================================
// Intensity
// ============================================================================

#[test]
fn mean_square_uses_top_sixteen_bits() {
    assert_eq!(mean_square(&[]), 0);
    let frames = [Frame::mono(1_000 << 16), Frame::mono(-1_000 << 16)];
    assert_eq!(mean_square(&frames), 1_000_000);
    // Low 16 bits do not contribute.
    assert_eq!(mean_square(&[Frame::mono(0xFFFF); 4]), 0);
    // Only the left channel is measured.
    assert_eq!(mean_square(&[Frame::new(0, i32::MAX); 4]), 0);
}

#[test]
fn analyzer_scales_rms_and_clips() {
    let analyzer = AudioIntensityAnalyzer::DEFAULT;
    assert_eq!(analyzer, AudioIntensityAnalyzer::default());
    assert!(close(
        analyzer.intensity_from_mean_square(1_000_000),
        1_000.0 / 32_768.0 * 3.0
    ));
    assert!(close(analyzer.analyze(&[Frame::mono(i32::MAX); 16]), 1.0));
    assert!(close(analyzer.analyze(&[Frame::SILENCE; 16]), 0.0));
    assert!(close(AudioIntensityAnalyzer::with_gain(-1.0).intensity_from_mean_square(1 << 20), 0.0));
}

#[test]
fn impulse_decays_strictly_to_exact_zero() {
    let mut state = IntensityState::new();
    assert!(close(state.update(1.0), 0.3));
    assert!(close(state.raw(), 1.0));
    assert!(close(state.update(1.0), 0.51));

    let mut previous = state.smoothed();
    let mut steps = 0;
    while state.smoothed() > 0.0 {
        let next = state.decay();
        assert!(next < previous || next.to_bits() == 0, "{next} did not drop below {previous}");
        previous = next;
        steps += 1;
        assert!(steps < 100, "decay never reached zero");
    }
    assert_eq!(state.smoothed().to_bits(), 0.0_f32.to_bits());
    assert_eq!(state.raw().to_bits(), 0.0_f32.to_bits());
}

#[test]
fn intensity_state_clips_inputs_and_clears() {
    let mut state = IntensityState::new();
    state.update(5.0);
    assert!(close(state.raw(), 1.0));
    state.update(f32::NAN);
    assert!(close(state.raw(), 0.0));
    assert!((0.0..=1.0).contains(&state.smoothed()));
    state.clear();
    assert_eq!(state, IntensityState::new());
}

#[test]
fn shared_intensity_is_a_listener() {
    let shared = SharedIntensity::new();
    assert!(close(shared.load(), 0.0));
    let listener: &dyn IntensityListener = &shared;
    listener.on_intensity(0.625);
    assert!(close(shared.load(), 0.625));
}

// ============================================================================
// LED math
// ============================================================================

#[test]
fn fade_moves_a_fraction_and_never_overshoots() {
    assert_eq!(fade_toward(0, 1_000, 8), 31);
    assert_eq!(fade_toward(1_000, 0, 8), 969);
    assert_eq!(fade_toward(0, 10, 8), 1);
    assert_eq!(fade_toward(10, 0, 8), 9);
    assert_eq!(fade_toward(500, 500, 8), 500);
    assert_eq!(fade_toward(0, PWM_TOP, 255), 65_279);
    assert_eq!(fade_toward(PWM_TOP - 1, PWM_TOP, 255), PWM_TOP);
}

#[test]
fn display_curve_applies_deadzone_and_gamma() {
    assert!(close(display_curve(0.05, 0.05, 2.5), 0.0));
    assert!(close(display_curve(0.01, 0.05, 2.5), 0.0));
    assert!(close(display_curve(1.0, 0.05, 2.5), 1.0));
    assert!(close(display_curve(0.525, 0.05, 1.0), 0.5));
    assert!(close(display_curve(0.5, 0.0, 2.0), 0.25));
    assert!(close(display_curve(f32::NAN, 0.05, 2.5), 0.0));
}

#[test]
fn effects_follow_their_formulas() {
    assert_eq!(effect_modulation(EffectPattern::Off, 1.0, 0, 1.0), None);
    assert!(close(effect_modulation(EffectPattern::Pulse, 3.0, 1, 0.0).unwrap(), 0.2));
    assert!(close(effect_modulation(EffectPattern::Pulse, 3.0, 1, 1.0).unwrap(), 1.0));

    // A quarter turn in: LED 0 at the top of its swing, LED 1 at the bottom.
    let t = PI / 4.0;
    assert!(close(effect_modulation(EffectPattern::Alternate, t, 0, 1.0).unwrap(), 1.0));
    assert!(close(effect_modulation(EffectPattern::Alternate, t, 1, 1.0).unwrap(), 0.4));

    assert!(close(effect_modulation(EffectPattern::Wave, 0.0, 0, 0.0).unwrap(), 0.1));
    assert!(close(effect_modulation(EffectPattern::Breathe, 0.0, 0, 0.0).unwrap(), 0.3));

    let config = LedConfig::DEFAULT;
    assert_eq!(effect_brightness(&config, EffectPattern::Off, 0.0, 0, 1.0), 0);
    assert_eq!(effect_brightness(&config, EffectPattern::Pulse, 0.0, 0, 0.0), 13_907);
    assert_eq!(effect_brightness(&config, EffectPattern::Pulse, 0.0, 0, 1.0), PWM_TOP);
    for led in 0..4 {
        for step in 0..50 {
            let elapsed = step as f32 * 0.37;
            let level = effect_brightness(&config, EffectPattern::Wave, elapsed, led, 1.0);
            assert!((config.min_brightness..=config.max_brightness).contains(&level));
        }
    }
}

#[test]
fn led_config_validation() {
    assert!(LedConfig::DEFAULT.validate().is_ok());

    let none = LedConfig {
        channel_count: 0,
        ..LedConfig::DEFAULT
    };
    assert_eq!(
        none.validate(),
        Err(Error::InvalidConfig(ConfigError::LedChannelCount))
    );
    let five = LedConfig {
        channel_count: 5,
        ..LedConfig::DEFAULT
    };
    assert!(five.validate().is_err());

    let inverted_range = LedConfig {
        min_brightness: 2_000,
        max_brightness: 1_000,
        ..LedConfig::DEFAULT
    };
    assert_eq!(
        inverted_range.validate(),
        Err(Error::InvalidConfig(ConfigError::BrightnessRange))
    );

    let shared_pin = LedConfig {
        channel_count: 3,
        pins: [11, 12, 11, 14],
        ..LedConfig::DEFAULT
    };
    assert_eq!(
        shared_pin.validate(),
        Err(Error::InvalidConfig(ConfigError::PinConflict { pin: 11 }))
    );
    // Unused pin slots are not checked.
    let two = LedConfig {
        pins: [11, 12, 12, 12],
        ..LedConfig::DEFAULT
    };
    assert!(two.validate().is_ok());

    assert!(LedIntensityController::new(none, RecordingWriter::default()).is_err());
}

// ============================================================================
// LED controller
// ============================================================================

fn controller() -> LedIntensityController<RecordingWriter> {
    LedIntensityController::new(LedConfig::DEFAULT, RecordingWriter::default())
        .expect("default config is valid")
}

#[test]
fn controller_starts_dark_and_enabled() {
    let controller = controller();
    assert!(controller.is_enabled());
    assert!(controller.writer().enabled);
    assert_eq!(controller.writer().duties, [0; 4]);
    assert_eq!(controller.writer().writes, 2);
    assert_eq!(controller.effect(), EffectPattern::Pulse);
    assert_eq!(controller.channel_brightness(0), Some(0));
    assert_eq!(controller.channel_brightness(2), None);
}

#[test]
fn controller_fades_toward_effect_target() {
    let mut controller = controller();
    controller.update_audio_intensity(0.0);
    controller.update(Duration::from_millis(20));
    assert_eq!(controller.channel_brightness(0), Some(434));
    assert_eq!(controller.writer().duties[0], 434);

    for _ in 0..500 {
        controller.update(Duration::from_millis(20));
    }
    assert_eq!(controller.channel_brightness(0), Some(13_907));
    assert_eq!(controller.channel_brightness(1), Some(13_907));
    // Unconfigured channels are never written.
    assert_eq!(controller.writer().duties, [13_907, 13_907, 0, 0]);
}

#[test]
fn display_level_holds_peaks() {
    let mut controller = controller();
    for _ in 0..200 {
        controller.update_audio_intensity(1.0);
    }
    assert!(controller.smoothed_intensity() > 0.99);
    let peak = controller.display_level();
    assert!(peak > 0.97);

    let next = controller.update_audio_intensity(0.0);
    assert!(close(next, peak * 0.92));

    let mut quiet = controller.smoothed_intensity();
    for _ in 0..200 {
        controller.update_audio_intensity(0.0);
        assert!(controller.smoothed_intensity() <= quiet);
        quiet = controller.smoothed_intensity();
    }
    assert!(controller.display_level() < 1e-3);
}

#[test]
fn inverted_output_writes_complement() {
    let config = LedConfig {
        invert_output: true,
        ..LedConfig::DEFAULT
    };
    let mut controller =
        LedIntensityController::new(config, RecordingWriter::default()).expect("valid config");
    assert_eq!(controller.writer().duties, [PWM_TOP, PWM_TOP, 0, 0]);
    controller.update(Duration::from_millis(20));
    assert_eq!(controller.channel_brightness(0), Some(434));
    assert_eq!(controller.writer().duties[0], PWM_TOP - 434);
}

#[test]
fn manual_channel_brightness_overrides_effect() {
    let mut controller = controller();
    controller
        .set_channel_brightness(1, Some(u16::MAX))
        .expect("channel 1 exists");
    assert_eq!(
        controller.set_channel_brightness(2, Some(1)),
        Err(Error::InvalidConfig(ConfigError::LedChannelCount))
    );
    for _ in 0..500 {
        controller.update(Duration::from_millis(20));
    }
    assert_eq!(controller.channel_brightness(1), Some(PWM_TOP));
    assert_eq!(controller.channel_brightness(0), Some(13_907));

    // Changing effect releases the override.
    controller.set_effect(EffectPattern::Pulse);
    for _ in 0..500 {
        controller.update(Duration::from_millis(20));
    }
    assert_eq!(controller.channel_brightness(1), Some(13_907));
}

#[test]
fn brightness_scale_dims_effects() {
    let mut controller = controller();
    controller.set_brightness(0.0);
    for _ in 0..10 {
        controller.update(Duration::from_millis(20));
    }
    assert_eq!(controller.channel_brightness(0), Some(0));

    controller.set_brightness(f32::NAN);
    controller.update(Duration::from_millis(20));
    assert_eq!(controller.channel_brightness(0), Some(0));
}

#[test]
fn turning_off_goes_dark_and_freezes() {
    let mut controller = controller();
    for _ in 0..20 {
        controller.update(Duration::from_millis(20));
    }
    assert!(controller.channel_brightness(0).unwrap() > 0);

    controller.turn_off();
    assert!(!controller.is_enabled());
    assert!(!controller.writer().enabled);
    assert_eq!(controller.writer().duties, [0; 4]);
    let writes = controller.writer().writes;
    controller.update(Duration::from_millis(20));
    assert_eq!(controller.writer().writes, writes);

    controller.turn_on();
    assert!(controller.writer().enabled);
    controller.update(Duration::from_millis(20));
    assert_eq!(controller.channel_brightness(0), Some(434));

    controller.set_effect(EffectPattern::Off);
    assert_eq!(controller.effect(), EffectPattern::Off);
    assert!(!controller.is_enabled());
    assert_eq!(controller.writer().duties, [0; 4]);
}

// ============================================================================
// Status LED
// ============================================================================

#[test]
fn status_levels_follow_their_patterns() {
    assert!(close(status_level(LedStatus::Off, Duration::from_millis(123)), 0.0));
    assert!(close(status_level(LedStatus::On, Duration::from_millis(123)), 1.0));

    assert!(close(status_level(LedStatus::Breathing, Duration::from_millis(0)), 0.0));
    assert!(close(status_level(LedStatus::Breathing, Duration::from_millis(500)), 0.5));
    assert!(close(status_level(LedStatus::Breathing, Duration::from_millis(1_000)), 1.0));
    assert!(close(status_level(LedStatus::Breathing, Duration::from_millis(2_000)), 0.0));

    assert!(close(status_level(LedStatus::FastBlink, Duration::from_millis(0)), 1.0));
    assert!(close(status_level(LedStatus::FastBlink, Duration::from_millis(150)), 0.0));
    assert!(close(status_level(LedStatus::FastBlink, Duration::from_millis(250)), 1.0));
    assert!(close(status_level(LedStatus::SlowBlink, Duration::from_millis(499)), 1.0));
    assert!(close(status_level(LedStatus::SlowBlink, Duration::from_millis(600)), 0.0));
}

#[test]
fn status_led_keeps_phase_for_repeated_status() {
    let mut status = StatusLed::new(RecordingWriter::default());
    assert_eq!(status.status(), LedStatus::Off);
    assert!(status.writer().enabled);
    assert_eq!(status.update(Instant::from_millis(10)), 0);

    status.set_status(LedStatus::FastBlink, Instant::from_millis(1_000));
    assert_eq!(status.update(Instant::from_millis(1_050)), PWM_TOP);
    assert_eq!(status.update(Instant::from_millis(1_150)), 0);
    assert_eq!(status.duty(), 0);
    assert_eq!(status.writer().duties[0], 0);

    status.set_status(LedStatus::FastBlink, Instant::from_millis(1_160));
    assert_eq!(status.update(Instant::from_millis(1_210)), PWM_TOP);

    // Idempotent for the same instant.
    assert_eq!(status.update(Instant::from_millis(1_210)), PWM_TOP);
    // An instant before the status change reads as its start.
    assert_eq!(status.update(Instant::from_millis(900)), PWM_TOP);

    status.set_status(LedStatus::On, Instant::from_millis(2_000));
    assert_eq!(status.update(Instant::from_millis(2_000)), PWM_TOP);
    assert_eq!(status.writer().duties[0], PWM_TOP);
}
