#![allow(missing_docs)]
//! Host-level tests for clock divider planning.

use dalek_voice::clock_plan::{
    BitDepth, ClockDivider, ClockRequest, MAX_RATE_DEVIATION, plan_clocks, validate_sync,
};
use dalek_voice::transport::{StreamHandle, TransportConfig};
use dalek_voice::{ClockError, ConfigError, Error};

const RP2040_CLOCK_HZ: u32 = 125_000_000;
const RP2350_CLOCK_HZ: u32 = 150_000_000;
const SAMPLE_RATES: [u32; 7] = [8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000];

#[test]
fn sweep_with_system_clock_stays_within_tolerance_and_locked() {
    for base_clock_hz in [RP2040_CLOCK_HZ, RP2350_CLOCK_HZ] {
        for sample_rate_hz in SAMPLE_RATES {
            for multiplier in [256, 384] {
                let request = ClockRequest::new(sample_rate_hz, BitDepth::Bits16, multiplier, true);
                let plan = plan_clocks(&request, base_clock_hz)
                    .unwrap_or_else(|err| panic!("{sample_rate_hz} Hz x{multiplier}: {err}"));

                let requested = sample_rate_hz as f32;
                let deviation = (plan.actual_sample_rate_hz() - requested).abs() / requested;
                assert!(
                    deviation <= MAX_RATE_DEVIATION,
                    "{sample_rate_hz} Hz x{multiplier} deviates by {deviation}"
                );

                let system_clock_hz = plan.system_clock_hz().expect("system clock requested");
                let ratio = system_clock_hz / plan.bit_clock_hz();
                assert!((ratio - ratio.round()).abs() < 0.001, "ratio {ratio}");
                assert!(validate_sync(&plan).is_ok());
            }
        }
    }
}

#[test]
fn sweep_without_system_clock_has_no_system_divider() {
    for sample_rate_hz in SAMPLE_RATES {
        let request = ClockRequest::new(sample_rate_hz, BitDepth::Bits16, 256, false);
        let plan = plan_clocks(&request, RP2040_CLOCK_HZ).expect("reachable rate");
        assert_eq!(plan.system_clock_divider(), None);
        assert_eq!(plan.system_clock_hz(), None);
        // 16-bit stereo: 32 bit clocks per frame.
        let frame_rate = plan.bit_clock_hz() / 32.0;
        assert!((frame_rate - plan.actual_sample_rate_hz()).abs() < 0.05);
    }
}

#[test]
fn bit_clock_divider_is_exact_multiple_of_system_divider() {
    let request = ClockRequest::new(22_050, BitDepth::Bits16, 256, true);
    let plan = plan_clocks(&request, RP2040_CLOCK_HZ).expect("reachable rate");
    let system = plan.system_clock_divider().expect("system clock requested");
    // 256 * 2 system cycles per frame vs 16 * 2 * 2 bit cycles per frame.
    assert_eq!(plan.bit_clock_divider().to_q8(), system.to_q8() * 8);
}

#[test]
fn default_configuration_plans_near_22050() {
    let config = TransportConfig::DEFAULT;
    let plan = plan_clocks(&config.clock_request(), RP2040_CLOCK_HZ).expect("default is reachable");
    assert!((plan.actual_sample_rate_hz() - 22_050.0).abs() < 22.05);

    let handle = StreamHandle::new(&plan, config.buffer_frame_count);
    assert_eq!(handle.frames_per_half, 64);
    // 64 frames at ~22.05 kHz is ~2.9 ms.
    let period_us = handle.buffer_period.as_micros();
    assert!((2_890..=2_915).contains(&period_us), "{period_us}");
}

#[test]
fn zero_inputs_are_rejected() {
    let zero_rate = ClockRequest::new(0, BitDepth::Bits16, 256, true);
    assert_eq!(
        plan_clocks(&zero_rate, RP2040_CLOCK_HZ),
        Err(Error::ClockConfiguration(ClockError::ZeroSampleRate))
    );
    let zero_multiplier = ClockRequest::new(22_050, BitDepth::Bits16, 0, true);
    assert_eq!(
        plan_clocks(&zero_multiplier, RP2040_CLOCK_HZ),
        Err(Error::ClockConfiguration(ClockError::ZeroMultiplier))
    );
}

#[test]
fn non_integral_clock_ratio_is_rejected() {
    // 100 * 2 system cycles per frame is not a multiple of 64 bit-clock cycles.
    let request = ClockRequest::new(22_050, BitDepth::Bits16, 100, true);
    assert_eq!(
        plan_clocks(&request, RP2040_CLOCK_HZ),
        Err(Error::ClockConfiguration(ClockError::NotPhaseLocked))
    );
}

#[test]
fn unreachable_rates_report_divider_out_of_range() {
    let too_slow = ClockRequest::new(1, BitDepth::Bits16, 256, false);
    assert!(matches!(
        plan_clocks(&too_slow, RP2040_CLOCK_HZ),
        Err(Error::ClockConfiguration(ClockError::DividerOutOfRange { .. }))
    ));
    let too_fast = ClockRequest::new(1_000_000, BitDepth::Bits32, 384, true);
    assert!(matches!(
        plan_clocks(&too_fast, RP2040_CLOCK_HZ),
        Err(Error::ClockConfiguration(ClockError::DividerOutOfRange { .. }))
    ));
}

#[test]
fn divider_range_and_fixed_conversion() {
    assert!(ClockDivider::from_q8(255, 1).is_err());
    assert!(ClockDivider::from_q8(0x100_0000, 1).is_err());
    let divider = ClockDivider::from_q8(3 * 256 + 128, 1).expect("3.5 is in range");
    assert_eq!(divider.integer(), 3);
    assert_eq!(divider.fraction(), 128);
    assert_eq!(divider.to_fixed().to_bits(), 3 * 256 + 128);
}

#[test]
fn bit_depth_parsing() {
    assert_eq!(BitDepth::from_bits(16), Some(BitDepth::Bits16));
    assert_eq!(BitDepth::from_bits(32), Some(BitDepth::Bits32));
    assert_eq!(BitDepth::from_bits(8), None);
    assert_eq!(BitDepth::Bits24.bits(), 24);
}

#[test]
fn transport_config_validation() {
    assert!(TransportConfig::DEFAULT.validate().is_ok());

    let conflict = TransportConfig {
        system_clock_pin: Some(9),
        ..TransportConfig::DEFAULT
    };
    assert_eq!(
        conflict.validate(),
        Err(Error::InvalidConfig(ConfigError::PinConflict { pin: 9 }))
    );

    let capture_ok = TransportConfig {
        capture_pin: Some(7),
        ..TransportConfig::DEFAULT
    };
    assert!(capture_ok.validate().is_ok());

    let capture_far = TransportConfig {
        capture_pin: Some(5),
        ..TransportConfig::DEFAULT
    };
    assert_eq!(
        capture_far.validate(),
        Err(Error::InvalidConfig(ConfigError::CapturePinNotAdjacent))
    );

    let empty_buffers = TransportConfig {
        buffer_frame_count: 0,
        ..TransportConfig::DEFAULT
    };
    assert_eq!(
        empty_buffers.validate(),
        Err(Error::InvalidConfig(ConfigError::BufferGeometry))
    );

    let off_chip = TransportConfig {
        data_pin: 60,
        ..TransportConfig::DEFAULT
    };
    assert!(matches!(
        off_chip.validate(),
        Err(Error::InvalidConfig(ConfigError::PinOutOfRange { pin: 60 }))
    ));
}
