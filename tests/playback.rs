#![allow(missing_docs)]
//! Host-level tests for assets and the playback session.

use dalek_voice::Error;
use dalek_voice::asset::{
    AssetTable, AudioAsset, from_s16le_bytes, samples_for_duration_ms, tone,
};
use dalek_voice::clock_plan::BitDepth;
use dalek_voice::playback::{PlaybackSession, PlaybackState, Volume, apply_volume, widen_16};
use dalek_voice::transport::{FillOutcome, Frame};

static SHORT: [i16; 3] = [100, -100, 50];
static RAMP: [i16; 1000] = {
    let mut samples = [0_i16; 1000];
    let mut index = 0;
    while index < 1000 {
        samples[index] = index as i16;
        index += 1;
    }
    samples
};
static STEREO: [i16; 4] = [1, -2, 3, -4];
static WIDE: [i32; 2] = [0x1234_5678, -0x1234_5678];

static ASSETS: [AudioAsset; 4] = [
    AudioAsset::mono_i16("short", 22_050, &SHORT),
    AudioAsset::mono_i16("ramp", 22_050, &RAMP),
    AudioAsset::stereo_i16("stereo", 22_050, &STEREO),
    AudioAsset::mono_i32("wide", 48_000, &WIDE),
];

const SHORT_INDEX: usize = 0;
const RAMP_INDEX: usize = 1;
const STEREO_INDEX: usize = 2;
const WIDE_INDEX: usize = 3;

fn session() -> PlaybackSession {
    PlaybackSession::new(AssetTable::new(&ASSETS))
}

#[test]
fn short_asset_at_half_volume_ends_with_silence() {
    let session = session();
    session.set_volume(0.5);
    session.play(SHORT_INDEX).expect("asset exists");

    let mut chunk = [Frame::new(7, 7); 8];
    let outcome = session.fill_next_chunk(&mut chunk);

    assert_eq!(outcome, FillOutcome::EndOfStream { frames: 3 });
    assert_eq!(chunk[0], Frame::mono(50 << 16));
    assert_eq!(chunk[1], Frame::mono(-50 << 16));
    assert_eq!(chunk[2], Frame::mono(25 << 16));
    assert!(chunk[3..].iter().all(|frame| *frame == Frame::SILENCE));
    assert_eq!(session.state(), PlaybackState::Stopped);
    assert!(!session.is_playing());

    let outcome = session.fill_next_chunk(&mut chunk);
    assert_eq!(outcome, FillOutcome::Silence);
    assert!(chunk.iter().all(|frame| *frame == Frame::SILENCE));
}

#[test]
fn cursor_only_moves_forward_until_the_end() {
    let session = session();
    session.play(RAMP_INDEX).expect("asset exists");

    let mut chunk = [Frame::SILENCE; 64];
    let mut previous = session.cursor();
    let mut chunks = 0;
    loop {
        let outcome = session.fill_next_chunk(&mut chunk);
        let cursor = session.cursor();
        chunks += 1;
        if let FillOutcome::EndOfStream { frames } = outcome {
            // 1000 = 15 * 64 + 40
            assert_eq!(frames, 40);
            break;
        }
        assert_eq!(outcome, FillOutcome::Filled);
        assert_eq!(cursor, previous + 64);
        assert_eq!(chunk[0], Frame::mono(i32::try_from(previous).unwrap() << 16));
        previous = cursor;
    }
    assert_eq!(chunks, 16);
}

#[test]
fn pause_keeps_cursor_and_resume_continues() {
    let session = session();
    session.play(RAMP_INDEX).expect("asset exists");

    let mut chunk = [Frame::SILENCE; 100];
    assert_eq!(session.fill_next_chunk(&mut chunk), FillOutcome::Filled);
    assert_eq!(session.cursor(), 100);

    session.pause().expect("playing");
    assert_eq!(session.state(), PlaybackState::Paused);
    assert_eq!(session.asset_index(), Some(RAMP_INDEX));
    assert_eq!(session.fill_next_chunk(&mut chunk), FillOutcome::Silence);
    assert!(chunk.iter().all(|frame| *frame == Frame::SILENCE));
    assert_eq!(session.cursor(), 100);
    assert_eq!(session.pause(), Err(Error::InvalidState));

    session.resume().expect("paused");
    assert_eq!(session.fill_next_chunk(&mut chunk), FillOutcome::Filled);
    assert_eq!(chunk[0], Frame::mono(100 << 16));
    assert_eq!(session.cursor(), 200);
    assert_eq!(session.resume(), Err(Error::InvalidState));
}

#[test]
fn stop_resets_and_pause_from_stopped_is_rejected() {
    let session = session();
    assert_eq!(session.pause(), Err(Error::InvalidState));
    assert_eq!(session.resume(), Err(Error::InvalidState));

    session.play(RAMP_INDEX).expect("asset exists");
    let mut chunk = [Frame::SILENCE; 10];
    session.fill_next_chunk(&mut chunk);
    session.stop();
    assert_eq!(session.state(), PlaybackState::Stopped);
    assert_eq!(session.cursor(), 0);
    assert_eq!(session.asset_index(), None);
}

#[test]
fn play_restarts_from_the_beginning() {
    let session = session();
    session.play(RAMP_INDEX).expect("asset exists");
    let mut chunk = [Frame::SILENCE; 10];
    session.fill_next_chunk(&mut chunk);
    session.play(RAMP_INDEX).expect("asset exists");
    assert_eq!(session.cursor(), 0);
    session.fill_next_chunk(&mut chunk);
    assert_eq!(chunk[0], Frame::mono(0));
    assert_eq!(chunk[9], Frame::mono(9 << 16));
}

#[test]
fn missing_asset_leaves_session_untouched() {
    let session = session();
    session.play(RAMP_INDEX).expect("asset exists");
    assert_eq!(session.play(ASSETS.len()), Err(Error::AssetNotFound { index: 4 }));
    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(session.asset_index(), Some(RAMP_INDEX));

    let empty = PlaybackSession::new(AssetTable::EMPTY);
    assert_eq!(empty.play(0), Err(Error::AssetNotFound { index: 0 }));
}

#[test]
fn stereo_and_wide_assets_keep_their_layout() {
    let session = session();
    session.play(STEREO_INDEX).expect("asset exists");
    let mut chunk = [Frame::SILENCE; 4];
    assert_eq!(
        session.fill_next_chunk(&mut chunk),
        FillOutcome::EndOfStream { frames: 2 }
    );
    assert_eq!(chunk[0], Frame::new(1 << 16, -2 << 16));
    assert_eq!(chunk[1], Frame::new(3 << 16, -4 << 16));
    assert_eq!(chunk[2], Frame::SILENCE);

    session.play(WIDE_INDEX).expect("asset exists");
    session.fill_next_chunk(&mut chunk);
    assert_eq!(chunk[0], Frame::mono(0x1234_5678));
    assert_eq!(chunk[1], Frame::mono(-0x1234_5678));
}

#[test]
fn not_playing_fills_silence() {
    let session = session();
    let mut chunk = [Frame::new(1, 1); 16];
    assert_eq!(session.fill_next_chunk(&mut chunk), FillOutcome::Silence);
    assert!(chunk.iter().all(|frame| *frame == Frame::SILENCE));
}

#[test]
fn volume_is_clamped_and_mute_is_exact() {
    assert_eq!(Volume::from_f32(f32::NAN), Volume::MUTE);
    assert_eq!(Volume::from_f32(2.0), Volume::UNITY);
    assert_eq!(Volume::from_f32(-1.0), Volume::MUTE);
    assert_eq!(Volume::from_f32(0.5).q16(), 32_768);
    assert_eq!(Volume::from_q16(u32::MAX), Volume::UNITY);
    assert!((Volume::from_f32(0.25).to_f32() - 0.25).abs() < 1e-6);

    assert_eq!(apply_volume(i32::MIN, Volume::UNITY), i32::MIN);
    assert_eq!(apply_volume(i32::MAX, Volume::MUTE), 0);
    assert_eq!(apply_volume(-3, Volume::from_f32(0.5)), -1);
    assert_eq!(widen_16(i16::MIN, Volume::UNITY), i32::MIN);
    assert_eq!(widen_16(i16::MAX, Volume::UNITY), i32::from(i16::MAX) << 16);

    let session = session();
    assert_eq!(session.volume(), Volume::UNITY);
    session.set_volume(0.0);
    session.play(SHORT_INDEX).expect("asset exists");
    let mut chunk = [Frame::new(1, 1); 3];
    session.fill_next_chunk(&mut chunk);
    assert!(chunk.iter().all(|frame| *frame == Frame::SILENCE));
}

#[test]
fn asset_info_describes_each_asset() {
    let table = AssetTable::new(&ASSETS);
    assert_eq!(table.len(), 4);

    let stereo = table.info(STEREO_INDEX).expect("asset exists");
    assert_eq!(stereo.name, "stereo");
    assert_eq!(stereo.sample_count, 4);
    assert_eq!(stereo.frame_count, 2);
    assert_eq!(stereo.channels, 2);
    assert_eq!(stereo.bit_depth, BitDepth::Bits16);

    let wide = table.info(WIDE_INDEX).expect("asset exists");
    assert_eq!(wide.bit_depth, BitDepth::Bits32);
    assert_eq!(wide.sample_rate_hz, 48_000);

    let ramp = table.info(RAMP_INDEX).expect("asset exists");
    // 1000 frames at 22.05 kHz.
    assert_eq!(ramp.duration_ms, 45);

    assert_eq!(table.info(9), Err(Error::AssetNotFound { index: 9 }));
}

#[test]
fn const_builders() {
    assert_eq!(samples_for_duration_ms(500, 22_050), 11_025);

    const BYTES: [u8; 6] = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80];
    const DECODED: [i16; 3] = from_s16le_bytes::<3, 6>(&BYTES);
    assert_eq!(DECODED, [1, -1, i16::MIN]);

    const SAMPLES: [i16; 100] = tone::<100>(8_000, 1_000);
    // Eight samples per cycle, starting at zero.
    assert_eq!(SAMPLES[0], 0);
    assert!(SAMPLES[2] > 32_000);
    assert!(SAMPLES[6] < -32_000);
    assert_eq!(SAMPLES[8], 0);
    assert!((SAMPLES[1] - SAMPLES[9]).abs() <= 1);
}
