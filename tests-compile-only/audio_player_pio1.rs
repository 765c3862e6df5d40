#![no_std]
#![no_main]
#![allow(dead_code)]
//! Test audio_player! on PIO1 with a non-default format and buffer size.

use core::convert::Infallible;

use dalek_voice::Result;
use dalek_voice::asset::AudioAsset;
use dalek_voice::audio_player;
use embassy_executor::Spawner;
use {defmt_rtt as _, panic_probe as _};

static SAMPLES: [i32; 128] = [0; 128];
static ASSETS: [AudioAsset; 1] = [AudioAsset::mono_i32("wide", 48_000, &SAMPLES)];

audio_player! {
    WideVoice {
        assets: &ASSETS,
        pio: PIO1,
        data_pin: PIN_16,
        bit_clock_pin: PIN_18,
        frame_select_pin: PIN_19,
        system_clock_pin: PIN_20,
        sample_rate_hz: 48_000,
        bit_depth: dalek_voice::clock_plan::BitDepth::Bits32,
        oversampling_multiplier: 384,
        frames: 128,
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());
    let wide_voice = WideVoice::new(
        p.PIN_16, p.PIN_18, p.PIN_19, p.PIN_20, p.PIO1, p.DMA_CH0, p.DMA_CH1, spawner,
    )?;
    assert_eq!(WideVoice::FRAMES, 128);
    wide_voice.play(0)?;
    core::future::pending().await
}
