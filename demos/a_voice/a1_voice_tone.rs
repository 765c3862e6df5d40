#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};

use dalek_voice::{
    Result,
    asset::{AudioAsset, samples_for_duration_ms, tone},
    audio_player::audio_player,
};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

const SAMPLE_RATE_HZ: u32 = 22_050;
const BEEP_LEN: usize = samples_for_duration_ms(400, SAMPLE_RATE_HZ);

static LOW_SAMPLES: [i16; BEEP_LEN] = tone(SAMPLE_RATE_HZ, 220);
static HIGH_SAMPLES: [i16; BEEP_LEN] = tone(SAMPLE_RATE_HZ, 440);

static VOICE_ASSETS: [AudioAsset; 2] = [
    AudioAsset::mono_i16("low", SAMPLE_RATE_HZ, &LOW_SAMPLES),
    AudioAsset::mono_i16("high", SAMPLE_RATE_HZ, &HIGH_SAMPLES),
];

// Data on GPIO 6, bit clock GPIO 8, frame select GPIO 9, system clock GPIO 10.
audio_player! {
    DalekVoice {
        assets: &VOICE_ASSETS,
        sample_rate_hz: SAMPLE_RATE_HZ,
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    let dalek_voice = DalekVoice::new(
        p.PIN_6, p.PIN_8, p.PIN_9, p.PIN_10, p.PIO0, p.DMA_CH0, p.DMA_CH1, spawner,
    )?;
    dalek_voice.set_volume(0.5);

    loop {
        for index in 0..dalek_voice.asset_count() {
            let info = dalek_voice.asset_info(index)?;
            defmt::info!("playing {} ({} ms)", info.name, info.duration_ms);
            dalek_voice.play(index)?;
            Timer::after(Duration::from_millis(u64::from(info.duration_ms) + 200)).await;
        }
        Timer::after(Duration::from_secs(1)).await;
    }
}
