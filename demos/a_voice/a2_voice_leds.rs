#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};

use dalek_voice::{
    Result,
    asset::{AudioAsset, samples_for_duration_ms, tone},
    audio_player::audio_player,
    led::pwm::{LedPlayer, LedPlayerStatic, PwmLedChannel, PwmLedWriter},
    led::{EffectPattern, LedConfig},
    status_led::{LedStatus, StatusLedDevice, StatusLedDeviceStatic},
};
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

const SAMPLE_RATE_HZ: u32 = 22_050;
const PHRASE_LEN: usize = samples_for_duration_ms(1_500, SAMPLE_RATE_HZ);

static PHRASE_SAMPLES: [i16; PHRASE_LEN] = tone(SAMPLE_RATE_HZ, 150);
static VOICE_ASSETS: [AudioAsset; 1] =
    [AudioAsset::mono_i16("exterminate", SAMPLE_RATE_HZ, &PHRASE_SAMPLES)];

audio_player! {
    DalekVoice {
        assets: &VOICE_ASSETS,
    }
}

static LED_PLAYER_STATIC: LedPlayerStatic = LedPlayer::new_static();
static STATUS_LED_STATIC: StatusLedDeviceStatic = StatusLedDevice::new_static();

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    let status_led = StatusLedDevice::new(
        &STATUS_LED_STATIC,
        PwmLedChannel::new(p.PIN_25, p.PWM_SLICE4),
        spawner,
    )?;
    status_led.set_status(LedStatus::SlowBlink);

    // Head lights on GPIO 11 and 12; each needs its own PWM slice.
    let mut writer = PwmLedWriter::new();
    writer.push(PwmLedChannel::new(p.PIN_11, p.PWM_SLICE5))?;
    writer.push(PwmLedChannel::new(p.PIN_12, p.PWM_SLICE6))?;
    let leds = LedPlayer::new(&LED_PLAYER_STATIC, LedConfig::DEFAULT, writer, spawner)?;
    leds.set_effect(EffectPattern::Alternate);

    let dalek_voice = DalekVoice::new(
        p.PIN_6, p.PIN_8, p.PIN_9, p.PIN_10, p.PIO0, p.DMA_CH0, p.DMA_CH1, spawner,
    )?;
    dalek_voice.set_intensity_listener(leds.intensity_listener());
    status_led.set_status(LedStatus::Breathing);

    loop {
        status_led.set_status(LedStatus::FastBlink);
        dalek_voice.play(0)?;
        Timer::after(Duration::from_millis(1_700)).await;
        status_led.set_status(LedStatus::Breathing);
        Timer::after(Duration::from_secs(3)).await;
    }
}
