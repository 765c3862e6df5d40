#![no_std]
#![no_main]
#![allow(dead_code)]
//! Test visibility support for audio_player! macro.

use dalek_voice::asset::AudioAsset;
use dalek_voice::audio_player;
use {defmt_rtt as _, panic_probe as _};

static SILENT_SAMPLES: [i16; 64] = [0; 64];
static ASSETS: [AudioAsset; 1] = [AudioAsset::mono_i16("silence", 22_050, &SILENT_SAMPLES)];

// Test default visibility (public)
audio_player! {
    AudioPlayerDefault {
        assets: &ASSETS,
    }
}

// Test pub(crate) visibility - separate module
mod test_pub_crate {
    use dalek_voice::audio_player;

    audio_player! {
        pub(crate) AudioPlayerPubCrate {
            assets: &super::ASSETS,
            pio: PIO1,
            data_dma: DMA_CH2,
            control_dma: DMA_CH3,
        }
    }
}

// Test private visibility - separate module
mod test_private {
    use dalek_voice::audio_player;

    audio_player! {
        pub(self) AudioPlayerPrivate {
            data_pin: PIN_0,
            bit_clock_pin: PIN_2,
            frame_select_pin: PIN_3,
            system_clock_pin: PIN_4,
            assets: &super::ASSETS,
            data_dma: DMA_CH4,
            control_dma: DMA_CH5,
        }
    }

    // This function can access the private type within the module
    pub fn use_private_type() -> &'static str {
        type _Test = AudioPlayerPrivate;
        "accessible within module"
    }
}

// This should compile successfully, demonstrating that all visibility modifiers work correctly
#[embassy_executor::main]
async fn main(_spawner: embassy_executor::Spawner) {
    type _Test1 = AudioPlayerDefault;
    type _Test2 = test_pub_crate::AudioPlayerPubCrate;

    let _ = test_private::use_private_type();
}
