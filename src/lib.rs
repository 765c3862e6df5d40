//! I2S audio streaming and audio-reactive LEDs for the Pico-based Dalek robot.
//!
//! The crate plays static PCM assets through a PIO-generated I2S bus fed by chained DMA,
//! measures the loudness of what it just produced, and drives PWM LEDs from that loudness.
//!
//! # Glossary
//!
//! Resources available on the Pico 1 and Pico 2:
//!
//! - **PIO ([Programmable I/O](https://medium.com/data-science/nine-pico-pio-wats-with-rust-part-1-9d062067dc25)):** Pico 1 has 2. Pico 2 has 3.
//!   The I2S bit clock, frame select and optional system clock are generated by PIO state machines.
//! - **DMA ([Direct Memory Access](https://en.wikipedia.org/wiki/Direct_memory_access)):** Both Pico 1 and 2 have 12 channels.
//!   Each I2S direction uses a pair: a data channel that feeds the PIO FIFO and a control channel that
//!   re-arms the data channel with the next buffer half.
//! - **PWM ([Pulse Width Modulation](https://en.wikipedia.org/wiki/Pulse-width_modulation)) Slices:** Both Pico 1 and 2 have 8 slices (& 16 channels). These "slices"
//!   are unrelated Rust slices.
//!
//! # Layout
//!
//! - [`clock_plan`] turns a sample rate into PIO clock dividers.
//! - [`transport`] holds the buffer hand-off machinery shared by the hardware and simulated transports.
//! - [`playback`], [`asset`] and [`intensity`] produce samples and measure them.
//! - [`led`] and [`status_led`] render brightness.
//! - [`audio_player`] ties a transport, a session and the analyzer together.
#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]
#![allow(async_fn_in_trait, reason = "single-threaded embedded")]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "pico1", feature = "pico2")), not(feature = "host")))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

// Compile-time checks: exactly one architecture must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "arm", feature = "riscv")), not(feature = "host")))]
compile_error!("Must enable exactly one architecture feature: 'arm' or 'riscv'");

#[cfg(all(feature = "arm", feature = "riscv"))]
compile_error!("Cannot enable both 'arm' and 'riscv' features simultaneously");

// Compile-time check: pico1 only supports ARM
#[cfg(all(feature = "pico1", feature = "riscv"))]
compile_error!("Pico 1 (RP2040) only supports ARM architecture, not RISC-V");

// PIO interrupt bindings - shared by the I2S transport
#[cfg(not(feature = "host"))]
#[doc(hidden)]
pub mod pio_irqs;

pub mod asset;
pub mod audio_player;
pub mod clock_plan;
mod error;
// These modules require embassy_rp and are excluded when testing on host
#[cfg(not(feature = "host"))]
pub mod i2s;
pub mod intensity;
pub mod led;
pub mod playback;
pub mod status_led;
pub mod transport;

// Re-export error types and result (used throughout)
pub use crate::error::{ClockError, ConfigError, Error, Result};
