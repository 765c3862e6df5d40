use derive_more::{Display, Error, From};

/// Result alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by setup and control operations.
///
/// Per-buffer problems (an underrun, the end of an asset) are not errors; the fill path
/// reports them as [`FillOutcome`](crate::transport::FillOutcome) values instead.
#[derive(Debug, Display, Error, From, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Error {
    /// Requested clocks cannot be produced by the PIO dividers.
    #[display("clock configuration: {_0}")]
    #[from]
    ClockConfiguration(ClockError),

    /// A transport or LED configuration value is invalid.
    #[display("invalid configuration: {_0}")]
    #[from]
    InvalidConfig(ConfigError),

    /// A hardware channel or interrupt slot is already claimed.
    #[display("hardware resource exhausted")]
    ResourceExhausted,

    /// The asset table has no entry at `index`.
    #[display("asset {index} not found")]
    AssetNotFound {
        /// Index that was requested.
        index: usize,
    },

    /// The operation is not legal from the current playback state.
    #[display("operation not valid in the current playback state")]
    InvalidState,

    /// Spawning an embassy task failed.
    #[cfg(not(feature = "host"))]
    #[display("task spawn failed: {_0:?}")]
    #[from]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),
}

/// Why a clock plan could not be produced.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ClockError {
    /// The sample rate is zero.
    #[display("sample rate must be greater than zero")]
    ZeroSampleRate,

    /// The oversampling multiplier is zero.
    #[display("oversampling multiplier must be greater than zero")]
    ZeroMultiplier,

    /// A divider fell outside the PIO range `1.0..65536.0`.
    #[display("divider for {target_hz} Hz is outside the PIO range")]
    DividerOutOfRange {
        /// Clock the divider was computed for.
        target_hz: u32,
    },

    /// The system clock is not an integer multiple of the bit clock.
    #[display("system clock is not an integer multiple of the bit clock")]
    NotPhaseLocked,

    /// The achieved sample rate is too far from the request.
    #[display("achieved sample rate deviates from the request")]
    RateDeviation,
}

/// Why a configuration was rejected.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ConfigError {
    /// Two signals share a GPIO.
    #[display("pin {pin} is used twice")]
    PinConflict {
        /// Conflicting GPIO number.
        pin: u8,
    },

    /// A GPIO number does not exist on this chip.
    #[display("pin {pin} does not exist")]
    PinOutOfRange {
        /// Offending GPIO number.
        pin: u8,
    },

    /// Frame select must sit on the pin right after the bit clock.
    #[display("frame select pin must follow the bit clock pin")]
    ClockPinsNotConsecutive,

    /// The capture data pin must sit right below the bit clock pin.
    #[display("capture data pin must precede the bit clock pin")]
    CapturePinNotAdjacent,

    /// Buffer geometry is unusable.
    #[display("buffer geometry is invalid")]
    BufferGeometry,

    /// LED channel count outside `1..=4`.
    #[display("LED channel count must be 1..=4")]
    LedChannelCount,

    /// A clock plan does not match the loaded program's bit depth or system clock output.
    #[display("clock plan does not match the transport")]
    PlanMismatch,

    /// Minimum brightness above maximum brightness.
    #[display("minimum brightness exceeds maximum brightness")]
    BrightnessRange,
}
