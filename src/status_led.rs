//! A single indicator LED showing what the robot is doing.
//!
//! Every pattern is a pure function of the time since its status was set, so
//! [`StatusLed::update`] can be called at any rate (20 Hz or faster resolves the fast blink)
//! and calling it twice with the same instant writes the same duty twice.
//!
//! On hardware the LED is usually GPIO 25; see [`StatusLedDevice`] for the spawned version.

use embassy_time::{Duration, Instant};

use crate::led::{DutyWriter, PWM_TOP};

/// Full sine cycle of [`LedStatus::Breathing`].
pub const BREATHING_PERIOD: Duration = Duration::from_secs(2);
/// On time (and off time) of [`LedStatus::FastBlink`].
pub const FAST_BLINK_HALF_PERIOD: Duration = Duration::from_millis(100);
/// On time (and off time) of [`LedStatus::SlowBlink`].
pub const SLOW_BLINK_HALF_PERIOD: Duration = Duration::from_millis(500);

/// Indicator patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, defmt::Format)]
pub enum LedStatus {
    /// Dark.
    #[default]
    Off,
    /// Fully lit.
    On,
    /// Sine fade over [`BREATHING_PERIOD`], starting dark.
    Breathing,
    /// 100 ms on, 100 ms off, starting on.
    FastBlink,
    /// 500 ms on, 500 ms off, starting on.
    SlowBlink,
}

#[cfg(not(feature = "host"))]
impl LedStatus {
    const fn to_bits(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Breathing => 2,
            Self::FastBlink => 3,
            Self::SlowBlink => 4,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::On,
            2 => Self::Breathing,
            3 => Self::FastBlink,
            4 => Self::SlowBlink,
            _ => Self::Off,
        }
    }
}

/// Brightness in `[0, 1]` for `status`, `elapsed` after it was set.
#[must_use]
pub fn status_level(status: LedStatus, elapsed: Duration) -> f32 {
    match status {
        LedStatus::Off => 0.0,
        LedStatus::On => 1.0,
        LedStatus::Breathing => {
            let period = BREATHING_PERIOD.as_micros();
            #[expect(clippy::cast_precision_loss, reason = "phase within one period")]
            let phase = (elapsed.as_micros() % period) as f32 / period as f32;
            (1.0 - libm::cosf(phase * core::f32::consts::TAU)) * 0.5
        }
        LedStatus::FastBlink => blink_level(elapsed, FAST_BLINK_HALF_PERIOD),
        LedStatus::SlowBlink => blink_level(elapsed, SLOW_BLINK_HALF_PERIOD),
    }
}

fn blink_level(elapsed: Duration, half_period: Duration) -> f32 {
    let halves = elapsed
        .as_micros()
        .checked_div(half_period.as_micros())
        .unwrap_or(0);
    if halves % 2 == 0 { 1.0 } else { 0.0 }
}

/// Renders a [`LedStatus`] onto channel 0 of a [`DutyWriter`].
pub struct StatusLed<W: DutyWriter> {
    writer: W,
    status: LedStatus,
    since: Instant,
    duty: u16,
}

impl<W: DutyWriter> StatusLed<W> {
    /// Start dark, with the writer enabled.
    pub fn new(mut writer: W) -> Self {
        writer.set_duty(0, 0);
        writer.set_enabled(true);
        Self {
            writer,
            status: LedStatus::Off,
            since: Instant::from_ticks(0),
            duty: 0,
        }
    }

    /// Switch pattern at `now`. Setting the current status again keeps its phase.
    pub fn set_status(&mut self, status: LedStatus, now: Instant) {
        if status != self.status {
            self.status = status;
            self.since = now;
        }
    }

    /// Current pattern.
    #[must_use]
    pub const fn status(&self) -> LedStatus {
        self.status
    }

    /// Write the duty for `now` and return it.
    pub fn update(&mut self, now: Instant) -> u16 {
        let elapsed = now
            .checked_duration_since(self.since)
            .unwrap_or(Duration::from_ticks(0));
        let level = status_level(self.status, elapsed);
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "level is within [0, 1]"
        )]
        let duty = libm::roundf(level * f32::from(PWM_TOP)) as u16;
        self.duty = duty;
        self.writer.set_duty(0, duty);
        duty
    }

    /// Duty written by the last update.
    #[must_use]
    pub const fn duty(&self) -> u16 {
        self.duty
    }

    /// The underlying writer.
    #[must_use]
    pub const fn writer(&self) -> &W {
        &self.writer
    }
}

// ============================================================================
// Device
// ============================================================================

#[cfg(not(feature = "host"))]
pub use device::{StatusLedDevice, StatusLedDeviceStatic};

#[cfg(not(feature = "host"))]
mod device {
    use defmt::info;
    use embassy_executor::Spawner;
    use embassy_time::{Duration, Instant, Ticker};
    use portable_atomic::{AtomicU8, Ordering};

    use super::{LedStatus, StatusLed};
    use crate::Result;
    use crate::led::pwm::PwmLedChannel;

    const UPDATE_PERIOD: Duration = Duration::from_millis(20);

    /// Static resources for [`StatusLedDevice`].
    pub struct StatusLedDeviceStatic {
        status: AtomicU8,
    }

    /// A [`StatusLed`] on its own PWM channel, updated every 20 ms by a spawned task.
    ///
    /// ```rust,no_run
    /// # #![no_std]
    /// # #![no_main]
    /// # use panic_probe as _;
    /// # use core::convert::Infallible;
    /// use dalek_voice::Result;
    /// use dalek_voice::led::pwm::PwmLedChannel;
    /// use dalek_voice::status_led::{LedStatus, StatusLedDevice, StatusLedDeviceStatic};
    ///
    /// async fn example(spawner: embassy_executor::Spawner) -> Result<Infallible> {
    ///     let p = embassy_rp::init(Default::default());
    ///     static STATUS_STATIC: StatusLedDeviceStatic = StatusLedDevice::new_static();
    ///     let channel = PwmLedChannel::new(p.PIN_25, p.PWM_SLICE4);
    ///     let status = StatusLedDevice::new(&STATUS_STATIC, channel, spawner)?;
    ///     status.set_status(LedStatus::Breathing);
    ///     core::future::pending().await
    /// }
    /// ```
    pub struct StatusLedDevice {
        device_static: &'static StatusLedDeviceStatic,
    }

    impl StatusLedDevice {
        /// Create static resources.
        #[must_use]
        pub const fn new_static() -> StatusLedDeviceStatic {
            StatusLedDeviceStatic {
                status: AtomicU8::new(0),
            }
        }

        /// Spawn the update task for `channel`.
        ///
        /// # Errors
        ///
        /// Returns [`Error::TaskSpawn`](crate::Error::TaskSpawn) if the task is already
        /// running.
        pub fn new(
            device_static: &'static StatusLedDeviceStatic,
            channel: PwmLedChannel<'static>,
            spawner: Spawner,
        ) -> Result<Self> {
            spawner.spawn(status_led_task(device_static, StatusLed::new(channel)))?;
            Ok(Self { device_static })
        }

        /// Show `status` from the next update on.
        pub fn set_status(&self, status: LedStatus) {
            self.device_static
                .status
                .store(status.to_bits(), Ordering::Relaxed);
        }

        /// Status most recently requested.
        #[must_use]
        pub fn status(&self) -> LedStatus {
            LedStatus::from_bits(self.device_static.status.load(Ordering::Relaxed))
        }
    }

    #[embassy_executor::task]
    async fn status_led_task(
        device_static: &'static StatusLedDeviceStatic,
        mut status_led: StatusLed<PwmLedChannel<'static>>,
    ) -> ! {
        let mut ticker = Ticker::every(UPDATE_PERIOD);
        loop {
            let now = Instant::now();
            let status = LedStatus::from_bits(device_static.status.load(Ordering::Relaxed));
            if status != status_led.status() {
                info!("status led {}", status);
            }
            status_led.set_status(status, now);
            status_led.update(now);
            ticker.next().await;
        }
    }
}
