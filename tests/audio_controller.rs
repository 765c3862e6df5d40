#![allow(missing_docs)]
//! Host-level tests for the audio controller driving a simulated transport.

use std::sync::Mutex;

use dalek_voice::Error;
use dalek_voice::asset::{AssetTable, AudioAsset};
use dalek_voice::audio_player::{
    AudioController, AudioPlayer, AudioPlayerStatic, END_OF_STREAM_DRAIN_WINDOWS,
    SharedPlayback,
};
use dalek_voice::clock_plan::{ClockPlan, plan_clocks};
use dalek_voice::intensity::IntensityListener;
use dalek_voice::playback::{PlaybackState, Volume};
use dalek_voice::transport::{
    BufferHalf, Frame, PumpSlot, SimulatedTransport, StreamHandle, Transport, TransportConfig,
};

const FRAMES: usize = 4;

static SIX_FRAMES: [i16; 6] = [16_384; 6];
static LOUD: [i16; 400] = [16_384; 400];

static ASSETS: [AudioAsset; 2] = [
    AudioAsset::mono_i16("short", 22_050, &SIX_FRAMES),
    AudioAsset::mono_i16("loud", 22_050, &LOUD),
];

const SHORT: usize = 0;
const LONG: usize = 1;

type Controller = AudioController<SimulatedTransport<FRAMES>>;

#[derive(Default)]
struct RecordingListener {
    heard: Mutex<Vec<f32>>,
}

impl RecordingListener {
    fn heard(&self) -> Vec<f32> {
        self.heard.lock().expect("not poisoned").clone()
    }
}

impl IntensityListener for RecordingListener {
    fn on_intensity(&self, intensity: f32) {
        self.heard.lock().expect("not poisoned").push(intensity);
    }
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

fn default_plan() -> ClockPlan {
    plan_clocks(&TransportConfig::DEFAULT.clock_request(), 125_000_000).expect("default plan")
}

fn pump_slot(shared: &'static SharedPlayback) -> &'static PumpSlot {
    leak(PumpSlot::new(leak(shared.interrupt_pump())))
}

fn controller_over(shared: &'static SharedPlayback) -> Controller {
    let pump = pump_slot(shared);
    AudioController::new(SimulatedTransport::new(), &default_plan(), shared, pump)
        .expect("stopped transport accepts the plan")
}

fn controller() -> Controller {
    controller_over(leak(SharedPlayback::new(AssetTable::new(&ASSETS))))
}

fn close(actual: f32, expected: f32) -> bool {
    (actual - expected).abs() < 1e-4
}

#[test]
fn transport_runs_only_while_something_plays() {
    let mut controller = controller();
    assert!(!controller.transport().is_running());
    assert_eq!(controller.handle().frames_per_half, FRAMES);

    controller.play(LONG).expect("asset exists");
    assert!(controller.is_playing());
    assert!(controller.transport().is_running());

    // Priming already pulled the first two halves from the asset.
    assert_eq!(controller.session().cursor(), 2 * FRAMES);
    let mut half = [Frame::SILENCE; FRAMES];
    controller.transport().read_half(BufferHalf::A, &mut half);
    assert_eq!(half, [Frame::mono(16_384 << 16); FRAMES]);

    controller.stop();
    assert!(!controller.transport().is_running());
    assert_eq!(controller.session().state(), PlaybackState::Stopped);
}

#[test]
fn end_of_stream_stops_transport_after_tail_drains() {
    let mut controller = controller();
    controller.play(SHORT).expect("asset exists");
    // Both primed halves came from the six-frame asset, so it has already ended.
    assert_eq!(controller.session().state(), PlaybackState::Stopped);
    assert!(controller.transport().is_running());

    let report = controller.service();
    assert!(report.ended);
    assert!(!report.stopped_transport);
    assert!(controller.transport().is_running());

    for drained in 1..=END_OF_STREAM_DRAIN_WINDOWS {
        controller
            .transport_mut()
            .drain_next()
            .expect("still running");
        let report = controller.service();
        assert!(!report.ended);
        let last = drained == END_OF_STREAM_DRAIN_WINDOWS;
        assert_eq!(report.stopped_transport, last);
        assert_eq!(controller.transport().is_running(), !last);
    }
    assert_eq!(controller.transport_mut().drain_next(), None);
    assert!(close(controller.audio_intensity(), 0.0));
}

#[test]
fn sync_keeps_transport_running_until_ended_asset_drains() {
    let mut controller = controller();
    controller.play(SHORT).expect("asset exists");
    controller.sync_transport().expect("start succeeds");
    assert!(controller.transport().is_running());
    assert!(controller.service().ended);
}

#[test]
fn replaying_during_drain_cancels_the_stop() {
    let mut controller = controller();
    controller.play(SHORT).expect("asset exists");
    controller.service();
    controller.play(LONG).expect("asset exists");
    for _ in 0..5 {
        controller.transport_mut().drain_next().expect("running");
        let report = controller.service();
        assert!(!report.stopped_transport);
    }
    assert!(controller.transport().is_running());
    assert!(controller.is_playing());
}

#[test]
fn intensity_rises_per_window_and_drops_on_stop() {
    let mut controller = controller();
    let listener: &'static RecordingListener = leak(RecordingListener::default());
    controller.set_intensity_listener(listener);
    controller.play(LONG).expect("asset exists");

    // Half scale at gain 3 clips to 1.0; smoothing keeps 70% of the previous value.
    let first = controller.service();
    assert!(close(first.intensity, 0.3));
    assert_eq!(first.underruns, 0);
    controller.transport_mut().drain_next().expect("running");
    let second = controller.service();
    assert!(close(second.intensity, 0.51));
    assert!(close(controller.audio_intensity(), 0.51));

    // No new window: same value, not published again.
    let idle = controller.service();
    assert!(close(idle.intensity, 0.51));
    assert_eq!(listener.heard().len(), 2);

    controller.stop();
    assert!(close(controller.audio_intensity(), 0.0));
    let heard = listener.heard();
    assert_eq!(heard.len(), 3);
    assert!(close(heard[2], 0.0));
    assert!(close(controller.service().intensity, 0.0));
}

#[test]
fn paused_playback_reports_zero_intensity_and_keeps_running() {
    let mut controller = controller();
    controller.play(LONG).expect("asset exists");
    controller.service();
    controller.pause().expect("playing");
    assert_eq!(controller.pause(), Err(Error::InvalidState));

    let cursor = controller.session().cursor();
    controller.transport_mut().drain_next().expect("running");
    assert!(close(controller.service().intensity, 0.0));
    assert_eq!(controller.session().cursor(), cursor);
    assert!(controller.transport().is_running());

    controller.resume().expect("paused");
    controller.transport_mut().drain_next().expect("running");
    assert_eq!(controller.session().cursor(), cursor + FRAMES);
    assert!(controller.service().intensity > 0.0);
}

#[test]
fn controller_reports_bad_indices_and_assets() {
    let mut controller = controller();
    assert_eq!(controller.play(7), Err(Error::AssetNotFound { index: 7 }));
    assert!(!controller.transport().is_running());
    assert_eq!(controller.asset_count(), 2);
    assert_eq!(controller.asset_info(LONG).expect("asset exists").frame_count, 400);

    controller.set_volume(0.25);
    assert_eq!(controller.volume(), Volume::from_f32(0.25));
}

#[test]
fn controller_rejects_reconfiguring_a_running_transport() {
    let mut transport = SimulatedTransport::<FRAMES>::new();
    transport.configure(&default_plan()).expect("stopped");
    transport.start().expect("configured");
    let shared = leak(SharedPlayback::new(AssetTable::EMPTY));
    let pump = pump_slot(shared);
    assert!(matches!(
        AudioController::new(transport, &default_plan(), shared, pump),
        Err(Error::InvalidState)
    ));
}

#[test]
fn player_handle_acts_on_the_shared_session() {
    let player_static: &'static AudioPlayerStatic =
        leak(AudioPlayer::new_static(AssetTable::new(&ASSETS)));
    let player = AudioPlayer::new(player_static);
    assert_eq!(player.asset_count(), 2);
    assert_eq!(player.state(), PlaybackState::Stopped);

    assert_eq!(player.play(2), Err(Error::AssetNotFound { index: 2 }));
    assert_eq!(player.pause(), Err(Error::InvalidState));
    assert_eq!(player.state(), PlaybackState::Stopped);

    let mut controller = controller_over(player_static.playback());
    player.play(LONG).expect("asset exists");
    assert!(player.is_playing());
    controller.sync_transport().expect("start succeeds");
    assert!(controller.transport().is_running());

    player.pause().expect("playing");
    assert_eq!(player.state(), PlaybackState::Paused);
    player.resume().expect("paused");
    player.set_volume(2.0);
    assert_eq!(player.volume(), Volume::UNITY);

    controller.service();
    assert!(close(player.audio_intensity(), 0.3));

    player.stop();
    assert_eq!(player.state(), PlaybackState::Stopped);
    controller.sync_transport().expect("stop succeeds");
    assert!(!controller.transport().is_running());
    assert!(close(controller.service().intensity, 0.0));
    assert!(close(player.audio_intensity(), 0.0));

    assert!(player_static.take_listener().is_none());
    let listener: &'static RecordingListener = leak(RecordingListener::default());
    player.set_intensity_listener(listener);
    let pending = player_static.take_listener().expect("listener was handed over");
    controller.set_intensity_listener(pending);
    controller.play(LONG).expect("asset exists");
    controller.service();
    assert_eq!(listener.heard().len(), 1);
    assert_eq!(player.asset_info(SHORT).expect("asset exists").frame_count, 6);
}

/// Accepts a plan but never starts, like hardware whose resources were taken.
#[derive(Default)]
struct RefusingTransport {
    starts: usize,
    stops: usize,
}

impl Transport for RefusingTransport {
    fn configure(&mut self, plan: &ClockPlan) -> dalek_voice::Result<StreamHandle> {
        Ok(StreamHandle::new(plan, FRAMES))
    }

    fn on_buffer_drained(&mut self, _pump: &'static PumpSlot) {}

    fn start(&mut self) -> dalek_voice::Result<()> {
        self.starts += 1;
        Err(Error::ResourceExhausted)
    }

    fn stop(&mut self) {
        self.stops += 1;
    }

    fn is_running(&self) -> bool {
        false
    }
}

#[test]
fn failed_start_leaves_playback_stopped() {
    let shared = leak(SharedPlayback::new(AssetTable::new(&ASSETS)));
    let listener = leak(RecordingListener::default());
    let mut controller = AudioController::new(
        RefusingTransport::default(),
        &default_plan(),
        shared,
        pump_slot(shared),
    )
    .expect("configure succeeds");
    controller.set_intensity_listener(listener);

    assert_eq!(controller.play(LONG), Err(Error::ResourceExhausted));
    assert_eq!(controller.session().state(), PlaybackState::Stopped);
    assert!(!controller.is_playing());
    assert!(close(controller.audio_intensity(), 0.0));
    assert_eq!(controller.transport().starts, 1);

    // A later attempt is a fresh start, not a resume of a phantom session.
    assert_eq!(controller.resume(), Err(Error::InvalidState));
    assert_eq!(controller.transport().starts, 1);
    assert_eq!(controller.play(SHORT), Err(Error::ResourceExhausted));
    assert_eq!(controller.session().state(), PlaybackState::Stopped);
    assert_eq!(controller.transport().starts, 2);
    assert_eq!(listener.heard(), vec![0.0, 0.0]);
}
