//! The monitor: one owner for the clock, timers, camera and both core
//! components, driven by `turn()`.

use anyhow::{anyhow, Context as _, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::clip::{Clip, ClipKind, ClipSink};
use crate::context::Context;
use crate::detect::SharedBackend;
use crate::detection::{DetectionLoop, TickOutcome};
use crate::error::{Fault, FaultKind};
use crate::frame::FrameSource;
use crate::notify::{AudioCue, Notifier, Outbox};
use crate::record::{Recorder, RecordingController};
use crate::render::{OverlaySurface, Renderer};
use crate::schedule::{Clock, Scheduler, Wakeup};
use crate::state::{validate_recording_duration, validate_volume, Settings, StateChange};

/// Longest the blocking loop sleeps before rechecking the shutdown flag.
const MAX_IDLE: Duration = Duration::from_millis(250);

/// Everything a monitor is assembled from.
pub struct MonitorParts {
    pub clock: Box<dyn Clock>,
    pub camera: Option<Box<dyn FrameSource>>,
    pub renderer: Box<dyn Renderer>,
    pub recorder: Box<dyn Recorder>,
    pub notifier: Box<dyn Notifier>,
    pub cue: Box<dyn AudioCue>,
    pub sink: Box<dyn ClipSink>,
    pub settings: Settings,
}

/// User commands accepted by `Monitor::run`.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ToggleRecord,
    CaptureStill,
    ToggleMirrored,
    ToggleAutoRecord,
    SetVolume(f32),
    SetRecordingDuration(Duration),
    Quit,
}

impl Command {
    /// Parse one line of the interactive command protocol.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?;
        let arg = parts.next();
        let command = match (verb, arg) {
            ("r", None) => Command::ToggleRecord,
            ("s", None) => Command::CaptureStill,
            ("m", None) => Command::ToggleMirrored,
            ("a", None) => Command::ToggleAutoRecord,
            ("q", None) => Command::Quit,
            ("v", Some(value)) => {
                let volume: f32 = value
                    .parse()
                    .map_err(|_| anyhow!("volume must be a number, got '{}'", value))?;
                Command::SetVolume(volume)
            }
            ("d", Some(value)) => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| anyhow!("duration must be whole seconds, got '{}'", value))?;
                Command::SetRecordingDuration(Duration::from_secs(secs))
            }
            _ => return Err(anyhow!("unknown command '{}'", line.trim())),
        };
        if parts.next().is_some() {
            return Err(anyhow!("too many arguments in '{}'", line.trim()));
        }
        Ok(command)
    }
}

/// Resources shared by the detection loop and the recording controller.
struct Shared {
    clock: Box<dyn Clock>,
    scheduler: Scheduler,
    camera: Option<Box<dyn FrameSource>>,
    outbox: Outbox,
}

impl Shared {
    fn cx(&mut self) -> Context<'_> {
        Context {
            clock: self.clock.as_ref(),
            scheduler: &mut self.scheduler,
            camera: self.camera.as_deref_mut(),
            outbox: &mut self.outbox,
        }
    }
}

pub struct Monitor {
    shared: Shared,
    detection: DetectionLoop,
    recordings: RecordingController,
    settings: Settings,
}

impl Monitor {
    pub fn new(parts: MonitorParts) -> Result<Self> {
        parts.settings.validate().context("invalid monitor settings")?;
        let detection = DetectionLoop::new(parts.renderer, &parts.settings);
        let recordings = RecordingController::new(parts.recorder, &parts.settings);
        Ok(Self {
            shared: Shared {
                clock: parts.clock,
                scheduler: Scheduler::new(),
                camera: parts.camera,
                outbox: Outbox::new(parts.notifier, parts.cue, parts.sink),
            },
            detection,
            recordings,
            settings: parts.settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.detection.is_running()
    }

    pub fn is_recording(&self) -> bool {
        self.recordings.is_recording()
    }

    pub fn has_model(&self) -> bool {
        self.detection.has_model()
    }

    pub fn has_camera(&self) -> bool {
        self.shared.camera.is_some()
    }

    pub fn overlay(&self) -> &OverlaySurface {
        self.detection.surface()
    }

    pub fn recordings(&self) -> &RecordingController {
        &self.recordings
    }

    pub fn pending_timers(&self) -> usize {
        self.shared.scheduler.len()
    }

    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        self.shared.outbox.subscribe()
    }

    pub fn start(&mut self) {
        self.detection.start(&mut self.shared.cx());
    }

    /// Stop sampling, close any active recording and hand its clip to the sink.
    pub fn stop(&mut self) {
        let mut cx = self.shared.cx();
        self.detection.stop(&mut cx);
        self.recordings.shutdown(&mut cx);
        self.recordings.drain_events(&mut cx);
    }

    pub fn install_model(&mut self, model: SharedBackend) {
        let backend = match model.lock() {
            Ok(guard) => guard.name().to_string(),
            Err(_) => "unknown".to_string(),
        };
        log::info!("model ready: {}", backend);
        let mut cx = self.shared.cx();
        self.detection.install_model(&mut cx, model);
        cx.outbox.publish(StateChange::ModelLoaded { backend });
    }

    /// Model loading failed. The monitor stays usable; detection stays idle.
    pub fn model_failed(&mut self, err: &anyhow::Error) {
        let fault = Fault::new(FaultKind::ModelUnavailable, format!("{:#}", err));
        log::error!("{}", fault);
        let mut cx = self.shared.cx();
        self.detection.clear_model(&mut cx);
        cx.outbox.error("Failed to load model");
        cx.outbox.publish(StateChange::ModelUnavailable {
            reason: fault.message,
        });
    }

    /// Attach a camera, replacing (and detaching) any current one.
    pub fn attach_camera(&mut self, camera: Box<dyn FrameSource>) {
        if self.shared.camera.is_some() {
            self.detach_camera();
        }
        let name = camera.name().to_string();
        log::info!("camera attached: {}", name);
        self.shared.camera = Some(camera);
        self.shared
            .outbox
            .publish(StateChange::CameraAttached { name });
    }

    /// Detach the camera. A recording from it is closed first.
    pub fn detach_camera(&mut self) -> Option<Box<dyn FrameSource>> {
        {
            let mut cx = self.shared.cx();
            self.recordings.shutdown(&mut cx);
            self.recordings.drain_events(&mut cx);
        }
        let camera = self.shared.camera.take()?;
        log::info!("camera detached: {}", camera.name());
        self.shared.outbox.publish(StateChange::CameraDetached);
        Some(camera)
    }

    /// The record button.
    pub fn toggle_record(&mut self) {
        self.recordings.stop_manual(&mut self.shared.cx());
    }

    /// Save the current frame as a PNG still. Returns whether a file was saved.
    pub fn capture_still(&mut self) -> bool {
        let shared = &mut self.shared;
        let Some(camera) = shared.camera.as_deref_mut() else {
            log::warn!("still not captured: {}", Fault::camera_not_found());
            shared
                .outbox
                .error("Camera not found. Please reconnect the camera.");
            return false;
        };

        let encoded = match camera.current_frame() {
            Ok(Some(frame)) => frame.encode_png(),
            Ok(None) => Err(anyhow!("no frame ready")),
            Err(e) => Err(e),
        };
        let png = match encoded {
            Ok(png) if !png.is_empty() => png,
            Ok(_) => {
                let fault = Fault::new(FaultKind::CaptureFailure, "encoded image is empty");
                log::error!("still not captured: {}", fault);
                shared.outbox.error("Failed to capture image");
                return false;
            }
            Err(e) => {
                let fault = Fault::new(FaultKind::CaptureFailure, format!("{:#}", e));
                log::error!("still not captured: {}", fault);
                shared.outbox.error("Failed to capture image");
                return false;
            }
        };

        let clip = Clip::new(ClipKind::Still, png, shared.clock.local_time());
        match shared.outbox.sink.save(&clip) {
            Ok(path) => {
                shared.outbox.success("Image captured");
                shared.outbox.publish(StateChange::ClipSaved {
                    kind: ClipKind::Still,
                    path,
                });
                true
            }
            Err(e) => {
                log::error!("saving {} failed: {:#}", clip.suggested_filename(), e);
                shared.outbox.error("Failed to capture image");
                false
            }
        }
    }

    pub fn toggle_mirrored(&mut self) {
        self.set_mirrored(!self.settings.mirrored);
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.settings.mirrored = mirrored;
        self.detection.set_mirrored(mirrored);
        self.shared
            .outbox
            .publish(StateChange::MirroredChanged(mirrored));
    }

    pub fn toggle_auto_record(&mut self) {
        let enabled = !self.settings.auto_record;
        self.settings.auto_record = enabled;
        self.detection.set_auto_record(enabled);
        if enabled {
            self.shared.outbox.success("Auto-record enabled");
        } else {
            self.shared.outbox.error("Auto-record disabled");
        }
        self.shared
            .outbox
            .publish(StateChange::AutoRecordChanged(enabled));
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let volume = validate_volume(volume)?;
        self.settings.volume = volume;
        self.recordings.set_volume(volume);
        self.shared.outbox.publish(StateChange::VolumeChanged(volume));
        Ok(())
    }

    /// Takes effect from the next recording; an active one keeps its limit.
    pub fn set_recording_duration(&mut self, duration: Duration) -> Result<()> {
        let duration = validate_recording_duration(duration)?;
        self.settings.recording_duration = duration;
        self.recordings.set_max_duration(duration);
        self.shared
            .outbox
            .publish(StateChange::RecordingDurationChanged(duration));
        Ok(())
    }

    /// Deadline of the next pending timer, in clock milliseconds.
    pub fn next_deadline(&self) -> Option<u64> {
        self.shared.scheduler.next_deadline()
    }

    /// Fire every timer due now, then apply recorder output. Returns the
    /// number of timers fired.
    pub fn turn(&mut self) -> usize {
        let mut fired = 0;
        loop {
            let now = self.shared.clock.now_ms();
            let Some((_, wakeup)) = self.shared.scheduler.pop_due(now) else {
                break;
            };
            fired += 1;
            let mut cx = self.shared.cx();
            match wakeup {
                Wakeup::Tick => {
                    if let TickOutcome::Detected {
                        recording_started: true,
                        ..
                    } = self.detection.on_tick(&mut cx, &mut self.recordings)
                    {
                        log::debug!("tick started an automatic recording");
                    }
                }
                Wakeup::AutoStop(session) => self.recordings.on_time_limit(&mut cx, session),
                Wakeup::Capture(session) => self.recordings.on_capture(&mut cx, session),
            }
        }
        self.recordings.drain_events(&mut self.shared.cx());
        fired
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ToggleRecord => self.toggle_record(),
            Command::CaptureStill => {
                self.capture_still();
            }
            Command::ToggleMirrored => self.toggle_mirrored(),
            Command::ToggleAutoRecord => self.toggle_auto_record(),
            Command::SetVolume(volume) => self.set_volume(volume)?,
            Command::SetRecordingDuration(duration) => self.set_recording_duration(duration)?,
            Command::Quit => {}
        }
        Ok(())
    }

    /// Blocking event loop for the daemon. Returns once `shutdown` is set,
    /// `Quit` arrives, or `limit` elapses.
    pub fn run(
        &mut self,
        shutdown: &AtomicBool,
        commands: &Receiver<Command>,
        limit: Option<Duration>,
    ) -> Result<()> {
        let started_ms = self.shared.clock.now_ms();
        let limit_ms = limit.map(|limit| limit.as_millis() as u64);
        let mut commands_open = true;
        self.start();

        while !shutdown.load(Ordering::SeqCst) {
            self.turn();

            let now = self.shared.clock.now_ms();
            if limit_ms.is_some_and(|limit| now.saturating_sub(started_ms) >= limit) {
                log::info!("run limit reached");
                break;
            }
            let wait = self
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
                .unwrap_or(MAX_IDLE)
                .min(MAX_IDLE);

            if !commands_open {
                std::thread::sleep(wait);
                continue;
            }
            match commands.recv_timeout(wait) {
                Ok(Command::Quit) => {
                    log::info!("quit requested");
                    break;
                }
                Ok(command) => {
                    if let Err(e) = self.apply(command) {
                        log::warn!("command rejected: {:#}", e);
                        self.shared.outbox.error(&format!("{:#}", e));
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("command channel closed");
                    commands_open = false;
                }
            }
        }

        self.stop();
        Ok(())
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.detection.is_running() || self.recordings.is_recording() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_lines() {
        assert_eq!(Command::parse("r").unwrap(), Command::ToggleRecord);
        assert_eq!(Command::parse(" s ").unwrap(), Command::CaptureStill);
        assert_eq!(Command::parse("v 0.25").unwrap(), Command::SetVolume(0.25));
        assert_eq!(
            Command::parse("d 30").unwrap(),
            Command::SetRecordingDuration(Duration::from_secs(30))
        );
        assert_eq!(Command::parse("q").unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_malformed_command_lines() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("v").is_err());
        assert!(Command::parse("v loud").is_err());
        assert!(Command::parse("d 1.5").is_err());
        assert!(Command::parse("r now").is_err());
        assert!(Command::parse("x").is_err());
    }
}
