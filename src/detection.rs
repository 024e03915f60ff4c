//! Periodic detection: sample the camera, run the detector, draw the overlay
//! and apply the auto-record policy.
//!
//! Ticks are fixed-delay. The next tick is armed only once the current one
//! has finished, so inference never overlaps and a slow detector cannot build
//! a backlog.

use anyhow::{anyhow, Result};

use crate::context::Context;
use crate::detect::{target_present, Detection, SharedBackend};
use crate::error::{fault_kind, Fault, FaultKind};
use crate::record::RecordingController;
use crate::render::{OverlaySurface, Renderer};
use crate::schedule::{TimerId, Wakeup};
use crate::state::{LoopState, Settings, StateChange};

/// What happened on one tick.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// No model, no camera, or no ready frame.
    Skipped,
    /// The detector failed; nothing was drawn.
    Failed(FaultKind),
    Detected {
        detections: usize,
        target_present: bool,
        recording_started: bool,
    },
}

pub struct DetectionLoop {
    state: LoopState,
    surface: OverlaySurface,
    renderer: Box<dyn Renderer>,
    tick: Option<TimerId>,
    running: bool,
    /// Set after a detector error has been surfaced; cleared by the next success.
    failing: bool,
    ticks: u64,
}

impl DetectionLoop {
    pub fn new(renderer: Box<dyn Renderer>, settings: &Settings) -> Self {
        Self {
            state: LoopState::from_settings(settings),
            surface: OverlaySurface::new(),
            renderer,
            tick: None,
            running: false,
            failing: false,
            ticks: 0,
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_model(&self) -> bool {
        self.state.model.is_some()
    }

    pub fn pending_tick(&self) -> Option<TimerId> {
        self.tick
    }

    /// Ticks that reached the detector.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.state.mirrored = mirrored;
    }

    pub fn set_auto_record(&mut self, auto_record: bool) {
        self.state.auto_record = auto_record;
    }

    /// Begin periodic sampling. Polling waits for a model if none is loaded.
    pub fn start(&mut self, cx: &mut Context<'_>) {
        if self.running {
            return;
        }
        self.running = true;
        log::info!(
            "detection loop started (interval {}ms, model {})",
            self.state.poll_interval.as_millis(),
            if self.has_model() { "ready" } else { "pending" }
        );
        cx.outbox.publish(StateChange::LoopStarted);
        self.arm(cx);
    }

    /// Halt sampling and cancel the pending tick.
    pub fn stop(&mut self, cx: &mut Context<'_>) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(timer) = self.tick.take() {
            cx.scheduler.cancel(timer);
        }
        log::info!("detection loop stopped after {} ticks", self.ticks);
        cx.outbox.publish(StateChange::LoopStopped);
    }

    pub fn install_model(&mut self, cx: &mut Context<'_>, model: SharedBackend) {
        self.state.model = Some(model);
        self.failing = false;
        self.arm(cx);
    }

    /// Forget the model; ticks stop until another one is installed.
    pub fn clear_model(&mut self, cx: &mut Context<'_>) {
        self.state.model = None;
        if let Some(timer) = self.tick.take() {
            cx.scheduler.cancel(timer);
        }
    }

    /// Handle a fired `Wakeup::Tick`, then arm the next one.
    pub fn on_tick(
        &mut self,
        cx: &mut Context<'_>,
        recordings: &mut RecordingController,
    ) -> TickOutcome {
        self.tick = None;
        let outcome = self.tick_once(cx, recordings);
        self.arm(cx);
        outcome
    }

    /// One iteration without touching the timer.
    pub fn tick_once(
        &mut self,
        cx: &mut Context<'_>,
        recordings: &mut RecordingController,
    ) -> TickOutcome {
        let Some(model) = self.state.model.clone() else {
            return TickOutcome::Skipped;
        };

        let (width, height, result) = {
            let Some(camera) = cx.camera() else {
                return TickOutcome::Skipped;
            };
            let frame = match camera.current_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return TickOutcome::Skipped,
                Err(e) => {
                    log::warn!("camera frame not ready: {:#}", e);
                    return TickOutcome::Skipped;
                }
            };
            self.ticks += 1;
            let result = run_detector(&model, frame.pixels(), frame.width, frame.height);
            (frame.width, frame.height, result)
        };

        let detections = match result {
            Ok(detections) => {
                self.failing = false;
                detections
            }
            Err(e) => {
                let kind = fault_kind(&e).unwrap_or(FaultKind::InferenceFailure);
                let fault = Fault::new(kind, format!("{:#}", e));
                log::error!("detection failed: {}", fault);
                if !self.failing {
                    self.failing = true;
                    cx.outbox.error("Failed to detect objects");
                }
                return TickOutcome::Failed(fault.kind);
            }
        };

        self.surface.resize(width, height);
        self.renderer
            .render(self.state.mirrored, &detections, &mut self.surface);

        let present = target_present(&detections, &self.state.target_label);
        let mut recording_started = false;
        if present && self.state.auto_record {
            recording_started = recordings.start_auto(cx);
        }

        TickOutcome::Detected {
            detections: detections.len(),
            target_present: present,
            recording_started,
        }
    }

    fn arm(&mut self, cx: &mut Context<'_>) {
        if !self.running || self.state.model.is_none() || self.tick.is_some() {
            return;
        }
        let deadline = cx.now_ms() + self.state.poll_interval.as_millis() as u64;
        self.tick = Some(cx.scheduler.schedule_at(deadline, Wakeup::Tick));
    }
}

fn run_detector(model: &SharedBackend, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
    let mut backend = model
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    backend.detect(pixels, width, height)
}
