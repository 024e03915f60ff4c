use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use super::recorder::{Recorder, RecorderEvent, RecorderEvents, RecorderHandle};
use super::SessionId;
use crate::clip::{Clip, ClipKind};
use crate::context::Context;
use crate::error::{fault_kind, Fault, FaultKind};
use crate::schedule::{TimerId, Wakeup};
use crate::state::{RecordTrigger, Settings, StateChange, StopReason};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Recording,
}

/// The one active recording.
#[derive(Debug)]
pub struct RecordingSession {
    pub id: SessionId,
    pub trigger: RecordTrigger,
    pub started_at_ms: u64,
    pub max_duration: Duration,
    /// Camera frame interval the capture timer runs at.
    pub frame_interval: Duration,
    handle: RecorderHandle,
    auto_stop: Option<TimerId>,
    capture: Option<TimerId>,
}

impl RecordingSession {
    pub fn auto_stop_timer(&self) -> Option<TimerId> {
        self.auto_stop
    }

    pub fn capture_timer(&self) -> Option<TimerId> {
        self.capture
    }
}

/// Owns the recorder and enforces the single-recorder invariant.
///
/// All transitions are status-guarded on `&mut self`, so a stop that loses a
/// race against another stop finds no session and does nothing.
pub struct RecordingController {
    recorder: Box<dyn Recorder>,
    session: Option<RecordingSession>,
    /// Bytes received per stopped-or-running session, awaiting `Stopped`.
    pending: BTreeMap<SessionId, Vec<u8>>,
    max_duration: Duration,
    volume: f32,
    beep_on_auto: bool,
    next_session: u64,
    events_tx: Sender<RecorderEvent>,
    events_rx: Receiver<RecorderEvent>,
    clips_saved: u64,
}

impl RecordingController {
    pub fn new(recorder: Box<dyn Recorder>, settings: &Settings) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            recorder,
            session: None,
            pending: BTreeMap::new(),
            max_duration: settings.recording_duration,
            volume: settings.volume,
            beep_on_auto: settings.beep_on_auto,
            next_session: 0,
            events_tx,
            events_rx,
            clips_saved: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.session {
            Some(_) => SessionStatus::Recording,
            None => SessionStatus::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn clips_saved(&self) -> u64 {
        self.clips_saved
    }

    /// Applies to sessions started after this call.
    pub fn set_max_duration(&mut self, duration: Duration) {
        self.max_duration = duration;
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    /// Policy-driven start. No-op while a session is recording.
    pub fn start_auto(&mut self, cx: &mut Context<'_>) -> bool {
        self.start(cx, RecordTrigger::Auto)
    }

    /// User-driven start; never plays the cue. No-op while a session is recording.
    pub fn start_manual(&mut self, cx: &mut Context<'_>) -> bool {
        self.start(cx, RecordTrigger::Manual)
    }

    /// The record toggle: stops the active session, or starts a manual one.
    pub fn stop_manual(&mut self, cx: &mut Context<'_>) {
        if self.session.is_some() {
            self.finish(cx, StopReason::Manual);
        } else {
            self.start_manual(cx);
        }
    }

    /// Auto-stop timer fired for `session`.
    pub fn on_time_limit(&mut self, cx: &mut Context<'_>, session: SessionId) {
        match self.session.as_mut() {
            Some(active) if active.id == session => {
                active.auto_stop = None;
                self.finish(cx, StopReason::TimeLimit);
            }
            _ => log::debug!("time limit for {} ignored: session already closed", session),
        }
    }

    /// Capture timer fired for `session`: pull one camera frame into the
    /// recording and re-arm at the camera's frame interval.
    pub fn on_capture(&mut self, cx: &mut Context<'_>, session: SessionId) {
        let Some(active) = self.session.as_mut() else {
            return;
        };
        if active.id != session {
            return;
        }
        active.capture = None;
        match cx.camera() {
            Some(camera) => {
                if let Err(e) = camera.pump() {
                    log::warn!("{}: frame capture failed: {:#}", session, e);
                }
            }
            None => log::warn!("{}: camera gone while recording", session),
        }
        let deadline = cx.now_ms() + active.frame_interval.as_millis().max(1) as u64;
        active.capture = Some(cx.scheduler.schedule_at(deadline, Wakeup::Capture(session)));
    }

    /// Stop any active session and cancel its timers.
    pub fn shutdown(&mut self, cx: &mut Context<'_>) {
        if self.session.is_some() {
            self.finish(cx, StopReason::Shutdown);
        }
    }

    fn start(&mut self, cx: &mut Context<'_>, trigger: RecordTrigger) -> bool {
        if let Some(active) = &self.session {
            log::debug!("{:?} start ignored: {} already recording", trigger, active.id);
            return false;
        }

        let Some(camera) = cx.camera() else {
            let fault = Fault::camera_not_found();
            log::warn!("recording not started: {}", fault);
            cx.outbox
                .error("Camera not found. Please reconnect the camera.");
            return false;
        };

        let frame_interval = camera.frame_interval();
        let stream = match camera.capture_stream() {
            Ok(stream) => stream,
            Err(e) => {
                let kind = fault_kind(&e).unwrap_or(FaultKind::DeviceUnavailable);
                let fault = Fault::new(kind, format!("{:#}", e));
                log::error!("recording not started: {}", fault);
                cx.outbox.error("Failed to start recording");
                return false;
            }
        };

        self.next_session += 1;
        let id = SessionId::new(self.next_session);
        let events = RecorderEvents::new(id, self.events_tx.clone());
        let handle = match self.recorder.start(stream, events) {
            Ok(handle) => handle,
            Err(e) => {
                let kind = fault_kind(&e).unwrap_or(FaultKind::DeviceUnavailable);
                let fault = Fault::new(kind, format!("{:#}", e));
                log::error!("recording not started: {}", fault);
                cx.outbox.error("Failed to start recording");
                return false;
            }
        };

        // First frame goes in right away; the capture timer supplies the rest.
        if let Some(camera) = cx.camera() {
            if let Err(e) = camera.pump() {
                log::warn!("{}: first frame capture failed: {:#}", id, e);
            }
        }

        if trigger == RecordTrigger::Auto && self.beep_on_auto {
            cx.outbox.cue.beep(self.volume);
        }

        let started_at_ms = cx.now_ms();
        let deadline = started_at_ms + self.max_duration.as_millis() as u64;
        let auto_stop = cx.scheduler.schedule_at(deadline, Wakeup::AutoStop(id));
        let capture = cx.scheduler.schedule_at(
            started_at_ms + frame_interval.as_millis().max(1) as u64,
            Wakeup::Capture(id),
        );

        self.pending.insert(id, Vec::new());
        self.session = Some(RecordingSession {
            id,
            trigger,
            started_at_ms,
            max_duration: self.max_duration,
            frame_interval,
            handle,
            auto_stop: Some(auto_stop),
            capture: Some(capture),
        });
        log::info!(
            "{} started ({:?}, limit {}s)",
            id,
            trigger,
            self.max_duration.as_secs()
        );
        cx.outbox
            .publish(StateChange::RecordingStarted { session: id, trigger });
        true
    }

    fn finish(&mut self, cx: &mut Context<'_>, reason: StopReason) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = self.recorder.request_flush(&session.handle) {
            log::warn!("{}: flush failed: {:#}", session.id, e);
        }
        for timer in [session.auto_stop, session.capture].into_iter().flatten() {
            cx.scheduler.cancel(timer);
        }
        if let Err(e) = self.recorder.stop(session.handle) {
            // No Stopped event will follow; drop whatever was buffered.
            self.pending.remove(&session.id);
            let fault = Fault::new(FaultKind::CaptureFailure, format!("{:#}", e));
            log::error!("{}: stop failed: {}", session.id, fault);
            cx.outbox.error("Failed to save recording");
        } else {
            cx.outbox.success("Recording stopped");
        }

        log::info!("{} stopped ({:?})", session.id, reason);
        cx.outbox.publish(StateChange::RecordingStopped {
            session: session.id,
            reason,
        });
    }

    /// Apply recorder events delivered since the last call.
    pub fn drain_events(&mut self, cx: &mut Context<'_>) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                RecorderEvent::Data { session, bytes } => match self.pending.get_mut(&session) {
                    Some(buffer) => buffer.extend_from_slice(&bytes),
                    None => log::warn!("{}: data after stop ignored", session),
                },
                RecorderEvent::Stopped { session } => self.package(cx, session),
            }
        }
    }

    fn package(&mut self, cx: &mut Context<'_>, session: SessionId) {
        let Some(bytes) = self.pending.remove(&session) else {
            log::warn!("{}: duplicate stop ignored", session);
            return;
        };
        if bytes.is_empty() {
            let fault = Fault::new(FaultKind::CaptureFailure, "recorder delivered no data");
            log::warn!("{}: {}", session, fault);
            cx.outbox.error("Recording produced no data");
            return;
        }

        let clip = Clip::new(ClipKind::Video, bytes, cx.clock.local_time());
        match cx.outbox.sink.save(&clip) {
            Ok(path) => {
                self.clips_saved += 1;
                cx.outbox.success("Recording saved");
                cx.outbox.publish(StateChange::ClipSaved {
                    kind: ClipKind::Video,
                    path,
                });
            }
            Err(e) => {
                log::error!("{}: saving {} failed: {:#}", session, clip.suggested_filename(), e);
                cx.outbox.error("Failed to save recording");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, FrameSource, MediaStream};
    use crate::notify::{AudioCue, ChannelNotifier, Notice, NoticeKind, Outbox, SilentCue};
    use crate::record::ChunkRecorder;
    use crate::schedule::{Clock, ManualClock, Scheduler};
    use crate::clip::ClipSink;
    use anyhow::{anyhow, Result};
    use chrono::NaiveDate;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::sync::mpsc::Receiver;

    struct FixedStream;

    impl MediaStream for FixedStream {
        fn read_available(&mut self) -> Result<Vec<u8>> {
            Ok(b"chunk".to_vec())
        }
    }

    struct FakeCamera {
        fail_capture: bool,
    }

    impl FrameSource for FakeCamera {
        fn name(&self) -> &str {
            "fake"
        }

        fn current_frame(&mut self) -> Result<Option<&Frame>> {
            Ok(None)
        }

        fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>> {
            if self.fail_capture {
                Err(anyhow!("device busy"))
            } else {
                Ok(Box::new(FixedStream))
            }
        }
    }

    struct CountingSink(Rc<RefCell<Vec<Clip>>>);

    impl ClipSink for CountingSink {
        fn save(&mut self, clip: &Clip) -> Result<PathBuf> {
            self.0.borrow_mut().push(clip.clone());
            Ok(PathBuf::from(clip.suggested_filename()))
        }
    }

    struct Harness {
        clock: ManualClock,
        scheduler: Scheduler,
        camera: Option<Box<dyn FrameSource>>,
        outbox: Outbox,
        notices: Receiver<Notice>,
        clips: Rc<RefCell<Vec<Clip>>>,
    }

    impl Harness {
        fn new(camera: Option<Box<dyn FrameSource>>) -> Self {
            let (notifier, notices) = ChannelNotifier::new();
            let clips = Rc::new(RefCell::new(Vec::new()));
            let origin = NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(8, 7, 9)
                .unwrap();
            Self {
                clock: ManualClock::new(origin),
                scheduler: Scheduler::new(),
                camera,
                outbox: Outbox::new(
                    Box::new(notifier),
                    Box::new(SilentCue),
                    Box::new(CountingSink(clips.clone())),
                ),
                notices,
                clips,
            }
        }

        fn cx(&mut self) -> Context<'_> {
            Context {
                clock: &self.clock,
                scheduler: &mut self.scheduler,
                camera: self.camera.as_deref_mut(),
                outbox: &mut self.outbox,
            }
        }
    }

    fn controller() -> RecordingController {
        RecordingController::new(Box::new(ChunkRecorder::new()), &Settings::default())
    }

    #[test]
    fn second_start_is_a_no_op() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let mut rec = controller();

        assert!(rec.start_manual(&mut h.cx()));
        let first = rec.session().unwrap().id;
        h.clock.advance(Duration::from_millis(500));
        assert!(!rec.start_auto(&mut h.cx()));
        assert_eq!(rec.session().unwrap().id, first);
        assert_eq!(rec.session().unwrap().started_at_ms, 0);
        // One time limit and one capture timer, both from the first start.
        assert_eq!(h.scheduler.len(), 2);
    }

    #[test]
    fn manual_stop_cancels_time_limit_and_saves_one_clip() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let mut rec = controller();

        rec.start_manual(&mut h.cx());
        let timer = rec.session().unwrap().auto_stop_timer().unwrap();
        rec.stop_manual(&mut h.cx());
        rec.drain_events(&mut h.cx());

        assert!(!h.scheduler.is_pending(timer));
        assert_eq!(rec.status(), SessionStatus::Idle);
        let clips = h.clips.borrow();
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].data, b"chunkchunk");
        assert_eq!(clips[0].suggested_filename(), "03-05-2024 08-07-09.webm");
    }

    #[test]
    fn stale_time_limit_is_ignored() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let mut rec = controller();

        rec.start_manual(&mut h.cx());
        let first = rec.session().unwrap().id;
        rec.stop_manual(&mut h.cx());
        rec.start_manual(&mut h.cx());

        rec.on_time_limit(&mut h.cx(), first);
        assert!(rec.is_recording());
    }

    #[test]
    fn toggle_from_idle_starts_manual_session() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let mut rec = controller();
        rec.stop_manual(&mut h.cx());
        assert_eq!(rec.session().unwrap().trigger, RecordTrigger::Manual);
    }

    #[test]
    fn missing_camera_is_reported_distinctly() {
        let mut h = Harness::new(None);
        let mut rec = controller();
        assert!(!rec.start_manual(&mut h.cx()));
        let notice = h.notices.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.message.contains("Camera not found"));
    }

    #[test]
    fn capture_failure_creates_no_session() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: true })));
        let mut rec = controller();
        assert!(!rec.start_auto(&mut h.cx()));
        assert_eq!(rec.status(), SessionStatus::Idle);
        assert!(h.scheduler.is_empty());
        let notices: Vec<Notice> = h.notices.try_iter().collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message, "Failed to start recording");
    }

    #[test]
    fn empty_recording_produces_no_clip() {
        struct Silent;
        impl MediaStream for Silent {
            fn read_available(&mut self) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
        }
        struct SilentCamera;
        impl FrameSource for SilentCamera {
            fn name(&self) -> &str {
                "silent"
            }
            fn current_frame(&mut self) -> Result<Option<&Frame>> {
                Ok(None)
            }
            fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>> {
                Ok(Box::new(Silent))
            }
        }

        let mut h = Harness::new(Some(Box::new(SilentCamera)));
        let mut rec = controller();
        rec.start_manual(&mut h.cx());
        rec.stop_manual(&mut h.cx());
        rec.drain_events(&mut h.cx());

        assert!(h.clips.borrow().is_empty());
        let notices: Vec<(NoticeKind, String)> =
            h.notices.try_iter().map(|n| (n.kind, n.message)).collect();
        assert_eq!(
            notices,
            vec![
                (NoticeKind::Success, "Recording stopped".to_string()),
                (NoticeKind::Error, "Recording produced no data".to_string()),
            ]
        );
    }

    #[test]
    fn saved_recording_notices_do_not_contradict() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let mut rec = controller();
        rec.start_manual(&mut h.cx());
        rec.stop_manual(&mut h.cx());
        rec.drain_events(&mut h.cx());

        let messages: Vec<String> = h.notices.try_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["Recording stopped", "Recording saved"]);
    }

    struct PumpedCamera {
        pumps: Rc<Cell<usize>>,
    }

    impl FrameSource for PumpedCamera {
        fn name(&self) -> &str {
            "pumped"
        }

        fn current_frame(&mut self) -> Result<Option<&Frame>> {
            Ok(None)
        }

        fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>> {
            Ok(Box::new(FixedStream))
        }

        fn frame_interval(&self) -> Duration {
            Duration::from_millis(40)
        }

        fn pump(&mut self) -> Result<()> {
            self.pumps.set(self.pumps.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn capture_timer_feeds_frames_until_stop() {
        let pumps = Rc::new(Cell::new(0));
        let mut h = Harness::new(Some(Box::new(PumpedCamera { pumps: pumps.clone() })));
        let mut rec = controller();

        rec.start_manual(&mut h.cx());
        assert_eq!(pumps.get(), 1);
        let session = rec.session().unwrap().id;

        for _ in 0..5 {
            h.clock.advance(Duration::from_millis(40));
            while let Some((_, wakeup)) = h.scheduler.pop_due(h.clock.now_ms()) {
                assert_eq!(wakeup, Wakeup::Capture(session));
                rec.on_capture(&mut h.cx(), session);
            }
        }
        assert_eq!(pumps.get(), 6);

        let capture = rec.session().unwrap().capture_timer().unwrap();
        rec.stop_manual(&mut h.cx());
        assert!(!h.scheduler.is_pending(capture));
        assert!(h.scheduler.is_empty());

        // A capture wakeup for a finished session does nothing.
        rec.on_capture(&mut h.cx(), session);
        assert_eq!(pumps.get(), 6);
        assert!(h.scheduler.is_empty());
    }

    struct RecordingCue {
        volumes: Rc<RefCell<Vec<f32>>>,
        changes: Receiver<StateChange>,
        started_before_beep: Rc<Cell<bool>>,
    }

    impl AudioCue for RecordingCue {
        fn beep(&mut self, volume: f32) {
            if self
                .changes
                .try_iter()
                .any(|change| matches!(change, StateChange::RecordingStarted { .. }))
            {
                self.started_before_beep.set(true);
            }
            self.volumes.borrow_mut().push(volume);
        }
    }

    fn install_cue(h: &mut Harness) -> (Rc<RefCell<Vec<f32>>>, Rc<Cell<bool>>) {
        let volumes = Rc::new(RefCell::new(Vec::new()));
        let started_before_beep = Rc::new(Cell::new(false));
        let changes = h.outbox.subscribe();
        h.outbox.cue = Box::new(RecordingCue {
            volumes: volumes.clone(),
            changes,
            started_before_beep: started_before_beep.clone(),
        });
        (volumes, started_before_beep)
    }

    #[test]
    fn auto_start_beeps_once_at_volume_before_start_is_published() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let (volumes, started_before_beep) = install_cue(&mut h);
        let mut rec = controller();
        rec.set_volume(0.3);

        assert!(rec.start_auto(&mut h.cx()));
        assert!(!rec.start_auto(&mut h.cx()));
        assert_eq!(*volumes.borrow(), vec![0.3]);
        assert!(!started_before_beep.get());
    }

    #[test]
    fn manual_starts_are_silent() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let (volumes, _) = install_cue(&mut h);
        let mut rec = controller();

        rec.start_manual(&mut h.cx());
        rec.stop_manual(&mut h.cx());
        // Toggle from idle is a manual start as well.
        rec.stop_manual(&mut h.cx());
        assert!(rec.is_recording());
        assert!(volumes.borrow().is_empty());
    }

    #[test]
    fn auto_start_is_silent_when_beep_disabled() {
        let mut h = Harness::new(Some(Box::new(FakeCamera { fail_capture: false })));
        let (volumes, _) = install_cue(&mut h);
        let settings = Settings {
            beep_on_auto: false,
            ..Settings::default()
        };
        let mut rec = RecordingController::new(Box::new(ChunkRecorder::new()), &settings);

        assert!(rec.start_auto(&mut h.cx()));
        assert!(volumes.borrow().is_empty());
    }
}
