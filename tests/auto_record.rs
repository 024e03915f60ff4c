use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use watchpost::{
    BoundingBox, BoxRenderer, ChannelNotifier, ChunkRecorder, Clip, ClipKind, ClipSink, Detection,
    DetectorBackend, Frame, FrameSource, ManualClock, MediaStream, Monitor, MonitorParts, Notice,
    NoticeKind, RecordTrigger, Settings, SilentCue, StateChange, StopReason,
};

struct PersonDetector {
    calls: Arc<AtomicUsize>,
    present: Arc<Mutex<bool>>,
}

impl DetectorBackend for PersonDetector {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn detect(&mut self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let present = *self.present.lock().map_err(|_| anyhow!("poisoned"))?;
        let mut detections = vec![Detection::new(
            "chair",
            0.7,
            BoundingBox::new(0.0, 0.0, 2.0, 2.0),
        )];
        if present {
            detections.insert(
                0,
                Detection::new("person", 0.9, BoundingBox::new(2.0, 2.0, 4.0, 4.0)),
            );
        }
        Ok(detections)
    }
}

struct ByteStream;

impl MediaStream for ByteStream {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(vec![0xab; 4])
    }
}

struct FakeCamera {
    frame: Frame,
    fail_capture: Rc<RefCell<bool>>,
}

impl FrameSource for FakeCamera {
    fn name(&self) -> &str {
        "fake://camera"
    }

    fn current_frame(&mut self) -> Result<Option<&Frame>> {
        Ok(Some(&self.frame))
    }

    fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>> {
        if *self.fail_capture.borrow() {
            return Err(anyhow!("NotReadableError: device in use"));
        }
        Ok(Box::new(ByteStream))
    }
}

struct MemorySink(Rc<RefCell<Vec<Clip>>>);

impl ClipSink for MemorySink {
    fn save(&mut self, clip: &Clip) -> Result<PathBuf> {
        self.0.borrow_mut().push(clip.clone());
        Ok(PathBuf::from(clip.suggested_filename()))
    }
}

struct Rig {
    clock: ManualClock,
    monitor: Monitor,
    changes: Receiver<StateChange>,
    notices: Receiver<Notice>,
    clips: Rc<RefCell<Vec<Clip>>>,
    calls: Arc<AtomicUsize>,
    present: Arc<Mutex<bool>>,
    fail_capture: Rc<RefCell<bool>>,
}

impl Rig {
    fn new(settings: Settings) -> Self {
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(8, 7, 9)
                .unwrap(),
        );
        let (notifier, notices) = ChannelNotifier::new();
        let clips = Rc::new(RefCell::new(Vec::new()));
        let fail_capture = Rc::new(RefCell::new(false));
        let mut monitor = Monitor::new(MonitorParts {
            clock: Box::new(clock.clone()),
            camera: Some(Box::new(FakeCamera {
                frame: Frame::new(vec![0; 16 * 16 * 3], 16, 16, 0).unwrap(),
                fail_capture: fail_capture.clone(),
            })),
            renderer: Box::new(BoxRenderer::new()),
            recorder: Box::new(ChunkRecorder::new()),
            notifier: Box::new(notifier),
            cue: Box::new(SilentCue),
            sink: Box::new(MemorySink(clips.clone())),
            settings,
        })
        .unwrap();
        let changes = monitor.subscribe();
        Self {
            clock,
            monitor,
            changes,
            notices,
            clips,
            calls: Arc::new(AtomicUsize::new(0)),
            present: Arc::new(Mutex::new(false)),
            fail_capture,
        }
    }

    fn load_model(&mut self) {
        let model = Arc::new(Mutex::new(PersonDetector {
            calls: self.calls.clone(),
            present: self.present.clone(),
        }));
        self.monitor.install_model(model);
    }

    fn set_present(&self, present: bool) {
        *self.present.lock().unwrap() = present;
    }

    /// Advance the clock one millisecond at a time, turning at every step.
    fn run_for(&mut self, duration: Duration) {
        for _ in 0..duration.as_millis() {
            self.clock.advance(Duration::from_millis(1));
            self.monitor.turn();
        }
    }

    fn changes(&self) -> Vec<StateChange> {
        self.changes.try_iter().collect()
    }
}

fn auto_settings(duration_secs: u64) -> Settings {
    Settings {
        auto_record: true,
        recording_duration: Duration::from_secs(duration_secs),
        ..Settings::default()
    }
}

#[test]
fn person_triggers_one_bounded_recording_and_one_clip() {
    let mut rig = Rig::new(auto_settings(2));
    rig.monitor.start();
    rig.load_model();
    rig.set_present(true);

    rig.run_for(Duration::from_millis(100));
    assert!(rig.monitor.is_recording());

    let started: Vec<StateChange> = rig
        .changes()
        .into_iter()
        .filter(|change| matches!(change, StateChange::RecordingStarted { .. }))
        .collect();
    assert_eq!(started.len(), 1);
    let StateChange::RecordingStarted { session, trigger } = started[0].clone() else {
        unreachable!()
    };
    assert_eq!(trigger, RecordTrigger::Auto);

    // Person stays in view: no second session may start before the limit.
    rig.run_for(Duration::from_millis(1999));
    assert!(rig.monitor.is_recording());
    assert!(rig.clips.borrow().is_empty());

    rig.run_for(Duration::from_millis(1));
    let stopped: Vec<StateChange> = rig
        .changes()
        .into_iter()
        .filter(|change| matches!(change, StateChange::RecordingStopped { .. }))
        .collect();
    assert_eq!(
        stopped,
        vec![StateChange::RecordingStopped {
            session,
            reason: StopReason::TimeLimit
        }]
    );

    let clips = rig.clips.borrow();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].kind, ClipKind::Video);
    assert!(!clips[0].data.is_empty());
}

#[test]
fn no_model_means_no_inference() {
    let mut rig = Rig::new(auto_settings(2));
    rig.monitor.start();
    rig.set_present(true);

    rig.run_for(Duration::from_millis(500));
    assert_eq!(rig.calls.load(Ordering::SeqCst), 0);
    assert!(!rig.monitor.is_recording());
    assert_eq!(rig.monitor.pending_timers(), 0);
    assert!(rig.monitor.overlay().boxes().is_empty());
}

#[test]
fn manual_stop_before_limit_prevents_time_limit_stop() {
    let mut rig = Rig::new(Settings::default());
    rig.monitor.start();
    rig.load_model();

    rig.monitor.toggle_record();
    assert!(rig.monitor.is_recording());
    rig.run_for(Duration::from_millis(3000));
    rig.monitor.toggle_record();
    rig.run_for(Duration::from_millis(8000));

    let reasons: Vec<StopReason> = rig
        .changes()
        .into_iter()
        .filter_map(|change| match change {
            StateChange::RecordingStopped { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec![StopReason::Manual]);
    assert_eq!(rig.clips.borrow().len(), 1);
    // Only the detection tick remains armed.
    assert_eq!(rig.monitor.pending_timers(), 1);
}

#[test]
fn auto_start_during_manual_recording_is_a_no_op() {
    let mut rig = Rig::new(auto_settings(10));
    rig.monitor.start();
    rig.load_model();
    rig.monitor.toggle_record();
    let session = rig.monitor.recordings().session().unwrap().id;

    rig.set_present(true);
    rig.run_for(Duration::from_millis(500));

    let active = rig.monitor.recordings().session().unwrap();
    assert_eq!(active.id, session);
    assert_eq!(active.trigger, RecordTrigger::Manual);
    assert_eq!(active.started_at_ms, 0);
}

#[test]
fn capture_failure_reports_once_and_recovers() {
    let mut rig = Rig::new(Settings::default());
    *rig.fail_capture.borrow_mut() = true;

    rig.monitor.toggle_record();
    assert!(!rig.monitor.is_recording());
    let errors: Vec<Notice> = rig
        .notices
        .try_iter()
        .filter(|notice| notice.kind == NoticeKind::Error)
        .collect();
    assert_eq!(errors.len(), 1);

    *rig.fail_capture.borrow_mut() = false;
    rig.monitor.toggle_record();
    assert!(rig.monitor.is_recording());
}

#[test]
fn duration_change_applies_to_next_session_only() {
    let mut rig = Rig::new(Settings::default());
    rig.monitor.toggle_record();
    rig.monitor
        .set_recording_duration(Duration::from_secs(2))
        .unwrap();

    rig.run_for(Duration::from_millis(5000));
    assert!(rig.monitor.is_recording());
    rig.run_for(Duration::from_millis(5000));
    assert!(!rig.monitor.is_recording());

    rig.monitor.toggle_record();
    rig.run_for(Duration::from_millis(2000));
    assert!(!rig.monitor.is_recording());
    assert_eq!(rig.clips.borrow().len(), 2);
}

#[test]
fn settings_are_validated() {
    let mut rig = Rig::new(Settings::default());
    assert!(rig.monitor.set_volume(1.5).is_err());
    assert!(rig
        .monitor
        .set_recording_duration(Duration::from_secs(0))
        .is_err());
    assert!(rig.monitor.set_volume(0.0).is_ok());
    assert_eq!(rig.monitor.settings().volume, 0.0);
}

#[test]
fn toggle_auto_record_notices_follow_new_state() {
    let mut rig = Rig::new(Settings::default());
    rig.monitor.toggle_auto_record();
    rig.monitor.toggle_auto_record();
    let kinds: Vec<NoticeKind> = rig.notices.try_iter().map(|notice| notice.kind).collect();
    assert_eq!(kinds, vec![NoticeKind::Success, NoticeKind::Error]);
    assert!(!rig.monitor.settings().auto_record);
}

#[test]
fn still_capture_is_named_by_local_time() {
    let mut rig = Rig::new(Settings::default());
    assert!(rig.monitor.capture_still());
    let clips = rig.clips.borrow();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].suggested_filename(), "03-05-2024 08-07-09.png");
    assert_eq!(&clips[0].data[..4], b"\x89PNG");
}

#[test]
fn still_capture_without_camera_reports_camera_not_found() {
    let mut rig = Rig::new(Settings::default());
    assert!(rig.monitor.detach_camera().is_some());
    assert!(!rig.monitor.capture_still());
    let notice = rig.notices.try_recv().unwrap();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert!(notice.message.contains("Camera not found"));
}

#[test]
fn stop_closes_active_recording() {
    let mut rig = Rig::new(Settings::default());
    rig.monitor.start();
    rig.load_model();
    rig.monitor.toggle_record();

    rig.monitor.stop();
    assert!(!rig.monitor.is_recording());
    assert_eq!(rig.monitor.pending_timers(), 0);
    assert_eq!(rig.clips.borrow().len(), 1);
}

#[test]
fn model_failure_leaves_monitor_usable() {
    let mut rig = Rig::new(auto_settings(2));
    rig.monitor.start();
    rig.monitor.model_failed(&anyhow!("weights missing"));
    assert!(!rig.monitor.has_model());
    assert!(rig
        .changes()
        .iter()
        .any(|change| matches!(change, StateChange::ModelUnavailable { .. })));

    rig.load_model();
    rig.set_present(true);
    rig.run_for(Duration::from_millis(100));
    assert!(rig.monitor.is_recording());
}
