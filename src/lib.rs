//! Watchpost
//!
//! A camera monitor that watches a live feed, draws labelled boxes around
//! detected objects, and records short clips automatically when a person is
//! present.
//!
//! # Architecture
//!
//! Everything runs on one cooperative event loop owned by [`Monitor`]:
//!
//! 1. **Detection loop**: fixed-delay ticks sample the camera, run the detector,
//!    update the overlay and apply the auto-record policy.
//! 2. **Recording controller**: at most one recording at a time, each one
//!    bounded by a hard time limit and packaged into a single clip.
//! 3. **Owned timers**: ticks and time limits are `TimerId`s held by the
//!    component that armed them and cancelled on every teardown path.
//!
//! # Module Structure
//!
//! - `detect`: detector boundary, backends (stub, tract) and presence policy
//! - `ingest`: camera sources (synthetic, V4L2) and recording taps
//! - `detection`: the detection loop
//! - `record`: recorder boundary and recording controller
//! - `monitor`: event loop and public control surface
//! - `clip`, `notify`, `render`: outward collaborators

pub mod clip;
pub mod config;
pub mod context;
pub mod detect;
pub mod detection;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod notify;
pub mod record;
pub mod render;
pub mod schedule;
pub mod state;
pub mod ui;

pub use clip::{Clip, ClipKind, ClipSink, DirectorySink};
pub use config::MonitorConfig;
pub use context::Context;
pub use detect::{
    target_present, BackendRegistry, BoundingBox, Detection, DetectorBackend, SharedBackend,
    StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detection::{DetectionLoop, TickOutcome};
pub use error::{fault_kind, Fault, FaultKind};
pub use frame::{Frame, FrameSource, MediaStream};
pub use ingest::{open_camera, CameraConfig, SceneScript, SyntheticCamera};
pub use monitor::{Command, Monitor, MonitorParts};
pub use notify::{
    AudioCue, ChannelNotifier, LogNotifier, Notice, NoticeKind, Notifier, Outbox, SilentCue,
    TerminalBell,
};
pub use record::{
    ChunkRecorder, Recorder, RecorderEvent, RecorderEvents, RecorderHandle, RecordingController,
    RecordingSession, SessionId, SessionStatus,
};
pub use render::{BoxRenderer, OverlayBox, OverlaySurface, Renderer};
pub use schedule::{Clock, ManualClock, Scheduler, SystemClock, TimerId, Wakeup};
pub use state::{RecordTrigger, Settings, StateChange, StopReason};
