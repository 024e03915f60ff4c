//! Runtime settings, loop state and the state-change events observers receive.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::clip::ClipKind;
use crate::detect::{SharedBackend, DEFAULT_TARGET_LABEL};
use crate::record::SessionId;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_RECORDING_DURATION: Duration = Duration::from_secs(10);
pub const MIN_RECORDING_DURATION: Duration = Duration::from_secs(1);
pub const MAX_RECORDING_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_VOLUME: f32 = 0.8;

/// User-adjustable settings. All of them apply without a restart.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub mirrored: bool,
    pub auto_record: bool,
    /// Cue volume in [0, 1].
    pub volume: f32,
    /// Hard limit for every recording, in [1 s, 60 s].
    pub recording_duration: Duration,
    /// Play the audio cue when a recording starts automatically.
    pub beep_on_auto: bool,
    /// Label that arms auto-recording.
    pub target_label: String,
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mirrored: true,
            auto_record: false,
            volume: DEFAULT_VOLUME,
            recording_duration: DEFAULT_RECORDING_DURATION,
            beep_on_auto: true,
            target_label: DEFAULT_TARGET_LABEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        validate_volume(self.volume)?;
        validate_recording_duration(self.recording_duration)?;
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.target_label.trim().is_empty() {
            return Err(anyhow!("target label must not be empty"));
        }
        Ok(())
    }
}

pub fn validate_volume(volume: f32) -> Result<f32> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(anyhow!("volume must be within [0, 1], got {}", volume));
    }
    Ok(volume)
}

pub fn validate_recording_duration(duration: Duration) -> Result<Duration> {
    if duration < MIN_RECORDING_DURATION || duration > MAX_RECORDING_DURATION {
        return Err(anyhow!(
            "recording duration must be within [{}s, {}s], got {:?}",
            MIN_RECORDING_DURATION.as_secs(),
            MAX_RECORDING_DURATION.as_secs(),
            duration
        ));
    }
    Ok(duration)
}

/// State owned by the detection loop.
///
/// The loop never polls while `model` is absent.
pub struct LoopState {
    pub model: Option<SharedBackend>,
    pub mirrored: bool,
    pub auto_record: bool,
    pub poll_interval: Duration,
    pub target_label: String,
}

impl LoopState {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: None,
            mirrored: settings.mirrored,
            auto_record: settings.auto_record,
            poll_interval: settings.poll_interval,
            target_label: settings.target_label.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordTrigger {
    /// Started by the presence policy.
    Auto,
    /// Started by the user.
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    TimeLimit,
    Manual,
    Shutdown,
}

/// Published to observers after every state transition.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    ModelLoaded { backend: String },
    ModelUnavailable { reason: String },
    CameraAttached { name: String },
    CameraDetached,
    LoopStarted,
    LoopStopped,
    MirroredChanged(bool),
    AutoRecordChanged(bool),
    VolumeChanged(f32),
    RecordingDurationChanged(Duration),
    RecordingStarted { session: SessionId, trigger: RecordTrigger },
    RecordingStopped { session: SessionId, reason: StopReason },
    ClipSaved { kind: ClipKind, path: PathBuf },
}
