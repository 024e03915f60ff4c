//! Terminal presentation for the daemon: startup stages and a live status line.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use crate::state::{RecordTrigger, StateChange};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !disable_pretty,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    /// Pretty output needs a terminal on stderr; `WATCHPOST_PLAIN` opts out in auto mode.
    pub fn detect(mode: UiMode) -> Self {
        let disable_pretty = std::env::var_os("WATCHPOST_PLAIN").is_some();
        Self::new(mode, std::io::stderr().is_terminal(), disable_pretty)
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty {
            let spinner = spinner("{spinner} {msg}");
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    pub fn status_line(&self) -> StatusLine {
        let bar = self.pretty.then(|| {
            let bar = spinner("{spinner} {msg}");
            bar.set_message(idle_message(false));
            bar
        });
        StatusLine {
            bar,
            auto_record: false,
            recording: None,
            clips: 0,
        }
    }
}

fn spinner(template: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_draw_target(ProgressDrawTarget::stderr());
    bar.enable_steady_tick(Duration::from_millis(120));
    let style =
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

/// One-line summary of monitor state, fed from `StateChange`s.
pub struct StatusLine {
    bar: Option<ProgressBar>,
    auto_record: bool,
    recording: Option<(String, RecordTrigger)>,
    clips: u64,
}

impl StatusLine {
    pub fn update(&mut self, change: &StateChange) {
        match change {
            StateChange::AutoRecordChanged(enabled) => self.auto_record = *enabled,
            StateChange::RecordingStarted { session, trigger } => {
                self.recording = Some((session.to_string(), *trigger));
            }
            StateChange::RecordingStopped { .. } => self.recording = None,
            StateChange::ClipSaved { .. } => self.clips += 1,
            _ => {}
        }
        let message = self.message();
        match &self.bar {
            Some(bar) => {
                if let StateChange::ClipSaved { path, .. } = change {
                    bar.println(format!("saved {}", path.display()));
                }
                bar.set_message(message);
            }
            None => eprintln!("--> {}", describe(change)),
        }
    }

    pub fn message(&self) -> String {
        match &self.recording {
            Some((session, trigger)) => format!(
                "● recording {} ({}) | clips saved: {}",
                session,
                match trigger {
                    RecordTrigger::Auto => "auto",
                    RecordTrigger::Manual => "manual",
                },
                self.clips
            ),
            None => format!(
                "{} | clips saved: {}",
                idle_message(self.auto_record),
                self.clips
            ),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn idle_message(auto_record: bool) -> String {
    if auto_record {
        "watching (auto-record on)".to_string()
    } else {
        "watching".to_string()
    }
}

fn describe(change: &StateChange) -> String {
    match change {
        StateChange::ModelLoaded { backend } => format!("model loaded ({})", backend),
        StateChange::ModelUnavailable { reason } => format!("model unavailable: {}", reason),
        StateChange::CameraAttached { name } => format!("camera attached ({})", name),
        StateChange::CameraDetached => "camera detached".to_string(),
        StateChange::LoopStarted => "detection started".to_string(),
        StateChange::LoopStopped => "detection stopped".to_string(),
        StateChange::MirroredChanged(on) => format!("mirrored: {}", on),
        StateChange::AutoRecordChanged(on) => format!("auto-record: {}", on),
        StateChange::VolumeChanged(volume) => format!("volume: {:.2}", volume),
        StateChange::RecordingDurationChanged(duration) => {
            format!("recording duration: {}s", duration.as_secs())
        }
        StateChange::RecordingStarted { session, trigger } => {
            format!("{} started ({:?})", session, trigger)
        }
        StateChange::RecordingStopped { session, reason } => {
            format!("{} stopped ({:?})", session, reason)
        }
        StateChange::ClipSaved { path, .. } => format!("saved {}", path.display()),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
