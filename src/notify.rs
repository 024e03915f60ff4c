//! Everything the monitor emits outward: user notices, the audio cue,
//! finished clips and state-change events.

use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::clip::ClipSink;
use crate::state::StateChange;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Fire-and-forget user notification.
pub trait Notifier {
    fn notify(&mut self, kind: NoticeKind, message: &str);
}

/// Writes notices to the log.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success => log::info!("notice: {}", message),
            NoticeKind::Error => log::error!("notice: {}", message),
        }
    }
}

/// Forwards notices over a channel. A dropped receiver is ignored.
pub struct ChannelNotifier {
    tx: Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<Notice>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&mut self, kind: NoticeKind, message: &str) {
        let _ = self.tx.send(Notice {
            kind,
            message: message.to_string(),
        });
    }
}

/// Audible cue played when a recording starts automatically.
pub trait AudioCue {
    /// `volume` is in [0, 1]; zero must be silent.
    fn beep(&mut self, volume: f32);
}

/// Terminal bell on stderr.
#[derive(Default)]
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn beep(&mut self, volume: f32) {
        if volume <= 0.0 {
            return;
        }
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

#[derive(Default)]
pub struct SilentCue;

impl AudioCue for SilentCue {
    fn beep(&mut self, _volume: f32) {}
}

/// Outward collaborators, grouped so core components can borrow them together.
pub struct Outbox {
    pub notifier: Box<dyn Notifier>,
    pub cue: Box<dyn AudioCue>,
    pub sink: Box<dyn ClipSink>,
    observers: Vec<Sender<StateChange>>,
}

impl Outbox {
    pub fn new(
        notifier: Box<dyn Notifier>,
        cue: Box<dyn AudioCue>,
        sink: Box<dyn ClipSink>,
    ) -> Self {
        Self {
            notifier,
            cue,
            sink,
            observers: Vec::new(),
        }
    }

    pub fn success(&mut self, message: &str) {
        self.notifier.notify(NoticeKind::Success, message);
    }

    pub fn error(&mut self, message: &str) {
        self.notifier.notify(NoticeKind::Error, message);
    }

    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = mpsc::channel();
        self.observers.push(tx);
        rx
    }

    /// Deliver a state change to every live observer; disconnected ones are dropped.
    pub fn publish(&mut self, change: StateChange) {
        self.observers
            .retain(|observer| observer.send(change.clone()).is_ok());
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Clip;
    use anyhow::Result;
    use std::path::PathBuf;

    struct NullSink;

    impl ClipSink for NullSink {
        fn save(&mut self, clip: &Clip) -> Result<PathBuf> {
            Ok(PathBuf::from(clip.suggested_filename()))
        }
    }

    #[test]
    fn publish_prunes_dropped_observers() {
        let (notifier, _rx) = ChannelNotifier::new();
        let mut outbox = Outbox::new(Box::new(notifier), Box::new(SilentCue), Box::new(NullSink));
        let kept = outbox.subscribe();
        let dropped = outbox.subscribe();
        drop(dropped);

        outbox.publish(StateChange::MirroredChanged(false));
        assert_eq!(outbox.observer_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), StateChange::MirroredChanged(false));
    }

    #[test]
    fn channel_notifier_preserves_order() {
        let (notifier, rx) = ChannelNotifier::new();
        let mut outbox = Outbox::new(Box::new(notifier), Box::new(SilentCue), Box::new(NullSink));
        outbox.error("first");
        outbox.success("second");
        let kinds: Vec<NoticeKind> = rx.try_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NoticeKind::Error, NoticeKind::Success]);
    }
}
