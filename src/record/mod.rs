//! Recording sessions.
//!
//! - `Recorder`: the encoder boundary (start, flush, stop, async data events).
//! - `RecordingController`: the only owner of recorder handles. Enforces one
//!   active session, the hard time limit and the record toggle.

mod controller;
mod recorder;

use std::fmt;

pub use controller::{RecordingController, RecordingSession, SessionStatus};
pub use recorder::{ChunkRecorder, Recorder, RecorderEvent, RecorderEvents, RecorderHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}
