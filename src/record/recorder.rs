use std::collections::HashMap;
use std::sync::mpsc::Sender;

use anyhow::{anyhow, Result};

use super::SessionId;
use crate::frame::MediaStream;

/// Opaque handle to a running recorder. Consumed by `Recorder::stop`.
#[derive(Debug, PartialEq, Eq)]
pub struct RecorderHandle(u64);

impl RecorderHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Bytes produced by a flush or by the final stop.
    Data { session: SessionId, bytes: Vec<u8> },
    /// No further data will arrive for the session.
    Stopped { session: SessionId },
}

/// Event channel a recorder reports on, bound to one session.
#[derive(Clone)]
pub struct RecorderEvents {
    session: SessionId,
    tx: Sender<RecorderEvent>,
}

impl RecorderEvents {
    pub fn new(session: SessionId, tx: Sender<RecorderEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn data(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(RecorderEvent::Data {
            session: self.session,
            bytes,
        });
    }

    pub fn stopped(&self) {
        let _ = self.tx.send(RecorderEvent::Stopped {
            session: self.session,
        });
    }
}

/// Encoder boundary.
///
/// Data is never returned directly; it arrives later as `RecorderEvent`s.
pub trait Recorder {
    fn start(&mut self, stream: Box<dyn MediaStream>, events: RecorderEvents)
        -> Result<RecorderHandle>;

    /// Ask for the data buffered so far to be delivered.
    fn request_flush(&mut self, handle: &RecorderHandle) -> Result<()>;

    /// Deliver the remaining data, then `Stopped`, and release the stream.
    fn stop(&mut self, handle: RecorderHandle) -> Result<()>;
}

struct ActiveRecording {
    stream: Box<dyn MediaStream>,
    events: RecorderEvents,
}

/// Passes stream bytes through in chunks, one chunk per flush or stop.
#[derive(Default)]
pub struct ChunkRecorder {
    next_id: u64,
    active: HashMap<u64, ActiveRecording>,
}

impl ChunkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }
}

impl Recorder for ChunkRecorder {
    fn start(
        &mut self,
        stream: Box<dyn MediaStream>,
        events: RecorderEvents,
    ) -> Result<RecorderHandle> {
        self.next_id += 1;
        self.active
            .insert(self.next_id, ActiveRecording { stream, events });
        Ok(RecorderHandle(self.next_id))
    }

    fn request_flush(&mut self, handle: &RecorderHandle) -> Result<()> {
        let recording = self
            .active
            .get_mut(&handle.0)
            .ok_or_else(|| anyhow!("recorder {} is not running", handle.0))?;
        let bytes = recording.stream.read_available()?;
        recording.events.data(bytes);
        Ok(())
    }

    fn stop(&mut self, handle: RecorderHandle) -> Result<()> {
        let mut recording = self
            .active
            .remove(&handle.0)
            .ok_or_else(|| anyhow!("recorder {} is not running", handle.0))?;
        match recording.stream.read_available() {
            Ok(bytes) => recording.events.data(bytes),
            Err(e) => log::warn!(
                "recorder {}: final read failed for {}: {:#}",
                handle.0,
                recording.events.session(),
                e
            ),
        }
        recording.events.stopped();
        Ok(())
    }
}
