use std::cell::RefCell;
use std::rc::{Rc, Weak};

use anyhow::Result;

use crate::frame::{Frame, MediaStream};

/// Recording taps attached to a camera.
///
/// Each captured frame is JPEG-encoded once and appended to every live tap.
/// A tap lives as long as the `TapStream` handed to the recorder.
#[derive(Default)]
pub(crate) struct TapSet {
    taps: Vec<Weak<RefCell<Vec<u8>>>>,
}

impl TapSet {
    pub(crate) fn open(&mut self) -> TapStream {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        self.taps.push(Rc::downgrade(&buffer));
        TapStream { buffer }
    }

    pub(crate) fn feed(&mut self, frame: &Frame) {
        self.taps.retain(|tap| tap.strong_count() > 0);
        if self.taps.is_empty() {
            return;
        }
        let encoded = match frame.encode_jpeg() {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("frame {} dropped from recording: {:#}", frame.sequence, e);
                return;
            }
        };
        for tap in &self.taps {
            if let Some(buffer) = tap.upgrade() {
                buffer.borrow_mut().extend_from_slice(&encoded);
            }
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.taps.iter().filter(|tap| tap.strong_count() > 0).count()
    }
}

/// Concatenated JPEG frames (MJPEG) captured since the last read.
pub struct TapStream {
    buffer: Rc<RefCell<Vec<u8>>>,
}

impl MediaStream for TapStream {
    fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(std::mem::take(&mut *self.buffer.borrow_mut()))
    }
}
