//! Frames and the camera boundary.
//!
//! - `Frame`: one RGB24 image with its pixel dimensions.
//! - `FrameSource`: what the detection loop samples and the recorder captures from.
//! - `MediaStream`: the live stream handed to a recorder by `capture_stream()`.

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::time::Duration;

/// One decoded RGB24 frame.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number assigned by the source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }

    /// Encode as PNG for still captures.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.to_image()?
            .write_to(&mut out, ImageFormat::Png)
            .context("encode png")?;
        Ok(out.into_inner())
    }

    /// Encode as JPEG for recorded streams.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.to_image()?
            .write_to(&mut out, ImageFormat::Jpeg)
            .context("encode jpeg")?;
        Ok(out.into_inner())
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// A camera as seen by the monitor.
pub trait FrameSource {
    /// Human-readable source identifier for logs.
    fn name(&self) -> &str;

    /// The current frame, or `None` while the source has no fully available
    /// frame yet.
    fn current_frame(&mut self) -> Result<Option<&Frame>>;

    /// Open a live stream for recording. Only the recording controller calls this.
    fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>>;

    /// Spacing between frames while a recording is running.
    fn frame_interval(&self) -> Duration {
        Duration::from_millis(100)
    }

    /// Grab one frame for the open capture streams. The recording controller
    /// calls this at `frame_interval()` while a session is active, so
    /// recordings keep receiving frames whether or not detection runs.
    fn pump(&mut self) -> Result<()> {
        self.current_frame().map(|_| ())
    }
}

/// A live encoded stream. Dropping it releases the capture.
pub trait MediaStream {
    /// Encoded bytes produced since the previous read. Never blocks.
    fn read_available(&mut self) -> Result<Vec<u8>>;
}
