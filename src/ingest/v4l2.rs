//! V4L2 camera.
//!
//! Captures frames from a local device node (e.g., /dev/video0) through an
//! mmap stream. Frames are normalized to RGB24 before they reach the detector
//! or a recording tap.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::tap::TapSet;
use super::CameraConfig;
use crate::frame::{Frame, FrameSource, MediaStream};

pub struct V4l2Camera {
    config: CameraConfig,
    state: Option<DeviceState>,
    pixel_format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    current: Option<Frame>,
    taps: TapSet,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.contains("://") {
            return Err(anyhow!("v4l2 camera expects a device path, got {}", config.url));
        }
        Ok(Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            pixel_format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
            current: None,
            taps: TapSet::default(),
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.url)
            .with_context(|| format!("open v4l2 device {}", self.config.url))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    self.config.url,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported v4l2 pixel format {}",
                String::from_utf8_lossy(&format.fourcc.repr)
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Camera: failed to set fps on {}: {}",
                    self.config.url,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Camera: connected to {} ({}x{}, {:?})",
            self.config.url,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn capture(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let raw = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        let rgb = normalize_to_rgb(
            &raw,
            self.active_width,
            self.active_height,
            self.pixel_format,
        )?;
        Frame::new(rgb, self.active_width, self.active_height, self.frame_count)
    }
}

impl FrameSource for V4l2Camera {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn current_frame(&mut self) -> Result<Option<&Frame>> {
        if self.state.is_none() {
            return Ok(None);
        }
        self.current = Some(self.capture()?);
        Ok(self.current.as_ref())
    }

    fn frame_interval(&self) -> Duration {
        self.config.frame_interval()
    }

    fn pump(&mut self) -> Result<()> {
        if self.state.is_none() {
            return Err(anyhow!("{} is not capturing", self.config.url));
        }
        let frame = self.capture()?;
        self.taps.feed(&frame);
        self.current = Some(frame);
        Ok(())
    }

    fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>> {
        if self.state.is_none() || !self.is_healthy() {
            return Err(anyhow!("{} is not capturing", self.config.url));
        }
        Ok(Box::new(self.taps.open()))
    }
}
