//! Camera sources.
//!
//! - Synthetic camera (`stub://` URLs), always available
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source implements `FrameSource`. Frames grabbed by `pump()` are fed
//! to the live recording taps, which is how `capture_stream()` is served.
//! Detection samples through `current_frame()` and never feeds a tap.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
mod tap;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use std::time::Duration;

use crate::frame::FrameSource;

pub use synthetic::{SceneScript, SyntheticCamera};
pub use tap::TapStream;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// Camera selection and capture geometry.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// `stub://name` for the synthetic camera, or a device path such as `/dev/video0`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl CameraConfig {
    /// Frame spacing implied by `target_fps`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.target_fps.max(1)))
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Open and connect the camera named by `config.url`.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        let mut camera = SyntheticCamera::new(config.clone())?;
        camera.connect()?;
        return Ok(Box::new(camera));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        let mut camera = V4l2Camera::new(config.clone())?;
        camera.connect()?;
        Ok(Box::new(camera))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!("camera {} requires the ingest-v4l2 feature", config.url)
    }
}
