//! Synthetic camera for `stub://` URLs.
//!
//! Renders a dim, slightly noisy background and, for part of every scene
//! cycle, a bright rectangle walking across the frame. `StubBackend` reports
//! that rectangle as a person, so the whole pipeline can run without hardware.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::Duration;

use super::tap::TapSet;
use super::CameraConfig;
use crate::frame::{Frame, FrameSource, MediaStream};

/// Pixel value of the walking figure. Background never exceeds 127.
pub const FIGURE_LUMA: u8 = 250;

/// When the figure is visible within a scene cycle.
#[derive(Clone, Copy, Debug)]
pub struct SceneScript {
    /// Frames per scene cycle.
    pub cycle_frames: u64,
    /// Trailing frames of each cycle during which the figure is visible.
    pub figure_frames: u64,
}

impl Default for SceneScript {
    fn default() -> Self {
        Self {
            cycle_frames: 300,
            figure_frames: 100,
        }
    }
}

impl SceneScript {
    fn figure_visible(&self, frame_count: u64) -> bool {
        if self.cycle_frames == 0 {
            return false;
        }
        let phase = frame_count % self.cycle_frames;
        phase >= self.cycle_frames.saturating_sub(self.figure_frames)
    }
}

pub struct SyntheticCamera {
    config: CameraConfig,
    script: SceneScript,
    connected: bool,
    frame_count: u64,
    current: Option<Frame>,
    taps: TapSet,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!("synthetic camera requires a stub:// url"));
        }
        if config.width < 8 || config.height < 8 {
            return Err(anyhow!("synthetic camera needs at least 8x8 pixels"));
        }
        Ok(Self {
            config,
            script: SceneScript::default(),
            connected: false,
            frame_count: 0,
            current: None,
            taps: TapSet::default(),
        })
    }

    pub fn with_script(mut self, script: SceneScript) -> Self {
        self.script = script;
        self
    }

    /// Synthetic cameras are always reachable.
    pub fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticCamera: connected to {}", self.config.url);
        Ok(())
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn render(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut rng = rand::thread_rng();

        let mut pixels = vec![0u8; width * height * 3];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            let x = (i / 3) % width;
            let base = (x * 96 / width) as u8;
            *pixel = base + rng.gen_range(0..16);
        }

        if self.script.figure_visible(self.frame_count) {
            let fig_w = (width / 6).max(2);
            let fig_h = (height / 2).max(2);
            let phase = self.frame_count % self.script.cycle_frames.max(1);
            let travel = width.saturating_sub(fig_w);
            let left = (phase as usize * 7) % travel.max(1);
            let top = height / 4;
            for y in top..(top + fig_h).min(height) {
                for x in left..(left + fig_w).min(width) {
                    let offset = (y * width + x) * 3;
                    pixels[offset..offset + 3].fill(FIGURE_LUMA);
                }
            }
        }

        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }
}

impl FrameSource for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn current_frame(&mut self) -> Result<Option<&Frame>> {
        if !self.connected {
            return Ok(None);
        }
        self.current = Some(self.render()?);
        Ok(self.current.as_ref())
    }

    fn frame_interval(&self) -> Duration {
        self.config.frame_interval()
    }

    fn pump(&mut self) -> Result<()> {
        if !self.connected {
            return Err(anyhow!("{} is not connected", self.config.url));
        }
        let frame = self.render()?;
        self.taps.feed(&frame);
        self.current = Some(frame);
        Ok(())
    }

    fn capture_stream(&mut self) -> Result<Box<dyn MediaStream>> {
        if !self.connected {
            return Err(anyhow!("{} is not connected", self.config.url));
        }
        let stream = self.taps.open();
        log::debug!(
            "{}: recording tap opened ({} active)",
            self.config.url,
            self.taps.active()
        );
        Ok(Box::new(stream))
    }
}
