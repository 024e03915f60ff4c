use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::rgb_len;

/// Stub backend. Reports the bright region of a frame as a single object.
///
/// Pairs with `SyntheticCamera`, whose walking figure is the only thing above
/// the brightness threshold.
pub struct StubBackend {
    label: String,
    threshold: u8,
    min_pixels: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            label: "person".to_string(),
            threshold: 240,
            min_pixels: 16,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            ));
        }

        let w = width as usize;
        let mut count = 0usize;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (usize::MAX, usize::MAX, 0, 0);
        for (i, rgb) in pixels.chunks_exact(3).enumerate() {
            if rgb.iter().all(|c| *c >= self.threshold) {
                let (x, y) = (i % w, i / w);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                count += 1;
            }
        }

        if count < self.min_pixels {
            return Ok(Vec::new());
        }

        let box_w = max_x - min_x + 1;
        let box_h = max_y - min_y + 1;
        let fill = count as f32 / (box_w * box_h) as f32;
        Ok(vec![Detection::new(
            self.label.clone(),
            fill,
            BoundingBox::new(min_x as f32, min_y as f32, box_w as f32, box_h as f32),
        )])
    }
}
