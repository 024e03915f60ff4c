//! Detection overlay.
//!
//! The overlay surface mirrors the frame's pixel geometry. A `Renderer` turns
//! one frame's detections into shapes on that surface and touches nothing else.

use crate::detect::{BoundingBox, Detection, DEFAULT_TARGET_LABEL};

/// Overlay box color for the target class.
pub const TARGET_COLOR: [u8; 3] = [0xFF, 0x0F, 0x0F];
/// Overlay box color for every other class.
pub const OTHER_COLOR: [u8; 3] = [0x00, 0xB6, 0x12];

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub bbox: BoundingBox,
    pub caption: String,
    pub color: [u8; 3],
    pub fill_alpha: f32,
}

/// Drawing surface sized to the current frame.
#[derive(Debug, Default)]
pub struct OverlaySurface {
    width: u32,
    height: u32,
    boxes: Vec<OverlayBox>,
}

impl OverlaySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match the frame dimensions. Returns true when the size changed, in
    /// which case the surface is cleared.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.boxes.clear();
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    pub fn push(&mut self, overlay: OverlayBox) {
        self.boxes.push(overlay);
    }

    pub fn boxes(&self) -> &[OverlayBox] {
        &self.boxes
    }
}

pub trait Renderer {
    fn render(&mut self, mirrored: bool, detections: &[Detection], surface: &mut OverlaySurface);
}

/// Labelled, translucent boxes; the target class is drawn in red.
pub struct BoxRenderer {
    target_label: String,
}

impl BoxRenderer {
    pub fn new() -> Self {
        Self {
            target_label: DEFAULT_TARGET_LABEL.to_string(),
        }
    }

    pub fn with_target_label(mut self, label: impl Into<String>) -> Self {
        self.target_label = label.into();
        self
    }
}

impl Default for BoxRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for BoxRenderer {
    fn render(&mut self, mirrored: bool, detections: &[Detection], surface: &mut OverlaySurface) {
        surface.clear();
        let surface_width = surface.width() as f32;
        for detection in detections {
            let bbox = if mirrored {
                detection.bbox.mirrored(surface_width)
            } else {
                detection.bbox
            };
            let color = if detection.label == self.target_label {
                TARGET_COLOR
            } else {
                OTHER_COLOR
            };
            surface.push(OverlayBox {
                bbox,
                caption: format!("{} {:.0}%", detection.label, detection.confidence * 100.0),
                color,
                fill_alpha: 0.4,
            });
        }
    }
}
