/// Axis-aligned box in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Reflect horizontally within a surface of the given width.
    pub fn mirrored(self, surface_width: f32) -> Self {
        Self {
            x: surface_width - self.x - self.width,
            ..self
        }
    }
}

/// One detected object in a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Class label exactly as the model produced it (e.g. "person").
    pub label: String,
    /// Score in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            bbox,
        }
    }
}
