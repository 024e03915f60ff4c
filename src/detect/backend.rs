use anyhow::Result;

use crate::detect::result::Detection;

/// Object detector backend.
///
/// A backend sees one frame at a time and keeps no temporal state that would
/// change its answer for a given frame.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an RGB24 frame.
    ///
    /// Implementations must treat the pixel slice as read-only and must not
    /// retain it beyond the call.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once when the model is loaded.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
