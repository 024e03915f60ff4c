mod backend;
mod backends;
mod presence;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use presence::{target_present, DEFAULT_TARGET_LABEL};
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{BoundingBox, Detection};
