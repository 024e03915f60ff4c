//! Recoverable fault taxonomy.
//!
//! Every fault here is handled locally: it is logged, surfaced to the user as an
//! error notice, and the loop or controller stays usable afterwards.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Model failed to load or is still loading. Ticks become no-ops.
    ModelUnavailable,
    /// Camera or stream capture could not be obtained. Recording start aborts.
    DeviceUnavailable,
    /// A single detection call failed. The tick is skipped.
    InferenceFailure,
    /// Recorder delivered empty or unusable data. No file is produced.
    CaptureFailure,
}

impl FaultKind {
    pub fn code(self) -> &'static str {
        match self {
            FaultKind::ModelUnavailable => "MODEL_UNAVAILABLE",
            FaultKind::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            FaultKind::InferenceFailure => "INFERENCE_FAILURE",
            FaultKind::CaptureFailure => "CAPTURE_FAILURE",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// No camera is attached at all, as opposed to a camera that failed.
    pub fn camera_not_found() -> Self {
        Self::new(FaultKind::DeviceUnavailable, "camera not found")
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for Fault {}

/// Returns the fault kind carried by an `anyhow` error chain, if any.
pub fn fault_kind(err: &anyhow::Error) -> Option<FaultKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Fault>())
        .map(|fault| fault.kind)
}
