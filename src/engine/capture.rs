//! The seam between the engine and whatever owns the capture hardware.
//!
//! The engine asks a [`CaptureProvider`] for a stream when the user
//! enables the microphone; the stream lives inside the graph's capture
//! node until the microphone is disabled, at which point dropping the
//! node releases it. Backends that can be re-acquired hand the resource
//! back to their provider on drop.

use crate::graph::capture::CaptureStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
}

pub trait CaptureProvider: Send {
    /// Acquire the capture stream. Fails without side effects; the engine
    /// leaves canonical state untouched on failure.
    fn open(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Provider for deployments with no capture backend at all; `open`
/// always reports the device as unavailable.
#[derive(Debug, Default)]
pub struct NullCapture;

impl CaptureProvider for NullCapture {
    fn open(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "no capture backend configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_capture_is_unavailable() {
        let err = NullCapture.open().err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }
}
