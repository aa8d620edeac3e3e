//! Error handling for the tracer.
//!
//! Every failure here is fatal to the frame being produced: the caller keeps
//! whatever it displayed last. Configuration problems never show up here;
//! they are clamped where they enter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("Failed to allocate buffer '{label}' ({len} x {stride} bytes): {reason}")]
    BufferAllocation {
        label: String,
        len: usize,
        stride: usize,
        reason: String,
    },

    #[error("Failed to allocate image '{label}' ({width}x{height}): {reason}")]
    ImageAllocation {
        label: String,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Kernel resource '{0}' was never bound")]
    UnboundResource(&'static str),

    #[error("Image size mismatch: {0:?} vs {1:?}")]
    SizeMismatch((u32, u32), (u32, u32)),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Readback error: {0}")]
    Readback(String),
}

impl TracerError {
    pub fn device<T: ToString>(msg: T) -> Self {
        TracerError::Device(msg.to_string())
    }

    pub fn readback<T: ToString>(msg: T) -> Self {
        TracerError::Readback(msg.to_string())
    }
}

/// Result type alias for tracer operations
pub type TracerResult<T> = Result<T, TracerError>;
