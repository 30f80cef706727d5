//! Error types for the `yuvenc` crate.
//!
//! [`EncodeError`] is returned by every fallible session operation. Backend
//! adapters report [`BackendError`] values, which the session translates into
//! the variant matching the phase that failed (negotiation, submission,
//! teardown).

use std::path::PathBuf;

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `yuvenc` operations.
///
/// Every variant carries a human-readable diagnostic, taken from the backend
/// where one is available.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The requested geometry, frame rate, or option set is invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The destination format has no usable video encoder.
    #[error("No encoder available for codec '{codec}' (container '{container}')")]
    UnsupportedCodec {
        /// Codec the container asked for.
        codec: String,
        /// Short name of the negotiated container.
        container: String,
    },

    /// The backend failed while setting up the session.
    #[error("Negotiation failed while {stage}: {reason}")]
    Negotiation {
        /// The negotiation step that failed.
        stage: &'static str,
        /// Backend diagnostic.
        reason: String,
    },

    /// The encoder rejected a frame because it must be drained first.
    #[error("Encoder is not accepting input: {0}")]
    EncoderBusy(String),

    /// The encoder failed while producing output.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Writing to the destination failed. The session is unusable afterwards.
    #[error("Failed to write to {path}: {reason}")]
    Write {
        /// Destination of the session.
        path: PathBuf,
        /// Backend diagnostic.
        reason: String,
    },

    /// A backend allocation failed.
    #[error("Resource allocation failed: {0}")]
    Resource(String),

    /// A submitted plane does not match the negotiated geometry.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The session was already closed.
    #[error("Encoding session is closed")]
    Closed,

    /// An encoded file could not be inspected.
    #[error("Failed to probe {path}: {reason}")]
    Probe {
        /// File that was probed.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Saving a decoded plane as an image failed.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

/// Classification of a [`BackendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The call cannot make progress until the other side is serviced
    /// (FFmpeg's `EAGAIN`).
    WouldBlock,
    /// The encoder has been fully flushed.
    EndOfStream,
    /// No container format could be deduced from the destination.
    UnknownFormat,
    /// Memory or buffer allocation failed.
    Allocation,
    /// Any other backend failure.
    Other,
}

/// An error reported by an encoding backend.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    /// Classification used by the session to pick an [`EncodeError`] variant.
    pub kind: BackendErrorKind,
    /// Backend diagnostic text.
    pub message: String,
}

impl BackendError {
    /// Create an error of the given kind.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`BackendErrorKind::Other`].
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    /// Shorthand for [`BackendErrorKind::Allocation`].
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Allocation, message)
    }

    /// Shorthand for [`BackendErrorKind::WouldBlock`].
    pub fn would_block(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::WouldBlock, message)
    }

    /// Translate a failure that happened during negotiation.
    pub(crate) fn into_negotiation(self, stage: &'static str) -> EncodeError {
        match self.kind {
            BackendErrorKind::Allocation => {
                EncodeError::Resource(format!("{stage}: {}", self.message))
            }
            _ => EncodeError::Negotiation {
                stage,
                reason: self.message,
            },
        }
    }

    /// Translate a failure reported by the encoder while sending or
    /// receiving.
    pub(crate) fn into_encoding(self) -> EncodeError {
        match self.kind {
            BackendErrorKind::WouldBlock => EncodeError::EncoderBusy(self.message),
            BackendErrorKind::Allocation => EncodeError::Resource(self.message),
            _ => EncodeError::Encoding(self.message),
        }
    }
}

/// Result type used by backend adapters.
pub type BackendResult<T> = Result<T, BackendError>;
