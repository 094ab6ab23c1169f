//! Error types for the editing session.
//!
//! Precondition violations are returned synchronously from the call that
//! violates them. Job failures never surface here; they reach the listener
//! as an [`InpaintFailure`].

use std::fmt;

use thiserror::Error;

/// The four image layers owned by a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    Original,
    Mask,
    Person,
    Background,
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Original => "original",
            Layer::Mask => "mask",
            Layer::Person => "person",
            Layer::Background => "background",
        }
    }

    pub fn all() -> &'static [Layer] {
        &[Layer::Original, Layer::Mask, Layer::Person, Layer::Background]
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure to turn an image source into a pixel buffer.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("RAW decode error: {0}")]
    Raw(String),

    #[error("unsupported image source: {0}")]
    UnsupportedFormat(String),
}

/// Failure to write a finished image.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Synchronous errors returned by [`crate::Session`] operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// `start_inpaint` while a job is in flight. Try again later.
    #[error("an inpainting job is already running")]
    JobAlreadyRunning,

    /// A mutation that would invalidate the running job's buffers.
    #[error("operation rejected while an inpainting job is in progress")]
    JobInProgress,

    #[error("{layer} is {}x{} but {}x{} was expected", actual.0, actual.1, expected.0, expected.1)]
    DimensionMismatch {
        layer: Layer,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("{0} layer has not been set")]
    MissingLayer(Layer),

    /// The OS refused to start the job's worker thread. Nothing was started.
    #[error("could not start inpainting worker: {0}")]
    WorkerSpawn(std::io::Error),
}

/// Why an accepted job did not produce a new background.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InpaintFailure {
    #[error("inpainter failed: {0}")]
    Inpainter(String),

    #[error("inpainter panicked: {0}")]
    Panicked(String),

    #[error("inpainter returned {}x{}, expected {}x{}", actual.0, actual.1, expected.0, expected.1)]
    InvalidResult {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("inpainting job was cancelled")]
    Cancelled,
}

/// Convenience Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_message_names_layer_and_sizes() {
        let err = SessionError::DimensionMismatch {
            layer: Layer::Mask,
            expected: (100, 80),
            actual: (64, 64),
        };
        assert_eq!(err.to_string(), "mask is 64x64 but 100x80 was expected");
    }

    #[test]
    fn decode_error_is_transparent_inside_session_error() {
        let err: SessionError = DecodeError::UnsupportedFormat("empty buffer".into()).into();
        assert_eq!(err.to_string(), "unsupported image source: empty buffer");
    }
}
