//! Error types for the ground-station core

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the ground-station core
///
/// Everything except [`Error::Open`] is local and recoverable: the offending
/// line, frame or calibration step is dropped and the stream keeps going.
#[derive(Debug, Error)]
pub enum Error {
    /// Telemetry line starts with `ACC:` but does not match the expected layout
    #[error("malformed telemetry line: {reason}")]
    MalformedLine { reason: String },

    /// No marker, length or payload arrived within the stream timeout
    #[error("timed out while {stage}")]
    Timeout { stage: &'static str },

    /// Image payload is not a decodable image
    #[error("image payload of {size} bytes could not be decoded")]
    ImageDecodeFailure {
        size: usize,
        #[source]
        source: image::ImageError,
    },

    /// Image payload does not fit the 16-bit length prefix
    #[error("image payload of {size} bytes exceeds the 65535-byte frame limit")]
    PayloadTooLarge { size: usize },

    /// A calibration burst collected no samples
    #[error("calibration step {step} collected no samples")]
    InsufficientSamples { step: &'static str },

    /// Calibration result requested before every step completed
    #[error("calibration incomplete: {completed} of {required} steps done")]
    IncompleteCalibration { completed: usize, required: usize },

    /// Positive and negative readings of an axis are identical, scale would be zero
    #[error("calibration axis {axis} has zero scale")]
    DegenerateAxis { axis: char },

    /// The byte stream could not be opened
    #[error("failed to open {port}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// Serial ports could not be enumerated
    #[error("failed to list serial ports")]
    PortEnumeration(#[source] serialport::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Image could not be encoded or written
    #[error("failed to save image")]
    ImageSave(#[source] image::ImageError),
}
