//! Error types for wavplay
//!
//! Two layers, both built on thiserror:
//! - [`DeviceError`]: everything the PCM device and audio sink can report
//! - [`Error`]: the crate-level error the player and binary propagate

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a PCM device or the audio sink wrapping it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Device not found, busy, or permission denied
    #[error("Can't open audio device '{device}': {reason}")]
    Open { device: String, reason: String },

    /// Bit depth has no matching sample format
    #[error("Unsupported bit depth: {0} bits per sample")]
    UnsupportedBitDepth(u16),

    /// Hardware parameters rejected or invalid
    #[error("Failed to configure audio device: {0}")]
    Config(String),

    /// Write attempted before a successful configure
    #[error("Audio device is not configured")]
    NotConfigured,

    /// Device was starved of data (xrun)
    #[error("Audio device underrun")]
    Underrun,

    /// Any write failure other than an underrun
    #[error("Can't write to PCM device: {0}")]
    Write(String),

    /// Operation on a sink that was already closed
    #[error("Audio device is closed")]
    Closed,
}

/// Main error type for wavplay
#[derive(Error, Debug)]
pub enum Error {
    /// Input file could not be opened
    #[error("File {path} not found or unreadable: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Audio device errors (open, configure, write)
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// RIFF/WAVE header did not validate
    #[error("Malformed WAV header: {0}")]
    MalformedHeader(String),

    /// Input ended before the data chunk was located
    #[error("Malformed or truncated file: end of input before data chunk")]
    Truncated,

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using wavplay Error
pub type Result<T> = std::result::Result<T, Error>;
