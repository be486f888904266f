//! Crate-wide error type.
//!
//! Every fallible operation in the framework returns [`OscarResult`].
//! The single [`OscarError`] enum spans all modules so that an error can
//! cross module boundaries unchanged; variants carry the offending
//! parameter where that helps diagnosis.
//!
//! Transient conditions (`Timeout`, `NoMessageAvailable`) are part of
//! normal polling protocols and are reported without error-level
//! logging; everything else is logged at the public entry point where
//! it first surfaces.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for results using the framework error type.
pub type OscarResult<T> = std::result::Result<T, OscarError>;

#[derive(Error, Debug)]
pub enum OscarError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unable to open file {path}: {source}")]
    UnableToOpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("file parse error: {0}")]
    FileParseError(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("device is busy")]
    DeviceBusy,

    #[error("operation timed out")]
    Timeout,

    #[error("no capture in flight to abort")]
    NothingToAbort,

    #[error("out of memory")]
    OutOfMemory,

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("captured picture is too old")]
    PictureTooOld,

    #[error("picture too small to be cropped to the requested window")]
    PictureTooSmall,

    #[error("no matching picture available")]
    NoMatchingPicture,

    #[error("no capture started")]
    NoCaptureStarted,

    #[error("no area of interest set")]
    NoAreaOfInterestSet,

    #[error("frame buffer {0} is busy")]
    FrameBufferBusy(u8),

    #[error("frame buffer {0} cannot be deleted while part of a multi buffer")]
    CannotDelete(u8),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("wrong image format: got {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    WrongImageFormat {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("no more DMA chains available")]
    NoMoreChainsAvailable,

    #[error("peer sent a negative acknowledge")]
    NegativeAcknowledge,

    #[error("no message available")]
    NoMessageAvailable,

    #[error("cannot unload: module handles still in use")]
    CannotUnload,

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OscarError {
    /// Whether this error is a transient poll result rather than a
    /// failure. Callers of non-blocking operations retry on these.
    pub fn is_transient(&self) -> bool {
        matches!(self, OscarError::Timeout | OscarError::NoMessageAvailable)
    }
}
