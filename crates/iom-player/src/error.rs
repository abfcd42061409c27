//! Error types for the rolling queue and the decode step.

use std::io;

use thiserror::Error;

/// Failures reported by [`crate::rolling::RollingQueue`].
#[derive(Error, Debug)]
pub enum QueueError {
    /// `next` was called with no item after the cursor.
    #[error("no next item")]
    NoNextItem,

    /// `previous` was called at the lowest retrievable index.
    #[error("no previous item")]
    NoPreviousItem,

    /// `now` was called before the cursor was ever moved.
    #[error("no current item")]
    NoCurrentItem,

    /// The outstanding background load could not read its source.
    #[error("background load failed")]
    LoadFailure,

    /// The current item was not populated within the configured load timeout.
    #[error("timed out waiting for background load")]
    LoadTimeout,

    /// Spill-file write or read failed.
    #[error("storage error: {0}")]
    Storage(#[from] io::Error),
}

/// Failures reported by the decode step. Scoped to one queued item.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// None of the known container signatures matched.
    #[error("unsupported audio format")]
    UnsupportedFormat,

    #[error("read source: {0}")]
    Read(#[from] io::Error),

    #[error("probe container: {0}")]
    Probe(#[from] symphonia::core::errors::Error),

    #[error("no default audio track")]
    MissingTrack,

    #[error("unknown {0}")]
    MissingParams(&'static str),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
