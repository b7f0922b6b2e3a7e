//! Error types for ALICE-FM
//!
//! One closed enum covers construction, image loading, querying and
//! persistence. Nothing in the crate returns integer status codes.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by index construction, loading and querying.
#[derive(Error, Debug)]
pub enum FmError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u8),

    #[error("corrupt index image: {0}")]
    CompressedFormat(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("search invariant violated: {0}")]
    Search(String),

    #[error("index was built without position marking")]
    NoMarkedChar,

    #[error("cannot write index file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read index file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<TryReserveError> for FmError {
    fn from(_: TryReserveError) -> Self {
        FmError::OutOfMemory
    }
}

impl FmError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        FmError::CompressedFormat(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        FmError::Decode(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FmError>;

/// Allocate an empty vector with reserved capacity.
pub(crate) fn try_with_capacity<T>(cap: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(cap)?;
    Ok(v)
}
