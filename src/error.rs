use std::path::PathBuf;

use thiserror::Error;

use crate::header::Compression;

/// A specialized [`Result`] type for tile archive operations.
pub type TilesResult<T> = Result<T, TilesError>;

/// Errors that can occur while reading or writing tile archives.
#[derive(Debug, Error)]
pub enum TilesError {
    #[error("invalid archive header")]
    InvalidHeader,
    #[error("unsupported PMTiles version")]
    UnsupportedPmTilesVersion,
    #[error("invalid compression")]
    InvalidCompression,
    #[error("invalid tile type")]
    InvalidTileType,
    #[error("invalid directory")]
    InvalidDirectory,
    #[error("compression not supported ({0:?})")]
    UnsupportedCompression(Compression),
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),
    #[error("write called after finalize")]
    WriteAfterFinalize,
    #[error("finalize called twice")]
    FinalizeTwice,
    #[error("directory entry overflow")]
    IndexEntryOverflow,
    #[error("invalid file pattern: {0}")]
    InvalidPattern(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub(crate) fn into_u32(value: usize) -> TilesResult<u32> {
    u32::try_from(value).map_err(|_| TilesError::IndexEntryOverflow)
}
