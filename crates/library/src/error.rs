use std::path::PathBuf;

use metadata::MetadataReadError;
use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    /// A configured music folder cannot be read; fatal for the scan run.
    FolderAccess {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A scan for the same library is already in flight.
    ConcurrentScanRejected(String),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
            LibraryError::FolderAccess { path, source } => {
                write!(f, "music folder {} is not accessible: {}", path.display(), source)
            }
            LibraryError::ConcurrentScanRejected(library) => {
                write!(f, "a scan is already running for library {}", library)
            }
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}

/// Failure while refreshing one album's cached artwork. Logged and counted,
/// never fatal for the artwork pass.
#[derive(Debug)]
pub enum AlbumArtworkError {
    Remove(std::io::Error),
    Read(MetadataReadError),
    Write(std::io::Error),
    Store(LibraryError),
}

impl std::fmt::Display for AlbumArtworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlbumArtworkError::Remove(err) => write!(f, "failed to remove cached artwork: {}", err),
            AlbumArtworkError::Read(err) => write!(f, "failed to read artwork: {}", err),
            AlbumArtworkError::Write(err) => write!(f, "failed to cache artwork: {}", err),
            AlbumArtworkError::Store(err) => write!(f, "failed to record artwork: {}", err),
        }
    }
}

impl std::error::Error for AlbumArtworkError {}

impl From<MetadataReadError> for AlbumArtworkError {
    fn from(err: MetadataReadError) -> Self {
        AlbumArtworkError::Read(err)
    }
}

impl From<LibraryError> for AlbumArtworkError {
    fn from(err: LibraryError) -> Self {
        AlbumArtworkError::Store(err)
    }
}
