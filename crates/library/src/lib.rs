mod artwork;
mod error;
mod events;
mod filler;
mod fs;
mod mime;
mod scanner;
mod store;

pub use artwork::{ArtworkCache, ArtworkIndexer, ArtworkReport};
pub use error::{AlbumArtworkError, LibraryError};
pub use events::{NullListener, ScanEvent, ScanListener, ScanPhase};
pub use filler::TrackFiller;
pub use fs::{file_extension, file_name, now_millis, FileSystem, LocalFileSystem};
pub use mime::{is_supported_audio, mime_type_for_extension, UNKNOWN_MIME_TYPE};
pub use scanner::{
    library_id, CancelFlag, ScanGuard, ScanLocks, ScanReport, Scanner, DEFAULT_SCAN_WORKERS,
};
pub use store::{group_albums, TrackRepository, TrackStore};
