use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Filesystem capability used by the filler and the scanner. Every call is
/// independently fallible.
pub trait FileSystem: Send + Sync {
    fn file_size(&self, path: &Path) -> io::Result<u64>;

    fn date_created(&self, path: &Path) -> io::Result<u64>;

    fn date_modified(&self, path: &Path) -> io::Result<u64>;

    /// `Ok(false)` only when the path is definitely gone; any other failure
    /// to look it up is an error.
    fn exists(&self, path: &Path) -> io::Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    // Birth time is unsupported on some filesystems; modified time stands in.
    fn date_created(&self, path: &Path) -> io::Result<u64> {
        let meta = fs::metadata(path)?;
        let created = meta.created().or_else(|_| meta.modified())?;
        Ok(millis_since_epoch(created))
    }

    fn date_modified(&self, path: &Path) -> io::Result<u64> {
        Ok(millis_since_epoch(fs::metadata(path)?.modified()?))
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        match fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// File name without its extension.
pub fn file_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Extension including the leading dot, e.g. `.mp3`; empty when absent.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

pub fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

pub fn now_millis() -> u64 {
    millis_since_epoch(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn names_come_from_the_path() {
        let path = Path::new("/home/user/Music/Track 1.mp3");
        assert_eq!(file_name(path), "Track 1");
        assert_eq!(file_extension(path), ".mp3");
        assert_eq!(file_extension(Path::new("/music/README")), "");
    }

    #[test]
    fn local_stats_read_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        fs::write(&path, b"12345").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(1_000)).unwrap();

        let local = LocalFileSystem;
        assert_eq!(local.file_size(&path).unwrap(), 5);
        assert_eq!(local.date_modified(&path).unwrap(), 1_000_000);
        assert!(local.date_created(&path).is_ok());
        assert!(local.file_size(&dir.path().join("missing.mp3")).is_err());
    }

    #[test]
    fn exists_separates_missing_from_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        fs::write(&path, b"x").unwrap();

        let local = LocalFileSystem;
        assert!(local.exists(&path).unwrap());
        assert!(local.exists(dir.path()).unwrap());
        assert!(!local.exists(&dir.path().join("missing.mp3")).unwrap());
        assert!(!local.exists(&dir.path().join("gone/deeper.mp3")).unwrap());
    }
}
