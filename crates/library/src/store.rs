use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{split_multi_value, AlbumRecord, TrackRecord};
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::LibraryError;

const INDEX_VERSION: u32 = 1;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
const ALBUM_ARTWORK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("album_artwork");

const META_VERSION_KEY: &str = "version";

/// Persistent store of track rows, consumed by the pipeline.
pub trait TrackRepository: Send + Sync {
    fn get_all_tracks(&self) -> Result<Vec<TrackRecord>, LibraryError>;

    fn get_tracks_needing_indexing(&self) -> Result<Vec<TrackRecord>, LibraryError>;

    fn get_albums(&self) -> Result<Vec<AlbumRecord>, LibraryError>;

    fn get_albums_needing_artwork_indexing(&self) -> Result<Vec<AlbumRecord>, LibraryError>;

    fn upsert_track(&self, track: &TrackRecord) -> Result<(), LibraryError>;

    fn delete_tracks_by_path(&self, paths: &[String]) -> Result<usize, LibraryError>;

    /// Upserts and deletes in a single write transaction.
    fn commit_scan(&self, upserts: &[TrackRecord], deletions: &[String])
        -> Result<(), LibraryError>;

    /// Records (or clears) the cached artwork for an album.
    fn set_artwork_path(&self, album_key: &str, path: Option<&str>) -> Result<(), LibraryError>;

    /// Clears the artwork flag on the given tracks. Returns how many changed.
    fn clear_artwork_flags(&self, paths: &[String]) -> Result<usize, LibraryError>;

    /// Keys of every album that still has at least one indexed track.
    fn get_album_keys(&self) -> Result<HashSet<String>, LibraryError>;

    /// Drops artwork rows for albums that no longer exist and returns their
    /// keys.
    fn remove_orphaned_artwork(&self) -> Result<Vec<String>, LibraryError>;
}

#[derive(Clone)]
pub struct TrackStore {
    db: Arc<Database>,
}

impl TrackStore {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        let db = open_or_create_db(path)?;
        Self::with_db(Arc::new(db))
    }

    pub fn with_db(db: Arc<Database>) -> Result<Self, LibraryError> {
        let store = Self { db };
        store.init_tables()?;
        Ok(store)
    }

    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    fn init_tables(&self) -> Result<(), LibraryError> {
        let version = read_version(&self.db)?;
        let write_txn = self.db.begin_write()?;
        match version {
            Some(version) if version == INDEX_VERSION => {}
            Some(version) => {
                warn!("Index version mismatch ({}); clearing tracks", version);
                clear_table(&write_txn, TRACKS_TABLE)?;
                clear_table(&write_txn, ALBUM_ARTWORK_TABLE)?;
            }
            None => info!("Creating empty track index"),
        }
        {
            let mut meta_table = write_txn.open_table(META_TABLE)?;
            let version_bytes = encode_value(&INDEX_VERSION)?;
            meta_table.insert(META_VERSION_KEY, version_bytes.as_slice())?;
            write_txn.open_table(TRACKS_TABLE)?;
            write_txn.open_table(ALBUM_ARTWORK_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read_tracks<F>(&self, keep: F) -> Result<Vec<TrackRecord>, LibraryError>
    where
        F: Fn(&TrackRecord) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(TRACKS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut tracks = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let track: TrackRecord = decode_value(entry.1.value())?;
            if keep(&track) {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    fn read_artwork(&self) -> Result<HashMap<String, String>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(ALBUM_ARTWORK_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(HashMap::new()),
            Err(err) => return Err(err.into()),
        };
        let mut artwork = HashMap::new();
        for entry in table.iter()? {
            let entry = entry?;
            let path: String = decode_value(entry.1.value())?;
            artwork.insert(entry.0.value().to_string(), path);
        }
        Ok(artwork)
    }
}

impl TrackRepository for TrackStore {
    fn get_all_tracks(&self) -> Result<Vec<TrackRecord>, LibraryError> {
        self.read_tracks(|_| true)
    }

    fn get_tracks_needing_indexing(&self) -> Result<Vec<TrackRecord>, LibraryError> {
        self.read_tracks(|track| track.needs_indexing)
    }

    fn get_albums(&self) -> Result<Vec<AlbumRecord>, LibraryError> {
        let tracks = self.get_all_tracks()?;
        let artwork = self.read_artwork()?;
        Ok(group_albums(tracks, &artwork))
    }

    fn get_albums_needing_artwork_indexing(&self) -> Result<Vec<AlbumRecord>, LibraryError> {
        let tracks = self.get_all_tracks()?;
        let flagged: HashSet<String> = tracks
            .iter()
            .filter(|track| track.needs_album_artwork_indexing && !track.album_key.is_empty())
            .map(|track| track.album_key.clone())
            .collect();
        if flagged.is_empty() {
            return Ok(Vec::new());
        }
        let artwork = self.read_artwork()?;
        Ok(group_albums(tracks, &artwork)
            .into_iter()
            .filter(|album| flagged.contains(&album.album_key))
            .collect())
    }

    fn upsert_track(&self, track: &TrackRecord) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            let bytes = encode_value(track)?;
            table.insert(track.path.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_tracks_by_path(&self, paths: &[String]) -> Result<usize, LibraryError> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            let mut removed = 0usize;
            for path in paths {
                if table.remove(path.as_str())?.is_some() {
                    removed += 1;
                }
            }
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn commit_scan(
        &self,
        upserts: &[TrackRecord],
        deletions: &[String],
    ) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            for track in upserts {
                let bytes = encode_value(track)?;
                table.insert(track.path.as_str(), bytes.as_slice())?;
            }
            for path in deletions {
                table.remove(path.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn set_artwork_path(&self, album_key: &str, path: Option<&str>) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut artwork_table = write_txn.open_table(ALBUM_ARTWORK_TABLE)?;
            match path {
                Some(path) => {
                    let bytes = encode_value(&path.to_string())?;
                    artwork_table.insert(album_key, bytes.as_slice())?;
                }
                None => {
                    artwork_table.remove(album_key)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn clear_artwork_flags(&self, paths: &[String]) -> Result<usize, LibraryError> {
        let write_txn = self.db.begin_write()?;
        let cleared = {
            let mut table = write_txn.open_table(TRACKS_TABLE)?;
            let mut cleared = 0usize;
            for path in paths {
                let mut track: TrackRecord = match table.get(path.as_str())? {
                    Some(value) => decode_value(value.value())?,
                    None => continue,
                };
                if !track.needs_album_artwork_indexing {
                    continue;
                }
                track.needs_album_artwork_indexing = false;
                let bytes = encode_value(&track)?;
                table.insert(path.as_str(), bytes.as_slice())?;
                cleared += 1;
            }
            cleared
        };
        write_txn.commit()?;
        Ok(cleared)
    }

    fn get_album_keys(&self) -> Result<HashSet<String>, LibraryError> {
        Ok(self
            .read_tracks(|track| !track.album_key.is_empty())?
            .into_iter()
            .map(|track| track.album_key)
            .collect())
    }

    fn remove_orphaned_artwork(&self) -> Result<Vec<String>, LibraryError> {
        let live = self.get_album_keys()?;
        let orphaned: Vec<String> = self
            .read_artwork()?
            .into_keys()
            .filter(|key| !live.contains(key))
            .collect();
        if orphaned.is_empty() {
            return Ok(orphaned);
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ALBUM_ARTWORK_TABLE)?;
            for key in &orphaned {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(orphaned)
    }
}

/// Folds tracks into albums by album key. Tracks that never indexed
/// successfully carry no key and are left out.
pub fn group_albums(
    mut tracks: Vec<TrackRecord>,
    artwork: &HashMap<String, String>,
) -> Vec<AlbumRecord> {
    tracks.sort_by(|a, b| a.path.cmp(&b.path));
    let mut albums: Vec<AlbumRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for track in tracks {
        if track.album_key.is_empty() {
            continue;
        }
        match index.get(&track.album_key) {
            Some(&pos) => {
                let album = &mut albums[pos];
                album.date_added = earliest(album.date_added, track.date_added);
                album.date_file_created = earliest(album.date_file_created, track.date_file_created);
                album.date_last_played = album.date_last_played.max(track.date_last_played);
                if album.year.is_none() {
                    album.year = track.year;
                }
                album.track_paths.push(track.path);
            }
            None => {
                index.insert(track.album_key.clone(), albums.len());
                albums.push(AlbumRecord {
                    artwork_path: artwork.get(&track.album_key).cloned(),
                    album_key: track.album_key,
                    album_title: track.album_title,
                    album_artists: split_multi_value(&track.album_artists),
                    artists: split_multi_value(&track.artists),
                    date_added: track.date_added,
                    date_last_played: track.date_last_played,
                    date_file_created: track.date_file_created,
                    year: track.year,
                    track_paths: vec![track.path.clone()],
                    first_track_path: track.path,
                });
            }
        }
    }

    albums
}

fn earliest(current: u64, candidate: u64) -> u64 {
    match (current, candidate) {
        (0, value) | (value, 0) => value,
        (a, b) => a.min(b),
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, LibraryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn read_version(db: &Database) -> Result<Option<u32>, LibraryError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(META_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let version = match table.get(META_VERSION_KEY)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    Ok(version)
}

fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), LibraryError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{album_key, join_multi_value};

    fn indexed_track(path: &str, album: &str, artists: &[&str]) -> TrackRecord {
        let artists: Vec<String> = artists.iter().map(|a| a.to_string()).collect();
        let mut track = TrackRecord::new(path);
        track.album_title = album.to_string();
        track.album_artists = join_multi_value(Some(artists.as_slice()));
        track.album_key = album_key(Some(album), &artists);
        track.date_added = 100;
        track.mark_indexed();
        track
    }

    fn open_store(dir: &tempfile::TempDir) -> TrackStore {
        TrackStore::open(&dir.path().join("library.redb")).unwrap()
    }

    #[test]
    fn upsert_and_delete_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.upsert_track(&TrackRecord::new("/music/a.mp3")).unwrap();
        store.upsert_track(&TrackRecord::new("/music/b.mp3")).unwrap();
        assert_eq!(store.get_all_tracks().unwrap().len(), 2);
        assert_eq!(store.get_tracks_needing_indexing().unwrap().len(), 2);

        let removed = store
            .delete_tracks_by_path(&["/music/a.mp3".to_string(), "/music/zzz.mp3".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        let remaining = store.get_all_tracks().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].path, "/music/b.mp3");
    }

    #[test]
    fn commit_scan_applies_upserts_and_deletions_together() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.upsert_track(&TrackRecord::new("/music/old.mp3")).unwrap();

        let fresh = indexed_track("/music/new.mp3", "Album", &["Artist"]);
        store
            .commit_scan(&[fresh.clone()], &["/music/old.mp3".to_string()])
            .unwrap();

        assert_eq!(store.get_all_tracks().unwrap(), vec![fresh]);
        assert!(store.get_tracks_needing_indexing().unwrap().is_empty());
    }

    #[test]
    fn albums_group_tracks_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let mut first = indexed_track("/music/x/1.mp3", "Album", &["Artist"]);
        first.date_added = 300;
        first.year = Some(2020);
        let mut second = indexed_track("/music/x/2.mp3", "Album", &["Artist"]);
        second.date_added = 200;
        second.date_last_played = Some(50);
        let other = indexed_track("/music/y/1.mp3", "Other", &["Artist"]);
        let mut failed = TrackRecord::new("/music/z/broken.mp3");
        failed.mark_failed("bad header");
        store.commit_scan(&[first, second, other, failed], &[]).unwrap();

        let albums = store.get_albums().unwrap();
        assert_eq!(albums.len(), 2);
        let album = &albums[0];
        assert_eq!(album.album_title, "Album");
        assert_eq!(album.display_artist(), "Artist");
        assert_eq!(album.date_added, 200);
        assert_eq!(album.date_last_played, Some(50));
        assert_eq!(album.year, Some(2020));
        assert_eq!(album.first_track_path, "/music/x/1.mp3");
        assert_eq!(album.track_paths, vec!["/music/x/1.mp3", "/music/x/2.mp3"]);
        assert_eq!(album.artwork_path, None);
    }

    #[test]
    fn artwork_path_is_stored_per_album() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let track = indexed_track("/music/x/1.mp3", "Album", &["Artist"]);
        let key = track.album_key.clone();
        let other = indexed_track("/music/y/1.mp3", "Other", &["Artist"]);
        store.commit_scan(&[track, other], &[]).unwrap();
        assert_eq!(store.get_albums_needing_artwork_indexing().unwrap().len(), 2);

        store.set_artwork_path(&key, Some("/cache/album.jpg")).unwrap();
        assert_eq!(store.get_albums_needing_artwork_indexing().unwrap().len(), 2);
        let cleared = store
            .clear_artwork_flags(&["/music/x/1.mp3".to_string()])
            .unwrap();
        assert_eq!(cleared, 1);

        let pending = store.get_albums_needing_artwork_indexing().unwrap();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].album_key, key);
        let album = store
            .get_albums()
            .unwrap()
            .into_iter()
            .find(|album| album.album_key == key)
            .unwrap();
        assert_eq!(album.artwork_path.as_deref(), Some("/cache/album.jpg"));

        store.set_artwork_path(&key, None).unwrap();
        let album = store
            .get_albums()
            .unwrap()
            .into_iter()
            .find(|album| album.album_key == key)
            .unwrap();
        assert_eq!(album.artwork_path, None);
    }

    #[test]
    fn clearing_flags_only_touches_listed_flagged_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let first = indexed_track("/music/x/1.mp3", "Album", &["Artist"]);
        let second = indexed_track("/music/x/2.mp3", "Album", &["Artist"]);
        store.commit_scan(&[first, second], &[]).unwrap();

        let paths = vec![
            "/music/x/1.mp3".to_string(),
            "/music/x/2.mp3".to_string(),
            "/music/missing.mp3".to_string(),
        ];
        assert_eq!(store.clear_artwork_flags(&paths).unwrap(), 2);
        assert_eq!(store.clear_artwork_flags(&paths).unwrap(), 0);
        assert!(store.get_albums_needing_artwork_indexing().unwrap().is_empty());
    }

    #[test]
    fn orphaned_artwork_rows_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let kept = indexed_track("/music/x/1.mp3", "Album", &["Artist"]);
        let gone = indexed_track("/music/y/1.mp3", "Other", &["Artist"]);
        let kept_key = kept.album_key.clone();
        let gone_key = gone.album_key.clone();
        store.commit_scan(&[kept, gone], &[]).unwrap();
        store.set_artwork_path(&kept_key, Some("/cache/a.jpg")).unwrap();
        store.set_artwork_path(&gone_key, Some("/cache/b.jpg")).unwrap();
        assert!(store.remove_orphaned_artwork().unwrap().is_empty());

        store
            .commit_scan(&[], &["/music/y/1.mp3".to_string()])
            .unwrap();

        assert_eq!(store.remove_orphaned_artwork().unwrap(), vec![gone_key]);
        assert_eq!(store.get_album_keys().unwrap().len(), 1);
        let artwork = store.read_artwork().unwrap();
        assert_eq!(artwork.len(), 1);
        assert!(artwork.contains_key(&kept_key));
    }

    #[test]
    fn version_mismatch_clears_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        store.upsert_track(&TrackRecord::new("/music/a.mp3")).unwrap();
        let db = store.db();
        {
            let write_txn = db.begin_write().unwrap();
            {
                let mut meta = write_txn.open_table(META_TABLE).unwrap();
                let bytes = encode_value(&(INDEX_VERSION + 1)).unwrap();
                meta.insert(META_VERSION_KEY, bytes.as_slice()).unwrap();
            }
            write_txn.commit().unwrap();
        }
        drop(store);

        let reopened = TrackStore::with_db(db).unwrap();
        assert!(reopened.get_all_tracks().unwrap().is_empty());
        assert_eq!(read_version(&reopened.db).unwrap(), Some(INDEX_VERSION));
    }
}
