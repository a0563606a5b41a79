use std::path::Path;
use std::sync::Arc;

use common::{album_key, join_multi_value, normalize_number, normalize_text, TrackRecord};
use metadata::{MetadataView, TagReader};
use tracing::{debug, warn};

use crate::fs::{file_extension, file_name, now_millis, FileSystem};
use crate::mime::mime_type_for_extension;

/// Turns a file path into a fully populated track record. Never fails: any
/// error is recorded on the record itself.
#[derive(Clone)]
pub struct TrackFiller {
    tags: Arc<dyn TagReader>,
    fs: Arc<dyn FileSystem>,
}

impl TrackFiller {
    pub fn new(tags: Arc<dyn TagReader>, fs: Arc<dyn FileSystem>) -> Self {
        Self { tags, fs }
    }

    pub fn add_metadata_to_track(&self, mut track: TrackRecord) -> TrackRecord {
        let now = now_millis();
        if track.date_added == 0 {
            track.date_added = now;
        }
        track.date_last_synced = now;

        let path = Path::new(&track.path).to_path_buf();
        track.file_name = file_name(&path);
        track.mime_type = mime_type_for_extension(&file_extension(&path));

        let mut failure: Option<String> = None;
        let view = match self.tags.read(&path) {
            Ok(view) => Some(view),
            Err(err) => {
                failure = Some(err.to_string());
                None
            }
        };

        match self.fs.file_size(&path) {
            Ok(size) => track.file_size = size,
            Err(err) => {
                failure.get_or_insert_with(|| err.to_string());
            }
        }
        match self.fs.date_created(&path) {
            Ok(created) => track.date_file_created = created,
            Err(err) => {
                failure.get_or_insert_with(|| err.to_string());
            }
        }
        match self.fs.date_modified(&path) {
            Ok(modified) => track.date_file_modified = modified,
            Err(err) => {
                failure.get_or_insert_with(|| err.to_string());
            }
        }

        match (failure, view) {
            (None, Some(view)) => {
                apply_metadata(&mut track, &view);
                track.mark_indexed();
                debug!("Indexed {:?}", path);
            }
            (Some(reason), _) => {
                warn!("Failed to index {:?}: {}", path, reason);
                track.mark_failed(reason);
            }
            (None, None) => track.mark_failed("no metadata"),
        }

        track
    }
}

fn apply_metadata(track: &mut TrackRecord, view: &MetadataView) {
    track.track_title = normalize_text(view.title.as_deref());
    track.artists = join_multi_value(Some(view.artists.as_slice()));
    track.genres = join_multi_value(Some(view.genres.as_slice()));
    track.album_title = normalize_text(view.album.as_deref());
    track.album_artists = join_multi_value(Some(view.album_artists.as_slice()));
    track.album_key = album_key(view.album.as_deref(), &view.album_artists);
    track.track_number = normalize_number(view.track_number);
    track.track_count = normalize_number(view.track_count);
    track.disc_number = normalize_number(view.disc_number);
    track.disc_count = normalize_number(view.disc_count);
    track.year = normalize_number(view.year);
    track.duration_ms = normalize_number(view.duration_ms);
    track.bit_rate = normalize_number(view.bit_rate);
    track.sample_rate = normalize_number(view.sample_rate);
    track.rating = normalize_number(view.rating);
    track.has_lyrics = view
        .lyrics
        .as_deref()
        .map(|lyrics| !lyrics.is_empty())
        .unwrap_or(false);
}
