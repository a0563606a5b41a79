use serde::{Deserialize, Serialize};

/// Separator used by the stored multi-value encoding. Every value is wrapped
/// as `;value;`, so `["A", "B"]` is stored as `;A;;B;` and the empty string
/// is reserved for "no values".
pub const MULTI_VALUE_DELIMITER: char = ';';

const DELIMITER_REPLACEMENT: char = ',';
const KEY_SEP: char = '\x1f';
const KNOWN_MARK: char = '=';
const UNKNOWN_MARK: char = '?';

pub const UNKNOWN_ARTIST: &str = "Unknown artist";
pub const UNKNOWN_TITLE: &str = "Unknown title";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub path: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub track_title: String,
    pub artists: String,
    pub genres: String,
    pub album_title: String,
    pub album_artists: String,
    pub album_key: String,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_count: Option<u32>,
    pub year: Option<u32>,
    pub duration_ms: Option<u64>,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub rating: Option<u32>,
    pub has_lyrics: bool,
    /// Milliseconds since the unix epoch; zero means "not set yet".
    pub date_added: u64,
    pub date_last_synced: u64,
    pub date_file_created: u64,
    pub date_file_modified: u64,
    pub date_last_played: Option<u64>,
    pub needs_indexing: bool,
    pub needs_album_artwork_indexing: bool,
    pub indexing_success: bool,
    pub indexing_failure_reason: String,
}

impl TrackRecord {
    /// A freshly discovered file, due for indexing.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            needs_indexing: true,
            ..Self::default()
        }
    }

    pub fn mark_indexed(&mut self) {
        self.needs_indexing = false;
        self.needs_album_artwork_indexing = true;
        self.indexing_success = true;
        self.indexing_failure_reason.clear();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.needs_indexing = false;
        self.indexing_success = false;
        self.indexing_failure_reason = if reason.trim().is_empty() {
            "unknown error".to_string()
        } else {
            reason
        };
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub album_key: String,
    pub album_title: String,
    pub album_artists: Vec<String>,
    pub artists: Vec<String>,
    pub date_added: u64,
    pub date_last_played: Option<u64>,
    pub date_file_created: u64,
    pub year: Option<u32>,
    pub artwork_path: Option<String>,
    /// Track used for embedded artwork and the co-located cover file lookup.
    pub first_track_path: String,
    #[serde(default)]
    pub track_paths: Vec<String>,
}

impl AlbumRecord {
    pub fn display_artist(&self) -> &str {
        self.album_artists
            .iter()
            .chain(self.artists.iter())
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_ARTIST)
    }

    pub fn display_title(&self) -> &str {
        let title = self.album_title.trim();
        if title.is_empty() {
            UNKNOWN_TITLE
        } else {
            title
        }
    }
}

/// Encodes a sequence of values in the stored multi-value format.
///
/// A value that itself contains the delimiter has it replaced, which alters
/// that value only and keeps its neighbours intact.
pub fn join_multi_value(values: Option<&[String]>) -> String {
    let values = match values {
        Some(values) if !values.is_empty() => values,
        _ => return String::new(),
    };
    let mut out = String::new();
    for value in values {
        out.push(MULTI_VALUE_DELIMITER);
        out.extend(value.chars().map(|ch| {
            if ch == MULTI_VALUE_DELIMITER {
                DELIMITER_REPLACEMENT
            } else {
                ch
            }
        }));
        out.push(MULTI_VALUE_DELIMITER);
    }
    out
}

pub fn split_multi_value(field: &str) -> Vec<String> {
    if field.is_empty() {
        return Vec::new();
    }
    let inner = field.strip_prefix(MULTI_VALUE_DELIMITER).unwrap_or(field);
    let inner = inner.strip_suffix(MULTI_VALUE_DELIMITER).unwrap_or(inner);
    let mut pair = String::with_capacity(2);
    pair.push(MULTI_VALUE_DELIMITER);
    pair.push(MULTI_VALUE_DELIMITER);
    inner.split(pair.as_str()).map(str::to_string).collect()
}

pub fn normalize_text(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Numbers are stored as read; kept as a single place to add unit conversion.
pub fn normalize_number<T>(value: Option<T>) -> Option<T> {
    value
}

/// Stable key grouping tracks into an album.
///
/// The key is order-sensitive on `album_artists`: `[A, B]` and `[B, A]` are
/// different albums. A missing or blank title and an empty artist list each
/// map to a reserved "unknown" marker that no real value can produce.
pub fn album_key(album_title: Option<&str>, album_artists: &[String]) -> String {
    let mut input = String::new();
    match album_title.map(str::trim).filter(|title| !title.is_empty()) {
        Some(title) => {
            input.push(KNOWN_MARK);
            input.push_str(title);
        }
        None => input.push(UNKNOWN_MARK),
    }
    input.push(KEY_SEP);
    if album_artists.is_empty() {
        input.push(UNKNOWN_MARK);
    } else {
        input.push(KNOWN_MARK);
        input.push_str(&join_multi_value(Some(album_artists)));
    }
    stable_id(&input)
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn stable_id_is_deterministic() {
        let first = stable_id("/music/Artist/Album/Track.mp3");
        let second = stable_id("/music/Artist/Album/Track.mp3");
        assert_eq!(first, second);
        assert_ne!(first, stable_id("/music/Artist/Album/Track2.mp3"));
    }

    #[test]
    fn multi_value_uses_wrapped_delimiters() {
        let values = strings(&["Artist 1", "Artist 2"]);
        assert_eq!(join_multi_value(Some(values.as_slice())), ";Artist 1;;Artist 2;");
        assert_eq!(join_multi_value(Some(&[] as &[String])), "");
        assert_eq!(join_multi_value(None), "");
    }

    #[test]
    fn multi_value_round_trips() {
        let cases = [
            strings(&[]),
            strings(&["Solo"]),
            strings(&["A", "B", "C"]),
            strings(&[""]),
            strings(&["A", "", "B"]),
            strings(&["", ""]),
            strings(&[" padded "]),
        ];
        for values in cases {
            let encoded = join_multi_value(Some(values.as_slice()));
            assert_eq!(split_multi_value(&encoded), values, "encoded as {encoded:?}");
        }
    }

    #[test]
    fn empty_value_is_distinct_from_no_values() {
        assert_ne!(join_multi_value(Some(strings(&[""]).as_slice())), join_multi_value(None));
    }

    #[test]
    fn delimiter_inside_value_does_not_leak_into_neighbours() {
        let values = strings(&["a;", "b"]);
        let decoded = split_multi_value(&join_multi_value(Some(values.as_slice())));
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1], "b");
    }

    #[test]
    fn normalize_text_trims_and_defaults() {
        assert_eq!(normalize_text(Some("  Album title ")), "Album title");
        assert_eq!(normalize_text(None), "");
        assert_eq!(normalize_number(Some(320)), Some(320));
        assert_eq!(normalize_number::<u32>(None), None);
    }

    #[test]
    fn album_key_is_deterministic_and_order_sensitive() {
        let forward = strings(&["Album artist 1", "Album artist 2"]);
        let reversed = strings(&["Album artist 2", "Album artist 1"]);
        let key = album_key(Some("Album title"), &forward);
        assert_eq!(key, album_key(Some("Album title"), &forward));
        assert_ne!(key, album_key(Some("Album title"), &reversed));
    }

    #[test]
    fn album_key_reserves_unknown_buckets() {
        let artists = strings(&["Artist"]);
        let unknown_title = album_key(None, &artists);
        assert_eq!(unknown_title, album_key(Some("   "), &artists));
        assert_ne!(unknown_title, album_key(Some("?"), &artists));
        assert_ne!(unknown_title, album_key(Some(""), &strings(&[])));

        let unknown_artists = album_key(Some("Album"), &[]);
        assert_ne!(unknown_artists, album_key(Some("Album"), &strings(&["?"])));
        assert_ne!(unknown_artists, album_key(Some("Album"), &strings(&[""])));
    }

    #[test]
    fn album_display_falls_back() {
        let mut album = AlbumRecord::default();
        assert_eq!(album.display_artist(), UNKNOWN_ARTIST);
        assert_eq!(album.display_title(), UNKNOWN_TITLE);

        album.artists = strings(&["Artist 1"]);
        assert_eq!(album.display_artist(), "Artist 1");

        album.album_artists = strings(&["Album artist 1", "Album artist 2"]);
        album.album_title = "Album title".to_string();
        assert_eq!(album.display_artist(), "Album artist 1");
        assert_eq!(album.display_title(), "Album title");
    }

    #[test]
    fn failure_reason_tracks_success_flag() {
        let mut track = TrackRecord::new("/music/a.mp3");
        assert!(track.needs_indexing);
        track.mark_failed("The error text");
        assert!(!track.indexing_success);
        assert_eq!(track.indexing_failure_reason, "The error text");
        track.mark_indexed();
        assert!(track.indexing_success);
        assert!(track.indexing_failure_reason.is_empty());
    }
}
