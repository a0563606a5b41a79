use std::path::Path;

use lofty::error::LoftyError;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{Accessor, AudioFile, ItemKey, TaggedFileExt};
use lofty::tag::Tag;

/// Read-only view of the tags and audio properties of one file.
///
/// Anything the file does not carry stays `None` (or empty for the
/// multi-valued fields); no field is defaulted to zero.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetadataView {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
    pub genres: Vec<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub track_count: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_count: Option<u32>,
    pub duration_ms: Option<u64>,
    pub bit_rate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub rating: Option<u32>,
    pub lyrics: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug)]
pub enum MetadataReadError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataReadError::Io(err) => write!(f, "{}", err),
            MetadataReadError::Lofty(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for MetadataReadError {}

impl From<std::io::Error> for MetadataReadError {
    fn from(err: std::io::Error) -> Self {
        MetadataReadError::Io(err)
    }
}

impl From<LoftyError> for MetadataReadError {
    fn from(err: LoftyError) -> Self {
        MetadataReadError::Lofty(err)
    }
}

/// Tag-reading capability consumed by the indexing pipeline.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<MetadataView, MetadataReadError>;

    fn read_cover(&self, path: &Path) -> Result<Option<CoverArt>, MetadataReadError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<MetadataView, MetadataReadError> {
        read_tags(path)
    }

    fn read_cover(&self, path: &Path) -> Result<Option<CoverArt>, MetadataReadError> {
        read_cover(path)
    }
}

pub fn read_tags(path: &Path) -> Result<MetadataView, MetadataReadError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut view = MetadataView::default();

    let duration_ms = properties.duration().as_millis();
    if duration_ms > 0 {
        view.duration_ms = Some(duration_ms.min(u128::from(u64::MAX)) as u64);
    }
    view.sample_rate = properties.sample_rate();
    view.bit_rate = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        view.title = non_empty(tag.get_string(&ItemKey::TrackTitle));
        view.album = non_empty(tag.get_string(&ItemKey::AlbumTitle));
        view.artists = collect_values(tag, &ItemKey::TrackArtist);
        view.album_artists = collect_values(tag, &ItemKey::AlbumArtist);
        for value in tag.get_strings(&ItemKey::Genre) {
            for genre in parse_genres(value) {
                if !view.genres.contains(&genre) {
                    view.genres.push(genre);
                }
            }
        }
        view.year = tag.year().or_else(|| {
            tag.get_string(&ItemKey::RecordingDate)
                .or_else(|| tag.get_string(&ItemKey::Year))
                .and_then(parse_year)
        });
        view.track_number = tag.track();
        view.track_count = tag.track_total();
        view.disc_number = tag.disk();
        view.disc_count = tag.disk_total();
        view.rating = tag
            .get_string(&ItemKey::Popularimeter)
            .and_then(parse_popularimeter)
            .map(stars_from_popularimeter);
        view.lyrics = tag.get_string(&ItemKey::Lyrics).map(|v| v.to_string());
    }

    Ok(view)
}

pub fn read_cover(path: &Path) -> Result<Option<CoverArt>, MetadataReadError> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let picture = match pick_picture(tag.pictures()) {
        Some(picture) => picture,
        None => return Ok(None),
    };

    let data = picture.data().to_vec();
    let mime = guess_mime(&data);
    Ok(Some(CoverArt { data, mime }))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn collect_values(tag: &Tag, key: &ItemKey) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in tag.get_strings(key) {
        let trimmed = value.trim();
        if trimmed.is_empty() || out.iter().any(|v| v == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

fn parse_year(text: &str) -> Option<u32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn parse_genres(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', '/', '|', '\0'][..]) {
        let trimmed = part.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

// POPM frames are rendered as "email|rating|counter" or as the bare rating.
fn parse_popularimeter(text: &str) -> Option<u8> {
    let mut fields = text.split('|').map(str::trim);
    let first = fields.next()?;
    if let Ok(value) = first.parse::<u8>() {
        return Some(value);
    }
    fields.next()?.parse::<u8>().ok()
}

fn stars_from_popularimeter(value: u8) -> u32 {
    match value {
        0 => 0,
        1..=31 => 1,
        32..=95 => 2,
        96..=159 => 3,
        160..=223 => 4,
        _ => 5,
    }
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_takes_leading_four_digits() {
        assert_eq!(parse_year("2020-05-01"), Some(2020));
        assert_eq!(parse_year("  1999"), Some(1999));
        assert_eq!(parse_year("unknown"), None);
    }

    #[test]
    fn genres_split_on_common_separators() {
        assert_eq!(parse_genres("Rock; Pop/Jazz"), vec!["Rock", "Pop", "Jazz"]);
        assert!(parse_genres("  ").is_empty());
    }

    #[test]
    fn popularimeter_maps_to_stars() {
        assert_eq!(parse_popularimeter("someone@example.com|196|3"), Some(196));
        assert_eq!(parse_popularimeter("64"), Some(64));
        assert_eq!(parse_popularimeter("nothing here"), None);
        assert_eq!(stars_from_popularimeter(0), 0);
        assert_eq!(stars_from_popularimeter(1), 1);
        assert_eq!(stars_from_popularimeter(64), 2);
        assert_eq!(stars_from_popularimeter(128), 3);
        assert_eq!(stars_from_popularimeter(196), 4);
        assert_eq!(stars_from_popularimeter(255), 5);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let err = read_tags(Path::new("/definitely/not/here.mp3")).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn mime_is_sniffed_from_magic_bytes() {
        assert_eq!(guess_mime(&[0xFF, 0xD8, 0xFF, 0xE0]).as_deref(), Some("image/jpeg"));
        assert_eq!(guess_mime(&[0x89, 0x50, 0x4E, 0x47]).as_deref(), Some("image/png"));
        assert_eq!(guess_mime(b"GIF89a"), None);
    }
}
