pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

const AUDIO_MIME_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/opus"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("wav", "audio/wav"),
    ("wma", "audio/x-ms-wma"),
    ("ape", "audio/ape"),
];

/// Audio extensions picked up by the scanner.
pub fn is_supported_audio(extension: &str) -> bool {
    let ext = normalize_extension(extension);
    AUDIO_MIME_TYPES.iter().any(|(known, _)| *known == ext)
}

/// Total lookup from an extension (with or without the dot) to a mime type.
pub fn mime_type_for_extension(extension: &str) -> String {
    let ext = normalize_extension(extension);
    if ext.is_empty() {
        return UNKNOWN_MIME_TYPE.to_string();
    }
    if let Some((_, mime)) = AUDIO_MIME_TYPES.iter().find(|(known, _)| *known == ext) {
        return mime.to_string();
    }
    mime_guess::from_ext(&ext)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| UNKNOWN_MIME_TYPE.to_string())
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_extensions_map_to_audio_types() {
        assert_eq!(mime_type_for_extension(".mp3"), "audio/mpeg");
        assert_eq!(mime_type_for_extension("FLAC"), "audio/flac");
        assert!(is_supported_audio(".Mp3"));
        assert!(!is_supported_audio(".txt"));
    }

    #[test]
    fn unknown_extensions_fall_back() {
        assert_eq!(mime_type_for_extension(""), UNKNOWN_MIME_TYPE);
        assert_eq!(mime_type_for_extension(".zzzunknown"), UNKNOWN_MIME_TYPE);
        assert_eq!(mime_type_for_extension(".png"), "image/png");
    }
}
