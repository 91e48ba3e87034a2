//! Cheap, allocation-light filtering applied before a raw notification is
//! ever given a debounce timer slot.

use std::path::{Component, Path};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "raw", "cr2", "nef", "arw",
];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg",
];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "pages"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz"];

const NOISE_DIRS: &[&str] = &[
    ".git", ".hg", ".svn", "@eaDir", ".AppleDouble", "Thumbs.db", "$RECYCLE.BIN",
];

/// Is this extension one the pipeline knows how to process at all? Checked
/// case-insensitively, exact match only (no wildcard/glob matching).
pub fn is_supported_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    let ext = ext.as_str();
    IMAGE_EXTENSIONS.contains(&ext)
        || VIDEO_EXTENSIONS.contains(&ext)
        || AUDIO_EXTENSIONS.contains(&ext)
        || DOCUMENT_EXTENSIONS.contains(&ext)
        || ARCHIVE_EXTENSIONS.contains(&ext)
}

/// Dotfiles and well-known noise directories, filtered before debouncing so
/// they never consume a timer slot.
pub fn is_noise_path(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(os) => match os.to_str() {
            Some(name) => name.starts_with('.') || NOISE_DIRS.contains(&name),
            None => false,
        },
        _ => false,
    })
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_extensions_case_insensitively() {
        assert!(is_supported_extension(Path::new("/a/b.JPG")));
        assert!(is_supported_extension(Path::new("/a/b.mp4")));
        assert!(is_supported_extension(Path::new("/a/b.FLAC")));
    }

    #[test]
    fn rejects_unknown_or_missing_extension() {
        assert!(!is_supported_extension(Path::new("/a/b.exe")));
        assert!(!is_supported_extension(Path::new("/a/b")));
    }

    #[test]
    fn flags_dotfiles_and_noise_directories() {
        assert!(is_noise_path(Path::new("/vol/.hidden/photo.jpg")));
        assert!(is_noise_path(Path::new("/vol/a/.git/config.jpg")));
        assert!(is_noise_path(Path::new("/vol/@eaDir/thumb.jpg")));
        assert!(!is_noise_path(Path::new("/vol/photos/a.jpg")));
    }
}
