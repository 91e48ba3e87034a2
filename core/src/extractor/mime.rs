//! MIME detection and the `file_type` classification it drives.

use std::path::Path;

use crate::watcher::filter;

/// The coarse file-type bucket carried on every index document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Document => "document",
            FileType::Archive => "archive",
            FileType::Other => "other",
        }
    }
}

/// Whether a processed file's extension should also get a thumbnail
/// generation job enqueued (§4.4 step 8): images and video only.
pub fn is_thumbnailable(extension: &str) -> bool {
    let ext = extension.trim_start_matches('.');
    filter::is_image_extension(ext) || filter::is_video_extension(ext)
}

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "rtf", "odt", "pages"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz"];

/// Detects file type from file contents (magic-number sniffing) first,
/// falling back to extension mapping for documents and archives whose
/// formats `infer` doesn't recognize (e.g. plain `.txt`, `.rtf`).
pub fn detect_file_type(path: &Path, contents_head: &[u8]) -> FileType {
    if let Some(kind) = infer::get(contents_head) {
        let mime = kind.mime_type();
        if mime.starts_with("image/") {
            return FileType::Image;
        }
        if mime.starts_with("video/") {
            return FileType::Video;
        }
        if mime.starts_with("audio/") {
            return FileType::Audio;
        }
        if mime == "application/pdf" || mime == "application/msword" || mime.contains("officedocument")
        {
            return FileType::Document;
        }
        if mime.starts_with("application/zip")
            || mime.contains("x-rar")
            || mime.contains("x-7z")
            || mime.contains("x-tar")
            || mime.contains("gzip")
        {
            return FileType::Archive;
        }
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
        return FileType::Document;
    }
    if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
        return FileType::Archive;
    }
    if filter::is_image_extension(&ext) {
        return FileType::Image;
    }
    if filter::is_video_extension(&ext) {
        return FileType::Video;
    }
    FileType::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_extension_for_plain_text() {
        let file_type = detect_file_type(Path::new("/a/notes.txt"), b"hello world");
        assert_eq!(file_type, FileType::Document);
    }

    #[test]
    fn falls_back_to_extension_for_unrecognized_archive_bytes() {
        let file_type = detect_file_type(Path::new("/a/data.gz"), b"");
        assert_eq!(file_type, FileType::Archive);
    }

    #[test]
    fn detects_png_by_magic_number() {
        let png_header: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_file_type(Path::new("/a/photo.dat"), png_header), FileType::Image);
    }
}
