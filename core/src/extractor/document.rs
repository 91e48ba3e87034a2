//! Document metadata extraction.
//!
//! `.txt` files get lossy-decoded full-text content (capped at 10,000
//! characters) plus a character count of the untruncated text; every other
//! document extension only gets a `document_type` tag — full-text extraction
//! from PDF/Word/RTF/ODT would require an external conversion service, which
//! is out of scope (§4.4).

use std::path::Path;

use serde_json::{Map, Value as Json, json};
use tracing::warn;

const MAX_CONTENT_CHARS: usize = 10_000;

pub async fn extract(path: &Path, extension: &str) -> Map<String, Json> {
    let mut fields = Map::new();

    if extension == ".txt" {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let character_count = text.chars().count();
                let truncated: String = text.chars().take(MAX_CONTENT_CHARS).collect();
                fields.insert("content".into(), json!(truncated));
                fields.insert("character_count".into(), json!(character_count));
            }
            Err(err) => warn!(path = %path.display(), error = %err, "failed to read text document"),
        }
    } else {
        fields.insert("document_type".into(), json!(extension.trim_start_matches('.')));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn truncates_long_text_but_counts_full_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let long_text = "a".repeat(MAX_CONTENT_CHARS + 500);
        tokio::fs::write(&path, &long_text).await.unwrap();

        let fields = extract(&path, ".txt").await;
        assert_eq!(fields["character_count"], json!(MAX_CONTENT_CHARS + 500));
        assert_eq!(fields["content"].as_str().unwrap().chars().count(), MAX_CONTENT_CHARS);
    }

    #[tokio::test]
    async fn non_txt_document_only_gets_document_type() {
        let fields = extract(Path::new("/a/report.pdf"), ".pdf").await;
        assert_eq!(fields["document_type"], json!("pdf"));
        assert!(!fields.contains_key("content"));
    }
}
