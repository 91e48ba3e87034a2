//! Content hashing and deterministic document identity.

use std::path::Path;

use md_5::Digest as _;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

/// `id = lowercase_hex(SHA-256(logical_path))`. Computed over the raw path
/// bytes (not a lossy-decoded string) so non-UTF-8 paths still hash
/// deterministically and two distinct byte sequences that happen to
/// lossy-decode to the same display string don't collide.
pub fn document_id(logical_path: impl AsRef<[u8]>) -> String {
    hex_sha256(logical_path.as_ref())
}

/// Hex-encoded SHA-256 of a file's full contents, read in fixed-size chunks
/// so large media files don't need to be loaded whole into memory.
pub async fn content_hash(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hex_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex MD5, used only for thumbnail filenames (naming convention,
/// not a security boundary).
pub fn thumbnail_key(logical_path: &str) -> String {
    hex::encode(md_5::Md5::digest(logical_path.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_hashes_to_known_constant() {
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn document_id_is_deterministic() {
        let a = document_id("/photos/a/b.jpg");
        let b = document_id("/photos/a/b.jpg");
        assert_eq!(a, b);
        assert_ne!(a, document_id("/photos/a/c.jpg"));
    }
}
