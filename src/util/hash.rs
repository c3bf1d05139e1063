//! Hashing of installed files for `RECORD`.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// The `RECORD` form of a digest: `sha256=<urlsafe base64, no padding>`.
fn record_form(digest: &[u8]) -> String {
    format!("sha256={}", URL_SAFE_NO_PAD.encode(digest))
}

/// Hash a byte slice in `RECORD` form.
pub fn record_hash(data: &[u8]) -> String {
    record_form(&Sha256::digest(data))
}

/// Hash a file in `RECORD` form and return the hash with the file's size.
pub fn record_hash_file(path: &Path) -> Result<(String, u64)> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut size = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok((record_form(&hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_hash_of_empty_input() {
        assert_eq!(
            record_hash(b""),
            "sha256=47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU"
        );
    }

    #[test]
    fn test_file_hash_matches_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("spam.py");
        std::fs::write(&path, "import sys\n").unwrap();

        let (hash, size) = record_hash_file(&path).unwrap();
        assert_eq!(hash, record_hash(b"import sys\n"));
        assert_eq!(size, 11);
    }
}
