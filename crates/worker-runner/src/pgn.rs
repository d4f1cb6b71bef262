//! PGN result handling: CRC verification and lossy UTF-8 decode ahead of
//! upload.

use std::path::Path;

/// Computes the CRC32 of `bytes` and compares it against `expected`.
pub fn verify_crc(bytes: &[u8], expected: u32) -> bool {
    crc32fast::hash(bytes) == expected
}

/// Reads the PGN file at `path`, checks its CRC against `expected_crc`, and
/// returns the text decoded as UTF-8 with invalid bytes replaced — ready for
/// the result uploader to gzip and base64-encode. Returns `Ok(None)` on a CRC
/// mismatch: no upload is attempted, but this is not treated as a hard
/// error.
pub fn read_pgn_for_upload(path: &Path, expected_crc: u32) -> std::io::Result<Option<String>> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() || !verify_crc(&bytes, expected_crc) {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_crc() {
        let bytes = b"[Event \"test\"]\n";
        let crc = crc32fast::hash(bytes);
        assert!(verify_crc(bytes, crc));
    }

    #[test]
    fn rejects_mismatched_crc() {
        assert!(!verify_crc(b"hello", 0xdead_beef));
    }

    #[test]
    fn read_for_upload_returns_none_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.pgn");
        std::fs::write(&path, b"[Event \"test\"]\n").unwrap();
        assert!(read_pgn_for_upload(&path, 0xdead_beef).unwrap().is_none());
    }

    #[test]
    fn read_for_upload_decodes_on_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.pgn");
        let content = b"[Event \"test\"]\n";
        std::fs::write(&path, content).unwrap();
        let crc = crc32fast::hash(content);
        let text = read_pgn_for_upload(&path, crc).unwrap().unwrap();
        assert!(text.contains("Event"));
    }
}
