//! Result uploader: packages PGN output with an integrity check and uploads
//! it gzip-compressed and base64-encoded.

use std::io::Write as _;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::{Compression, GzBuilder};
use worker_dispatcher::{upload_pgn, DispatcherClient, UploadPgnBody, WorkerInfo};
use worker_runner::read_pgn_for_upload;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("pgn CRC mismatch or empty file, upload skipped")]
    CrcMismatch,
    #[error("io error reading pgn: {0}")]
    Io(#[from] std::io::Error),
    #[error("dispatcher rejected upload: {0}")]
    Dispatcher(#[from] worker_dispatcher::DispatcherError),
}

/// Verifies the PGN at `pgn_path` against `expected_crc`, and if it matches,
/// gzips the decoded text (inner member name `{run_id}-{task_id}.pgn.gz`),
/// base64-encodes it, and posts it to `/api/upload_pgn`. The file must be
/// deleted either way; the caller is responsible for that cleanup since it
/// must happen even when this function returns `Err`.
pub async fn upload(
    client: &DispatcherClient,
    pgn_path: &Path,
    expected_crc: u32,
    run_id: &str,
    task_id: u32,
    worker_info: &WorkerInfo,
    password: &str,
) -> Result<(), UploadError> {
    let Some(text) = read_pgn_for_upload(pgn_path, expected_crc)? else {
        return Err(UploadError::CrcMismatch);
    };

    let encoded = gzip_then_base64(&text, &format!("{run_id}-{task_id}.pgn.gz"))?;

    let body = UploadPgnBody {
        run_id,
        task_id,
        pgn: &encoded,
        password,
        worker_info,
    };
    upload_pgn(client, &body).await?;
    Ok(())
}

fn gzip_then_base64(text: &str, inner_name: &str) -> std::io::Result<String> {
    let mut encoder = GzBuilder::new()
        .filename(inner_name)
        .write(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Removes the PGN file. Advisory: logs rather than failing if it cannot be
/// removed, since the file must be deleted either way.
pub fn cleanup_pgn_file(pgn_path: &Path) {
    if let Err(err) = std::fs::remove_file(pgn_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(?pgn_path, error = %err, "failed to delete pgn file after upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn gzip_round_trips_and_carries_inner_name() {
        let encoded = gzip_then_base64("[Event \"test\"]\n", "R1-3.pgn.gz").unwrap();
        let compressed = BASE64.decode(encoded).unwrap();
        let mut gz = flate2::read::GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        gz.read_to_string(&mut out).unwrap();
        assert_eq!(out, "[Event \"test\"]\n");
        assert_eq!(gz.header().unwrap().filename(), Some(b"R1-3.pgn.gz".as_slice()));
    }

    #[test]
    fn crc_mismatch_is_reported_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.pgn");
        std::fs::write(&path, b"[Event \"test\"]\n").unwrap();
        let result = read_pgn_for_upload(&path, 0xdead_beef).unwrap();
        assert!(result.is_none());
    }
}
