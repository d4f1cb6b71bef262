//! Content-hash manifest over the worker's own source files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use worker_core::constants::{FILE_LIST, WORKER_VERSION};

/// Mapping from source-file name to its content hash, plus a version marker.
///
/// The `__version` field is excluded from equality comparisons: the running
/// binary may legitimately be newer than the files a manifest was generated
/// from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(rename = "__version")]
    pub version: u32,
    #[serde(flatten)]
    pub hashes: BTreeMap<String, String>,
}

impl Manifest {
    /// Hashes match on every entry in `FILE_LIST`, ignoring `__version`.
    fn hashes_match(&self, other: &Manifest) -> bool {
        FILE_LIST
            .iter()
            .all(|name| self.hashes.get(*name) == other.hashes.get(*name))
    }
}

fn hash_file(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Computes the manifest for the source files under `source_dir`, using
/// `{name}.rs` as the on-disk filename for each entry in `FILE_LIST`.
pub fn generate_local(source_dir: &Path) -> anyhow::Result<Manifest> {
    let mut hashes = BTreeMap::new();
    for name in FILE_LIST {
        let path = source_dir.join(format!("{name}.rs"));
        hashes.insert(name.to_string(), hash_file(&path)?);
    }
    Ok(Manifest {
        version: WORKER_VERSION,
        hashes,
    })
}

/// Writes `manifest` to `path` atomically.
pub fn write_local(path: &Path, manifest: &Manifest) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(manifest)?;
    let tmp = path.with_extension("txt.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

fn read_local(path: &Path) -> anyhow::Result<Manifest> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// `verify_local()`: regenerate hashes from disk and compare against the
/// stored manifest at `sri_path`. Returns `true` iff every entry matches.
pub fn verify_local(source_dir: &Path, sri_path: &Path) -> anyhow::Result<bool> {
    let stored = read_local(sri_path)?;
    let current = generate_local(source_dir)?;
    Ok(current.hashes_match(&stored))
}

/// Outcome of comparing against the remote manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteVerdict {
    /// Files match, or the remote manifest is for a different worker version
    /// (in which case the comparison is skipped entirely and treated as
    /// unmodified).
    Unmodified,
    /// A mismatch was found; the worker should report itself as tainted.
    Tainted,
    /// The remote manifest could not be fetched; the caller must treat this
    /// as fatal, since a network failure here aborts startup.
    Unknown,
}

/// Downloads the remote manifest from `url`.
pub async fn download_remote(http: &reqwest::Client, url: &str) -> anyhow::Result<Manifest> {
    let res = http.get(url).send().await?;
    let res = res.error_for_status()?;
    let manifest: Manifest = res.json().await?;
    Ok(manifest)
}

/// `verify_remote()`: compares a freshly generated local manifest against a
/// remote manifest already fetched by the caller (so network failures are
/// handled uniformly by the caller via `download_remote`'s `Result`).
pub fn verify_remote(source_dir: &Path, remote: &Manifest) -> anyhow::Result<RemoteVerdict> {
    if remote.version != WORKER_VERSION {
        return Ok(RemoteVerdict::Unmodified);
    }
    let local = generate_local(source_dir)?;
    if local.hashes_match(remote) {
        Ok(RemoteVerdict::Unmodified)
    } else {
        Ok(RemoteVerdict::Tainted)
    }
}

/// Default on-disk path for the local manifest inside the install directory.
pub fn sri_path(install_dir: &Path) -> PathBuf {
    install_dir.join("sri.txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &Path) {
        for name in FILE_LIST {
            std::fs::write(dir.join(format!("{name}.rs")), format!("// {name}\n")).unwrap();
        }
    }

    #[test]
    fn verify_local_matches_freshly_generated_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let manifest = generate_local(dir.path()).unwrap();
        let sri = sri_path(dir.path());
        write_local(&sri, &manifest).unwrap();
        assert!(verify_local(dir.path(), &sri).unwrap());
    }

    #[test]
    fn verify_local_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let manifest = generate_local(dir.path()).unwrap();
        let sri = sri_path(dir.path());
        write_local(&sri, &manifest).unwrap();

        std::fs::write(dir.path().join("worker.rs"), "// tampered\n").unwrap();
        assert!(!verify_local(dir.path(), &sri).unwrap());
    }

    #[test]
    fn verify_local_ignores_version_field() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let mut manifest = generate_local(dir.path()).unwrap();
        let sri = sri_path(dir.path());
        write_local(&sri, &manifest).unwrap();

        manifest.version += 1;
        write_local(&sri, &manifest).unwrap();
        assert!(verify_local(dir.path(), &sri).unwrap());
    }

    #[test]
    fn verify_remote_skips_comparison_on_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let mut remote = generate_local(dir.path()).unwrap();
        remote.version = WORKER_VERSION + 1;
        remote.hashes.insert("worker".to_string(), "deadbeef".to_string());

        assert_eq!(
            verify_remote(dir.path(), &remote).unwrap(),
            RemoteVerdict::Unmodified
        );
    }

    #[test]
    fn verify_remote_flags_tampering_on_matching_version() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());
        let mut remote = generate_local(dir.path()).unwrap();
        remote.hashes.insert("worker".to_string(), "deadbeef".to_string());

        assert_eq!(
            verify_remote(dir.path(), &remote).unwrap(),
            RemoteVerdict::Tainted
        );
    }
}
