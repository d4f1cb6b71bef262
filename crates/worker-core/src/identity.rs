//! Worker identity: a stable fingerprint plus the negotiated runtime limits
//! reported to the dispatcher on every call.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Immutable per-process identity, created once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub unique_key: String,
    pub username: String,
    pub version: u32,
    pub uname: String,
    pub architecture: String,
    pub concurrency: u32,
    pub max_memory_mib: u64,
    pub min_threads: u32,
    pub compiler_name: String,
    pub compiler_version: (u32, u32, u32),
    pub modified: bool,
    pub near_github_api_limit: bool,
}

/// Reads a platform-specific machine identifier, best-effort.
///
/// Linux: `/etc/machine-id` or `/var/lib/dbus/machine-id`.
/// macOS: `IOPlatformUUID` via `ioreg`.
/// Windows: `MachineGuid` via the registry, read through `reg query` rather
/// than a registry crate so this module has no Windows-only dependency.
pub fn machine_id() -> anyhow::Result<String> {
    #[cfg(target_os = "linux")]
    {
        for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(contents) = std::fs::read_to_string(candidate) {
                let trimmed = contents.trim();
                if !trimmed.is_empty() {
                    return Ok(trimmed.to_string());
                }
            }
        }
        anyhow::bail!("no machine-id file found");
    }
    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if line.contains("IOPlatformUUID") {
                if let Some(start) = line.find('"') {
                    if let Some(end) = line.rfind('"') {
                        if end > start {
                            return Ok(line[start + 1..end].to_string());
                        }
                    }
                }
            }
        }
        anyhow::bail!("IOPlatformUUID not found in ioreg output")
    }
    #[cfg(target_os = "windows")]
    {
        let output = std::process::Command::new("reg")
            .args([
                "query",
                r"HKLM\SOFTWARE\Microsoft\Cryptography",
                "/v",
                "MachineGuid",
            ])
            .output()?;
        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            if let Some(idx) = line.find("MachineGuid") {
                if let Some(guid) = line[idx..].split_whitespace().last() {
                    return Ok(guid.to_string());
                }
            }
        }
        anyhow::bail!("MachineGuid not found in registry output")
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        anyhow::bail!("unsupported platform for machine-id lookup")
    }
}

/// First four bytes of the SHA-256 digest of `s`, as a big-endian integer.
///
/// Any fixed-width cryptographic hash serves the purpose here (a stable,
/// well-distributed 32-bit value); SHA-256 is the hash already used
/// elsewhere in this workspace.
fn fingerprint(s: &str) -> u32 {
    let digest = Sha256::digest(s.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Derives the 8-hex-digit `hw_id` from the machine id, install path, and a
/// persistent random seed.
pub fn hw_id(hw_seed: u32, machine_id: &str, install_path: &Path) -> String {
    let path_str = install_path.to_string_lossy();
    let value = hw_seed ^ fingerprint(machine_id) ^ fingerprint(&path_str);
    format!("{value:08x}")
}

/// Builds the `unique_key` sent to the dispatcher: an 8-character prefix
/// (either a user-chosen alphanumeric tag or the derived `hw_id`) followed by
/// the trailing 28 characters of a random UUIDv4's canonical (dashed) form.
pub fn unique_key(prefix: &str) -> String {
    let prefix: String = prefix.chars().take(8).collect();
    let id = uuid::Uuid::new_v4().to_string();
    format!("{prefix}{}", &id[8.min(id.len())..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_id_is_stable_for_same_inputs() {
        let path = Path::new("/opt/worker");
        let a = hw_id(42, "abc-machine", path);
        let b = hw_id(42, "abc-machine", path);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn hw_id_changes_with_seed() {
        let path = Path::new("/opt/worker");
        let a = hw_id(1, "abc-machine", path);
        let b = hw_id(2, "abc-machine", path);
        assert_ne!(a, b);
    }

    #[test]
    fn unique_key_keeps_prefix() {
        let key = unique_key("myprefi");
        assert!(key.starts_with("myprefi"));
        assert_eq!(key.len(), 7 + 28);
    }
}
