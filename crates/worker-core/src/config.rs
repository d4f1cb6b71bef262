//! Persisted worker configuration.
//!
//! Serialized as TOML, with three sections: `[login]`, `[parameters]`, and
//! `[private]`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn default_protocol() -> String {
    "http".to_string()
}

fn default_concurrency_expr() -> String {
    "max(1, min(3, MAX-1))".to_string()
}

fn default_memory_expr() -> String {
    "MAX/2".to_string()
}

fn default_uuid_prefix() -> String {
    "_hw".to_string()
}

fn default_min_threads() -> u32 {
    1
}

const fn default_fleet() -> bool {
    false
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSection {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersSection {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_concurrency_expr")]
    pub concurrency: String,
    #[serde(default = "default_memory_expr")]
    pub max_memory: String,
    #[serde(default = "default_uuid_prefix")]
    pub uuid_prefix: String,
    #[serde(default = "default_min_threads")]
    pub min_threads: u32,
    #[serde(default = "default_fleet")]
    pub fleet: bool,
    #[serde(default)]
    pub global_cache: Option<PathBuf>,
    #[serde(default)]
    pub compiler: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateSection {
    pub hw_seed: u32,
}

/// Top-level config file shape: `[login]`, `[parameters]`, `[private]`.
///
/// Deserializing through `serde(deny_unknown_fields)` would reject a config
/// written by a future version that adds sections; instead unrecognized
/// top-level keys are silently absent from the round-tripped struct —
/// anything not named here is dropped the next time the file is saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub login: LoginSection,
    pub parameters: ParametersSection,
    pub private: PrivateSection,
}

impl WorkerConfig {
    /// Normalizes port for a mismatched protocol/port pair.
    pub fn normalize_port(&mut self) {
        match (self.parameters.protocol.as_str(), self.parameters.port) {
            ("http", 443) => self.parameters.port = 80,
            ("https", 80) => self.parameters.port = 443,
            _ => {}
        }
    }
}

/// Loads the config file at `path`. Returns `Ok(None)` if it does not exist
/// (the caller decides whether that means "first run" or "error").
pub fn load(path: &Path) -> anyhow::Result<Option<WorkerConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let mut cfg: WorkerConfig = toml::from_str(&raw)?;
    cfg.normalize_port();
    Ok(Some(cfg))
}

/// Saves `cfg` to `path` atomically (write to a sibling `.tmp` file, then
/// rename over the target), matching the write pattern used throughout this
/// workspace for on-disk state.
pub fn save(path: &Path, cfg: &WorkerConfig) -> anyhow::Result<()> {
    let mut cfg = cfg.clone();
    cfg.normalize_port();

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let text = toml::to_string_pretty(&cfg)?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}

/// Generates a fresh `hw_seed`, used the first time a config file is created.
pub fn generate_hw_seed() -> u32 {
    use rand::RngCore;
    rand::rng().next_u32()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkerConfig {
        WorkerConfig {
            login: LoginSection {
                username: Some("alice".to_string()),
                password: Some("secret".to_string()),
            },
            parameters: ParametersSection {
                protocol: "http".to_string(),
                host: "dispatcher.example".to_string(),
                port: 443,
                concurrency: default_concurrency_expr(),
                max_memory: default_memory_expr(),
                uuid_prefix: default_uuid_prefix(),
                min_threads: 1,
                fleet: false,
                global_cache: None,
                compiler: None,
            },
            private: PrivateSection { hw_seed: 12345 },
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fishtest.cfg");
        save(&path, &sample()).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.login.username.as_deref(), Some("alice"));
        assert_eq!(loaded.private.hw_seed, 12345);
    }

    #[test]
    fn normalizes_stale_http_443() {
        let mut cfg = sample();
        cfg.normalize_port();
        assert_eq!(cfg.parameters.port, 80);
    }

    #[test]
    fn normalizes_stale_https_80() {
        let mut cfg = sample();
        cfg.parameters.protocol = "https".to_string();
        cfg.parameters.port = 80;
        cfg.normalize_port();
        assert_eq!(cfg.parameters.port, 443);
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.cfg");
        assert!(load(&path).unwrap().is_none());
    }
}
