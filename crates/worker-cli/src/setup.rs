//! Resolves CLI flags and the persisted config file into a `WorkerConfig`,
//! derives the runtime `WorkerIdentity`, and performs the one-time startup
//! integrity check.

use std::path::{Path, PathBuf};

use worker_core::config::{
    self, LoginSection, ParametersSection, PrivateSection, WorkerConfig,
};
use worker_core::constants::WORKER_VERSION;
use worker_core::{identity, limits, WorkerIdentity};

use crate::cli::Cli;

pub(crate) fn resolve_path(install_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        install_dir.join(path)
    }
}

fn default_config(hw_seed: u32) -> WorkerConfig {
    WorkerConfig {
        login: LoginSection {
            username: None,
            password: None,
        },
        parameters: ParametersSection {
            protocol: "http".to_string(),
            host: String::new(),
            port: 0,
            concurrency: "max(1, min(3, MAX-1))".to_string(),
            max_memory: "MAX/2".to_string(),
            uuid_prefix: "_hw".to_string(),
            min_threads: 1,
            fleet: false,
            global_cache: None,
            compiler: None,
        },
        private: PrivateSection { hw_seed },
    }
}

/// Loads the config file (if any), overlays CLI overrides on top, validates
/// the required fields, and persists the merged result back to disk so
/// options survive across restarts.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<(WorkerConfig, PathBuf)> {
    let config_path = resolve_path(&cli.install_dir, &cli.config_file);

    let mut cfg = match config::load(&config_path)? {
        Some(cfg) => cfg,
        None => default_config(config::generate_hw_seed()),
    };

    if let Some((username, password)) = cli.username_password() {
        cfg.login.username = Some(username);
        cfg.login.password = Some(password);
    }
    if let Some(protocol) = cli.protocol {
        cfg.parameters.protocol = protocol.as_str().to_string();
    }
    if let Some(host) = &cli.host {
        cfg.parameters.host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.parameters.port = port;
    }
    if let Some(expr) = &cli.concurrency {
        cfg.parameters.concurrency = expr.clone();
    }
    if let Some(expr) = &cli.max_memory {
        cfg.parameters.max_memory = expr.clone();
    }
    if let Some(prefix) = &cli.uuid_prefix {
        cfg.parameters.uuid_prefix = prefix.chars().take(8).collect();
    }
    if let Some(min_threads) = cli.min_threads {
        cfg.parameters.min_threads = min_threads;
    }
    if let Some(fleet) = cli.fleet {
        cfg.parameters.fleet = fleet;
    }
    if let Some(cache) = &cli.global_cache {
        cfg.parameters.global_cache = Some(cache.clone());
    }
    if let Some(compiler) = &cli.compiler {
        cfg.parameters.compiler = Some(compiler.clone());
    }

    if cfg.login.username.is_none() || cfg.login.password.is_none() {
        anyhow::bail!(
            "username and password are required: pass them positionally or store them in {}",
            config_path.display()
        );
    }
    if cfg.parameters.host.is_empty() {
        anyhow::bail!("--host is required on first run");
    }

    cfg.normalize_port();
    config::save(&config_path, &cfg)?;
    Ok((cfg, config_path))
}

/// Builds the dispatcher base URL from the resolved config.
pub fn dispatcher_url(cfg: &WorkerConfig) -> anyhow::Result<reqwest::Url> {
    let raw = format!(
        "{}://{}:{}/",
        cfg.parameters.protocol, cfg.parameters.host, cfg.parameters.port
    );
    Ok(reqwest::Url::parse(&raw)?)
}

/// Derives the immutable `WorkerIdentity` from the resolved config and the
/// host's actual resources. `near_github_api_limit` starts `false`; the
/// lifecycle engine updates it before each task request.
pub fn build_identity(
    cfg: &WorkerConfig,
    install_dir: &Path,
    modified: bool,
) -> anyhow::Result<WorkerIdentity> {
    let resolved = limits::resolve_limits(&cfg.parameters.concurrency, &cfg.parameters.max_memory)
        .map_err(|err| anyhow::anyhow!("resolving concurrency/max_memory: {err}"))?;
    if resolved.concurrency_reduced {
        tracing::warn!(
            concurrency = resolved.concurrency,
            "requested concurrency reduced to fit the memory-feasibility floor"
        );
    }

    let prefix = if cfg.parameters.uuid_prefix == "_hw" {
        let machine = identity::machine_id().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read machine id, falling back to a constant");
            "unknown-machine".to_string()
        });
        identity::hw_id(cfg.private.hw_seed, &machine, install_dir)
    } else {
        cfg.parameters.uuid_prefix.clone()
    };
    let unique_key = identity::unique_key(&prefix);

    let compiler_name = cfg
        .parameters
        .compiler
        .clone()
        .unwrap_or_else(|| "g++".to_string());
    let compiler = worker_runner::detect_compiler(&compiler_name)
        .map_err(|err| anyhow::anyhow!("detecting compiler {compiler_name:?}: {err}"))?;
    worker_runner::verify_toolchain(&compiler, "make")
        .map_err(|err| anyhow::anyhow!("verifying toolchain: {err}"))?;

    Ok(WorkerIdentity {
        unique_key,
        username: cfg.login.username.clone().unwrap_or_default(),
        version: WORKER_VERSION,
        uname: uname_string(),
        architecture: std::env::consts::ARCH.to_string(),
        concurrency: resolved.concurrency,
        max_memory_mib: resolved.max_memory_mib,
        min_threads: cfg.parameters.min_threads,
        compiler_name,
        compiler_version: compiler.version,
        modified,
        near_github_api_limit: false,
    })
}

fn uname_string() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_defaults() {
        let cfg = default_config(7);
        assert_eq!(cfg.parameters.protocol, "http");
        assert_eq!(cfg.private.hw_seed, 7);
        assert_eq!(cfg.parameters.min_threads, 1);
    }

    #[test]
    fn dispatcher_url_joins_protocol_host_port() {
        let mut cfg = default_config(1);
        cfg.parameters.host = "dispatcher.example".to_string();
        cfg.parameters.port = 8080;
        let url = dispatcher_url(&cfg).unwrap();
        assert_eq!(url.as_str(), "http://dispatcher.example:8080/");
    }
}
