//! One-time startup checks: the local/remote integrity check that feeds
//! `WorkerIdentity::modified`, and the interactive credential retry on a
//! rejected `/api/request_version` call.

use std::io::IsTerminal;
use std::path::Path;

use worker_core::config::WorkerConfig;
use worker_dispatcher::{request_version, DispatcherClient};
use worker_integrity::RemoteVerdict;

/// Directory the integrity manifest is computed over. A compiled binary has
/// no on-disk `.py`-style source tree to hash; if this directory is absent
/// the local check is skipped entirely and `modified` stays `false` rather
/// than failing startup over something that was never deployed (a reasoned
/// deviation from the source, which assumes its own source tree is always
/// present alongside the running process).
fn source_dir(install_dir: &Path) -> std::path::PathBuf {
    install_dir.join("src")
}

/// Resolves the `modified` flag reported on every dispatcher call.
///
/// Local check: advisory (an unreadable or missing source tree/manifest does
/// not block startup). Remote check, when `manifest_url` is configured: a
/// network failure fetching it is fatal and aborts startup.
pub async fn resolve_modified_flag(
    http: &reqwest::Client,
    install_dir: &Path,
    manifest_url: Option<&str>,
) -> anyhow::Result<bool> {
    let source_dir = source_dir(install_dir);
    let sri_path = worker_integrity::sri_path(install_dir);

    let local_modified = if !source_dir.exists() || !sri_path.exists() {
        tracing::debug!("no local source tree/manifest present, skipping local integrity check");
        false
    } else {
        match worker_integrity::verify_local(&source_dir, &sri_path) {
            Ok(true) => false,
            Ok(false) => {
                tracing::warn!("local integrity check failed: on-disk files do not match the stored manifest");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "local integrity check errored, treating as advisory");
                false
            }
        }
    };

    let Some(url) = manifest_url else {
        return Ok(local_modified);
    };

    let remote = worker_integrity::download_remote(http, url)
        .await
        .map_err(|err| anyhow::anyhow!("fetching remote integrity manifest: {err}"))?;

    if !source_dir.exists() {
        return Ok(local_modified);
    }

    match worker_integrity::verify_remote(&source_dir, &remote)? {
        RemoteVerdict::Unmodified => Ok(local_modified),
        RemoteVerdict::Tainted => Ok(true),
        RemoteVerdict::Unknown => anyhow::bail!("remote integrity verdict could not be determined"),
    }
}

/// Validates credentials against `/api/request_version` once. If rejected,
/// not suppressed by `--no-validation`, and stdin is a terminal, prompts for
/// new credentials, persists them, and retries exactly once.
pub async fn validate_credentials(
    client: &DispatcherClient,
    cfg: &mut WorkerConfig,
    config_path: &Path,
    no_validation: bool,
) -> anyhow::Result<()> {
    if no_validation {
        return Ok(());
    }

    let username = cfg.login.username.clone().unwrap_or_default();
    let password = cfg.login.password.clone().unwrap_or_default();

    let response = request_version(client, &username, &password).await?;
    if response.error.is_none() {
        return Ok(());
    }

    if !std::io::stdin().is_terminal() {
        anyhow::bail!(
            "dispatcher rejected credentials and stdin is not a terminal to prompt for new ones"
        );
    }

    eprintln!("dispatcher rejected the configured credentials; enter new ones:");
    let username = prompt_line("username: ")?;
    let password = prompt_line("password: ")?;

    let response = request_version(client, &username, &password).await?;
    if let Some(err) = response.error {
        anyhow::bail!("dispatcher rejected the re-entered credentials: {err}");
    }

    cfg.login.username = Some(username);
    cfg.login.password = Some(password);
    worker_core::config::save(config_path, cfg)?;
    Ok(())
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    use std::io::Write as _;
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
