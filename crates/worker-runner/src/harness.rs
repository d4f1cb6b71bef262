//! `ensure_runner`: verify or build the match-runner binary.

use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::compiler::Compiler;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("network error fetching runner source: {0}")]
    Network(#[from] reqwest::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("build command failed: {0}")]
    BuildFailed(String),
    #[error("built binary failed re-verification")]
    ReverificationFailed,
}

/// A verified, runnable match-runner binary.
#[derive(Debug, Clone)]
pub struct RunnerBinary {
    pub path: PathBuf,
    pub commit_sha: String,
}

/// Runs `{path} --version` and extracts a 7+ hex-character commit fragment,
/// checking it is a prefix match for `pinned_sha`.
fn verify_runner_binary(path: &Path, pinned_sha: &str) -> bool {
    let Ok(output) = std::process::Command::new(path).arg("--version").output() else {
        return false;
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let Some(short_sha) = extract_short_sha(&text) else {
        return false;
    };
    short_sha.len() >= 7 && pinned_sha.starts_with(&short_sha)
}

fn extract_short_sha(text: &str) -> Option<String> {
    let line = text.lines().next_back()?;
    let token = line.rsplit('-').next()?;
    let token = token.trim();
    if token.len() >= 7 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_string())
    } else {
        None
    }
}

/// Ensures a verified match-runner binary exists at
/// `install_dir/testing/match-runner`, building it from source if necessary.
///
/// `source_url` points at a zip archive of the runner's source at
/// `pinned_sha`; `cache_dir` is an optional on-disk cache of that archive,
/// checked before falling back to a fresh download.
pub async fn ensure_runner(
    install_dir: &Path,
    pinned_sha: &str,
    source_url: &str,
    cache_dir: Option<&Path>,
    compiler: &Compiler,
    concurrency: u32,
) -> Result<RunnerBinary, HarnessError> {
    let testing_dir = install_dir.join("testing");
    std::fs::create_dir_all(&testing_dir)?;
    let binary_path = testing_dir.join("match-runner");

    if binary_path.exists() && verify_runner_binary(&binary_path, pinned_sha) {
        return Ok(RunnerBinary {
            path: binary_path,
            commit_sha: pinned_sha.to_string(),
        });
    }

    let archive_bytes = fetch_or_cache(source_url, cache_dir).await?;
    let build_dir = tempfile::tempdir_in(&testing_dir).map_err(HarnessError::Io)?;
    extract_zip(&archive_bytes, build_dir.path())?;

    let compiler_flag = match compiler.family {
        crate::compiler::CompilerFamily::Gcc => "g++",
        crate::compiler::CompilerFamily::Clang => "clang++",
    };
    let status = std::process::Command::new("make")
        .current_dir(build_dir.path())
        .arg(format!("-j{concurrency}"))
        .arg(format!("CXX={compiler_flag}"))
        .arg(format!("GIT_SHA={}", &pinned_sha[..pinned_sha.len().min(8)]))
        .status()
        .map_err(|err| HarnessError::BuildFailed(err.to_string()))?;
    if !status.success() {
        return Err(HarnessError::BuildFailed(format!("make exited with {status}")));
    }

    let built_binary = find_built_binary(build_dir.path())?;
    std::fs::rename(&built_binary, &binary_path)?;

    if !verify_runner_binary(&binary_path, pinned_sha) {
        return Err(HarnessError::ReverificationFailed);
    }

    Ok(RunnerBinary {
        path: binary_path,
        commit_sha: pinned_sha.to_string(),
    })
}

async fn fetch_or_cache(url: &str, cache_dir: Option<&Path>) -> Result<Vec<u8>, HarnessError> {
    if let Some(cache_dir) = cache_dir {
        let cache_path = cache_dir.join("runner-source.zip");
        if cache_path.exists() {
            return Ok(std::fs::read(cache_path)?);
        }
    }
    let bytes = reqwest::get(url).await?.bytes().await?.to_vec();
    if let Some(cache_dir) = cache_dir {
        std::fs::create_dir_all(cache_dir)?;
        std::fs::write(cache_dir.join("runner-source.zip"), &bytes)?;
    }
    Ok(bytes)
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<(), HarnessError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(out_path) = entry.enclosed_name().map(|p| dest.join(p)) else {
            continue;
        };
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        std::fs::write(&out_path, buf)?;
    }
    Ok(())
}

fn find_built_binary(build_dir: &Path) -> Result<PathBuf, HarnessError> {
    for entry in walkdir::WalkDir::new(build_dir).max_depth(2) {
        let entry = entry.map_err(|err| HarnessError::BuildFailed(err.to_string()))?;
        if entry.file_type().is_file() && entry.file_name() == "match-runner" {
            return Ok(entry.into_path());
        }
    }
    Err(HarnessError::BuildFailed(
        "built binary not found after make".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_short_sha_from_version_line() {
        let text = "match-runner alpha 1.2.3 2024-01-01-5e4b66b57ef790d68119f4bf\n";
        assert_eq!(
            extract_short_sha(text).as_deref(),
            Some("5e4b66b57ef790d68119f4bf")
        );
    }

    #[test]
    fn rejects_too_short_fragment() {
        assert_eq!(extract_short_sha("match-runner 1.0 abc12\n"), None);
    }
}
