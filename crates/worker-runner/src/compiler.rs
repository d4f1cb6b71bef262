//! Compiler detection: identifies the g++/clang++ toolchain available on the
//! host and checks it against the minimum supported version.

use worker_core::constants::{MIN_CLANG_VERSION, MIN_GCC_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFamily {
    Gcc,
    Clang,
}

#[derive(Debug, Clone)]
pub struct Compiler {
    pub family: CompilerFamily,
    pub version: (u32, u32, u32),
}

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("compiler {0:?} not found on PATH")]
    CompilerNotFound(String),
    #[error("could not determine compiler version from: {0:?}")]
    UnrecognizedVersionOutput(String),
    #[error("compiler version {0:?} is below the minimum supported version")]
    VersionTooOld(String),
    #[error("required build tool {0:?} not found on PATH")]
    ToolNotFound(&'static str),
}

/// Runs `compiler --version` and extracts the first `major.minor.patch`
/// triple from its output, classifying the family from the command name.
pub fn detect_compiler(compiler: &str) -> Result<Compiler, ToolchainError> {
    let family = if compiler.contains("clang") {
        CompilerFamily::Clang
    } else {
        CompilerFamily::Gcc
    };

    let output = std::process::Command::new(compiler)
        .arg("--version")
        .output()
        .map_err(|_| ToolchainError::CompilerNotFound(compiler.to_string()))?;
    let text = String::from_utf8_lossy(&output.stdout);
    let version =
        parse_version_triple(&text).ok_or_else(|| ToolchainError::UnrecognizedVersionOutput(text.to_string()))?;

    Ok(Compiler { family, version })
}

fn parse_version_triple(text: &str) -> Option<(u32, u32, u32)> {
    for word in text.split(|c: char| c.is_whitespace()) {
        let parts: Vec<&str> = word.split('.').collect();
        if parts.len() >= 2 {
            let nums: Option<Vec<u32>> = parts.iter().take(3).map(|p| p.parse().ok()).collect();
            if let Some(nums) = nums {
                if nums.len() >= 2 {
                    return Some((nums[0], nums[1], *nums.get(2).unwrap_or(&0)));
                }
            }
        }
    }
    None
}

/// Confirms the detected compiler meets the minimum version floor, and that
/// `strip` and a `make`-equivalent build tool are present on `PATH`.
pub fn verify_toolchain(compiler: &Compiler, make_tool: &str) -> Result<(), ToolchainError> {
    let floor = match compiler.family {
        CompilerFamily::Gcc => MIN_GCC_VERSION,
        CompilerFamily::Clang => MIN_CLANG_VERSION,
    };
    let (maj, min, _) = compiler.version;
    if (maj, min) < floor {
        return Err(ToolchainError::VersionTooOld(format!(
            "{maj}.{min}.{}",
            compiler.version.2
        )));
    }

    which::which("strip").map_err(|_| ToolchainError::ToolNotFound("strip"))?;
    which::which(make_tool).map_err(|_| ToolchainError::ToolNotFound("make"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gcc_style_version_line() {
        assert_eq!(parse_version_triple("g++ (GCC) 12.2.0"), Some((12, 2, 0)));
    }

    #[test]
    fn parses_clang_style_version_line() {
        assert_eq!(
            parse_version_triple("Ubuntu clang version 14.0.0-1ubuntu1"),
            Some((14, 0, 0))
        );
    }

    #[test]
    fn rejects_old_gcc() {
        let compiler = Compiler {
            family: CompilerFamily::Gcc,
            version: (8, 1, 0),
        };
        let err = verify_toolchain(&compiler, "make-definitely-not-on-path-xyz");
        assert!(matches!(err, Err(ToolchainError::VersionTooOld(_))));
    }
}
