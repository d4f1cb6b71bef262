//! Command-line surface. Argument parsing only — schema validation
//! and the config-file merge live in `setup`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "fishtest-worker", version, about = "Chess-engine testing worker")]
pub struct Cli {
    /// Dispatcher username, password (both or neither; overrides the config file).
    #[arg(value_names = ["USERNAME", "PASSWORD"], num_args = 0..=2)]
    pub credentials: Vec<String>,

    /// Dispatcher protocol.
    #[arg(short = 'P', long = "protocol", value_enum)]
    pub protocol: Option<Protocol>,

    /// Dispatcher hostname.
    #[arg(short = 'n', long = "host")]
    pub host: Option<String>,

    /// Dispatcher port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Concurrency expression over the variable MAX (e.g. `MAX-1`).
    #[arg(short = 'c', long = "concurrency")]
    pub concurrency: Option<String>,

    /// Max-memory expression in MiB over the variable MAX.
    #[arg(short = 'm', long = "max-memory")]
    pub max_memory: Option<String>,

    /// User-chosen alphanumeric prefix (≤8 chars) for the unique worker key.
    #[arg(short = 'u', long = "uuid-prefix")]
    pub uuid_prefix: Option<String>,

    /// Minimum engine threads this worker will accept a task for.
    #[arg(short = 't', long = "min-threads")]
    pub min_threads: Option<u32>,

    /// Fleet mode: exit 1 on first failed iteration instead of retrying.
    #[arg(short = 'f', long = "fleet")]
    pub fleet: Option<bool>,

    /// Shared cache directory for downloaded match-runner archives.
    #[arg(short = 'g', long = "global-cache")]
    pub global_cache: Option<PathBuf>,

    /// Compiler to build the match runner with (auto-detected if unset).
    #[arg(short = 'C', long = "compiler")]
    pub compiler: Option<String>,

    /// Write the resolved config and exit without starting the worker.
    #[arg(short = 'w', long = "only-config", default_value_t = false)]
    pub only_config: bool,

    /// Skip the /api/request_version credential check (no interactive retry).
    #[arg(short = 'v', long = "no-validation", default_value_t = false)]
    pub no_validation: bool,

    /// Directory the worker treats as its install directory (config, lock,
    /// log file, and `testing/` scratch space all live here).
    #[arg(long = "install-dir", env = "FISHTEST_WORKER_INSTALL_DIR", default_value = ".")]
    pub install_dir: PathBuf,

    /// Path to the persisted config file, relative to `--install-dir` unless absolute.
    #[arg(long = "config", default_value = "fishtest.cfg")]
    pub config_file: PathBuf,

    /// Zip URL for the match-runner's source at the pinned commit.
    #[arg(long = "runner-source-url", env = "FISHTEST_WORKER_RUNNER_SOURCE_URL")]
    pub runner_source_url: Option<String>,

    /// Pinned match-runner commit SHA this worker version expects.
    #[arg(long = "runner-sha", env = "FISHTEST_WORKER_RUNNER_SHA")]
    pub runner_sha: Option<String>,

    /// URL of the canonical remote integrity manifest.
    #[arg(long = "manifest-url", env = "FISHTEST_WORKER_MANIFEST_URL")]
    pub manifest_url: Option<String>,

    /// Updater binary invoked when the dispatcher requires a newer worker version.
    #[arg(long = "updater-path", env = "FISHTEST_WORKER_UPDATER_PATH", default_value = "updater")]
    pub updater_path: PathBuf,
}

impl Cli {
    pub fn username_password(&self) -> Option<(String, String)> {
        match self.credentials.as_slice() {
            [username, password] => Some((username.clone(), password.clone())),
            _ => None,
        }
    }
}
