//! `fishtest-worker`: the compute worker binary. Wires the CLI surface,
//! persisted config, identity derivation, logging, process lock, startup
//! integrity check, signal handling, heartbeat loop, and the task lifecycle
//! engine together.

mod cli;
mod github;
mod lifecycle;
mod logging;
mod setup;
mod startup;

use std::sync::Arc;

use clap::Parser;

use worker_core::SharedState;
use worker_dispatcher::{DispatcherClient, WorkerInfo};
use worker_runner::{HarnessRunner, MatchRunner};

use crate::cli::Cli;
use crate::lifecycle::{EngineContext, LifecycleExit};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging_guard = logging::init(&cli.install_dir)?;

    let (mut cfg, config_path) = setup::resolve_config(&cli)?;
    if cli.only_config {
        println!("wrote configuration to {}", config_path.display());
        return Ok(());
    }

    let lock_path = cli.install_dir.join("fishtest_worker.lock");
    let lock = worker_engine::acquire(&lock_path).map_err(|err| anyhow::anyhow!("{err}"))?;

    let base_url = setup::dispatcher_url(&cfg)?;
    let client = DispatcherClient::new(base_url)?;
    let github_http = reqwest::Client::builder().timeout(client.timeout()).build()?;

    startup::validate_credentials(&client, &mut cfg, &config_path, cli.no_validation).await?;

    let modified =
        startup::resolve_modified_flag(&github_http, &cli.install_dir, cli.manifest_url.as_deref()).await?;
    let identity = setup::build_identity(&cfg, &cli.install_dir, modified)?;
    let password = cfg.login.password.clone().unwrap_or_default();

    let worker_info = WorkerInfo::from_identity(&identity, 0.0);
    let state = Arc::new(SharedState::new());

    let signal_rx = worker_engine::spawn_signal_waiter(state.clone());
    tokio::spawn(async move {
        if let Ok(signal) = signal_rx.await {
            tracing::info!(signal = signal.name(), "received termination signal, shutting down");
        }
    });

    tokio::spawn(worker_engine::heartbeat::run(
        client.clone(),
        (worker_info, password.clone()),
        state.clone(),
    ));

    let compiler_name = cfg.parameters.compiler.clone().unwrap_or_else(|| "g++".to_string());
    let compiler = worker_runner::detect_compiler(&compiler_name)
        .map_err(|err| anyhow::anyhow!("detecting compiler {compiler_name:?}: {err}"))?;

    let match_runner: Arc<dyn MatchRunner> = Arc::new(HarnessRunner {
        install_dir: cli.install_dir.clone(),
        pinned_sha: cli.runner_sha.clone().unwrap_or_default(),
        source_url: cli.runner_source_url.clone().unwrap_or_default(),
        cache_dir: cfg.parameters.global_cache.clone(),
        compiler,
        concurrency: identity.concurrency,
    });

    let fleet = cfg.parameters.fleet;
    let install_dir = cli.install_dir.clone();

    let exit = lifecycle::run(EngineContext {
        client,
        github_http,
        state,
        identity,
        password,
        install_dir: install_dir.clone(),
        fleet,
        match_runner,
    })
    .await;

    match exit {
        LifecycleExit::CleanExit => Ok(()),
        LifecycleExit::Failure => anyhow::bail!("worker exiting after a failure"),
        LifecycleExit::SelfUpdateRequired => {
            worker_integrity::backup_log(&logging::log_path(&install_dir));
            lock.release();
            let updater_path = setup::resolve_path(&install_dir, &cli.updater_path);
            let args = vec!["--install-dir".to_string(), install_dir.display().to_string()];
            if let Err(err) = worker_integrity::run_self_update(&updater_path, &args) {
                tracing::error!(error = %err, "self-update invocation failed");
            }
            anyhow::bail!("dispatcher requires a newer worker version, handed off to the updater")
        }
    }
}
