// CLI Command Implementations
// Runs a demo drain round and the configuration utilities

use super::{info, success, warning, Commands};
use colored::*;
use graceful_drain::config::DrainConfig;
use graceful_drain::{observability, with_context, WaitOutcome};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Execute a CLI command
pub async fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { config, workers, work_ms } => {
            run_command(config, workers, work_ms).await
        }
        Commands::Validate { file } => validate_command(file),
        Commands::Defaults => defaults_command(),
    }
}

/// Spawn workers, wait for a shutdown signal, then drain them
async fn run_command(config_path: String, workers: usize, work_ms: u64) -> anyhow::Result<()> {
    // The subscriber is configured from the file, so report its source afterwards
    let (config, source) = DrainConfig::load_with_source(&config_path)?;
    observability::init(&config.logging)?;
    source.log();

    let signals = config.shutdown.signal_numbers()?;
    let (coordinator, token, release) = with_context(&CancellationToken::new(), &signals)?;
    let cleanup_timeout = config.shutdown.cleanup_timeout();

    coordinator.subscribe_n(workers);
    for worker in 0..workers {
        let coordinator = coordinator.clone();
        let token = token.clone();

        tokio::spawn(async move {
            token.cancelled().await;

            let outcome = coordinator
                .unsubscribe_future_with_timeout(
                    async move {
                        tokio::time::sleep(Duration::from_millis(work_ms)).await;
                        tracing::debug!(worker, "cleanup finished");
                    },
                    cleanup_timeout,
                )
                .await;
            tracing::info!(worker, ?outcome, "worker released");
        });
    }

    success(&format!("{} workers running", workers));
    info(&format!(
        "Send {} to start draining",
        config.shutdown.signals.join(" or ").bright_white()
    ));

    token.cancelled().await;
    println!();
    info(&format!("Draining {} workers...", coordinator.count()));

    let span = observability::round_span(coordinator.name(), coordinator.count());
    let outcome = coordinator
        .wait_with_timeout(config.shutdown.wait_timeout())
        .instrument(span)
        .await;
    release.release();

    match outcome {
        WaitOutcome::Drained => success("All workers drained"),
        WaitOutcome::Forced { abandoned } => warning(&format!(
            "Wait timed out after {}ms, abandoned {} workers",
            config.shutdown.wait_timeout_ms, abandoned
        )),
    }

    Ok(())
}

/// Validate a configuration file
fn validate_command(file: String) -> anyhow::Result<()> {
    if !Path::new(&file).exists() {
        anyhow::bail!("Configuration file {} not found", file);
    }

    let config = DrainConfig::load(&file)?;
    success(&format!("{} is valid", file.bright_white()));
    info(&format!("Signals: {}", config.shutdown.signals.join(", ")));
    info(&format!(
        "Wait timeout: {}ms, cleanup timeout: {}ms",
        config.shutdown.wait_timeout_ms, config.shutdown.cleanup_timeout_ms
    ));

    Ok(())
}

/// Print the default configuration as TOML
fn defaults_command() -> anyhow::Result<()> {
    print!("{}", DrainConfig::default().to_toml()?);
    Ok(())
}
