//! rm-notify entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load the TOML file named by `--config` and
//!    validate it. An invalid file is fatal.
//! 2. **Wire observability**: install `tracing-subscriber` (text or JSON, with
//!    timestamps in the business-hours offset) and, when configured, an
//!    OpenTelemetry OTLP span exporter.
//! 3. **Construct infrastructure**: the S3 object store, the Slack notifier
//!    and the file-backed dedup ledger, injected into the ingestion cycle.
//! 4. **Select trigger mode**:
//!    - `--once`: run a single cycle, ignoring the gate, and exit.
//!    - default: run the bucket poller until Ctrl-C or SIGTERM.

mod config;
mod observability;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ingest::{CycleSettings, IngestionCycle};
use ledger_file::FileSnapshotStore;
use listener::{BucketPoller, PollerSettings};
use object_store::{S3ObjectStore, S3Settings};
use pipeline::{BusinessHours, DedupLedger, SystemClock};
use slack::{SlackNotifier, SlackSettings};
use tracing::{error, info, warn};

use crate::config::Config;

/// Watches a bucket for issue-change events and notifies Slack.
#[derive(Debug, Parser)]
#[command(name = "rm-notify", version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, short, default_value = "rm-notify.toml")]
    config: PathBuf,

    /// Run one ingestion cycle immediately, ignoring business hours, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let gate = config.business_hours()?;

    let telemetry = observability::init(&config.logging, &config.telemetry, gate.offset())?;
    let result = run(&args, &config, gate).await;
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "rm-notify stopped");
    }
    telemetry.shutdown();
    result
}

async fn run(args: &Args, config: &Config, gate: BusinessHours) -> anyhow::Result<()> {
    let ledger = DedupLedger::load(
        config.ledger.strategy,
        Arc::new(FileSnapshotStore::new(&config.ledger.path)),
    )
    .with_context(|| format!("loading dedup ledger {}", config.ledger.path.display()))?;

    let store = S3ObjectStore::connect(&S3Settings {
        region: config.storage.region.clone(),
        endpoint: config.storage.endpoint.clone(),
        access_key: config.storage.access_key.clone(),
        secret_key: config.storage.secret_key.clone(),
        bucket: config.storage.bucket.clone(),
    })
    .await;

    let notifier = SlackNotifier::new(&SlackSettings {
        token: config.slack.token.clone(),
        api_base: config.slack.api_base.clone(),
        timeout: config.slack_timeout(),
    })
    .context("building Slack client")?;

    let cycle = IngestionCycle::new(
        Arc::new(store),
        Arc::new(notifier),
        Arc::new(ledger),
        CycleSettings {
            prefix: config.storage.prefix.clone(),
            archive_prefix: config.archive_prefix(),
            policy: config.policy.clone(),
            recipient: config.recipient()?,
            mark: config.ledger.mark,
        },
    );

    info!(
        bucket = %config.storage.bucket,
        prefix = %config.storage.prefix,
        strategy = ?config.ledger.strategy,
        mark = ?config.ledger.mark,
        once = args.once,
        "rm-notify starting"
    );

    if args.once {
        cycle.run_once().await?;
        return Ok(());
    }

    let poller = BucketPoller::new(
        cycle,
        gate,
        Arc::new(SystemClock),
        PollerSettings {
            interval: config.poll_interval(),
            initial_sweep: config.poll.initial_sweep,
        },
    );
    poller.run(shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown requested; finishing current cycle");
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_arguments_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_to_polling_with_default_config_path() {
        let args = Args::parse_from(["rm-notify"]);
        assert_eq!(args.config, PathBuf::from("rm-notify.toml"));
        assert!(!args.once);

        let args = Args::parse_from(["rm-notify", "--config", "/etc/rm-notify.toml", "--once"]);
        assert_eq!(args.config, PathBuf::from("/etc/rm-notify.toml"));
        assert!(args.once);
    }
}
