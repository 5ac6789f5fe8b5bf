//! Change-digest entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load the optional TOML file named by `--config`
//!    and validate it. `.env` files are honoured for local runs.
//! 2. **Wire observability**: configure `tracing-subscriber` with a JSON (or
//!    pretty) layer and, when an endpoint is configured, an OpenTelemetry OTLP
//!    exporter. All spans and structured events from every crate flow through
//!    here.
//! 3. **Construct infrastructure**: the in-memory staging store, the DingTalk
//!    sender (or a log-only sender when no token is set), and the JSON-lines
//!    audit sink. All are injected into [`AggregationEngine`].
//! 4. **Run the ingest loop**: read normalized events from stdin until end of
//!    input or Ctrl-C, then flush every pending digest before exiting.

mod app;
mod config;
mod sender;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aggregator::{AggregationEngine, AuditDispatcher, Collaborators};
use anyhow::{Context, Result};
use audit::JsonlAuditSink;
use clap::Parser;
use dingtalk::{DingTalkConfig, DingTalkSender};
use events::{MarkdownDigestRenderer, NotificationSender};
use listener::JsonLinesEventSource;
use staging::InMemoryStagingStore;
use tracing::{error, info, warn};

use crate::config::FileConfig;
use crate::sender::LogSender;

/// How long shutdown waits for the audit queue to drain.
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A pending stdin read holds a blocking thread; don't wait on it at exit.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Aggregates issue change events from stdin into debounced chat digests.
#[derive(Debug, Parser)]
#[command(name = "changedigest", version)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, env = "CHANGEDIGEST_CONFIG")]
    config: Option<PathBuf>,

    /// DingTalk robot access token. Digests are only logged when unset.
    #[arg(long, env = "DINGTALK_ACCESS_TOKEN", hide_env_values = true)]
    dingtalk_token: Option<String>,

    /// DingTalk robot signing secret, for robots with signature verification.
    #[arg(long, env = "DINGTALK_SECRET", hide_env_values = true)]
    dingtalk_secret: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = runtime.block_on(serve(args, config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

async fn serve(args: Args, config: FileConfig) -> Result<()> {
    let telemetry = telemetry::init(&config.telemetry)?;
    let result = run(args, config).await;
    if let Err(error) = &result {
        error!(error = %format!("{error:#}"), "changedigest stopped with an error");
    }
    telemetry.shutdown();
    result
}

async fn run(args: Args, config: FileConfig) -> Result<()> {
    let aggregator_config = config.aggregator.to_aggregator_config()?;

    let store = Arc::new(InMemoryStagingStore::new());
    let janitor = store.spawn_janitor(config.aggregator.janitor_interval());

    let sender: Arc<dyn NotificationSender> = match args.dingtalk_token {
        Some(access_token) => Arc::new(
            DingTalkSender::new(DingTalkConfig {
                webhook_url: config.dingtalk.webhook_url.clone(),
                access_token,
                secret: args.dingtalk_secret,
                title: config.dingtalk.title.clone(),
                timeout: Duration::from_secs(config.dingtalk.timeout_secs),
            })
            .context("Failed to create DingTalk sender")?,
        ),
        None => {
            warn!("DINGTALK_ACCESS_TOKEN not set; digests will only be logged");
            Arc::new(LogSender)
        }
    };

    let (audit, audit_worker) = match &config.audit.path {
        Some(path) => {
            let sink = JsonlAuditSink::open(path)
                .await
                .with_context(|| format!("Failed to open audit file: {}", path.display()))?;
            let (handle, worker) =
                AuditDispatcher::spawn(Arc::new(sink), config.audit.queue_capacity);
            (Some(handle), Some(worker))
        }
        None => (None, None),
    };

    let engine = AggregationEngine::new(
        aggregator_config,
        Collaborators {
            store,
            sender,
            renderer: Arc::new(MarkdownDigestRenderer::new(
                config.renderer.issue_base_url.clone(),
            )),
            audit,
        },
    );

    info!(
        debounce_delay_secs = aggregator_config.debounce_delay().as_secs(),
        staging_ttl_secs = aggregator_config.staging_ttl().as_secs(),
        audit = audit_worker.is_some(),
        "listening for change events on stdin"
    );

    let mut source = JsonLinesEventSource::stdin();
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "could not listen for Ctrl-C; running until end of input");
            std::future::pending::<()>().await;
        }
    };
    let outcome = app::pump(&engine, &mut source, shutdown).await;

    let flushed = engine.flush_pending().await;
    info!(flushed, "pending digests flushed");
    janitor.abort();

    // The worker exits once every audit handle is gone, including the ones
    // held by the engine's timer tasks.
    drop(engine);
    if let Some(worker) = audit_worker {
        if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, worker).await.is_err() {
            warn!("audit queue did not drain before shutdown");
        }
    }

    outcome.map(|stopped| info!(?stopped, "changedigest stopped"))
}
