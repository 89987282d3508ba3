#![forbid(unsafe_code)]

//! `member-relay` — outbound integration core binary.
//!
//! Bootstraps configuration, connects the record store, starts the
//! provider worker pools and the status aggregator, and runs the scheduled
//! job engine plus the weekly registration and daily reminder tasks.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use member_relay::config::GlobalConfig;
use member_relay::email::BrevoClient;
use member_relay::engine::invoice::spawn_invoice_task;
use member_relay::engine::{spawn_engine_task, HandlerContext, JobEngine};
use member_relay::pool::{channel, spawn_pool_worker, PoolConfig};
use member_relay::sms::{OpenPhoneClient, SmsJob};
use member_relay::store::{connect, RecordStore};
use member_relay::zoom::registration::spawn_member_registration_task;
use member_relay::zoom::{spawn_status_aggregator, ZoomClient, ZoomJob};
use member_relay::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "member-relay", about = "Membership back-office integration core", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Missing file means defaults.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the data directory for the record store.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

/// Capacity of the status-event channel feeding the aggregator.
const STATUS_CHANNEL_CAPACITY: usize = 10_000;

/// Maximum time to wait for graceful shutdown before force-exiting.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("member-relay bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = if args.config.exists() {
        GlobalConfig::load_from_path(&args.config)?
    } else {
        info!(path = %args.config.display(), "config file missing; using defaults");
        GlobalConfig::default()
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    config.load_credentials()?;
    info!(is_prod = config.is_prod, "configuration loaded");

    // ── Connect the record store ────────────────────────
    let db = Arc::new(connect(Some(&config.db_path())).await?);
    let store = RecordStore::new(db);
    info!("record store connected");

    // ── Build provider clients ──────────────────────────
    let zoom = Arc::new(ZoomClient::new(&config.zoom));
    let sms = Arc::new(OpenPhoneClient::new(&config.sms));
    let email = Arc::new(BrevoClient::new(&config.email));

    // ── Start worker pools ──────────────────────────────
    let ct = CancellationToken::new();

    let zoom_pool_config = PoolConfig::new(
        "zoom",
        config.pools.zoom_rate_per_sec,
        config.pools.zoom_queue_capacity,
    )
    .rate_limit_backoff(std::time::Duration::from_secs(1))
    .job_timeout(std::time::Duration::from_secs(config.pools.job_timeout_seconds));
    let (zoom_pool, zoom_queue) = channel::<ZoomJob>(zoom_pool_config);
    let zoom_worker = spawn_pool_worker(zoom_queue, zoom_pool.clone(), ct.clone());

    let sms_pool_config = PoolConfig::new(
        "openphone",
        config.pools.sms_rate_per_sec,
        config.pools.sms_queue_capacity,
    )
    .rate_limit_backoff(std::time::Duration::from_secs(2))
    .job_timeout(std::time::Duration::from_secs(config.pools.job_timeout_seconds));
    let (sms_pool, sms_queue) = channel::<SmsJob>(sms_pool_config);
    let sms_worker = spawn_pool_worker(sms_queue, sms_pool.clone(), ct.clone());
    info!("worker pools started");

    // ── Start the status aggregator ─────────────────────
    let (status_tx, status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
    let aggregator = spawn_status_aggregator(
        status_rx,
        Arc::clone(&zoom),
        zoom_pool.clone(),
        std::time::Duration::from_secs(config.flush_interval_seconds),
        ct.clone(),
    );

    // ── Start the scheduled tasks ───────────────────────
    let ctx = HandlerContext {
        store: store.clone(),
        zoom: Arc::clone(&zoom),
        sms: Arc::clone(&sms),
        email: Arc::clone(&email),
        zoom_pool: zoom_pool.clone(),
        sms_pool: sms_pool.clone(),
    };

    let engine = JobEngine::new(
        Arc::new(ctx.clone()),
        i64::try_from(config.engine_window_minutes)
            .map_err(|_| AppError::Config("engine window out of range".into()))?,
    );
    let engine_task = spawn_engine_task(engine, ct.clone());

    let registration_task = spawn_member_registration_task(
        store.clone(),
        Arc::clone(&zoom),
        zoom_pool.clone(),
        status_tx.clone(),
        config.zoom.clone(),
        ct.clone(),
    );

    let invoice_task = spawn_invoice_task(ctx, ct.clone());
    info!("scheduled tasks started; member-relay ready");

    // ── Wait for first shutdown signal ──────────────────
    shutdown_signal().await;
    info!("shutdown signal received — starting graceful shutdown");
    ct.cancel();

    // Spawn a background listener for a second Ctrl+C (force-exit).
    tokio::spawn(async {
        shutdown_signal().await;
        error!("second shutdown signal received — forcing exit");
        std::process::exit(1);
    });

    // ── Graceful shutdown with timeout ───────────────────
    shutdown_with_timeout(vec![
        ("zoom pool", zoom_worker),
        ("sms pool", sms_worker),
        ("aggregator", aggregator),
        ("engine", engine_task),
        ("registration", registration_task),
        ("invoices", invoice_task),
    ])
    .await;

    info!("member-relay shut down");
    Ok(())
}

/// Await every background task, bounded by [`SHUTDOWN_TIMEOUT`] in total.
async fn shutdown_with_timeout(handles: Vec<(&'static str, JoinHandle<()>)>) {
    let shutdown_fut = async {
        for (name, handle) in handles {
            if handle.await.is_err() {
                error!(task = name, "task panicked during shutdown");
            }
        }
    };

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown_fut)
        .await
        .is_err()
    {
        error!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "graceful shutdown timed out — exiting"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
