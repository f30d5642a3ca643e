//! RideMatch Pipeline - Main Entry Point
//!
//! One binary, three roles (RIDEMATCH_ROLE): producer, matcher, db-writer.
//! Matchers scale horizontally by starting more processes with distinct
//! CONSUMER_IDs; the broker's fair dispatch does the load balancing.

mod config;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Role, RuntimeConfig};
use ridematch_core::application::matcher::{
    shutdown_channel, MatcherWorker, RequeuePolicy, ShutdownSender,
};
use ridematch_core::application::{DbWriter, ProducerService, SubmitRequest};
use ridematch_core::domain::WorkerIdentity;
use ridematch_core::port::id_provider::UuidProvider;
use ridematch_core::port::time_provider::SystemTimeProvider;
use ridematch_infra_amqp::{
    connect_with_backoff, declare_topology, lapin, AmqpRequestPublisher, AmqpRequestQueue,
    AmqpResultQueue, AmqpResultSink,
};
use ridematch_infra_sqlite::{
    create_pool, run_migrations, SqliteDriverDirectory, SqliteMatchResultRepository,
    SqliteProcessedMarkers, SqlitePool,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const CONNECT_MAX_ATTEMPTS: u32 = 10;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format =
        std::env::var("RIDEMATCH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("ridematch=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    // 2. Load configuration
    let config = RuntimeConfig::from_env()?;
    info!(
        role = ?config.role,
        consumer_id = %config.consumer_id,
        "RideMatch v{} starting...",
        VERSION
    );

    match config.role {
        Role::Producer => run_producer(&config).await,
        Role::Matcher => run_matcher(&config).await,
        Role::DbWriter => run_db_writer(&config).await,
    }
}

/// Producer: read NDJSON ride requests from stdin, enqueue each with
/// confirm semantics and print the assigned request_id. A rejected line
/// is reported and skipped; the stream continues.
async fn run_producer(config: &RuntimeConfig) -> Result<()> {
    let connection = connect(config).await?;

    let channel = connection.create_channel().await?;
    let publisher = AmqpRequestPublisher::new(channel)
        .await
        .map_err(|e| anyhow::anyhow!("Publisher setup failed: {}", e))?;

    let producer = ProducerService::new(
        Arc::new(publisher),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    );

    info!("Producer ready, reading requests from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut submitted = 0u64;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: SubmitRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Skipping malformed request line");
                continue;
            }
        };
        match producer.submit(request).await {
            Ok(request_id) => {
                submitted += 1;
                println!("{request_id}");
            }
            Err(e) => error!(error = %e, "Submit failed"),
        }
    }

    info!(submitted = submitted, "Input exhausted, producer exiting");
    Ok(())
}

/// Matcher: competing consumer on `ride_requests`
async fn run_matcher(config: &RuntimeConfig) -> Result<()> {
    let connection = connect(config).await?;

    let pool = open_database(config).await?;
    let time_provider = Arc::new(SystemTimeProvider);

    let consume_channel = connection.create_channel().await?;
    let requests = AmqpRequestQueue::bind(consume_channel, &config.consumer_id)
        .await
        .map_err(|e| anyhow::anyhow!("Consumer setup failed: {}", e))?;

    let publish_channel = connection.create_channel().await?;
    let results = AmqpResultSink::new(publish_channel)
        .await
        .map_err(|e| anyhow::anyhow!("Result sink setup failed: {}", e))?;

    let worker = MatcherWorker::new(
        WorkerIdentity::new(&config.consumer_id),
        Arc::new(requests),
        Arc::new(results),
        Arc::new(SqliteDriverDirectory::new(pool.clone())),
        Arc::new(SqliteProcessedMarkers::new(pool, time_provider.clone())),
        RequeuePolicy::default(),
        time_provider,
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(async move {
        if let Err(e) = worker.run(shutdown_rx).await {
            error!(error = %e, "Matcher worker failed");
        }
    });

    wait_for_signal().await?;
    graceful_stop(shutdown_tx, handle).await;
    Ok(())
}

/// DB writer: sole consumer on `match_results`
async fn run_db_writer(config: &RuntimeConfig) -> Result<()> {
    let connection = connect(config).await?;

    let pool = open_database(config).await?;

    let consume_channel = connection.create_channel().await?;
    let results = AmqpResultQueue::bind(consume_channel, &config.consumer_id)
        .await
        .map_err(|e| anyhow::anyhow!("Consumer setup failed: {}", e))?;

    let writer = DbWriter::new(
        Arc::new(results),
        Arc::new(SqliteMatchResultRepository::new(pool)),
        RequeuePolicy::default(),
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(async move {
        if let Err(e) = writer.run(shutdown_rx).await {
            error!(error = %e, "DB writer failed");
        }
    });

    wait_for_signal().await?;
    graceful_stop(shutdown_tx, handle).await;
    Ok(())
}

/// Connect and declare the topology. Every role declares idempotently,
/// so start order across the fleet does not matter.
async fn connect(config: &RuntimeConfig) -> Result<lapin::Connection> {
    let connection = connect_with_backoff(&config.amqp_addr, CONNECT_MAX_ATTEMPTS)
        .await
        .map_err(|e| anyhow::anyhow!("Broker connection failed: {}", e))?;

    let channel = connection.create_channel().await?;
    declare_topology(&channel)
        .await
        .map_err(|e| anyhow::anyhow!("Topology declaration failed: {}", e))?;

    Ok(connection)
}

async fn open_database(config: &RuntimeConfig) -> Result<SqlitePool> {
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(db_path = %config.db_path, "Initializing database...");
    let pool = create_pool(&config.db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    Ok(pool)
}

async fn wait_for_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("Shutdown signal received. Exiting gracefully...");
    Ok(())
}

/// Signal shutdown and wait for the loop to drain its in-flight delivery
async fn graceful_stop(shutdown_tx: ShutdownSender, handle: tokio::task::JoinHandle<()>) {
    shutdown_tx.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
        warn!("Worker did not stop within the grace period");
    }
    info!("Shutdown complete.");
}
