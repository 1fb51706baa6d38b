//! `rusty-automation-tool` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`  : run the HTTP API, scheduler and worker pool.
//! - `migrate`: run pending database migrations.
//! - `dry-run`: execute one action from a JSON file, persisting nothing.

mod config;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use api::{AppState, IdempotencyCache, IdempotencyConfig, RateLimitConfig, TenantRateLimiter};
use db::{CredentialCipher, MemoryStore, PgStore, Store};
use engine::{
    CircuitBreakerConfig, CircuitBreakerRegistry, Executor, ExecutorConfig, Scheduler,
    TriggerKind, Workflow,
};
use nodes::ConnectorRegistry;
use queue::WorkerPool;

use crate::config::{Cli, Command, ServeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Migrate { database_url } => {
            let pool = db::pool::create_pool(&database_url, 2, Duration::from_secs(10))
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool)
                .await
                .context("migration failed")?;
            info!("migrations applied successfully");
            Ok(())
        }
        Command::DryRun { path } => dry_run_file(&path).await,
    }
}

async fn build_store(args: &ServeArgs) -> Result<Arc<dyn Store>> {
    if args.in_memory {
        warn!("using in-memory store; nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let database_url = args
        .database_url
        .as_deref()
        .context("DATABASE_URL is required unless --in-memory is set")?;
    let key = args
        .credentials_key
        .as_deref()
        .context("CREDENTIALS_KEY is required unless --in-memory is set")?;
    let cipher = CredentialCipher::from_base64(key).context("invalid CREDENTIALS_KEY")?;

    let pool = db::pool::create_pool(database_url, args.max_connections, Duration::from_secs(5))
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(PgStore::new(pool, cipher)))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let store = build_store(&args).await?;

    let connectors = Arc::new(ConnectorRegistry::with_builtins(reqwest::Client::new()));
    info!(actions = ?connectors.kinds(), "connectors registered");

    let executor = Arc::new(Executor::new(
        Arc::clone(&store),
        connectors,
        Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        ExecutorConfig::default(),
    ));

    let pool = Arc::new(WorkerPool::new(args.pool_config()));
    pool.start()?;

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&executor),
        pool.clone(),
        args.scheduler_config(),
    ));
    scheduler.start();

    let idempotency_config = IdempotencyConfig::default();
    let idempotency = Arc::new(IdempotencyCache::new(idempotency_config.ttl));
    let sweeper_stop = CancellationToken::new();
    let sweeper = idempotency.spawn_sweeper(idempotency_config.sweep_interval, sweeper_stop.clone());

    let state = AppState {
        store,
        executor,
        queue: pool.clone(),
        rate_limiter: Arc::new(TenantRateLimiter::new(RateLimitConfig::default())),
        idempotency,
    };

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    api::serve(listener, api::router(state), shutdown_signal()).await?;

    info!("shutting down");
    scheduler.stop().await;
    sweeper_stop.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "idempotency sweeper ended abnormally");
    }
    match pool.shutdown(args.shutdown_grace()).await {
        Ok(()) => info!("all in-flight jobs finished"),
        Err(e) => warn!(error = %e, "exiting with jobs still running"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
}

#[derive(Debug, Deserialize)]
struct DryRunFile {
    action_kind: String,
    #[serde(default)]
    config: Value,
    /// Service name to secret, e.g. `{"slack": "https://hooks.slack.com/..."}`.
    #[serde(default)]
    credentials: HashMap<String, String>,
}

async fn dry_run_file(path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let file: DryRunFile = serde_json::from_str(&content).context("invalid dry-run file")?;

    let owner = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    for (service, secret) in file.credentials {
        store.put_credential(owner, service, secret);
    }

    let executor = Executor::new(
        store,
        Arc::new(ConnectorRegistry::with_builtins(reqwest::Client::new())),
        Arc::new(CircuitBreakerRegistry::default()),
        ExecutorConfig::default(),
    );
    let mut workflow = Workflow::new("dry-run", TriggerKind::Webhook, file.action_kind, file.config);
    workflow.owner_id = owner;

    let result = executor
        .dry_run(&workflow, owner, &owner.to_string())
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
