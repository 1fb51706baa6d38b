//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use engine::SchedulerConfig;
use queue::WorkerPoolConfig;

#[derive(Debug, Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "Multi-tenant workflow automation engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP API, the scheduler and the worker pool.
    Serve(ServeArgs),
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Run one action from a JSON file without touching any database.
    DryRun {
        /// File containing `{"action_kind", "config", "credentials"}`.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Postgres connection string. Required unless `--in-memory`.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Base64-encoded 32-byte key for stored credentials.
    #[arg(long, env = "CREDENTIALS_KEY", hide_env_values = true)]
    pub credentials_key: Option<String>,

    /// Keep everything in process memory (development only).
    #[arg(long)]
    pub in_memory: bool,

    #[arg(long, env = "WORKER_COUNT", default_value_t = 10)]
    pub workers: usize,

    #[arg(long, env = "SCHEDULER_TICK_SECS", default_value_t = 60)]
    pub scheduler_tick_secs: u64,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Seconds to wait for in-flight jobs at shutdown.
    #[arg(long, default_value_t = 30)]
    pub shutdown_grace_secs: u64,
}

impl ServeArgs {
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::with_workers(self.workers.max(1))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_tick_interval(Duration::from_secs(self.scheduler_tick_secs.max(1)))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_build_component_configs() {
        let cli = Cli::try_parse_from([
            "rusty-automation-tool",
            "serve",
            "--in-memory",
            "--bind",
            "127.0.0.1:9000",
            "--workers",
            "4",
            "--scheduler-tick-secs",
            "5",
        ])
        .unwrap();

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert!(args.in_memory);
        assert_eq!(args.bind, "127.0.0.1:9000");

        let pool = args.pool_config();
        assert_eq!(pool.workers, 4);
        assert_eq!(pool.queue_capacity, 40);
        assert_eq!(
            args.scheduler_config().tick_interval,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn zero_workers_is_clamped() {
        let cli = Cli::try_parse_from([
            "rusty-automation-tool",
            "serve",
            "--in-memory",
            "--workers",
            "0",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.pool_config().workers, 1);
    }
}
