use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use harmonia_analytics_server::analytics::{PlayEventStore, QueryEngine, RefreshQueue};
use harmonia_analytics_server::server::{metrics, run_server, RequestsLoggingLevel};
use harmonia_analytics_server::SqliteAnalyticsStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite analytics database file.
    #[clap(value_parser = parse_path)]
    pub analytics_db: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Shared secret for verifying HS256 bearer tokens. Falls back to the
    /// JWT_SECRET environment variable.
    #[clap(long)]
    pub jwt_secret: Option<String>,

    /// Capacity of the background aggregate refresh queue. Refreshes queued
    /// beyond this are dropped (and counted).
    #[clap(long, default_value_t = 1024)]
    pub refresh_queue_capacity: usize,

    /// Number of days to retain raw events before pruning. Set to 0 to
    /// retain events forever.
    #[clap(long, default_value_t = 0)]
    pub event_retention_days: u64,

    /// Interval in hours between pruning runs. Only used if event_retention_days > 0.
    #[clap(long, default_value_t = 24)]
    pub prune_interval_hours: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let jwt_secret = match cli_args.jwt_secret.or_else(|| std::env::var("JWT_SECRET").ok()) {
        Some(secret) if !secret.is_empty() => secret,
        _ => bail!("No JWT secret configured (pass --jwt-secret or set JWT_SECRET)"),
    };

    info!(
        "Opening SQLite analytics database at {:?}...",
        cli_args.analytics_db
    );
    let store = Arc::new(SqliteAnalyticsStore::new(&cli_args.analytics_db)?);

    info!("Initializing metrics...");
    metrics::init_metrics();

    // Spawn background task for event pruning if enabled
    if cli_args.event_retention_days > 0 {
        let retention_days = cli_args.event_retention_days;
        let interval_hours = cli_args.prune_interval_hours;
        let pruning_store = store.clone();

        info!(
            "Event pruning enabled: retaining {} days, pruning every {} hours",
            retention_days, interval_hours
        );

        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_hours * 60 * 60);
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let cutoff = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs() as i64
                    - (retention_days as i64 * 24 * 60 * 60);

                match pruning_store.prune_events_older_than(cutoff) {
                    Ok(count) => {
                        if count > 0 {
                            info!("Pruned {} old events", count);
                        }
                    }
                    Err(e) => {
                        error!("Failed to prune events: {}", e);
                    }
                }
            }
        });
    }

    let query_engine = Arc::new(QueryEngine::new(store.clone()));
    let (refresh_queue, _refresh_worker) =
        RefreshQueue::start(store.clone(), cli_args.refresh_queue_capacity);

    info!("Ready to serve at port {}!", cli_args.port);
    run_server(
        store,
        query_engine,
        refresh_queue,
        cli_args.logging_level,
        cli_args.port,
        jwt_secret,
    )
    .await
}
