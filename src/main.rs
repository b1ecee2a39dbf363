use anyhow::{Context as _, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use taskifyd::config::BoardConfig;
use taskifyd::store::TaskStore;
use taskifyd::sync::event::EventBroadcaster;
use taskifyd::sync::session::SessionRegistry;
use taskifyd::{rest, sync, AppContext};

#[derive(Parser)]
#[command(
    name = "taskifyd",
    about = "Taskify sync server — realtime Kanban board synchronization",
    version
)]
struct Args {
    /// WebSocket sync server port
    #[arg(long, env = "TASKIFY_PORT")]
    port: Option<u16>,

    /// HTTP server port
    #[arg(long, env = "TASKIFY_HTTP_PORT")]
    http_port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "TASKIFY_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKIFY_LOG")]
    log: Option<String>,

    /// Log output format: pretty (default) or json
    #[arg(long, env = "TASKIFY_LOG_FORMAT")]
    log_format: Option<String>,

    /// Bind address for both servers (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TASKIFY_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(BoardConfig::new(
        args.port,
        args.http_port,
        args.data_dir,
        args.log,
        args.log_format,
        args.bind,
    ));
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "taskifyd starting");
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        http_port = config.http_port,
        "config loaded"
    );

    // Store bootstrap failure is fatal — unlike steady-state per-request
    // failures, which handlers absorb.
    let store = Arc::new(
        TaskStore::open(&config.data_dir)
            .await
            .context("failed to open task store")?,
    );

    let ctx = Arc::new(AppContext {
        config,
        store,
        broadcaster: Arc::new(EventBroadcaster::new()),
        sessions: Arc::new(SessionRegistry::new()),
        started_at: std::time::Instant::now(),
    });

    let rest_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = rest::start_rest_server(rest_ctx).await {
            warn!(err = %e, "HTTP server stopped");
        }
    });

    sync::run(ctx).await
}

fn init_logging(config: &BoardConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(config.log.clone());
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
    }
}
