//! tiered-cache: multi-tier cache coordinator with an admin HTTP API.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use tiered_cache::cache::CacheCoordinator;
use tiered_cache::config::{Cli, Config};
use tiered_cache::repository::FileRepository;
use tiered_cache::server::{build_router, AppState};
use tiered_cache::CacheLevel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "tiered_cache=debug,tower_http=debug"
    } else {
        "tiered_cache=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("tiered-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;

    info!(
        default_ttl = config.cache.default_ttl,
        max_ttl = config.cache.max_ttl,
        queue_events = config.integration.queue_events,
        "Configuration loaded"
    );

    for level in CacheLevel::by_priority() {
        let settings = config.level(level);
        info!(
            level = %level,
            enabled = settings.enabled,
            driver = %settings.driver,
            default_ttl = ?settings.default_ttl,
            "Tier configuration"
        );
    }

    // Queued events persist beside the database tier so flushing it keeps them.
    let mut builder = CacheCoordinator::builder(config.clone());
    if let Some(path) = config.level(CacheLevel::Database).path {
        let mut events_dir = path.into_os_string();
        events_dir.push("-events");
        builder = builder.event_store(Arc::new(FileRepository::new(events_dir)));
    }
    let cache = Arc::new(builder.build()?);

    // Build the HTTP router.
    let app = build_router(Arc::new(AppState::new(cache)));

    // Start the server.
    let listen_addr = cli.listen.unwrap_or(config.server.listen);
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
