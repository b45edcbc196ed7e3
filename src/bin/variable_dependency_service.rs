//! Variable Dependency Service Binary
//!
//! Runs the variable dependency kernel as a REST API service:
//! - Structured JSON logging
//! - Request tracing with correlation IDs
//! - Graceful shutdown handling
//! - Health check endpoints
//!
//! ## Configuration
//!
//! Environment variables:
//! - `GRAPH_STORE`: "memory" or "postgres" (default: memory)
//! - `CATALOG_PATH`: JSON catalog file or directory, loaded at startup and on reload
//! - `UNKNOWN_VARIABLES`: "ignore" or "reject" (default: ignore)
//! - `DATABASE_URL` / `GRAPH_DB_*`: PostgreSQL connection (postgres store only)
//! - `PORT`: Service port (default: 8002)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! CATALOG_PATH=catalogs/ cargo run --bin variable_dependency_service --features service
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::middleware;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use variable_dependency_kernel::service::{create_router, request_logging_middleware, ServiceState};
use variable_dependency_kernel::{
    CatalogSet, GraphStore, InMemoryGraphStore, LogFormat, PostgresGraphStore, ServiceConfig,
    StoreKind, TraversalMode,
};

/// Initialize the tracing subscriber in the configured format.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "variable_dependency_service=info,variable_dependency_kernel=info,variable_kernel=info,tower_http=info,sqlx=warn"
            .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE))
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init(),
    }
}

/// Build state over `store`, load the initial catalogs and serve until shutdown.
async fn serve<S: GraphStore + 'static>(
    store: S,
    config: &ServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut state = ServiceState::with_options(store, config.unknown_variables, TraversalMode::Delegated);

    match &config.catalog_path {
        Some(path) => {
            state = state.with_catalog_source(path);
            let set = CatalogSet::load_path(path)?;
            state.install(&set).await?;
            info!(
                path = %path.display(),
                dataset_count = set.len(),
                "Initial catalogs loaded"
            );
        }
        None => warn!("CATALOG_PATH not set; serving without catalogs and reload disabled"),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(address = %addr, "Variable Dependency Service listening");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
        }
    };

    info!("Ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env();
    init_tracing(config.log_format);

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");

    info!(
        version = version,
        build_sha = build_sha,
        "Starting Variable Dependency Service"
    );

    info!(
        store = ?config.store,
        unknown_variables = ?config.unknown_variables,
        "Configuration loaded"
    );

    match config.store {
        StoreKind::Memory => serve(InMemoryGraphStore::new(), &config).await?,
        StoreKind::Postgres => {
            info!("Connecting to PostgreSQL...");
            let connect_start = Instant::now();

            let store = match tokio::time::timeout(
                Duration::from_secs(30),
                PostgresGraphStore::from_env(),
            )
            .await
            {
                Ok(Ok(store)) => store,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    return Err(e.into());
                }
                Err(_) => {
                    tracing::error!("PostgreSQL connection timeout after 30s");
                    return Err("Database connection timeout".into());
                }
            };
            store.ensure_schema().await?;

            info!(
                latency_ms = connect_start.elapsed().as_millis() as u64,
                "PostgreSQL connection established"
            );
            serve(store, &config).await?;
        }
    }

    info!("Variable Dependency Service shutdown complete");

    Ok(())
}
