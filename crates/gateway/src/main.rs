use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use argus_db::Database;
use argus_domain::config::Config;
use argus_domain::service::Service;
use argus_engine::ScanManager;
use argus_gateway::api;
use argus_gateway::scanners::build_routing_table;
use argus_gateway::state::AppState;

#[derive(Parser)]
#[command(name = "argus", about = "Multi-domain security scanning platform")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the REST gateway (default).
    Serve {
        /// Serve only these domains (repeatable). Default: all.
        #[arg(long = "service")]
        services: Vec<String>,
        /// Config file path; falls back to $ARGUS_CONFIG, then ./argus.toml.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            init_tracing();
            run_server(Vec::new(), None).await
        }
        Some(Command::Serve { services, config }) => {
            init_tracing();
            run_server(services, config).await
        }
        Some(Command::Version) => {
            println!("argus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the serve command.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,argus_gateway=debug")),
        )
        .json()
        .init();
}

fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os("ARGUS_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("argus.toml"))
}

fn parse_services(raw: &[String]) -> anyhow::Result<Vec<Service>> {
    if raw.is_empty() {
        return Ok(Service::ALL.to_vec());
    }
    raw.iter()
        .map(|name| {
            Service::parse(name)
                .ok_or_else(|| anyhow::anyhow!("unknown service '{name}'"))
        })
        .collect()
}

async fn run_server(service_names: Vec<String>, config_file: Option<PathBuf>) -> anyhow::Result<()> {
    tracing::info!("argus starting");

    // ── Config ──────────────────────────────────────────────────────
    let path = config_path(config_file);
    let config = Arc::new(Config::load(&path).with_context(|| format!("loading {}", path.display()))?);
    let services = parse_services(&service_names)?;
    tracing::info!(
        config = %path.display(),
        services = ?services.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "configuration loaded"
    );

    // ── Database (backoff connect, idempotent schema) ───────────────
    let url = config.database_url().context("resolving database URL")?;
    let db = Database::connect_with_backoff(
        &url,
        config.database.max_connections,
        config.database.connect_retries,
    )
    .await
    .context("connecting to database")?;
    db.bootstrap().await.context("bootstrapping schema")?;

    // Rows left running by a previous process are stale: their tasks
    // died with it.
    db.reconcile_stale().await.context("reconciling stale scans")?;

    // ── Scan manager ────────────────────────────────────────────────
    let routes = build_routing_table(&config.tools, &services);
    let manager = ScanManager::new(
        db.clone(),
        routes,
        Duration::from_secs(config.tools.default_timeout_secs),
    );
    for (tool, available) in manager.available_tools() {
        if available {
            tracing::info!(tool, "tool available");
        } else {
            tracing::warn!(tool, "tool binary not found, scans using it will fail");
        }
    }

    // ── Router ──────────────────────────────────────────────────────
    let state = AppState {
        config: config.clone(),
        db,
        manager,
        services: Arc::new(services),
    };

    let app = api::router(state)
        .layer(build_cors_layer(&config.server.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    // ── Bind ────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "argus listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// CORS for the polling UI. `["*"]` allows any origin (development
/// default); otherwise only the listed origins are accepted.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(tower_http::cors::Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
