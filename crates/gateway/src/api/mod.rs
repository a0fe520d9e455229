//! REST surface. Each served domain mounts the same route set at
//! `/api/<domain>/…`:
//!
//! - `POST   /`                   — create a scan (starts it)
//! - `GET    /`                   — list scans (status/scanner/type filters)
//! - `GET    /:id`                — single scan
//! - `GET    /:id/results`        — typed results envelope
//! - `GET    /:id/logs`           — log entries, ascending
//! - `GET    /:id/stats`          — aggregates
//! - `POST   /:id/cancel`         — cooperative cancellation
//! - `DELETE /:id`                — cancel if running, then delete
//! - `GET    /tools`              — adapter availability probe
//! - `GET    /templates`          — user template CRUD + builtins

pub mod scans;
pub mod templates;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use axum::{Extension, Router};

use argus_domain::service::Service;

use crate::state::AppState;

/// Build the full API router over the served domains.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new().route("/healthz", get(healthz));
    for service in state.services.iter().copied() {
        app = app.nest(&format!("/api/{service}"), service_router(service));
    }
    app.with_state(state)
}

fn service_router(service: Service) -> Router<AppState> {
    Router::new()
        .route("/", post(scans::create_scan).get(scans::list_scans))
        .route("/tools", get(scans::available_tools))
        .route(
            "/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route("/templates/builtin", get(templates::builtin_templates))
        .route(
            "/templates/:id",
            put(templates::update_template).delete(templates::delete_template),
        )
        .route("/:id", get(scans::get_scan).delete(scans::delete_scan))
        .route("/:id/results", get(scans::get_results))
        .route("/:id/logs", get(scans::get_logs))
        .route("/:id/stats", get(scans::get_stats))
        .route("/:id/cancel", post(scans::cancel_scan))
        .layer(Extension(service))
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "services": state.services.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "active_scans": state.manager.active_count(),
    }))
}
