//! Scan lifecycle endpoints.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use argus_db::{ScanFilter, StoredResult};
use argus_domain::scan::{Scan, ScanStatus};
use argus_domain::service::Service;
use argus_domain::target;

use crate::scanners::default_scanner;
use crate::state::AppState;
use crate::templates::resolve_config;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn db_error(e: impl std::fmt::Display) -> Response {
    tracing::error!(error = %e, "database error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("database: {e}"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/<domain>/
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    pub name: String,
    pub target: String,
    pub scan_type: String,
    #[serde(default)]
    pub scanner: Option<String>,
    /// Accepted as `config` or `configuration`.
    #[serde(default, alias = "configuration")]
    pub config: Option<serde_json::Value>,
}

pub async fn create_scan(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Json(body): Json<CreateScanRequest>,
) -> Response {
    let name = body.name.trim();
    let raw_target = body.target.trim();
    if name.is_empty() || raw_target.is_empty() || body.scan_type.is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "name, target and scan_type are required",
        );
    }
    if !service.accepts(&body.scan_type) {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!(
                "unknown scan_type '{}' for service '{service}' (expected one of: {})",
                body.scan_type,
                service.scan_types().join(", ")
            ),
        );
    }

    // Host-oriented tools get URL targets reduced to the host; the rest
    // receive the target verbatim.
    let normalized = if service.host_oriented(&body.scan_type) {
        target::normalize_host(raw_target)
    } else {
        target::normalize_verbatim(raw_target)
    };

    let configuration =
        resolve_config(&state.db, service, &body.scan_type, body.config).await;
    let scanner = body
        .scanner
        .unwrap_or_else(|| default_scanner(service, &body.scan_type).to_owned());

    let scan = Scan::new(service, name, normalized, &body.scan_type, scanner, configuration);

    if let Err(e) = state.db.create_scan(&scan).await {
        return db_error(e);
    }

    if let Err(e) = state.manager.start(scan.clone()) {
        tracing::error!(scan_id = %scan.id, error = %e, "failed to start scan task");
        let _ = state
            .db
            .finish_scan(scan.id, ScanStatus::Failed, Some(&e.to_string()))
            .await;
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (StatusCode::CREATED, Json(serde_json::json!(scan))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListScansQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scanner: Option<String>,
    #[serde(default, rename = "type")]
    pub scan_type: Option<String>,
}

pub async fn list_scans(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Query(q): Query<ListScansQuery>,
) -> Response {
    let status = match q.status.as_deref() {
        Some(raw) => match ScanStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    format!("unknown status filter '{raw}'"),
                )
            }
        },
        None => None,
    };

    let filter = ScanFilter {
        status,
        scanner: q.scanner,
        scan_type: q.scan_type,
    };

    match state.db.list_scans(service, &filter).await {
        Ok(scans) => Json(serde_json::json!(scans)).into_response(),
        Err(e) => db_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn load_scan(state: &AppState, service: Service, id: Uuid) -> Result<Scan, Response> {
    match state.db.get_scan(id).await {
        Ok(Some(scan)) if scan.service == service => Ok(scan),
        Ok(_) => Err(api_error(StatusCode::NOT_FOUND, "scan not found")),
        Err(e) => Err(db_error(e)),
    }
}

pub async fn get_scan(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    match load_scan(&state, service, id).await {
        Ok(scan) => Json(serde_json::json!(scan)).into_response(),
        Err(response) => response,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/:id/results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn group_by_kind(results: Vec<StoredResult>) -> BTreeMap<&'static str, Vec<serde_json::Value>> {
    let mut grouped: BTreeMap<&'static str, Vec<serde_json::Value>> = BTreeMap::new();
    for result in results {
        grouped.entry(result.kind.as_str()).or_default().push(result.payload);
    }
    grouped
}

pub async fn get_results(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    let scan = match load_scan(&state, service, id).await {
        Ok(scan) => scan,
        Err(response) => return response,
    };

    match state.db.list_results(id).await {
        Ok(results) => {
            let total = results.len();
            Json(serde_json::json!({
                "scan_id": scan.id,
                "status": scan.status,
                "total": total,
                "results": group_by_kind(results),
            }))
            .into_response()
        }
        Err(e) => db_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/:id/logs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_logs(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(response) = load_scan(&state, service, id).await {
        return response;
    }
    match state.db.list_logs(id).await {
        Ok(logs) => Json(serde_json::json!(logs)).into_response(),
        Err(e) => db_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/:id/stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Aggregates for the results view: totals per kind, per severity, and
/// per HTTP status code. Severity strings are counted as stored, so the
/// lower-case vulnerability severities and upper-case finding
/// severities stay distinct.
pub fn compute_stats(results: &[StoredResult]) -> serde_json::Value {
    let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_status_code: BTreeMap<String, usize> = BTreeMap::new();

    for result in results {
        *by_kind.entry(result.kind.as_str()).or_default() += 1;

        if let Some(severity) = result.payload.get("severity").and_then(|v| v.as_str()) {
            *by_severity.entry(severity.to_owned()).or_default() += 1;
        }
        if let Some(code) = result.payload.get("status_code").and_then(|v| v.as_u64()) {
            *by_status_code.entry(code.to_string()).or_default() += 1;
        }
    }

    serde_json::json!({
        "total": results.len(),
        "by_kind": by_kind,
        "by_severity": by_severity,
        "by_status_code": by_status_code,
    })
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    let scan = match load_scan(&state, service, id).await {
        Ok(scan) => scan,
        Err(response) => return response,
    };

    match state.db.list_results(id).await {
        Ok(results) => {
            let mut stats = compute_stats(&results);
            stats["scan_id"] = serde_json::json!(scan.id);
            stats["status"] = serde_json::json!(scan.status);
            Json(stats).into_response()
        }
        Err(e) => db_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/<domain>/:id/cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel_scan(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    let scan = match load_scan(&state, service, id).await {
        Ok(scan) => scan,
        Err(response) => return response,
    };

    if scan.status.is_terminal() {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("scan is already {}", scan.status.as_str()),
        );
    }

    // Two parallel paths converge on the same terminal row: the manager
    // task observes the token, and this handler writes `cancelled`
    // directly. The conditional update makes whichever lands second a
    // no-op.
    let signalled = state.manager.cancel(id);
    if let Err(e) = state.db.finish_scan(id, ScanStatus::Cancelled, None).await {
        return db_error(e);
    }

    Json(serde_json::json!({
        "scan_id": id,
        "status": "cancelled",
        "task_signalled": signalled,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /api/<domain>/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_scan(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
    Path(id): Path<Uuid>,
) -> Response {
    let scan = match load_scan(&state, service, id).await {
        Ok(scan) => scan,
        Err(response) => return response,
    };

    if !scan.status.is_terminal() {
        state.manager.cancel(id);
        if let Err(e) = state.db.finish_scan(id, ScanStatus::Cancelled, None).await {
            return db_error(e);
        }
    }

    match state.db.delete_scan(id).await {
        Ok(true) => Json(serde_json::json!({ "deleted": true })).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "scan not found"),
        Err(e) => db_error(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/<domain>/tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn available_tools(
    State(state): State<AppState>,
    Extension(service): Extension<Service>,
) -> Response {
    Json(serde_json::json!({
        "service": service,
        "tools": state.manager.available_tools_for(service),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_domain::results::ResultKind;
    use chrono::Utc;

    fn stored(kind: ResultKind, payload: serde_json::Value) -> StoredResult {
        StoredResult {
            id: 1,
            scan_id: Uuid::new_v4(),
            kind,
            payload,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stats_count_kinds_severities_and_codes() {
        let results = vec![
            stored(
                ResultKind::Vulnerability,
                serde_json::json!({ "severity": "high" }),
            ),
            stored(
                ResultKind::Vulnerability,
                serde_json::json!({ "severity": "high" }),
            ),
            stored(
                ResultKind::CloudFinding,
                serde_json::json!({ "severity": "HIGH" }),
            ),
            stored(
                ResultKind::FuzzHit,
                serde_json::json!({ "status_code": 200 }),
            ),
            stored(
                ResultKind::FuzzHit,
                serde_json::json!({ "status_code": 403 }),
            ),
        ];

        let stats = compute_stats(&results);
        assert_eq!(stats["total"], 5);
        assert_eq!(stats["by_kind"]["vulnerability"], 2);
        assert_eq!(stats["by_kind"]["fuzz_hit"], 2);
        // Case distinction is preserved in the aggregates.
        assert_eq!(stats["by_severity"]["high"], 2);
        assert_eq!(stats["by_severity"]["HIGH"], 1);
        assert_eq!(stats["by_status_code"]["200"], 1);
        assert_eq!(stats["by_status_code"]["403"], 1);
    }

    #[test]
    fn stats_on_empty_results() {
        let stats = compute_stats(&[]);
        assert_eq!(stats["total"], 0);
        assert!(stats["by_severity"].as_object().unwrap().is_empty());
    }

    #[test]
    fn group_by_kind_buckets_payloads() {
        let results = vec![
            stored(ResultKind::Port, serde_json::json!({ "port": 22 })),
            stored(ResultKind::Port, serde_json::json!({ "port": 80 })),
            stored(
                ResultKind::DnsRecord,
                serde_json::json!({ "record_type": "A" }),
            ),
        ];
        let grouped = group_by_kind(results);
        assert_eq!(grouped["port"].len(), 2);
        assert_eq!(grouped["dns_record"].len(), 1);
    }
}
