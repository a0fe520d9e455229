//! The scan manager: binds each scan id to a cancellable supervised
//! task and routes it to an adapter or pipeline.
//!
//! The manager exclusively owns writes to status, progress, and the
//! lifecycle timestamps. Every task exit path — clean return, adapter
//! error, observed cancellation, deadline, even a panic inside an
//! adapter — removes the registry entry and lands on a terminal row.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use argus_db::Database;
use argus_domain::scan::{LogLevel, Scan, ScanStatus};
use argus_domain::service::Service;
use futures_util::FutureExt;
use uuid::Uuid;

use crate::adapter::ToolAdapter;
use crate::cancel::{CancelToken, ScanRegistry};
use crate::context::ScanContext;
use crate::error::ScanError;
use crate::pipeline::Pipeline;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a `(service, scan_type)` pair dispatches to.
#[derive(Clone)]
pub enum Routine {
    Single(Arc<dyn ToolAdapter>),
    Pipeline(Pipeline),
}

impl Routine {
    fn adapters(&self) -> Vec<Arc<dyn ToolAdapter>> {
        match self {
            Routine::Single(adapter) => vec![adapter.clone()],
            Routine::Pipeline(pipeline) => {
                pipeline.phases.iter().map(|p| p.adapter.clone()).collect()
            }
        }
    }
}

/// Static routing table built once at startup.
#[derive(Default)]
pub struct RoutingTable {
    routes: HashMap<Service, HashMap<&'static str, Routine>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, service: Service, scan_type: &'static str, routine: Routine) {
        debug_assert!(service.accepts(scan_type));
        self.routes.entry(service).or_default().insert(scan_type, routine);
    }

    pub fn get(&self, service: Service, scan_type: &str) -> Option<&Routine> {
        self.routes.get(&service)?.get(scan_type)
    }

    /// Every adapter reachable through the table, deduplicated by name.
    pub fn adapters(&self) -> Vec<Arc<dyn ToolAdapter>> {
        let mut seen: BTreeMap<&'static str, Arc<dyn ToolAdapter>> = BTreeMap::new();
        for by_type in self.routes.values() {
            for routine in by_type.values() {
                for adapter in routine.adapters() {
                    seen.entry(adapter.name()).or_insert(adapter);
                }
            }
        }
        seen.into_values().collect()
    }

    /// Adapters reachable from one service's routes, deduplicated.
    pub fn service_adapters(&self, service: Service) -> Vec<Arc<dyn ToolAdapter>> {
        let mut seen: BTreeMap<&'static str, Arc<dyn ToolAdapter>> = BTreeMap::new();
        if let Some(by_type) = self.routes.get(&service) {
            for routine in by_type.values() {
                for adapter in routine.adapters() {
                    seen.entry(adapter.name()).or_insert(adapter);
                }
            }
        }
        seen.into_values().collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum StartError {
    /// At-most-one active task per id; a second `start` is a caller bug.
    #[error("scan {0} already has an active task")]
    AlreadyRunning(Uuid),

    #[error("no route for service '{service}' scan type '{scan_type}'")]
    NoRoute { service: String, scan_type: String },
}

#[derive(Clone)]
pub struct ScanManager {
    inner: Arc<Inner>,
}

struct Inner {
    db: Database,
    registry: ScanRegistry,
    routes: RoutingTable,
    default_timeout: Duration,
}

impl ScanManager {
    pub fn new(db: Database, routes: RoutingTable, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                registry: ScanRegistry::new(),
                routes,
                default_timeout,
            }),
        }
    }

    /// Register a cancellation handle and spawn the supervised task for
    /// a freshly-inserted `pending` scan. Returns immediately.
    pub fn start(&self, scan: Scan) -> Result<(), StartError> {
        let routine = self
            .inner
            .routes
            .get(scan.service, &scan.scan_type)
            .cloned()
            .ok_or_else(|| StartError::NoRoute {
                service: scan.service.to_string(),
                scan_type: scan.scan_type.clone(),
            })?;

        let token = self
            .inner
            .registry
            .register(scan.id)
            .ok_or(StartError::AlreadyRunning(scan.id))?;

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_supervised(inner, scan, routine, token).await;
        });

        Ok(())
    }

    /// Cooperative cancellation. Signals the task and returns; the task
    /// observes the token and writes the terminal status itself.
    pub fn cancel(&self, scan_id: Uuid) -> bool {
        self.inner.registry.cancel(scan_id)
    }

    /// Non-authoritative presence check against the in-memory registry.
    pub fn is_running(&self, scan_id: Uuid) -> bool {
        self.inner.registry.is_running(scan_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry.active_count()
    }

    /// Probe each adapter's reachability at call time.
    pub fn available_tools(&self) -> BTreeMap<String, bool> {
        self.inner
            .routes
            .adapters()
            .into_iter()
            .map(|adapter| (adapter.name().to_owned(), adapter.available()))
            .collect()
    }

    /// Reachability of the adapters one service routes to.
    pub fn available_tools_for(&self, service: Service) -> BTreeMap<String, bool> {
        self.inner
            .routes
            .service_adapters(service)
            .into_iter()
            .map(|adapter| (adapter.name().to_owned(), adapter.available()))
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervised task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_supervised(inner: Arc<Inner>, scan: Scan, routine: Routine, token: CancelToken) {
    let scan_id = scan.id;

    // pending → running. A false return means the row already left
    // `pending` (cancelled while queued, or reconciled) — nothing to do.
    match inner.db.mark_running(scan_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(%scan_id, "scan no longer pending, not starting");
            inner.registry.remove(scan_id);
            return;
        }
        Err(e) => {
            tracing::error!(%scan_id, error = %e, "failed to mark scan running");
            let _ = inner
                .db
                .finish_scan(scan_id, ScanStatus::Failed, Some(&format!("database: {e}")))
                .await;
            inner.registry.remove(scan_id);
            return;
        }
    }

    let timeout = timeout_from_config(&scan.configuration, inner.default_timeout);
    let ctx = ScanContext::new(inner.db.clone(), scan_id, token.clone(), timeout);

    ctx.log(
        LogLevel::Info,
        format!(
            "scan '{}' started: {} {} against {}",
            scan.name, scan.service, scan.scan_type, scan.target
        ),
    )
    .await;

    // A panic inside an adapter becomes a `failed` row, not a wedged
    // registry entry.
    let outcome = std::panic::AssertUnwindSafe(run_routine(&routine, &ctx, &scan))
        .catch_unwind()
        .await;

    let (status, error_message) = match outcome {
        Ok(Ok(())) => {
            if token.is_cancelled() {
                (ScanStatus::Cancelled, None)
            } else {
                (ScanStatus::Completed, None)
            }
        }
        Ok(Err(ScanError::Cancelled)) => (ScanStatus::Cancelled, None),
        Ok(Err(e)) => (ScanStatus::Failed, Some(e.to_string())),
        Err(panic) => (ScanStatus::Failed, Some(panic_message(panic))),
    };

    match status {
        ScanStatus::Completed => {
            ctx.log(LogLevel::Success, "scan completed").await;
        }
        ScanStatus::Cancelled => {
            ctx.log(LogLevel::Warning, "scan cancelled").await;
        }
        _ => {
            let reason = error_message.as_deref().unwrap_or("unknown error");
            ctx.log(LogLevel::Error, format!("scan failed: {reason}")).await;
        }
    }

    // Idempotent terminal write: if the cancel handler already landed a
    // terminal row, this updates nothing and that is correct.
    match inner
        .db
        .finish_scan(scan_id, status, error_message.as_deref())
        .await
    {
        Ok(wrote) => {
            tracing::info!(%scan_id, status = status.as_str(), wrote, "scan finished");
        }
        Err(e) => {
            tracing::error!(%scan_id, error = %e, "terminal status write failed");
        }
    }

    inner.registry.remove(scan_id);
}

async fn run_routine(
    routine: &Routine,
    ctx: &ScanContext,
    scan: &Scan,
) -> Result<(), ScanError> {
    match routine {
        Routine::Single(adapter) => adapter.scan(ctx, scan).await,
        Routine::Pipeline(pipeline) => pipeline.run(ctx, scan).await,
    }
}

/// Scan deadline: `configuration.timeout` in seconds, else the
/// service-wide default.
pub fn timeout_from_config(config: &serde_json::Value, default: Duration) -> Duration {
    config
        .get("timeout")
        .and_then(|v| v.as_u64())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("adapter panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("adapter panicked: {message}")
    } else {
        "adapter panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanResult;
    use async_trait::async_trait;

    struct NoopAdapter(&'static str);

    #[async_trait]
    impl ToolAdapter for NoopAdapter {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn scan(&self, _ctx: &ScanContext, _scan: &Scan) -> ScanResult<()> {
            Ok(())
        }
    }

    #[test]
    fn routing_table_lookup() {
        let mut table = RoutingTable::new();
        table.add(
            Service::Network,
            "masscan_quick",
            Routine::Single(Arc::new(NoopAdapter("masscan"))),
        );

        assert!(table.get(Service::Network, "masscan_quick").is_some());
        assert!(table.get(Service::Network, "nmap").is_none());
        assert!(table.get(Service::Cms, "masscan_quick").is_none());
    }

    #[test]
    fn adapters_deduplicate_by_name() {
        let shared: Arc<dyn ToolAdapter> = Arc::new(NoopAdapter("nmap"));
        let mut table = RoutingTable::new();
        table.add(Service::Network, "nmap", Routine::Single(shared.clone()));
        table.add(
            Service::Network,
            "full",
            Routine::Pipeline(Pipeline::new(vec![crate::pipeline::Phase::new(
                "nmap",
                shared,
                (0, 100),
            )])),
        );

        assert_eq!(table.adapters().len(), 1);
    }

    #[test]
    fn timeout_prefers_config_value() {
        let config = serde_json::json!({ "timeout": 120 });
        assert_eq!(
            timeout_from_config(&config, Duration::from_secs(600)),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn timeout_falls_back_on_missing_or_zero() {
        let default = Duration::from_secs(600);
        assert_eq!(timeout_from_config(&serde_json::json!({}), default), default);
        assert_eq!(
            timeout_from_config(&serde_json::json!({ "timeout": 0 }), default),
            default
        );
        assert_eq!(
            timeout_from_config(&serde_json::json!({ "timeout": "soon" }), default),
            default
        );
    }

    #[test]
    fn panic_message_extracts_payloads() {
        let from_str = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(from_str), "adapter panicked: boom");

        let from_string =
            std::panic::catch_unwind(|| panic!("{}", String::from("dynamic"))).unwrap_err();
        assert_eq!(panic_message(from_string), "adapter panicked: dynamic");
    }
}
