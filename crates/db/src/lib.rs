//! Persistence layer — typed access over a shared Postgres pool.
//!
//! The store exposes only high-level operations; SQL never leaks past
//! this crate. State-machine invariants are enforced here with
//! conditional updates:
//!
//! - terminal statuses are absorbing (`WHERE status IN ('pending','running')`)
//! - progress is monotone (`SET progress = GREATEST(progress, $n)`)
//! - `started_at` is written once (`COALESCE(started_at, now())`)
//!
//! Startup performs connection with exponential backoff and idempotent
//! schema creation, then reconciles rows orphaned by a crash.

pub mod logs;
pub mod results;
pub mod scans;
pub mod templates;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use logs::*;
pub use results::*;
pub use scans::*;
pub use templates::*;

/// Shared handle over the connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Schema
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scans (
    id            UUID PRIMARY KEY,
    service       TEXT NOT NULL,
    name          TEXT NOT NULL,
    target        TEXT NOT NULL,
    scan_type     TEXT NOT NULL,
    scanner       TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    progress      INTEGER NOT NULL DEFAULT 0,
    configuration JSONB NOT NULL DEFAULT '{}'::jsonb,
    error_message TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    started_at    TIMESTAMPTZ,
    completed_at  TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS scan_results (
    id         BIGSERIAL PRIMARY KEY,
    scan_id    UUID NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    payload    JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS scan_logs (
    id         BIGSERIAL PRIMARY KEY,
    scan_id    UUID NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    level      TEXT NOT NULL,
    message    TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS templates (
    id          UUID PRIMARY KEY,
    service     TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    scan_type   TEXT NOT NULL,
    arguments   JSONB NOT NULL DEFAULT '{}'::jsonb,
    is_default  BOOLEAN NOT NULL DEFAULT false,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);
CREATE INDEX IF NOT EXISTS idx_scans_created_at ON scans(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_scan_results_scan_id ON scan_results(scan_id);
CREATE INDEX IF NOT EXISTS idx_scan_logs_scan_id ON scan_logs(scan_id);
CREATE INDEX IF NOT EXISTS idx_templates_service ON templates(service);
"#;

impl Database {
    /// Connect with exponential backoff: 1 s initial, doubled per
    /// attempt, capped at 30 s, up to `retries` attempts.
    pub async fn connect_with_backoff(url: &str, max_connections: u32, retries: u32) -> Result<Self, sqlx::Error> {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
            {
                Ok(pool) => {
                    tracing::info!(attempt, "database connected");
                    return Ok(Self { pool });
                }
                Err(e) if attempt < retries => {
                    tracing::warn!(
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "database connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Idempotent schema creation. Safe to run on every startup.
    pub async fn bootstrap(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("database schema ready");
        Ok(())
    }

    /// Mark rows left in a non-terminal state by a previous process as
    /// failed. Running scans do not survive a restart; their tasks are
    /// gone, so the rows are stale by definition.
    pub async fn reconcile_stale(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scans
             SET status = 'failed',
                 error_message = 'service restarted',
                 completed_at = now()
             WHERE status IN ('pending', 'running')",
        )
        .execute(&self.pool)
        .await?;

        let stale = result.rows_affected();
        if stale > 0 {
            tracing::warn!(stale, "reconciled stale scans from previous run");
        }
        Ok(stale)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
