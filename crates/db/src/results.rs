//! Append-only result rows: a kind discriminant plus the typed record
//! serialized as JSONB. Adapters append while the scan runs; the read
//! path groups rows by kind for the per-domain results envelope.

use argus_domain::results::{ResultKind, ResultRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::Database;

#[derive(Debug, Clone, Serialize)]
pub struct StoredResult {
    pub id: i64,
    pub scan_id: Uuid,
    pub kind: ResultKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Persist one typed record under its compile-time kind.
    pub async fn append_result<R: ResultRecord>(
        &self,
        scan_id: Uuid,
        record: &R,
    ) -> Result<(), sqlx::Error> {
        let payload = serde_json::to_value(record)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query("INSERT INTO scan_results (scan_id, kind, payload) VALUES ($1, $2, $3)")
            .bind(scan_id)
            .bind(R::KIND.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All results for a scan in append order.
    pub async fn list_results(&self, scan_id: Uuid) -> Result<Vec<StoredResult>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, scan_id, kind, payload, created_at
             FROM scan_results
             WHERE scan_id = $1
             ORDER BY id ASC",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind_str: String = row.try_get("kind")?;
                Ok(StoredResult {
                    id: row.try_get("id")?,
                    scan_id: row.try_get("scan_id")?,
                    kind: ResultKind::parse(&kind_str).ok_or_else(|| {
                        sqlx::Error::Decode(format!("unknown result kind '{kind_str}'").into())
                    })?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn count_results(
        &self,
        scan_id: Uuid,
        kind: Option<ResultKind>,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM scan_results
             WHERE scan_id = $1 AND ($2::text IS NULL OR kind = $2)",
        )
        .bind(scan_id)
        .bind(kind.map(|k| k.as_str()))
        .fetch_one(&self.pool)
        .await?;
        row.try_get("n")
    }

    /// Pipeline gate query: did any fingerprinting phase of this scan
    /// identify the given CMS?
    pub async fn has_cms_identification(
        &self,
        scan_id: Uuid,
        cms_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT EXISTS (
                 SELECT 1 FROM scan_results
                 WHERE scan_id = $1
                   AND kind = 'cms_identification'
                   AND payload->>'cms_name' ILIKE $2
             ) AS found",
        )
        .bind(scan_id)
        .bind(cms_name)
        .fetch_one(&self.pool)
        .await?;
        row.try_get("found")
    }
}
