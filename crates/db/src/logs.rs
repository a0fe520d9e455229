//! Append-only scan logs, polled by clients in real time.

use argus_domain::scan::{LogEntry, LogLevel};
use sqlx::Row;
use uuid::Uuid;

use crate::Database;

impl Database {
    pub async fn append_log(
        &self,
        scan_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO scan_logs (scan_id, level, message) VALUES ($1, $2, $3)")
            .bind(scan_id)
            .bind(level.as_str())
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Ascending by creation — the order the scan produced them.
    pub async fn list_logs(&self, scan_id: Uuid) -> Result<Vec<LogEntry>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, scan_id, level, message, created_at
             FROM scan_logs
             WHERE scan_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let level_str: String = row.try_get("level")?;
                Ok(LogEntry {
                    id: row.try_get("id")?,
                    scan_id: row.try_get("scan_id")?,
                    level: LogLevel::parse(&level_str).unwrap_or(LogLevel::Info),
                    message: row.try_get("message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
