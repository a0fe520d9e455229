//! Scan row CRUD and the state-machine writes.
//!
//! Ownership: handlers insert and delete; the scan manager owns status,
//! progress, and timestamp writes. Every status write is conditional so
//! racing writers converge on whichever terminal state landed first.

use argus_domain::scan::{Scan, ScanStatus};
use argus_domain::service::Service;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::Database;

/// Optional filters for scan listing; all conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub status: Option<ScanStatus>,
    pub scanner: Option<String>,
    pub scan_type: Option<String>,
}

fn scan_from_row(row: &PgRow) -> Result<Scan, sqlx::Error> {
    let service_str: String = row.try_get("service")?;
    let status_str: String = row.try_get("status")?;
    Ok(Scan {
        id: row.try_get("id")?,
        service: Service::parse(&service_str)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown service '{service_str}'").into()))?,
        name: row.try_get("name")?,
        target: row.try_get("target")?,
        scan_type: row.try_get("scan_type")?,
        scanner: row.try_get("scanner")?,
        status: ScanStatus::parse(&status_str)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown status '{status_str}'").into()))?,
        progress: row.try_get("progress")?,
        configuration: row.try_get("configuration")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

impl Database {
    /// Insert a freshly-built scan row (status `pending`, progress 0).
    pub async fn create_scan(&self, scan: &Scan) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO scans
               (id, service, name, target, scan_type, scanner, status,
                progress, configuration, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(scan.id)
        .bind(scan.service.as_str())
        .bind(&scan.name)
        .bind(&scan.target)
        .bind(&scan.scan_type)
        .bind(&scan.scanner)
        .bind(scan.status.as_str())
        .bind(scan.progress)
        .bind(&scan.configuration)
        .bind(scan.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM scans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(scan_from_row).transpose()
    }

    /// Newest-first listing for the polling UI, capped at 100 rows.
    pub async fn list_scans(
        &self,
        service: Service,
        filter: &ScanFilter,
    ) -> Result<Vec<Scan>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM scans
             WHERE service = $1
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR scanner = $3)
               AND ($4::text IS NULL OR scan_type = $4)
             ORDER BY created_at DESC
             LIMIT 100",
        )
        .bind(service.as_str())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.scanner.as_deref())
        .bind(filter.scan_type.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(scan_from_row).collect()
    }

    /// Delete a scan; results and logs cascade. Returns true if a row
    /// was removed.
    pub async fn delete_scan(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM scans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `pending → running`. Sets `started_at` exactly once. Returns
    /// false if the scan was no longer pending (e.g. cancelled while
    /// queued).
    pub async fn mark_running(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scans
             SET status = 'running',
                 started_at = COALESCE(started_at, now())
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Progress tick. Monotone by construction and a no-op once the
    /// scan has left `running`.
    pub async fn update_progress(&self, id: Uuid, progress: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scans
             SET progress = GREATEST(progress, $2)
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(progress.clamp(0, 100))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal transition. Progress snaps to 100 for `completed` and
    /// `failed`; `cancelled` keeps the progress reached so far. The
    /// conditional `WHERE` makes terminal states absorbing: a late
    /// writer that lost the race updates zero rows. Returns whether
    /// this call performed the write.
    pub async fn finish_scan(
        &self,
        id: Uuid,
        status: ScanStatus,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        debug_assert!(status.is_terminal());
        let result = sqlx::query(
            "UPDATE scans
             SET status = $2,
                 progress = CASE WHEN $2 IN ('completed', 'failed')
                                 THEN 100 ELSE progress END,
                 error_message = $3,
                 completed_at = now()
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
