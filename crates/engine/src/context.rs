//! Per-scan execution context handed down the adapter call chain.
//!
//! Carries the cancellation token, the scan deadline, the database
//! handle, and a progress band. Pipeline phases run with `sub_band`
//! contexts so each phase reports 0–100 locally and the gauge still
//! moves through its assigned slice of the scan.
//!
//! Log and progress writes are best-effort — a scan is not failed over a
//! dropped log line. Result appends are fatal on persistence errors and
//! propagate via `?`.

use std::time::Duration;

use argus_db::Database;
use argus_domain::results::ResultRecord;
use argus_domain::scan::LogLevel;
use tokio::time::Instant;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{ScanError, ScanResult};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Progress bands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A `[low, high]` slice of the 0–100 progress gauge. Bands compose:
/// narrowing a band yields a band inside the parent's slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    low: u8,
    high: u8,
}

impl Band {
    pub const FULL: Band = Band { low: 0, high: 100 };

    /// Map a local 0–100 value into this band.
    pub fn map(self, local: u8) -> u8 {
        let local = u32::from(local.min(100));
        let span = u32::from(self.high - self.low);
        self.low + (span * local / 100) as u8
    }

    /// The band covering `[low, high]` of this band's own range.
    pub fn narrow(self, low: u8, high: u8) -> Band {
        debug_assert!(low <= high && high <= 100);
        Band {
            low: self.map(low),
            high: self.map(high),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scan context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct ScanContext {
    db: Database,
    scan_id: Uuid,
    cancel: CancelToken,
    deadline: Instant,
    timeout_secs: u64,
    band: Band,
}

impl ScanContext {
    pub fn new(db: Database, scan_id: Uuid, cancel: CancelToken, timeout: Duration) -> Self {
        Self {
            db,
            scan_id,
            cancel,
            deadline: Instant::now() + timeout,
            timeout_secs: timeout.as_secs(),
            band: Band::FULL,
        }
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// A child context reporting into `[low, high]` of this context's
    /// own band.
    pub fn sub_band(&self, low: u8, high: u8) -> Self {
        let mut child = self.clone();
        child.band = self.band.narrow(low, high);
        child
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Time remaining before the scan deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Cooperative cancellation / deadline checkpoint. Adapters call
    /// this between streamed output lines and around DB boundaries.
    pub fn checkpoint(&self) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ScanError::TimedOut(self.timeout_secs));
        }
        Ok(())
    }

    /// Append a log row. Best-effort: failures are traced, not fatal.
    pub async fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        if let Err(e) = self.db.append_log(self.scan_id, level, message).await {
            tracing::warn!(scan_id = %self.scan_id, error = %e, "log append failed");
        }
    }

    /// Update the progress gauge, mapped through the band. Monotonicity
    /// is enforced by the store; a stale lower value never wins.
    pub async fn progress(&self, local: u8) {
        let mapped = self.band.map(local);
        if let Err(e) = self
            .db
            .update_progress(self.scan_id, i32::from(mapped))
            .await
        {
            tracing::warn!(scan_id = %self.scan_id, error = %e, "progress update failed");
        }
    }

    /// Persist a typed result record. Persistence errors are fatal for
    /// the scan.
    pub async fn append<R: ResultRecord>(&self, record: &R) -> ScanResult<()> {
        self.checkpoint()?;
        self.db.append_result(self.scan_id, record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_band_is_identity() {
        assert_eq!(Band::FULL.map(0), 0);
        assert_eq!(Band::FULL.map(50), 50);
        assert_eq!(Band::FULL.map(100), 100);
    }

    #[test]
    fn band_maps_into_slice() {
        let band = Band::FULL.narrow(20, 40);
        assert_eq!(band.map(0), 20);
        assert_eq!(band.map(50), 30);
        assert_eq!(band.map(100), 40);
    }

    #[test]
    fn bands_compose() {
        let phase = Band::FULL.narrow(40, 80);
        let inner = phase.narrow(0, 50);
        assert_eq!(inner.map(0), 40);
        assert_eq!(inner.map(100), 60);
    }

    #[test]
    fn band_progress_is_monotone_in_local_value() {
        let band = Band::FULL.narrow(55, 70);
        let mut last = 0;
        for local in 0..=100 {
            let mapped = band.map(local);
            assert!(mapped >= last);
            last = mapped;
        }
        assert_eq!(band.map(0), 55);
        assert_eq!(band.map(100), 70);
    }

    #[test]
    fn overflow_local_values_clamp() {
        assert_eq!(Band::FULL.map(200), 100);
        let band = Band::FULL.narrow(0, 20);
        assert_eq!(band.map(255), 20);
    }

    #[test]
    fn cancel_checkpoint_flows_through_token() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
