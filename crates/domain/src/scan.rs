//! The scan record and its status state machine.
//!
//! A `Scan` is one user-requested execution of one or more tools against
//! one target. The status DAG is:
//!
//! ```text
//! pending ──▶ running ──▶ completed
//!    │           ├──────▶ failed
//!    └───────────┴──────▶ cancelled
//! ```
//!
//! Terminal states are absorbing — the persistence layer enforces this
//! with conditional updates, callers must not assume a write landed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::service::Service;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scan status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Cancelled) => true,
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Cancelled) => true,
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scan record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub service: Service,
    pub name: String,
    pub target: String,
    pub scan_type: String,
    /// Tool discriminant (e.g. "masscan", "nmap"); equals `scan_type`
    /// unless the request named a specific scanner.
    pub scanner: String,
    pub status: ScanStatus,
    /// 0–100, monotonically non-decreasing.
    pub progress: i32,
    /// Opaque config bag; schema depends on `scan_type`. Owned by the
    /// creating handler, never mutated after insert.
    pub configuration: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Scan {
    pub fn new(
        service: Service,
        name: impl Into<String>,
        target: impl Into<String>,
        scan_type: impl Into<String>,
        scanner: impl Into<String>,
        configuration: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service,
            name: name.into(),
            target: target.into(),
            scan_type: scan_type.into(),
            scanner: scanner.into(),
            status: ScanStatus::Pending,
            progress: 0,
            configuration,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Log entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub scan_id: Uuid,
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [
            ScanStatus::Completed,
            ScanStatus::Failed,
            ScanStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                ScanStatus::Pending,
                ScanStatus::Running,
                ScanStatus::Completed,
                ScanStatus::Failed,
                ScanStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn legal_transitions() {
        assert!(ScanStatus::Pending.can_transition_to(ScanStatus::Running));
        assert!(ScanStatus::Pending.can_transition_to(ScanStatus::Cancelled));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Failed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Cancelled));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!ScanStatus::Pending.can_transition_to(ScanStatus::Completed));
        assert!(!ScanStatus::Pending.can_transition_to(ScanStatus::Failed));
        assert!(!ScanStatus::Running.can_transition_to(ScanStatus::Pending));
        assert!(!ScanStatus::Running.can_transition_to(ScanStatus::Running));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ScanStatus::Pending,
            ScanStatus::Running,
            ScanStatus::Completed,
            ScanStatus::Failed,
            ScanStatus::Cancelled,
        ] {
            assert_eq!(ScanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ScanStatus::parse("queued"), None);
    }

    #[test]
    fn status_serde_is_lowercase() {
        let json = serde_json::to_string(&ScanStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn new_scan_is_pending_with_zero_progress() {
        let scan = Scan::new(
            Service::Network,
            "q",
            "127.0.0.1",
            "masscan_quick",
            "masscan",
            serde_json::json!({}),
        );
        assert_eq!(scan.status, ScanStatus::Pending);
        assert_eq!(scan.progress, 0);
        assert!(scan.started_at.is_none());
        assert!(scan.completed_at.is_none());
        assert!(scan.error_message.is_none());
    }

    #[test]
    fn log_level_round_trips() {
        for level in [
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Success,
        ] {
            assert_eq!(LogLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(LogLevel::parse("debug"), None);
    }
}
