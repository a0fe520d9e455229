//! Per-scan cancellation tokens and the active-scan registry.
//!
//! Each running scan gets a `CancelToken`. Calling `cancel()` signals the
//! scan task to stop at its next checkpoint; the task itself writes the
//! terminal status on the way out.
//!
//! The registry is the only in-memory shared mutable state in the
//! engine. The lock covers map operations only — never any I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// A cancellation token checked cooperatively by the scan task.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the cancellation token of every in-flight scan.
pub struct ScanRegistry {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for ScanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a token for a scan. Returns `None` when the
    /// id already has an active task — at most one task per scan id.
    pub fn register(&self, scan_id: Uuid) -> Option<CancelToken> {
        let mut tokens = self.tokens.lock();
        if tokens.contains_key(&scan_id) {
            return None;
        }
        let token = CancelToken::new();
        tokens.insert(scan_id, token.clone());
        Some(token)
    }

    /// Signal a running scan. Returns true if a token was found.
    /// Idempotent — cancelling twice is harmless.
    pub fn cancel(&self, scan_id: Uuid) -> bool {
        match self.tokens.lock().get(&scan_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token for a scan (called when its task exits).
    pub fn remove(&self, scan_id: Uuid) {
        self.tokens.lock().remove(&scan_id);
    }

    /// Non-authoritative presence check against the in-memory map.
    pub fn is_running(&self, scan_id: Uuid) -> bool {
        self.tokens.lock().contains_key(&scan_id)
    }

    pub fn active_count(&self) -> usize {
        self.tokens.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_lifecycle() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_clone_shares_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn register_and_cancel() {
        let registry = ScanRegistry::new();
        let id = Uuid::new_v4();

        let token = registry.register(id).unwrap();
        assert!(registry.is_running(id));
        assert!(!token.is_cancelled());

        assert!(registry.cancel(id));
        assert!(token.is_cancelled());

        registry.remove(id);
        assert!(!registry.is_running(id));
        assert!(!registry.cancel(id));
    }

    #[test]
    fn duplicate_register_is_rejected() {
        let registry = ScanRegistry::new();
        let id = Uuid::new_v4();

        assert!(registry.register(id).is_some());
        assert!(registry.register(id).is_none());

        registry.remove(id);
        assert!(registry.register(id).is_some());
    }

    #[test]
    fn cancel_unknown_id_returns_false() {
        let registry = ScanRegistry::new();
        assert!(!registry.cancel(Uuid::new_v4()));
    }

    #[test]
    fn cancel_is_idempotent() {
        let registry = ScanRegistry::new();
        let id = Uuid::new_v4();
        let token = registry.register(id).unwrap();

        assert!(registry.cancel(id));
        assert!(registry.cancel(id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ScanRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id);
        registry.remove(id);
        registry.remove(id);
        assert!(!registry.is_running(id));
    }

    #[test]
    fn active_count_tracks_registrations() {
        let registry = ScanRegistry::new();
        assert_eq!(registry.active_count(), 0);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.register(a);
        registry.register(b);
        assert_eq!(registry.active_count(), 2);
        registry.remove(a);
        assert_eq!(registry.active_count(), 1);
    }
}
