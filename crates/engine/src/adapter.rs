//! The tool adapter contract.
//!
//! One implementation per external tool. The manager routes a scan to an
//! adapter (or a pipeline of them); the adapter decodes its config bag,
//! drives the tool through [`crate::exec`], and appends typed results
//! and logs through the context.

use argus_domain::scan::Scan;
use async_trait::async_trait;

use crate::context::ScanContext;
use crate::error::ScanResult;

#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Tool name used in logs and the availability map.
    fn name(&self) -> &'static str;

    /// Configured binary path, if this adapter shells out. Adapters that
    /// work over the network directly (DNS, API discovery) return None
    /// and always probe as available.
    fn binary(&self) -> Option<&str> {
        None
    }

    /// Run the tool against `scan.target`.
    ///
    /// Contract:
    /// - decode `scan.configuration` first; unknown fields are fatal
    /// - log start, the redacted invocation, phase progress, and a
    ///   completion summary
    /// - append typed records as output is parsed, never at the end
    /// - key success on usable output, not on the exit code
    /// - observe `ctx.checkpoint()` between units of work
    async fn scan(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()>;

    /// Whether the tool looks reachable right now.
    fn available(&self) -> bool {
        match self.binary() {
            Some(path) => binary_available(path),
            None => true,
        }
    }
}

/// Probe for a binary: an absolute path must exist, a bare name must be
/// findable in `PATH`.
pub fn binary_available(path: &str) -> bool {
    let candidate = std::path::Path::new(path);
    if candidate.is_absolute() {
        return candidate.exists();
    }
    let Some(dirs) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&dirs).any(|dir| dir.join(candidate).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_probe() {
        assert!(binary_available("/bin/sh") || binary_available("/usr/bin/sh"));
        assert!(!binary_available("/nonexistent/argus-test-binary"));
    }

    #[test]
    fn path_search_probe() {
        assert!(binary_available("sh"));
        assert!(!binary_available("argus-test-binary-that-does-not-exist"));
    }
}
