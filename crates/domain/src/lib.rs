//! Shared domain types for the Argus scanning platform.
//!
//! Everything that crosses a crate boundary lives here: the scan model
//! and its status state machine, the service/scan-type taxonomy, typed
//! result records, target normalization, and the TOML configuration.

pub mod config;
pub mod error;
pub mod results;
pub mod scan;
pub mod service;
pub mod target;
pub mod template;

pub use error::{Error, Result};
pub use scan::{LogEntry, LogLevel, Scan, ScanStatus};
pub use service::Service;
