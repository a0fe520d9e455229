//! The scan orchestration engine.
//!
//! One supervised tokio task per active scan. The manager owns the
//! in-memory registry of cancellation handles and all terminal status
//! writes; adapters own result and log appends. Cancellation is
//! cooperative: `cancel` fires a token, the task observes it at its next
//! checkpoint (between pipeline phases, between streamed output lines,
//! at DB-call boundaries) and exits through the normal terminal path.

pub mod adapter;
pub mod cancel;
pub mod context;
pub mod error;
pub mod exec;
pub mod manager;
pub mod pipeline;
pub mod redact;

pub use adapter::ToolAdapter;
pub use cancel::{CancelToken, ScanRegistry};
pub use context::ScanContext;
pub use error::{ScanError, ScanResult};
pub use manager::{Routine, RoutingTable, ScanManager, StartError};
pub use pipeline::{Gate, Phase, Pipeline};
