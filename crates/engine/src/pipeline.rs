//! Composite scans: an ordered sequence of adapter phases sharing one
//! scan id.
//!
//! Each phase gets a non-overlapping progress band and a fresh child
//! context. Cancellation is observed between phases. A failing phase is
//! a warning, not a pipeline failure, unless the phase is marked as a
//! prerequisite. Conditional phases are gated on results already
//! persisted for the scan — data flows between phases through the
//! database, not through memory.

use std::sync::Arc;

use argus_domain::scan::{LogLevel, Scan};

use crate::adapter::ToolAdapter;
use crate::context::ScanContext;
use crate::error::{ScanError, ScanResult};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Condition a prior phase must have established for a gated phase to
/// run. Evaluated against the scan's persisted results.
#[derive(Debug, Clone)]
pub enum Gate {
    /// A fingerprinting phase identified the named CMS.
    CmsIdentified(&'static str),
}

impl Gate {
    pub async fn is_open(&self, ctx: &ScanContext) -> ScanResult<bool> {
        match self {
            Gate::CmsIdentified(cms) => {
                Ok(ctx.db().has_cms_identification(ctx.scan_id(), cms).await?)
            }
        }
    }

    /// Log line emitted when the gate is closed.
    pub fn skip_message(&self, phase_name: &str) -> String {
        match self {
            Gate::CmsIdentified(cms) => {
                format!("{cms} not detected, skipping {phase_name} phase")
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Phases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct Phase {
    pub name: &'static str,
    pub adapter: Arc<dyn ToolAdapter>,
    /// Slice of the scan's 0–100 gauge this phase owns.
    pub band: (u8, u8),
    pub gate: Option<Gate>,
    /// Prerequisite phases abort the pipeline when they fail.
    pub required: bool,
}

impl Phase {
    pub fn new(name: &'static str, adapter: Arc<dyn ToolAdapter>, band: (u8, u8)) -> Self {
        Self {
            name,
            adapter,
            band,
            gate: None,
            required: false,
        }
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct Pipeline {
    pub phases: Vec<Phase>,
}

impl Pipeline {
    pub fn new(phases: Vec<Phase>) -> Self {
        debug_assert!(bands_are_ordered(&phases));
        Self { phases }
    }

    pub async fn run(&self, ctx: &ScanContext, scan: &Scan) -> ScanResult<()> {
        let total = self.phases.len();

        for (index, phase) in self.phases.iter().enumerate() {
            // Observe cancellation between phases.
            ctx.checkpoint()?;

            if let Some(gate) = &phase.gate {
                if !gate.is_open(ctx).await? {
                    ctx.log(LogLevel::Info, gate.skip_message(phase.name)).await;
                    ctx.progress(phase.band.1).await;
                    continue;
                }
            }

            ctx.log(
                LogLevel::Info,
                format!("phase {}/{}: {}", index + 1, total, phase.name),
            )
            .await;

            let phase_ctx = ctx.sub_band(phase.band.0, phase.band.1);
            match phase.adapter.scan(&phase_ctx, scan).await {
                Ok(()) => {
                    phase_ctx.progress(100).await;
                }
                // Control flow propagates regardless of phase policy.
                Err(e @ (ScanError::Cancelled | ScanError::TimedOut(_))) => return Err(e),
                Err(e) if phase.required => {
                    ctx.log(
                        LogLevel::Error,
                        format!("prerequisite phase {} failed: {e}", phase.name),
                    )
                    .await;
                    return Err(e);
                }
                Err(e) => {
                    ctx.log(
                        LogLevel::Warning,
                        format!("phase {} failed, continuing: {e}", phase.name),
                    )
                    .await;
                    phase_ctx.progress(100).await;
                }
            }
        }

        Ok(())
    }
}

fn bands_are_ordered(phases: &[Phase]) -> bool {
    phases.windows(2).all(|pair| pair[0].band.1 <= pair[1].band.0)
        && phases.iter().all(|p| p.band.0 <= p.band.1 && p.band.1 <= 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAdapter;

    #[async_trait::async_trait]
    impl ToolAdapter for NoopAdapter {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn scan(&self, _ctx: &ScanContext, _scan: &Scan) -> ScanResult<()> {
            Ok(())
        }
    }

    fn phase(band: (u8, u8)) -> Phase {
        Phase::new("noop", Arc::new(NoopAdapter), band)
    }

    #[test]
    fn ordered_bands_pass_validation() {
        assert!(bands_are_ordered(&[phase((0, 40)), phase((40, 100))]));
        assert!(bands_are_ordered(&[
            phase((0, 20)),
            phase((20, 55)),
            phase((55, 100)),
        ]));
    }

    #[test]
    fn overlapping_bands_fail_validation() {
        assert!(!bands_are_ordered(&[phase((0, 50)), phase((40, 100))]));
        assert!(!bands_are_ordered(&[phase((10, 5))]));
        assert!(!bands_are_ordered(&[phase((0, 101))]));
    }

    #[test]
    fn gate_skip_message_names_the_phase() {
        let gate = Gate::CmsIdentified("WordPress");
        let message = gate.skip_message("wpscan");
        assert!(message.contains("WordPress not detected, skipping"));
        assert!(message.contains("wpscan"));
    }

    #[test]
    fn phase_builders() {
        let p = phase((0, 50)).required();
        assert!(p.required);
        assert!(p.gate.is_none());

        let p = phase((50, 100)).gated(Gate::CmsIdentified("WordPress"));
        assert!(p.gate.is_some());
        assert!(!p.required);
    }
}
