//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Document-scoped tracing spans via the `PipelineSpan` RAII guard
//! - Emission functions for stage, checkpoint, device and record events
//!
//! Events are emitted at `info!` level (failures and removals at `warn!`)
//! with a stable `event` field, so JSON logs can be filtered by name.

use tracing::{info, warn};

use crate::domain::stage::Stage;

/// RAII guard that enters a document-scoped span for the duration of a run.
///
/// ```ignore
/// let _span = PipelineSpan::enter("To_Kill_a_Mockingbird", &run_id);
/// // every event below carries document and run_id
/// ```
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    pub fn enter(document: &str, run_id: &str) -> Self {
        Self {
            _span: pipeline_span(document, run_id).entered(),
        }
    }
}

/// The document-scoped span itself, for instrumenting async work.
pub fn pipeline_span(document: &str, run_id: &str) -> tracing::Span {
    tracing::info_span!("litkernel.pipeline", document = %document, run_id = %run_id)
}

/// Emit event: a stage is about to call the service.
pub fn emit_stage_started(document: &str, stage: Stage) {
    info!(event = "stage.started", document = %document, stage = %stage);
}

/// Emit event: a stage was satisfied from its checkpoint.
pub fn emit_stage_resumed(document: &str, stage: Stage) {
    info!(event = "stage.resumed", document = %document, stage = %stage);
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Emit event: a stage produced, validated and approved new output.
pub fn emit_stage_completed(document: &str, stage: Stage, duration_ms: u64, service_calls: u32) {
    info!(
        event = "stage.completed",
        document = %document,
        stage = %stage,
        duration_ms = duration_ms,
        service_calls = service_calls,
    );
}

/// Emit event: a stage failed; the pipeline halts here.
pub fn emit_stage_failed(document: &str, stage: Stage, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", document = %document, stage = %stage, error = %error);
}

pub fn emit_checkpoint_saved(document: &str, stage: Stage) {
    info!(event = "checkpoint.saved", document = %document, stage = %stage);
}

/// Emit event: a checkpoint was deleted (restart, or failed re-validation).
pub fn emit_checkpoint_invalidated(document: &str, stage: Stage, reason: &str) {
    info!(
        event = "checkpoint.invalidated",
        document = %document,
        stage = %stage,
        reason = %reason,
    );
}

/// Emit event: the consistency engine dropped a device.
pub fn emit_device_removed(device: &str, reason: &str) {
    warn!(event = "device.removed", device = %device, reason = %reason);
}

pub fn emit_record_assembled(document: &str, devices: usize, path: &std::path::Path) {
    info!(
        event = "record.assembled",
        document = %document,
        devices = devices,
        path = %path.display(),
    );
}
