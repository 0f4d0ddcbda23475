//! Stage orchestration: parsed stage outputs, operator review and the
//! checkpointing controller.

pub mod controller;
pub mod outputs;
pub mod review;

pub use controller::{CheckpointStatus, PipelineController, StageOutcome};
pub use outputs::{DeviceOutput, ExtractionOutput, SegmentExtract, StructureOutput};
pub use review::{AutoApprove, ReviewDecision, StageReviewer};
