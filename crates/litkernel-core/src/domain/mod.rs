//! Domain models for litkernel.
//!
//! Canonical definitions for the core entities:
//! - `ChapterRange` / `NarrativeSegment` / `ChapterAlignment`: where each
//!   dramatic-arc segment sits in the document
//! - `MacroProfile`: categorical narrative/rhetoric tags
//! - `Device` / `Example`: literary devices with located quotes
//! - `Stage` / `PipelineState`: the fixed stage sequence
//! - `PipelineRecord`: the final assembled artifact

pub mod alignment;
pub mod device;
pub mod error;
pub mod macro_profile;
pub mod range;
pub mod record;
pub mod segment;
pub mod stage;

// Re-export main types and errors
pub use alignment::{ChapterAlignment, NarrativeSegment};
pub use device::{Device, Example};
pub use error::{PipelineError, PositionError, Result};
pub use macro_profile::MacroProfile;
pub use range::ChapterRange;
pub use record::{PipelineRecord, RecordMetadata, CURRENT_SCHEMA_VERSION};
pub use segment::SegmentKind;
pub use stage::{PipelineState, Stage, UnknownStage};
