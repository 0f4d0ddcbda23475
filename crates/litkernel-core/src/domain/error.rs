//! Error taxonomy for the pipeline.

use litkernel_store::StoreError;

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::domain::stage::Stage;
use crate::migration::MigrationError;
use crate::service::ServiceError;
use crate::structure::StructureDiagnostics;

/// Errors produced by the position mapper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("malformed chapter range {input:?}: {reason}")]
    MalformedRange { input: String, reason: String },

    #[error("cannot format an empty chapter list")]
    EmptyRange,

    #[error("chapters are not contiguous: {chapters:?}")]
    NonContiguous { chapters: Vec<u32> },

    #[error("chapter {chapter} is outside 1..={total_chapters}")]
    ChapterOutOfRange { chapter: u32, total_chapters: u32 },

    #[error("document geometry is empty ({total_chapters} chapters, {total_words} words)")]
    EmptyDocument {
        total_chapters: u32,
        total_words: usize,
    },
}

/// Pipeline errors. Every variant that concerns a stage names it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage}: malformed service response: {reason}")]
    MalformedServiceResponse { stage: Stage, reason: String },

    #[error("{stage}: chapter coverage violation: {diagnostics}")]
    CoverageViolation {
        stage: Stage,
        diagnostics: StructureDiagnostics,
    },

    #[error("{stage}: climax spans {length} chapters (max {max})")]
    ClimaxOverflow { stage: Stage, length: u32, max: u32 },

    #[error("{stage} cannot run before {missing} has completed")]
    MissingUpstreamStage { stage: Stage, missing: Stage },

    #[error("{stage} rejected by reviewer: {reason}")]
    StageRejected { stage: Stage, reason: String },

    #[error("{stage}: generative service call failed: {source}")]
    Service {
        stage: Stage,
        #[source]
        source: ServiceError,
    },

    #[error("record already assembled in this run")]
    AlreadyAssembled,

    #[error("record cannot be assembled: {0} has no validated output")]
    Incomplete(Stage),

    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("position error: {0}")]
    Position(#[from] PositionError),

    #[error("schema migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::MalformedServiceResponse { stage, .. }
            | PipelineError::CoverageViolation { stage, .. }
            | PipelineError::ClimaxOverflow { stage, .. }
            | PipelineError::MissingUpstreamStage { stage, .. }
            | PipelineError::StageRejected { stage, .. }
            | PipelineError::Service { stage, .. } => Some(*stage),
            PipelineError::Incomplete(stage) => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn malformed(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::MalformedServiceResponse {
            stage,
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
