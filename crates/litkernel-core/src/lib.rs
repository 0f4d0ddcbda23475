//! litkernel core library
//!
//! Turns a long document into a validated five-part dramatic-arc
//! alignment, a macro narrative profile and a catalog of literary devices,
//! using a generative text service whose output is checked and repaired at
//! every stage.

pub mod archive;
pub mod assemble;
pub mod config;
pub mod devices;
pub mod document;
pub mod domain;
pub mod fakes;
pub mod migration;
pub mod obs;
pub mod pipeline;
pub mod position;
pub mod prompts;
pub mod response;
pub mod service;
pub mod structure;
pub mod telemetry;
pub mod versioning;

pub use archive::{Archive, ArchiveEntry, ArchiveIndex, ArchiveRequest};

pub use assemble::{read_record, record_path, verify_record, write_record, BookMetadata, RecordVerification};

pub use config::{ConfigError, PipelineConfig, ServiceConfig};

pub use devices::{ConsistencyEngine, ConsistencyReport};

pub use document::{Document, DocumentError};

pub use domain::{
    ChapterAlignment, ChapterRange, Device, Example, MacroProfile, NarrativeSegment, PipelineError,
    PipelineRecord, PipelineState, PositionError, RecordMetadata, Result, SegmentKind, Stage,
    CURRENT_SCHEMA_VERSION,
};

pub use migration::{migrate_to_current, patch, schema_version_of, MigrationError};

pub use pipeline::{AutoApprove, PipelineController, ReviewDecision, StageOutcome, StageReviewer};

pub use service::{AnthropicClient, GenerativeService, ServiceError, ServiceRequest, ServiceResponse};

pub use structure::{validate_alignment, StructureDiagnostics, StructureVerdict};

pub use telemetry::init_tracing;

pub use versioning::{patch_file, PatchOptions, PatchOutcome, RecordVersion, VersioningError};
