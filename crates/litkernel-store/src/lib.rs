//! litkernel-store: persistence for the litkernel pipeline
//!
//! This crate owns every byte the pipeline puts on disk: per-stage
//! checkpoints and the final assembled record.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: a checkpoint that is visible on disk is always complete. Writes go
//! to a temporary file in the destination directory and are renamed into
//! place, so a crash mid-write leaves the previous file (or nothing) behind.
//!
//! ## Key Components
//!
//! - `CheckpointKey`: document slug + fixed stage identifier
//! - `CheckpointStore`: load/save/delete contract
//! - `FsCheckpointStore`: one JSON file per stage, atomic writes
//! - `fakes::MemoryCheckpointStore`: in-memory store for tests

mod checkpoint;
mod error;
pub mod fakes;
mod fs;
mod record;

pub use checkpoint::{slugify, CheckpointKey, CheckpointStore};
pub use error::{StoreError, StoreResult};
pub use fs::FsCheckpointStore;
pub use record::{read_json_file, write_json_atomic};
