//! Error types for litkernel-store

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// A file exists but does not hold valid JSON (truncated or hand-edited)
    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Serialization of a payload failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File does not exist
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_error_names_the_file() {
        let err = StoreError::Corrupt {
            path: PathBuf::from("ckpt/The_Giver_stage0.json"),
            reason: "EOF while parsing".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("The_Giver_stage0.json"));
        assert!(msg.contains("EOF while parsing"));
    }
}
