//! Error types for chunkstore
//!
//! Every engine operation returns one of these classified outcomes.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for chunkstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("File {id} not found")]
    NotFound { id: u64 },

    #[error("File {id} is not ready")]
    NotReady { id: u64 },

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("File {id} is corrupted")]
    CorruptedFile { id: u64 },

    #[error("Part failed verification: {}", path.display())]
    CorruptPart { path: PathBuf },

    #[error("Part file missing: {}", path.display())]
    PartMissing { path: PathBuf },

    #[error("File {id} is incomplete: part {missing_index} is missing")]
    IncompleteFile { id: u64, missing_index: u32 },

    #[error("Part index {index} is invalid for a file of {part_count} parts")]
    InvalidPartIndex { index: u32, part_count: u32 },

    // -------------------------------------------------------------------------
    // Put/Get Outcome Errors
    // -------------------------------------------------------------------------
    #[error("Put of file {id} failed: {failed_parts} of {total_parts} parts could not be written")]
    PutFailed {
        id: u64,
        failed_parts: usize,
        total_parts: usize,
    },

    #[error("Operation on file {id} was cancelled")]
    Cancelled { id: u64 },

    #[error("Part operation panicked: {0}")]
    WorkerPanic(String),

    // -------------------------------------------------------------------------
    // Resource / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Capacity error: {0}")]
    Capacity(String),

    #[error("{kind} id space exhausted")]
    IdExhausted { kind: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("Command error: {0}")]
    Command(String),
}
