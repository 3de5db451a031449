//! # chunkstore
//!
//! A local, concurrent chunked-file storage engine with:
//! - Fixed-size chunking and index-ordered reassembly
//! - One compressed file per part, verified by content hash on every read
//! - Race-free ID allocation and snapshot-consistent registries
//! - A bounded I/O worker pool with memory-derived backpressure
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Command Prompt (binary)                     │
//! │             put / get / delete / list / exit                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                                │
//! │        (per-file locks, file state machine)                  │
//! └──────┬──────────────┬───────────────────┬───────────────────┘
//!        │              │                   │
//!        ▼              ▼                   ▼
//! ┌─────────────┐ ┌─────────────┐   ┌───────────────┐
//! │  Registries │ │  Chunking   │   │  IoScheduler  │
//! │ + IdAlloc   │ │   Engine    │   │ (worker pool) │
//! └─────────────┘ └─────────────┘   └───────┬───────┘
//!                                           │
//!                                           ▼
//!                                   ┌───────────────┐
//!                                   │   PartStore   │
//!                                   │ (part files)  │
//!                                   └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod id;
pub mod model;
pub mod registry;
pub mod chunking;
pub mod part_store;
pub mod scheduler;
pub mod command;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use engine::{DeleteReport, Engine};
pub use model::{File, FilePart, FileStatus, FileSummary, PartHash, PartStatus};
pub use scheduler::CancelToken;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chunkstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
