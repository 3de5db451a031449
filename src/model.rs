//! Data Model
//!
//! Files, file parts, and their tagged lifecycle states.

use std::fmt;
use std::path::PathBuf;

/// Lifecycle of a stored file
///
/// ```text
/// Pending ──all parts written──▶ Ready ──delete──▶ (removed)
///    │
///    └──any part failed / cancelled──▶ Failed ──delete──▶ (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Parts are still being written
    Pending,
    /// Every part was written successfully
    Ready,
    /// At least one part failed, or the put was cancelled
    Failed,
}

impl FileStatus {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Ready) | (FileStatus::Pending, FileStatus::Failed)
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Ready => "ready",
            FileStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Lifecycle of a single part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStatus {
    /// Registered, write dispatched
    Writing,
    /// Persisted with a known hash
    Written,
    /// Write failed; the part holds no usable bytes
    WriteFailed,
    /// Last read matched the stored hash
    VerifiedOk,
    /// Last read did not match the stored hash
    VerifyFailed,
}

/// MD5 digest of a part's uncompressed bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartHash(pub [u8; 16]);

impl PartHash {
    /// Digest `data`
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }
}

impl fmt::Display for PartHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for PartHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartHash({})", self)
    }
}

/// A stored file
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub id: u64,
    pub name: String,
    pub status: FileStatus,
    /// Part IDs in index order (position = chunk index)
    pub part_ids: Vec<u64>,
}

impl File {
    /// A freshly created file, before any part I/O
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: FileStatus::Pending,
            part_ids: Vec::new(),
        }
    }

    pub fn part_count(&self) -> usize {
        self.part_ids.len()
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            part_count: self.part_count(),
        }
    }
}

/// One contiguous slice of a file, stored independently
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub id: u64,
    pub parent_id: u64,
    /// Zero-based chunk position within the parent
    pub index: u32,
    pub path: PathBuf,
    /// Set once the part has been written
    pub hash: Option<PartHash>,
    pub status: PartStatus,
}

impl FilePart {
    /// A part whose write is about to be dispatched
    pub fn new(id: u64, parent_id: u64, index: u32, path: PathBuf) -> Self {
        Self {
            id,
            parent_id,
            index,
            path,
            hash: None,
            status: PartStatus::Writing,
        }
    }
}

/// Row returned by `list()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub id: u64,
    pub name: String,
    pub status: FileStatus,
    pub part_count: usize,
}
