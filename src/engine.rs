//! Engine Module
//!
//! The storage orchestrator that coordinates all components.
//!
//! ## Responsibilities
//! - Allocate file and part IDs and keep both registries current
//! - Drive chunking, part writes, reads and deletes through the scheduler
//! - Decide the file-level outcome from per-part results
//! - Serialize conflicting operations on the same file

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::chunking::ChunkingEngine;
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::id::IdAllocator;
use crate::model::{File, FilePart, FileStatus, FileSummary, PartHash, PartStatus};
use crate::part_store::PartStore;
use crate::registry::{FileRegistry, PartRegistry};
use crate::scheduler::{BatchOutcome, CancelToken, IoScheduler, PartOp};

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub id: u64,
    /// Part files removed (or already absent)
    pub parts_removed: usize,
    /// Part files that could not be removed and were left on disk
    pub orphaned: Vec<PathBuf>,
}

/// Per-file advisory locks
///
/// put/delete take the lock exclusively, get takes it shared.
#[derive(Default)]
struct FileLocks {
    locks: Mutex<HashMap<u64, Arc<RwLock<()>>>>,
}

impl FileLocks {
    fn handle(&self, id: u64) -> Arc<RwLock<()>> {
        Arc::clone(self.locks.lock().entry(id).or_default())
    }

    fn forget(&self, id: u64) {
        self.locks.lock().remove(&id);
    }

    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Different files**: put/get/delete run fully in parallel; their part
///   operations share one `IoScheduler` and its in-flight budget
/// - **Same file**: put and delete hold the file's lock exclusively, get
///   holds it shared, so a delete never overlaps a put or get of that file
/// - **Registries and ID allocators**: short critical sections, never held
///   across I/O
///
/// Every public operation blocks until all of its part operations finish.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Fixed-size splitter / reassembler
    chunking: ChunkingEngine,

    /// On-disk part files
    store: PartStore,

    /// Worker pool for all part I/O
    scheduler: IoScheduler,

    files: FileRegistry,
    parts: PartRegistry,

    file_ids: IdAllocator,
    part_ids: IdAllocator,

    file_locks: FileLocks,
}

impl Engine {
    /// Open an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the budgets
    /// 2. Create the parts directory
    /// 3. Start the I/O workers
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject budgets the scheduler cannot honor
        config.validate()?;

        // Step 2: Parts directory
        let store = PartStore::open(&config.parts_directory)?;
        let chunking = ChunkingEngine::new(config.part_size)?;

        // Step 3: Worker pool, capped at the available parallelism
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let workers = config.io_worker_count.min(cpus).max(1);
        let scheduler = IoScheduler::new(workers, config.max_in_flight())?;

        info!(
            parts_directory = %config.parts_directory.display(),
            part_size = config.part_size,
            max_in_flight = config.max_in_flight(),
            workers,
            "engine opened"
        );

        Ok(Self {
            config,
            chunking,
            store,
            scheduler,
            files: FileRegistry::new(),
            parts: PartRegistry::new(),
            file_ids: IdAllocator::new("file"),
            part_ids: IdAllocator::new("part"),
            file_locks: FileLocks::default(),
        })
    }

    // =========================================================================
    // Put
    // =========================================================================

    /// Store an in-memory buffer under `name`
    ///
    /// Returns the new file ID once every part is written. If any part fails
    /// the file is left `Failed` and `PutFailed` is returned.
    pub fn put(&self, name: &str, data: impl Into<Bytes>) -> Result<u64> {
        let chunks = self.chunking.split(data.into());
        self.put_chunks(name, chunks.into_iter().map(Ok), None)
    }

    /// Store the contents of a reader under `name`
    ///
    /// The reader is consumed lazily: a chunk is read only once the scheduler
    /// has room for it.
    pub fn put_reader<R: Read>(&self, name: &str, reader: R) -> Result<u64> {
        self.put_chunks(name, self.chunking.chunker(reader), None)
    }

    /// `put_reader` that stops reading when `cancel` fires, leaving the file
    /// `Failed`
    ///
    /// Parts already dispatched still finish and stay registered, so a later
    /// `delete` removes them.
    pub fn put_reader_with_cancel<R: Read>(
        &self,
        name: &str,
        reader: R,
        cancel: &CancelToken,
    ) -> Result<u64> {
        self.put_chunks(name, self.chunking.chunker(reader), Some(cancel))
    }

    /// `put` that stops early when `cancel` fires, leaving the file `Failed`
    pub fn put_with_cancel(
        &self,
        name: &str,
        data: impl Into<Bytes>,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let chunks = self.chunking.split(data.into());
        self.put_chunks(name, chunks.into_iter().map(Ok), Some(cancel))
    }

    fn put_chunks<I>(&self, name: &str, chunks: I, cancel: Option<&CancelToken>) -> Result<u64>
    where
        I: Iterator<Item = io::Result<Bytes>>,
    {
        // Step 1: Allocate and register the file before any part I/O
        let file_id = self.file_ids.next()?;
        let lock = self.file_locks.handle(file_id);
        let _guard = lock.write();
        self.files.register(File::new(file_id, name))?;

        info!(file_id, name, "put started");

        // Step 2: Register each part as it is admitted, then write it
        let mut part_ids: Vec<u64> = Vec::new();
        let mut setup_error: Option<StoreError> = None;

        let ops = chunks.enumerate().map_while(|(index, chunk)| {
            match self.prepare_write(file_id, index, chunk) {
                Ok((part_id, op)) => {
                    part_ids.push(part_id);
                    Some(op)
                }
                Err(e) => {
                    setup_error = Some(e);
                    None
                }
            }
        });

        let BatchOutcome { results, cancelled } = self.scheduler.submit(ops, cancel);

        // Step 3: Record per-part outcomes
        let mut failed_parts = 0;
        for (part_id, result) in part_ids.iter().zip(results) {
            let update = match result {
                Ok(hash) => self.parts.update(*part_id, |part| {
                    part.hash = Some(hash);
                    part.status = PartStatus::Written;
                }),
                Err(e) => {
                    failed_parts += 1;
                    warn!(file_id, part_id, error = %e, "part write failed");
                    self.parts.update(*part_id, |part| {
                        part.status = PartStatus::WriteFailed;
                    })
                }
            };
            update?;
        }

        // Step 4: Flip the file to its final state
        let total_parts = part_ids.len();
        let status = if failed_parts == 0 && !cancelled && setup_error.is_none() {
            FileStatus::Ready
        } else {
            FileStatus::Failed
        };

        self.files.update(file_id, |file| {
            if file.status.can_transition_to(status) {
                file.part_ids = part_ids;
                file.status = status;
            }
        })?;

        if cancelled {
            warn!(file_id, "put cancelled");
            return Err(StoreError::Cancelled { id: file_id });
        }
        if let Some(e) = setup_error {
            warn!(file_id, error = %e, "put aborted");
            return Err(e);
        }
        if failed_parts > 0 {
            return Err(StoreError::PutFailed {
                id: file_id,
                failed_parts,
                total_parts,
            });
        }

        info!(file_id, parts = total_parts, "put completed");
        Ok(file_id)
    }

    /// Allocate and register one part, returning its write operation
    fn prepare_write(
        &self,
        file_id: u64,
        index: usize,
        chunk: io::Result<Bytes>,
    ) -> Result<(u64, PartOp<PartHash>)> {
        let chunk = chunk?;
        let index = u32::try_from(index).map_err(|_| {
            StoreError::Capacity(format!("file {} has too many parts", file_id))
        })?;

        let part_id = self.part_ids.next()?;
        let path = self.store.part_path(part_id);
        self.parts
            .register(FilePart::new(part_id, file_id, index, path))?;

        let store = self.store.clone();
        let op: PartOp<PartHash> =
            Box::new(move || store.write(part_id, &chunk).map(|(_, hash)| hash));
        Ok((part_id, op))
    }

    // =========================================================================
    // Get
    // =========================================================================

    /// Reassemble a stored file in memory
    ///
    /// Every part is read and verified; any corrupted part fails the whole
    /// read with `CorruptedFile` and no bytes are returned.
    pub fn get(&self, id: u64) -> Result<Vec<u8>> {
        self.get_inner(id, None)
    }

    /// `get` that stops early when `cancel` fires
    pub fn get_with_cancel(&self, id: u64, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.get_inner(id, Some(cancel))
    }

    fn get_inner(&self, id: u64, cancel: Option<&CancelToken>) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.read_parts(id, cancel, |bytes| {
            data.extend_from_slice(&bytes);
            Ok(())
        })?;
        info!(file_id = id, bytes = data.len(), "get completed");
        Ok(data)
    }

    /// Reassemble a stored file into `output`, returning the bytes written
    ///
    /// Parts are read one admitted window at a time and appended to a
    /// temporary sibling of `output`, so memory stays within the in-flight
    /// budget whatever the file size. The temporary file is renamed into
    /// place only once every part has verified; on any failure `output` is
    /// left untouched.
    pub fn get_to_path(&self, id: u64, output: &Path) -> Result<u64> {
        let mut tmp_name = output.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let result = self.write_parts_to(id, &tmp_path);
        match result {
            Ok(written) => {
                fs::rename(&tmp_path, output)?;
                info!(file_id = id, bytes = written, output = %output.display(), "get completed");
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                Err(e)
            }
        }
    }

    fn write_parts_to(&self, id: u64, tmp_path: &Path) -> Result<u64> {
        let mut writer = BufWriter::new(fs::File::create(tmp_path)?);
        let mut written = 0u64;
        self.read_parts(id, None, |bytes| {
            writer.write_all(&bytes)?;
            written += bytes.len() as u64;
            Ok(())
        })?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(written)
    }

    /// Read and verify every part of `id` in index order, handing verified
    /// bytes to `sink`
    ///
    /// At most one scheduler window (`max_in_flight` parts) is resident at a
    /// time. Once a part fails, later parts are still verified so the error
    /// reported is the same however the file is consumed, but `sink` sees no
    /// more bytes.
    fn read_parts<F>(&self, id: u64, cancel: Option<&CancelToken>, mut sink: F) -> Result<()>
    where
        F: FnMut(Bytes) -> Result<()>,
    {
        // A pending file is reported immediately rather than waited on
        Self::ensure_readable(&self.files.get(id)?)?;

        let lock = self.file_locks.handle(id);
        let guard = lock.read();

        // Re-check under the lock: a delete may have won the race, and the
        // lock entry taken above must not outlive the file
        let file = match self.files.get(id) {
            Ok(file) => file,
            Err(e) => {
                drop(guard);
                self.file_locks.forget(id);
                return Err(e);
            }
        };
        Self::ensure_readable(&file)?;

        debug!(file_id = id, parts = file.part_count(), "get started");

        let mut parts = Vec::with_capacity(file.part_count());
        for (index, part_id) in file.part_ids.iter().enumerate() {
            let missing = || StoreError::IncompleteFile {
                id,
                missing_index: index as u32,
            };
            let part = self.parts.get(*part_id).map_err(|_| missing())?;
            let hash = part.hash.ok_or_else(missing)?;
            if part.index as usize != index {
                return Err(StoreError::InvalidPartIndex {
                    index: part.index,
                    part_count: file.part_count() as u32,
                });
            }
            parts.push((part.id, part.index, part.path, hash));
        }

        let mut first_missing = None;
        let mut failure = None;

        let window_size = self.scheduler.max_in_flight();
        for (window_index, window) in parts.chunks(window_size).enumerate() {
            let base = (window_index * window_size) as u32;

            let ops = window.iter().map(|(_, _, path, hash)| {
                let store = self.store.clone();
                let path = path.clone();
                let hash = *hash;
                Box::new(move || store.read_and_verify(&path, &hash)) as PartOp<Bytes>
            });

            let BatchOutcome { results, cancelled } = self.scheduler.submit(ops, cancel);

            // Record verification outcomes
            for ((part_id, _, _, _), result) in window.iter().zip(&results) {
                let status = match result {
                    Ok(_) => PartStatus::VerifiedOk,
                    Err(StoreError::CorruptPart { .. }) => PartStatus::VerifyFailed,
                    Err(_) => continue,
                };
                // The part can only vanish through delete, which we exclude
                let _ = self.parts.update(*part_id, |part| part.status = status);
            }

            if cancelled {
                warn!(file_id = id, "get cancelled");
                return Err(StoreError::Cancelled { id });
            }

            // Corruption outranks a missing part, which outranks other failures
            let mut verified = Vec::with_capacity(window.len());
            for ((_, index, _, _), result) in window.iter().zip(results) {
                match result {
                    Ok(bytes) => verified.push((*index - base, bytes)),
                    Err(StoreError::CorruptPart { .. }) => {
                        warn!(file_id = id, index, "get aborted: corrupted part");
                        return Err(StoreError::CorruptedFile { id });
                    }
                    Err(StoreError::PartMissing { path }) => {
                        warn!(file_id = id, index, path = %path.display(), "part file missing");
                        first_missing.get_or_insert(*index);
                    }
                    Err(e) => {
                        failure.get_or_insert(e);
                    }
                }
            }

            // Once anything has failed the caller gets no further bytes
            if first_missing.is_none() && failure.is_none() {
                let bytes = self
                    .chunking
                    .reassemble(id, window.len() as u32, verified)?;
                sink(Bytes::from(bytes))?;
            }
        }

        if let Some(missing_index) = first_missing {
            return Err(StoreError::IncompleteFile { id, missing_index });
        }
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(())
    }

    fn ensure_readable(file: &File) -> Result<()> {
        match file.status {
            FileStatus::Ready => Ok(()),
            FileStatus::Pending => Err(StoreError::NotReady { id: file.id }),
            FileStatus::Failed => Err(StoreError::CorruptedFile { id: file.id }),
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a file and all of its parts
    ///
    /// Registry removal always completes; part files that cannot be removed
    /// are logged and listed in the report as orphans.
    pub fn delete(&self, id: u64) -> Result<DeleteReport> {
        if self.files.get(id)?.status == FileStatus::Pending {
            return Err(StoreError::NotReady { id });
        }

        let lock = self.file_locks.handle(id);
        let guard = lock.write();

        // Removing the entry first makes the file vanish atomically for readers
        let file = match self.files.remove(id) {
            Ok(file) => file,
            Err(e) => {
                drop(guard);
                self.file_locks.forget(id);
                return Err(e);
            }
        };

        let parts: Vec<FilePart> = file
            .part_ids
            .iter()
            .filter_map(|part_id| self.parts.remove(*part_id).ok())
            .collect();

        let ops = parts.iter().map(|part| {
            let store = self.store.clone();
            let path = part.path.clone();
            Box::new(move || store.delete(&path)) as PartOp<bool>
        });
        let results = self.scheduler.submit_batch(ops);

        let mut report = DeleteReport {
            id,
            parts_removed: 0,
            orphaned: Vec::new(),
        };
        for (part, result) in parts.iter().zip(results) {
            match result {
                Ok(_) => report.parts_removed += 1,
                Err(e) => {
                    warn!(file_id = id, path = %part.path.display(), error = %e, "failed to remove part file");
                    report.orphaned.push(part.path.clone());
                }
            }
        }

        drop(guard);
        self.file_locks.forget(id);

        info!(
            file_id = id,
            removed = report.parts_removed,
            orphaned = report.orphaned.len(),
            "delete completed"
        );
        Ok(report)
    }

    // =========================================================================
    // List / Lookup
    // =========================================================================

    /// Snapshot of every file in registration order
    pub fn list(&self) -> Vec<FileSummary> {
        self.files.list().iter().map(File::summary).collect()
    }

    /// Metadata for one file
    pub fn file(&self, id: u64) -> Result<File> {
        self.files.get(id)
    }

    /// Parts of a file in index order
    pub fn parts_of(&self, id: u64) -> Result<Vec<FilePart>> {
        let file = self.files.get(id)?;
        Ok(file
            .part_ids
            .iter()
            .filter_map(|part_id| self.parts.get(*part_id).ok())
            .collect())
    }

    /// Close the engine, waiting for the I/O workers to stop
    pub fn close(self) {
        info!(files = self.files.len(), "engine closing");
        drop(self);
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the parts directory
    pub fn parts_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Get the I/O scheduler
    pub fn scheduler(&self) -> &IoScheduler {
        &self.scheduler
    }

    /// Number of per-file lock entries currently held
    pub fn tracked_locks(&self) -> usize {
        self.file_locks.len()
    }
}
