//! Part Store
//!
//! Persists individual parts, one file per part, and verifies them on read.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ zlib stream of the raw part bytes       │
//! └─────────────────────────────────────────┘
//! ```
//! The hash is an MD5 digest of the raw (uncompressed) bytes and is kept in
//! the part registry, not in the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use flate2::bufread::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};
use crate::model::PartHash;

/// Durable storage for individual parts under one directory
///
/// Part files are named by part ID, so concurrent writers never share a path.
#[derive(Debug, Clone)]
pub struct PartStore {
    /// Directory holding all part files
    dir: PathBuf,
}

impl PartStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic location for a part
    /// 42 → "{dir}/part_0000000042.part"
    pub fn part_path(&self, part_id: u64) -> PathBuf {
        self.dir.join(format!("part_{:010}.part", part_id))
    }

    /// Persist `data` as part `part_id`
    ///
    /// Writes to a temporary sibling, syncs, then renames into place so the
    /// final path only ever holds a complete part. Returns the final path and
    /// the digest of `data`.
    pub fn write(&self, part_id: u64, data: &[u8]) -> Result<(PathBuf, PartHash)> {
        let path = self.part_path(part_id);
        let tmp_path = path.with_extension("part.tmp");

        let hash = PartHash::compute(data);

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let result = Self::write_compressed(file, data);
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        fs::rename(&tmp_path, &path)?;

        trace!(part_id, bytes = data.len(), %hash, "part written");
        Ok((path, hash))
    }

    /// Read a part and check it against `expected`
    ///
    /// Returns:
    /// - `Ok(bytes)`: the part's raw bytes, digest matches
    /// - `Err(PartMissing)`: no file at `path`
    /// - `Err(CorruptPart)`: undecodable contents, trailing bytes or digest mismatch
    pub fn read_and_verify(&self, path: &Path, expected: &PartHash) -> Result<Bytes> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::PartMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = || StoreError::CorruptPart {
            path: path.to_path_buf(),
        };

        // The file is already in memory, so any decode error is damage
        let mut decoder = ZlibDecoder::new(&raw[..]);
        let mut data = Vec::new();
        if let Err(e) = decoder.read_to_end(&mut data) {
            debug!(path = %path.display(), error = %e, "part failed to decode");
            return Err(corrupt());
        }

        // Bytes after the end of the zlib stream are never decoded
        let trailing = decoder.get_ref().len();
        if trailing > 0 {
            debug!(path = %path.display(), trailing, "part has trailing bytes");
            return Err(corrupt());
        }

        let actual = PartHash::compute(&data);
        if actual != *expected {
            debug!(
                path = %path.display(),
                expected = %expected,
                actual = %actual,
                "part hash mismatch"
            );
            return Err(corrupt());
        }

        Ok(Bytes::from(data))
    }

    /// Remove a part file
    ///
    /// Idempotent: returns `Ok(false)` if nothing was there.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_compressed(file: File, data: &[u8]) -> Result<()> {
        let mut encoder = ZlibEncoder::new(BufWriter::new(file), Compression::default());
        encoder.write_all(data)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}
