//! Chunking Engine
//!
//! Splits byte streams into fixed-size parts and reassembles them.
//!
//! ## Split Rules
//! - Every chunk is exactly `part_size` bytes except possibly the last,
//!   which holds the remainder (1..=part_size bytes)
//! - Input whose length is a multiple of `part_size` has no trailing empty chunk
//! - Zero-length input yields exactly one empty chunk
//!
//! ## Reassembly Rules
//! - Parts are concatenated strictly by index, whatever order they arrive in
//! - Every index in `[0, part_count)` must be present exactly once

use std::io::{self, Read};

use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Fixed-size splitter and index-ordered reassembler
#[derive(Debug, Clone, Copy)]
pub struct ChunkingEngine {
    part_size: usize,
}

impl ChunkingEngine {
    /// Create an engine for `part_size`-byte chunks
    pub fn new(part_size: usize) -> Result<Self> {
        if part_size == 0 {
            return Err(StoreError::Capacity("part_size must be greater than 0".to_string()));
        }
        Ok(Self { part_size })
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Number of chunks `split` produces for `len` input bytes
    pub fn part_count(&self, len: usize) -> usize {
        if len == 0 {
            1
        } else {
            len.div_ceil(self.part_size)
        }
    }

    /// Split an in-memory buffer into ordered chunks
    ///
    /// Chunks are zero-copy slices of `data`.
    pub fn split(&self, data: Bytes) -> Vec<Bytes> {
        if data.is_empty() {
            return vec![Bytes::new()];
        }

        let mut chunks = Vec::with_capacity(self.part_count(data.len()));
        let mut start = 0;
        while start < data.len() {
            let end = (start + self.part_size).min(data.len());
            chunks.push(data.slice(start..end));
            start = end;
        }
        chunks
    }

    /// Lazily chunk a reader; at most one chunk is buffered per `next()`
    pub fn chunker<R: Read>(&self, reader: R) -> Chunker<R> {
        Chunker {
            reader,
            part_size: self.part_size,
            emitted: 0,
            done: false,
        }
    }

    /// Concatenate parts in index order
    ///
    /// `parts` may arrive in any order. A missing index fails with
    /// `IncompleteFile`; an index outside `[0, part_count)` or one seen twice
    /// fails with `InvalidPartIndex`.
    pub fn reassemble<I>(&self, file_id: u64, part_count: u32, parts: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = (u32, Bytes)>,
    {
        let mut slots: Vec<Option<Bytes>> = vec![None; part_count as usize];

        for (index, bytes) in parts {
            let slot = slots
                .get_mut(index as usize)
                .ok_or(StoreError::InvalidPartIndex { index, part_count })?;
            if slot.is_some() {
                return Err(StoreError::InvalidPartIndex { index, part_count });
            }
            *slot = Some(bytes);
        }

        let mut total = 0;
        for (index, slot) in slots.iter().enumerate() {
            match slot {
                Some(bytes) => total += bytes.len(),
                None => {
                    return Err(StoreError::IncompleteFile {
                        id: file_id,
                        missing_index: index as u32,
                    })
                }
            }
        }

        let mut output = Vec::with_capacity(total);
        for bytes in slots.into_iter().flatten() {
            output.extend_from_slice(&bytes);
        }
        Ok(output)
    }
}

/// Streaming splitter over a reader
///
/// Follows the same rules as [`ChunkingEngine::split`].
pub struct Chunker<R> {
    reader: R,
    part_size: usize,
    /// Chunks yielded so far
    emitted: usize,
    done: bool,
}

impl<R> Chunker<R> {
    /// Chunks yielded so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = Vec::with_capacity(self.part_size);
        if let Err(e) = (&mut self.reader)
            .take(self.part_size as u64)
            .read_to_end(&mut buf)
        {
            self.done = true;
            return Some(Err(e));
        }

        if buf.len() < self.part_size {
            self.done = true;
            // Nothing left: only an empty source produces an empty chunk
            if buf.is_empty() && self.emitted > 0 {
                return None;
            }
        }

        self.emitted += 1;
        Some(Ok(Bytes::from(buf)))
    }
}
