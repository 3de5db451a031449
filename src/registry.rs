//! Registries
//!
//! In-memory catalogs mapping entity IDs to metadata.
//!
//! ## Consistency Contract
//! - An entry becomes visible only once `register` has the whole entity
//! - `get`/`list` hand out clones taken under the read lock, so a reader
//!   sees an entity either fully before or fully after any update
//! - `list` is a snapshot in registration order
//! - The lock is held only for map operations, never across I/O

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::model::{File, FilePart};

/// An entity that carries its own registry key
pub trait Entity: Clone {
    fn id(&self) -> u64;
}

impl Entity for File {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Entity for FilePart {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Registry of stored files
pub type FileRegistry = Registry<File>;

/// Registry of file parts
pub type PartRegistry = Registry<FilePart>;

struct Inner<T> {
    /// id → (registration sequence, entity)
    entries: HashMap<u64, (u64, T)>,
    /// registration sequence → id
    order: BTreeMap<u64, u64>,
    next_seq: u64,
}

/// Thread-safe key-value catalog with snapshot listing
///
/// ## Concurrency:
/// - Single `RwLock` over the map and its ordering index, so insertion,
///   removal and listing never observe one without the other
/// - All methods use `&self`
pub struct Registry<T> {
    inner: RwLock<Inner<T>>,
}

impl<T: Entity> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Register a fully constructed entity under its own ID
    ///
    /// The ID must come from an `IdAllocator`; registering a live ID twice
    /// is a capacity/configuration bug and is rejected.
    pub fn register(&self, entity: T) -> Result<u64> {
        let id = entity.id();
        let mut inner = self.inner.write();

        if inner.entries.contains_key(&id) {
            return Err(StoreError::Capacity(format!("id {} is already registered", id)));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, id);
        inner.entries.insert(id, (seq, entity));

        Ok(id)
    }

    /// Get a snapshot of one entity
    pub fn get(&self, id: u64) -> Result<T> {
        self.inner
            .read()
            .entries
            .get(&id)
            .map(|(_, entity)| entity.clone())
            .ok_or(StoreError::NotFound { id })
    }

    /// Apply `f` to the stored entity under the write lock
    pub fn update<R>(&self, id: u64, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut inner = self.inner.write();
        match inner.entries.get_mut(&id) {
            Some((_, entity)) => Ok(f(entity)),
            None => Err(StoreError::NotFound { id }),
        }
    }

    /// Remove an entity, returning it
    pub fn remove(&self, id: u64) -> Result<T> {
        let mut inner = self.inner.write();
        let (seq, entity) = inner
            .entries
            .remove(&id)
            .ok_or(StoreError::NotFound { id })?;
        inner.order.remove(&seq);
        Ok(entity)
    }

    /// Snapshot of all entities in registration order
    pub fn list(&self) -> Vec<T> {
        let inner = self.inner.read();
        inner
            .order
            .values()
            .filter_map(|id| inner.entries.get(id).map(|(_, entity)| entity.clone()))
            .collect()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.inner.read().entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Entity> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
