use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::types::{Result, TrellisError};

use super::property_cache::{CacheKey, PropertyCache};

/// Which entity class a property column describes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ColumnScope {
    Node,
    Edge,
}

impl fmt::Display for ColumnScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnScope::Node => write!(f, "node"),
            ColumnScope::Edge => write!(f, "edge"),
        }
    }
}

/// One contiguous run of primitive values.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnChunk {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    U32(Vec<u32>),
    Bool(Vec<bool>),
}

impl ColumnChunk {
    pub fn len(&self) -> usize {
        match self {
            ColumnChunk::U64(v) => v.len(),
            ColumnChunk::I64(v) => v.len(),
            ColumnChunk::F64(v) => v.len(),
            ColumnChunk::U32(v) => v.len(),
            ColumnChunk::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        match self {
            ColumnChunk::U64(v) => v.len() * 8,
            ColumnChunk::I64(v) => v.len() * 8,
            ColumnChunk::F64(v) => v.len() * 8,
            ColumnChunk::U32(v) => v.len() * 4,
            ColumnChunk::Bool(v) => v.len(),
        }
    }
}

/// A property column as an ordered list of shared chunks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkedColumn {
    chunks: Vec<Arc<ColumnChunk>>,
}

impl ChunkedColumn {
    pub fn from_chunks(chunks: Vec<ColumnChunk>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn single(chunk: ColumnChunk) -> Self {
        Self::from_chunks(vec![chunk])
    }

    pub fn chunks(&self) -> &[Arc<ColumnChunk>] {
        &self.chunks
    }

    pub fn len(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(|c| c.byte_len()).sum()
    }
}

/// External persistence for columns. `store` returns an opaque location the
/// table hands back to `load` later.
pub trait ColumnStore {
    fn store(&mut self, scope: ColumnScope, name: &str, column: &ChunkedColumn) -> Result<String>;
    fn load(&self, location: &str) -> Result<ChunkedColumn>;
}

/// In-memory column store; the reference implementation for tests.
#[derive(Default)]
pub struct MemoryColumnStore {
    columns: HashMap<String, ChunkedColumn>,
}

impl MemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl ColumnStore for MemoryColumnStore {
    fn store(&mut self, scope: ColumnScope, name: &str, column: &ChunkedColumn) -> Result<String> {
        let location = format!("{scope}/{name}");
        self.columns.insert(location.clone(), column.clone());
        Ok(location)
    }

    fn load(&self, location: &str) -> Result<ChunkedColumn> {
        self.columns
            .get(location)
            .cloned()
            .ok_or_else(|| TrellisError::PropertyNotFound(location.to_string()))
    }
}

/// Residency of one column.
#[derive(Clone, Debug, PartialEq, Eq)]
enum PropState {
    /// Unloaded; resident copy lives at `location`.
    Absent { location: String },
    /// Loaded and unchanged since `location` was written.
    Clean { location: String },
    /// Loaded with changes that storage has not seen.
    Dirty,
}

struct PropSlot {
    name: String,
    state: PropState,
    column: Option<Arc<ChunkedColumn>>,
}

/// Named property columns of one entity class, with explicit load/unload
/// residency control.
///
/// Every column is either resident (clean or dirty) or absent with a known
/// storage location. Unloading a dirty column writes it back first; loading
/// consults the attached property cache before going to storage.
pub struct PropertyTable {
    scope: ColumnScope,
    num_rows: u64,
    slots: Vec<PropSlot>,
    cache: Option<Arc<PropertyCache<Arc<ChunkedColumn>>>>,
}

impl PropertyTable {
    pub fn new(scope: ColumnScope, num_rows: u64) -> Self {
        Self {
            scope,
            num_rows,
            slots: Vec::new(),
            cache: None,
        }
    }

    pub fn scope(&self) -> ColumnScope {
        self.scope
    }

    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Routes unloaded columns through `cache` so a later load can skip
    /// storage.
    pub fn attach_cache(&mut self, cache: Arc<PropertyCache<Arc<ChunkedColumn>>>) {
        self.cache = Some(cache);
    }

    /// Adds a new column; the name must be unused and the length must match
    /// the table.
    pub fn add(&mut self, name: &str, column: ChunkedColumn) -> Result<()> {
        if self.slot(name).is_some() {
            return Err(TrellisError::InvalidArgument(format!(
                "{} property {name:?} already exists",
                self.scope
            )));
        }
        self.check_rows(name, &column)?;
        self.slots.push(PropSlot {
            name: name.to_string(),
            state: PropState::Dirty,
            column: Some(Arc::new(column)),
        });
        Ok(())
    }

    /// Replaces an existing column or adds a new one; either way the column
    /// is dirty afterwards.
    pub fn upsert(&mut self, name: &str, column: ChunkedColumn) -> Result<()> {
        self.check_rows(name, &column)?;
        match self.slots.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.column = Some(Arc::new(column));
                slot.state = PropState::Dirty;
                Ok(())
            }
            None => self.add(name, column),
        }
    }

    /// Drops a column from the table entirely, resident or not.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let pos = self
            .slots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| TrellisError::PropertyNotFound(name.to_string()))?;
        self.slots.remove(pos);
        Ok(())
    }

    /// Evicts a resident column to storage. Dirty columns are written back
    /// first; clean ones keep their existing location.
    pub fn unload(&mut self, name: &str, store: &mut dyn ColumnStore) -> Result<()> {
        let scope = self.scope;
        let cache = self.cache.clone();
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| TrellisError::PropertyNotFound(name.to_string()))?;

        let location = match &slot.state {
            PropState::Absent { .. } => {
                return Err(TrellisError::AssertionFailed(format!(
                    "{scope} property {name:?} is not resident"
                )));
            }
            PropState::Clean { location } => location.clone(),
            PropState::Dirty => {
                let column = slot.column.as_ref().ok_or_else(|| {
                    TrellisError::AssertionFailed(format!(
                        "{scope} property {name:?} is dirty but has no data"
                    ))
                })?;
                let location = store.store(scope, name, column)?;
                debug!(%scope, name, %location, "wrote dirty column back to storage");
                location
            }
        };

        let column = slot.column.take().ok_or_else(|| {
            TrellisError::AssertionFailed(format!(
                "{scope} property {name:?} is resident but has no data"
            ))
        })?;
        if let Some(cache) = &cache {
            cache.insert(
                CacheKey {
                    scope,
                    name: name.to_string(),
                },
                column,
            );
        }
        slot.state = PropState::Absent { location };
        Ok(())
    }

    /// Makes an absent column resident again, from the property cache when
    /// possible, otherwise from storage.
    pub fn load(&mut self, name: &str, store: &dyn ColumnStore) -> Result<()> {
        let scope = self.scope;
        let cache = self.cache.clone();
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| TrellisError::PropertyNotFound(name.to_string()))?;

        let location = match &slot.state {
            PropState::Absent { location } => location.clone(),
            PropState::Clean { .. } | PropState::Dirty => {
                return Err(TrellisError::InvalidArgument(format!(
                    "{scope} property {name:?} is already loaded"
                )));
            }
        };

        let cached = cache.as_ref().and_then(|cache| {
            cache.get(&CacheKey {
                scope,
                name: name.to_string(),
            })
        });
        let column = match cached {
            Some(column) => column,
            None => Arc::new(store.load(&location)?),
        };
        slot.column = Some(column);
        slot.state = PropState::Clean { location };
        Ok(())
    }

    /// Storage location of a column; a dirty column has no trustworthy
    /// location.
    pub fn storage_location(&self, name: &str) -> Result<&str> {
        let slot = self
            .slot(name)
            .ok_or_else(|| TrellisError::PropertyNotFound(name.to_string()))?;
        match &slot.state {
            PropState::Absent { location } | PropState::Clean { location } => Ok(location),
            PropState::Dirty => Err(TrellisError::AssertionFailed(format!(
                "{} property {name:?} exists but is dirty",
                self.scope
            ))),
        }
    }

    /// Names of resident columns, in table order.
    pub fn loaded_names(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| !matches!(s.state, PropState::Absent { .. }))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Names of every column the table knows, resident or not.
    pub fn full_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Arc<ChunkedColumn>> {
        self.slot(name).and_then(|s| s.column.as_ref())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.slot(name)
            .is_some_and(|s| !matches!(s.state, PropState::Absent { .. }))
    }

    fn slot(&self, name: &str) -> Option<&PropSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    fn check_rows(&self, name: &str, column: &ChunkedColumn) -> Result<()> {
        if column.len() != self.num_rows {
            return Err(TrellisError::InvalidArgument(format!(
                "column {name:?} holds {} rows, table holds {}",
                column.len(),
                self.num_rows
            )));
        }
        Ok(())
    }
}
