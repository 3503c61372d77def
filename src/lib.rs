#![forbid(unsafe_code)]

pub mod primitives;
pub mod storage;
pub mod topology;
pub mod types;

pub use crate::primitives::bitset::DynamicBitset;
pub use crate::primitives::parallel::ParallelRuntime;
pub use crate::storage::columns::{
    ChunkedColumn, ColumnChunk, ColumnScope, ColumnStore, MemoryColumnStore, PropertyTable,
};
pub use crate::storage::property_cache::{CacheKey, EvictPolicy, PropertyCache};
pub use crate::topology::csr::Topology;
pub use crate::topology::persist::{
    DescriptorStore, MemoryDescriptorStore, ShadowKey, TopologyDescriptor,
};
pub use crate::topology::shuffle::{EdgeShuffleTopology, ShuffleTopology};
pub use crate::topology::type_aware::EdgeTypeAwareTopology;
pub use crate::topology::type_map::CondensedTypeMap;
pub use crate::topology::view_cache::{ViewCache, ViewContext};
pub use crate::topology::{
    AdjacencyView, EdgeSortKind, NodeSortKind, SliceTypeSource, TopologyKind, TransposeKind,
    TypeSource,
};
pub use crate::types::{Edge, EntityTypeId, Node, PropertyIndex, Result, TrellisError};
