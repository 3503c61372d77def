use std::collections::{BTreeSet, HashMap};

use crate::primitives::parallel::{ParallelRuntime, PerThread};
use crate::types::{Edge, EntityTypeId};

use super::csr::Topology;
use super::TypeSource;

/// Bijection between the sparse set of edge-type ids present in a graph and
/// the dense index range `[0, T)`.
///
/// Dense indices are assigned in ascending type-id order, not first
/// appearance, so equal inputs produce equal maps regardless of how many
/// workers sampled the edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondensedTypeMap {
    index_to_type: Vec<EntityTypeId>,
    type_to_index: HashMap<EntityTypeId, u32>,
}

impl CondensedTypeMap {
    /// Samples every edge's type into per-worker sets, merges them into one
    /// ordered set and assigns dense indices in that order.
    pub fn from_edge_types(base: &Topology, types: &dyn TypeSource, rt: &ParallelRuntime) -> Self {
        let local_sets: PerThread<BTreeSet<EntityTypeId>> = PerThread::new(rt);
        rt.do_all(base.num_edges(), |e| {
            let ty = types.edge_type(base.edge_property_index(e as Edge));
            local_sets.local().lock().insert(ty);
        });

        let mut merged = BTreeSet::new();
        for set in local_sets.drain() {
            merged.extend(set);
        }

        let index_to_type: Vec<EntityTypeId> = merged.into_iter().collect();
        let type_to_index = index_to_type
            .iter()
            .enumerate()
            .map(|(i, &ty)| (ty, i as u32))
            .collect();
        Self {
            index_to_type,
            type_to_index,
        }
    }

    pub fn num_unique_types(&self) -> usize {
        self.index_to_type.len()
    }

    /// The type id at dense index `index`. Panics on an out-of-range index.
    pub fn type_of(&self, index: u32) -> EntityTypeId {
        self.index_to_type[index as usize]
    }

    pub fn index_of(&self, ty: EntityTypeId) -> Option<u32> {
        self.type_to_index.get(&ty).copied()
    }

    pub fn index_to_type_map(&self) -> &[EntityTypeId] {
        &self.index_to_type
    }

    /// Whether a persisted raw index-to-type vector describes this map.
    pub fn matches(&self, raw: &[u32]) -> bool {
        self.index_to_type.len() == raw.len()
            && self
                .index_to_type
                .iter()
                .zip(raw)
                .all(|(ty, &raw_ty)| ty.0 == raw_ty)
    }
}
