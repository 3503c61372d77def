use crate::types::{Node, Result, TrellisError};

use super::csr::Topology;
use super::{EdgeSortKind, NodeSortKind, TopologyKind, TransposeKind};

const DESCRIPTOR_MAGIC: [u8; 4] = *b"TPLG";
const DESCRIPTOR_VERSION: u16 = 1;
// Node ids are 32-bit everywhere; the width byte keeps a 64-bit variant
// expressible at the format level.
const DEST_WIDTH_U32: u8 = 4;

/// Tags-only lookup key for persistent storage: enough to identify a view,
/// no data.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ShadowKey {
    pub kind: TopologyKind,
    pub transpose: TransposeKind,
    pub edge_sort: EdgeSortKind,
    pub node_sort: NodeSortKind,
}

/// Serializable form of a topology view: tags plus raw arrays.
///
/// `adj_indices` holds `num_nodes` offsets for most kinds and
/// `num_nodes * T` per-type offsets for the edge-type-aware kind, whose
/// dense index order is recorded in `index_to_type`. Empty property-index
/// arrays mean the identity mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopologyDescriptor {
    pub kind: TopologyKind,
    pub transpose: TransposeKind,
    pub edge_sort: EdgeSortKind,
    pub node_sort: NodeSortKind,
    pub num_nodes: u64,
    pub adj_indices: Vec<u64>,
    pub dests: Vec<Node>,
    pub edge_prop_indices: Vec<u64>,
    pub node_prop_indices: Vec<u64>,
    pub index_to_type: Vec<u32>,
}

impl TopologyDescriptor {
    pub fn shadow(&self) -> ShadowKey {
        ShadowKey {
            kind: self.kind,
            transpose: self.transpose,
            edge_sort: self.edge_sort,
            node_sort: self.node_sort,
        }
    }

    /// Whether this descriptor serves a lookup for `key`.
    pub fn matches(&self, key: &ShadowKey) -> bool {
        self.kind == key.kind
            && self.transpose == key.transpose
            && self.edge_sort.satisfies(key.edge_sort)
            && self.node_sort.satisfies(key.node_sort)
    }

    /// Descriptor for a base CSR topology.
    pub fn from_csr(topo: &Topology) -> Self {
        Self {
            kind: TopologyKind::Csr,
            transpose: TransposeKind::No,
            edge_sort: EdgeSortKind::Any,
            node_sort: NodeSortKind::Any,
            num_nodes: topo.num_nodes() as u64,
            adj_indices: topo.adj_indices().to_vec(),
            dests: topo.dests().to_vec(),
            edge_prop_indices: topo.edge_prop_indices().to_vec(),
            node_prop_indices: topo.node_prop_indices().to_vec(),
            index_to_type: Vec::new(),
        }
    }

    /// Rebuilds a base CSR topology from a `Csr`-kind descriptor.
    pub fn into_csr(self) -> Result<Topology> {
        if self.kind != TopologyKind::Csr {
            return Err(TrellisError::FormatMismatch(format!(
                "expected a csr descriptor, found {:?}",
                self.kind
            )));
        }
        Topology::from_parts(
            self.adj_indices,
            self.dests,
            self.edge_prop_indices,
            self.node_prop_indices,
        )
        .map_err(|e| TrellisError::FormatMismatch(format!("bad csr arrays: {e}")))
    }

    /// Fixed little-endian wire form: magic, version, tag bytes, lengths,
    /// then the raw arrays.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            44 + self.adj_indices.len() * 8
                + self.dests.len() * 4
                + self.edge_prop_indices.len() * 8
                + self.node_prop_indices.len() * 8
                + self.index_to_type.len() * 4,
        );
        buf.extend_from_slice(&DESCRIPTOR_MAGIC);
        buf.extend_from_slice(&DESCRIPTOR_VERSION.to_le_bytes());
        buf.push(kind_to_u8(self.kind));
        buf.push(transpose_to_u8(self.transpose));
        buf.push(edge_sort_to_u8(self.edge_sort));
        buf.push(node_sort_to_u8(self.node_sort));
        buf.push(DEST_WIDTH_U32);
        buf.extend_from_slice(&self.num_nodes.to_le_bytes());
        for len in [
            self.adj_indices.len(),
            self.dests.len(),
            self.edge_prop_indices.len(),
            self.node_prop_indices.len(),
            self.index_to_type.len(),
        ] {
            buf.extend_from_slice(&(len as u64).to_le_bytes());
        }
        for v in &self.adj_indices {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.dests {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.edge_prop_indices {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.node_prop_indices {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.index_to_type {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader { buf: bytes, pos: 0 };
        if r.take(4)? != &DESCRIPTOR_MAGIC[..] {
            return Err(TrellisError::FormatMismatch(
                "bad topology descriptor magic".into(),
            ));
        }
        let version = r.u16()?;
        if version != DESCRIPTOR_VERSION {
            return Err(TrellisError::FormatMismatch(format!(
                "unsupported descriptor version {version}"
            )));
        }
        let kind = kind_from_u8(r.u8()?)?;
        let transpose = transpose_from_u8(r.u8()?)?;
        let edge_sort = edge_sort_from_u8(r.u8()?)?;
        let node_sort = node_sort_from_u8(r.u8()?)?;
        let width = r.u8()?;
        if width != DEST_WIDTH_U32 {
            return Err(TrellisError::FormatMismatch(format!(
                "unsupported destination width {width}"
            )));
        }
        let num_nodes = r.u64()?;
        let adj_len = r.len()?;
        let dests_len = r.len()?;
        let eprop_len = r.len()?;
        let nprop_len = r.len()?;
        let types_len = r.len()?;

        let adj_indices = r.u64_array(adj_len)?;
        let dests = r.u32_array(dests_len)?;
        let edge_prop_indices = r.u64_array(eprop_len)?;
        let node_prop_indices = r.u64_array(nprop_len)?;
        let index_to_type = r.u32_array(types_len)?;
        if !r.done() {
            return Err(TrellisError::FormatMismatch(
                "trailing bytes after topology descriptor".into(),
            ));
        }

        Ok(Self {
            kind,
            transpose,
            edge_sort,
            node_sort,
            num_nodes,
            adj_indices,
            dests,
            edge_prop_indices,
            node_prop_indices,
            index_to_type,
        })
    }
}

/// Persistent store for serialized topology views, looked up by shadow key.
pub trait DescriptorStore {
    fn load(&self, key: &ShadowKey) -> Option<TopologyDescriptor>;
}

/// In-memory descriptor store; the reference implementation for tests and
/// single-process embedders.
#[derive(Default)]
pub struct MemoryDescriptorStore {
    descriptors: Vec<TopologyDescriptor>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor; a second descriptor with identical tags is
    /// rejected.
    pub fn add(&mut self, desc: TopologyDescriptor) -> Result<()> {
        if self.descriptors.iter().any(|d| d.shadow() == desc.shadow()) {
            return Err(TrellisError::InvalidArgument(format!(
                "a descriptor with tags {:?} is already stored",
                desc.shadow()
            )));
        }
        self.descriptors.push(desc);
        Ok(())
    }

    /// Replaces a descriptor with identical tags, or adds it.
    pub fn upsert(&mut self, desc: TopologyDescriptor) {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.shadow() == desc.shadow())
        {
            Some(slot) => *slot = desc,
            None => self.descriptors.push(desc),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl DescriptorStore for MemoryDescriptorStore {
    fn load(&self, key: &ShadowKey) -> Option<TopologyDescriptor> {
        self.descriptors.iter().find(|d| d.matches(key)).cloned()
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(TrellisError::FormatMismatch(
                "truncated topology descriptor".into(),
            )),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn len(&mut self) -> Result<usize> {
        let raw = self.u64()?;
        usize::try_from(raw).map_err(|_| {
            TrellisError::FormatMismatch(format!("array length {raw} exceeds address space"))
        })
    }

    fn u64_array(&mut self, len: usize) -> Result<Vec<u64>> {
        let bytes = self.take(len.checked_mul(8).ok_or_else(|| {
            TrellisError::FormatMismatch("array length overflow".into())
        })?)?;
        Ok(bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    fn u32_array(&mut self, len: usize) -> Result<Vec<u32>> {
        let bytes = self.take(len.checked_mul(4).ok_or_else(|| {
            TrellisError::FormatMismatch("array length overflow".into())
        })?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    fn done(&self) -> bool {
        self.pos == self.buf.len()
    }
}

fn kind_to_u8(kind: TopologyKind) -> u8 {
    match kind {
        TopologyKind::Csr => 0,
        TopologyKind::EdgeShuffle => 1,
        TopologyKind::Shuffle => 2,
        TopologyKind::EdgeTypeAware => 3,
    }
}

fn kind_from_u8(byte: u8) -> Result<TopologyKind> {
    match byte {
        0 => Ok(TopologyKind::Csr),
        1 => Ok(TopologyKind::EdgeShuffle),
        2 => Ok(TopologyKind::Shuffle),
        3 => Ok(TopologyKind::EdgeTypeAware),
        other => Err(TrellisError::FormatMismatch(format!(
            "unknown topology kind byte {other}"
        ))),
    }
}

fn transpose_to_u8(kind: TransposeKind) -> u8 {
    match kind {
        TransposeKind::No => 0,
        TransposeKind::Yes => 1,
    }
}

fn transpose_from_u8(byte: u8) -> Result<TransposeKind> {
    match byte {
        0 => Ok(TransposeKind::No),
        1 => Ok(TransposeKind::Yes),
        other => Err(TrellisError::FormatMismatch(format!(
            "unknown transpose byte {other}"
        ))),
    }
}

fn edge_sort_to_u8(kind: EdgeSortKind) -> u8 {
    match kind {
        EdgeSortKind::Any => 0,
        EdgeSortKind::ByDestId => 1,
        EdgeSortKind::ByEdgeType => 2,
        EdgeSortKind::ByEdgeTypeThenDest => 3,
    }
}

fn edge_sort_from_u8(byte: u8) -> Result<EdgeSortKind> {
    match byte {
        0 => Ok(EdgeSortKind::Any),
        1 => Ok(EdgeSortKind::ByDestId),
        2 => Ok(EdgeSortKind::ByEdgeType),
        3 => Ok(EdgeSortKind::ByEdgeTypeThenDest),
        other => Err(TrellisError::FormatMismatch(format!(
            "unknown edge sort byte {other}"
        ))),
    }
}

fn node_sort_to_u8(kind: NodeSortKind) -> u8 {
    match kind {
        NodeSortKind::Any => 0,
        NodeSortKind::ByDegree => 1,
        NodeSortKind::ByNodeType => 2,
    }
}

fn node_sort_from_u8(byte: u8) -> Result<NodeSortKind> {
    match byte {
        0 => Ok(NodeSortKind::Any),
        1 => Ok(NodeSortKind::ByDegree),
        2 => Ok(NodeSortKind::ByNodeType),
        other => Err(TrellisError::FormatMismatch(format!(
            "unknown node sort byte {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_descriptor() -> TopologyDescriptor {
        TopologyDescriptor {
            kind: TopologyKind::EdgeShuffle,
            transpose: TransposeKind::Yes,
            edge_sort: EdgeSortKind::ByDestId,
            node_sort: NodeSortKind::Any,
            num_nodes: 4,
            adj_indices: vec![1, 2, 4, 5],
            dests: vec![3, 0, 0, 3, 2],
            edge_prop_indices: vec![3, 0, 1, 4, 2],
            node_prop_indices: Vec::new(),
            index_to_type: Vec::new(),
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let desc = sample_descriptor();
        let bytes = desc.encode();
        let decoded = TopologyDescriptor::decode(&bytes).unwrap();
        assert_eq!(desc, decoded);
        // Bit-faithful both ways.
        assert_eq!(bytes, decoded.encode());
    }

    #[test]
    fn decode_rejects_corruption() {
        let desc = sample_descriptor();
        let bytes = desc.encode();

        assert!(TopologyDescriptor::decode(&bytes[..bytes.len() - 1]).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(TopologyDescriptor::decode(&bad_magic).is_err());

        let mut bad_kind = bytes.clone();
        bad_kind[6] = 42;
        assert!(TopologyDescriptor::decode(&bad_kind).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(TopologyDescriptor::decode(&trailing).is_err());
    }

    #[test]
    fn csr_descriptor_round_trip() {
        let topo = Topology::new(vec![2, 2, 3, 5], vec![1, 2, 3, 0, 2]).unwrap();
        let desc = TopologyDescriptor::from_csr(&topo);
        assert_eq!(desc.kind, TopologyKind::Csr);
        let rebuilt = desc.into_csr().unwrap();
        assert_eq!(rebuilt, topo);
    }

    #[test]
    fn shadow_matching_uses_sort_refinement() {
        let mut desc = sample_descriptor();
        desc.edge_sort = EdgeSortKind::ByEdgeTypeThenDest;
        assert!(desc.matches(&ShadowKey {
            kind: TopologyKind::EdgeShuffle,
            transpose: TransposeKind::Yes,
            edge_sort: EdgeSortKind::ByEdgeType,
            node_sort: NodeSortKind::Any,
        }));
        assert!(!desc.matches(&ShadowKey {
            kind: TopologyKind::EdgeShuffle,
            transpose: TransposeKind::No,
            edge_sort: EdgeSortKind::Any,
            node_sort: NodeSortKind::Any,
        }));
    }

    #[test]
    fn memory_store_add_and_upsert() {
        let mut store = MemoryDescriptorStore::new();
        let desc = sample_descriptor();
        store.add(desc.clone()).unwrap();
        assert!(store.add(desc.clone()).is_err());
        assert_eq!(store.len(), 1);

        let mut replacement = desc.clone();
        replacement.num_nodes = 9;
        store.upsert(replacement.clone());
        assert_eq!(store.len(), 1);

        let key = desc.shadow();
        assert_eq!(store.load(&key).unwrap().num_nodes, 9);
        assert!(store
            .load(&ShadowKey {
                kind: TopologyKind::Shuffle,
                ..key
            })
            .is_none());
    }
}
