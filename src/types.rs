use std::fmt;

use thiserror::Error;

/// Topology node handle in `[0, num_nodes)`.
pub type Node = u32;

/// Topology edge handle in `[0, num_edges)`.
pub type Edge = u64;

/// Row in the property table backing a node or an edge. Equal to the
/// topology handle unless a view has reordered entities.
pub type PropertyIndex = u64;

/// Sparse entity-type identifier, shared by node and edge types.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EntityTypeId(pub u32);

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EntityTypeId {
    fn from(value: u32) -> Self {
        EntityTypeId(value)
    }
}

impl From<EntityTypeId> for u32 {
    fn from(value: EntityTypeId) -> Self {
        value.0
    }
}

#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("property {0:?} not found")]
    PropertyNotFound(String),
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("format mismatch: {0}")]
    FormatMismatch(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TrellisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_id_round_trips_through_u32() {
        let ty = EntityTypeId::from(7u32);
        assert_eq!(u32::from(ty), 7);
        assert_eq!(ty.to_string(), "7");
    }

    #[test]
    fn errors_render_their_kind() {
        let err = TrellisError::PropertyNotFound("rank".into());
        assert_eq!(err.to_string(), "property \"rank\" not found");
        let err = TrellisError::Unsupported("sorting edges by destination node type");
        assert!(err.to_string().starts_with("unsupported operation"));
    }
}
