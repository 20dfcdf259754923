//! Errors raised while building a graph or partitioning its edges.
use super::types::{EdgeId, InterfaceId, NodeId, VariableId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Identifier '{name}' is already registered in this graph")]
    DuplicateIdentifier { name: String },
    #[error("Interface '{label}' is already connected")]
    AlreadyConnected { interface: InterfaceId, label: String },
    #[error("Interface '{label}' cannot be connected to itself")]
    SelfConnection { interface: InterfaceId, label: String },
    #[error("Kind '{kind}' was registered with {expected} interfaces, got {actual}")]
    ArityMismatch { kind: String, expected: usize, actual: usize },
    #[error("Interface {0:?} does not belong to this graph")]
    UnknownInterface(InterfaceId),
    #[error("Kind '{kind}' was registered with roles {expected:?}, got {actual:?}")]
    RoleMismatch { kind: String, expected: Vec<String>, actual: Vec<String> },
    #[error("Node {0:?} does not belong to this graph")]
    UnknownNode(NodeId),
    #[error("Variable {0:?} does not belong to this graph")]
    UnknownVariable(VariableId),
    #[error("Node '{node}' has no interface with role '{role}'")]
    UnknownRole { node: String, role: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Edge '{edge_name}' is claimed by more than one subgraph")]
    OverlappingSubgraphs { edge: EdgeId, edge_name: String },
    #[error("Edge '{edge_name}' is not covered by any subgraph")]
    UncoveredEdge { edge: EdgeId, edge_name: String },
    #[error("Edge {0:?} does not belong to this graph")]
    UnknownEdge(EdgeId),
    #[error("Interface {0:?} does not belong to this graph")]
    UnknownInterface(InterfaceId),
}
