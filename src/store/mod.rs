//! The graph model: arenas of nodes, interfaces, edges and variables, and the
//! edge partitioning used for structured factorizations.
pub mod error;
pub mod partition;
pub mod registry;
pub mod types;

pub use error::{GraphError, PartitionError};
pub use partition::{PartitioningScheme, Subgraph, TimeWrap, WriteBuffer};
pub use registry::FactorGraph;
pub use types::*;
