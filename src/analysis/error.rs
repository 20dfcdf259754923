use crate::store::{InterfaceId, SubgraphId};
use thiserror::Error;

/// Failures of schedule generation. All of them point at a structural defect of
/// the model, so none is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Interface '{label}' is not connected to a partner")]
    DisconnectedInterface { interface: InterfaceId, label: String },
    #[error("Unbroken loop at interface '{label}': prime an initial message on it before scheduling")]
    UnbrokenLoop { interface: InterfaceId, label: String },
    #[error("Partial schedule entry '{label}' lies outside subgraph {expected:?}")]
    CrossSubgraphPartialSchedule { interface: InterfaceId, label: String, expected: SubgraphId },
    #[error("Subgraph {0:?} is not part of this partitioning scheme")]
    UnknownSubgraph(SubgraphId),
    #[error("Interface {0:?} does not belong to this graph")]
    UnknownInterface(InterfaceId),
}
