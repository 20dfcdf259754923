//! Error types for rule dispatch, argument assembly and program compilation.
use crate::analysis::ScheduleError;
use crate::store::InterfaceId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No rule for kind '{kind}' computing '{role}' with inbounds {signature}")]
    NoApplicableRule { kind: String, role: String, signature: String },
    #[error("Ambiguous rules for kind '{kind}' computing '{role}': {rules:?}")]
    AmbiguousRule { kind: String, role: String, rules: Vec<String> },
    #[error("Rule '{name}' duplicates an already registered pattern")]
    DuplicateRule { name: String },
    #[error("Rule '{name}' is invalid: {reason}")]
    InvalidRule { name: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("No schedule entry produces the inbound '{label}' (scheduling must run before assembly)")]
    MissingInboundReference { interface: InterfaceId, label: String },
    #[error(
        "Rule '{rule}' needs the inbound on '{label}' as approximation point, but it is not available yet; \
         try reordering the schedule to perform a dependency pass first"
    )]
    UnavailableApproximationPoint { rule: String, interface: InterfaceId, label: String },
    #[error("Node '{node}' has no interface with role '{role}' required by rule '{rule}'")]
    UnknownRole { rule: String, node: String, role: String },
    #[error("Rule '{rule}' expects {expected} inbounds but node '{node}' has {actual}")]
    ArityMismatch { rule: String, node: String, expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("Dispatch failed at '{label}': {source}")]
    Dispatch { label: String, source: DispatchError },
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}
