//! Message schedule compiler for factor graphs.
//!
//! The pipeline has three stages:
//! 1. [`analysis::schedule()`] orders the interfaces whose outbound messages
//!    must be computed (dependencies first), over the whole graph or a
//!    subgraph of a [`store::PartitioningScheme`].
//! 2. [`compute::RuleCatalog::resolve`] picks, for every step, the most
//!    specific update rule matching the inbound types observed so far.
//! 3. [`compute::assemble_arguments`] binds each step's inputs to earlier
//!    entries, inlined constants, stored messages or node parameters.
//!
//! [`compute::Compiler`] runs stages 2 and 3 over a schedule and produces a
//! [`compute::Program`]. Nothing here evaluates messages.
pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod store;

pub use analysis::{complete_partial_schedule, schedule, schedule_all, schedule_subgraph, Schedule, ScheduleError};
pub use compute::{build_plan, compile_target, Argument, Compiler, InferencePlan, Program, RuleCatalog};
pub use config::SchedulerConfig;
pub use store::{FactorGraph, PartitioningScheme};
