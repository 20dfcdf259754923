//! Scheduling: dependency resolution, subgraph schedules, loop diagnostics
//! and reports over compiled programs.
pub mod error;
pub mod loops;
pub mod schedule;
pub mod subgraph;
pub mod telemetry;

pub use error::ScheduleError;
pub use schedule::{complete_partial_schedule, schedule, Schedule};
pub use subgraph::{schedule_all, schedule_subgraph, subgraph_schedule};
pub use telemetry::ScheduleReport;
