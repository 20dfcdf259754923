//! Rule dispatch and argument assembly: turns schedules into programs.
pub mod assembler;
pub mod error;
pub mod program;
pub mod rules;

pub use assembler::{assemble_arguments, Argument};
pub use error::{AssemblyError, CompileError, DispatchError};
pub use program::{
    build_plan, compile_target, BufferBinding, Compiler, InferencePlan, Program, ScheduleEntry, WrapBinding,
};
pub use rules::{FallbackPolicy, InboundType, Pattern, Rule, RuleCatalog, RuleCatalogBuilder, RuleId};
