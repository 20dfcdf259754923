pub mod trace;

pub use trace::format_program;
