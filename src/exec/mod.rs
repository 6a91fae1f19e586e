//! Execution control
//!
//! Child-process plumbing plus the compile and execution stages.

pub mod compile;
pub mod execute;
pub mod process;
