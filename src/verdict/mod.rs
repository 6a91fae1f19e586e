//! Verdict derivation
//!
//! Crash classification and the fixed-precedence result assembler.

pub mod assemble;
pub mod classify;

pub use assemble::ResultAssembler;
