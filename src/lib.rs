//! cppbox: compile and run untrusted C++ submissions
//!
//! One synchronous operation, [`pipeline::Pipeline::compile_and_run`], turns
//! source text plus optional stdin into a single [`core::types::CompileResult`].
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: `PipelineConfig`, `PipelineError` and the `Result` alias
//! - [`config::loader`]: JSON loading (`cppbox.json`)
//! - [`config::validator`]: Fatal errors and logged warnings
//!
//! ## Toolchain ([`toolchain`])
//! - [`toolchain::locator`]: Ordered candidate probing, cached handle, invocation style
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: UUID-named request workspaces, stale sweep
//!
//! ## Execution Control ([`exec`])
//! - [`exec::process`]: Process-group child handle with timed wait and tree kill
//! - [`exec::compile`]: Compile stage and the `CompiledBinary` token
//! - [`exec::execute`]: Execution stage under the wall-clock budget
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::classify`]: Crash signatures from terminating signals
//! - [`verdict::assemble`]: Fixed-precedence result assembly
//!
//! ## Surfaces
//! - [`api`]: JSON request/response shapes and version info
//! - [`cli`]: `cppbox` command line
//!
//! # Design Principles
//!
//! 1. **Cleanup on every path** - Workspaces are released after success, failure and panic
//! 2. **Kill the tree** - Timeouts signal the whole process group, never just the child
//! 3. **Types prevent errors** - Execution requires a `CompiledBinary` only compilation can mint
//! 4. **Results, not exceptions** - Every failure kind becomes a well-formed result

// Configuration
pub mod config;

// Shared outcome types
pub mod core;

// Toolchain discovery
pub mod toolchain;

// Safety & Cleanup
pub mod safety;

// Execution Control
pub mod exec;

// Verdict
pub mod verdict;

// Utilities
pub mod utils;

pub mod pipeline;

pub mod api;

pub mod cli;
