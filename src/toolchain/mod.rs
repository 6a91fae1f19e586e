//! Compiler discovery
//!
//! Resolves one working C++ compiler from an ordered candidate list and
//! decides how both stages are launched on this host.

pub mod locator;

pub use locator::{Invocation, ToolchainHandle, ToolchainLocator};
