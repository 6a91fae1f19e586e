//! Configuration
//!
//! Immutable pipeline configuration, its JSON loader and startup validation.

pub mod loader;
pub mod types;
pub mod validator;
