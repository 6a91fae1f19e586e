//! Safety and cleanup
//!
//! Every request owns a uniquely named workspace that is removed on every
//! exit path.

pub mod workspace;
