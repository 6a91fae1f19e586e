//! Stage outcomes, verdicts and the result type shared across the pipeline.

pub mod types;
