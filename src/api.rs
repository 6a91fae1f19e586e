//! JSON request and response shapes for callers of the pipeline
use crate::core::types::Verdict;
use crate::pipeline::{Pipeline, EMPTY_CODE_MESSAGE};
use serde::{Deserialize, Serialize};

pub const FAILURE_MESSAGE: &str = "Compilation or execution failed";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompileRequest {
    #[serde(default)]
    pub code: String,
    /// Absent and empty are equivalent: no stdin
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    BadRequest,
}

impl ResponseStatus {
    pub fn http_code(&self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::BadRequest => 400,
        }
    }
}

/// Validate a request and run it through the pipeline
pub fn handle(pipeline: &Pipeline, request: &CompileRequest) -> (ResponseStatus, CompileResponse) {
    if request.code.trim().is_empty() {
        return (
            ResponseStatus::BadRequest,
            CompileResponse {
                success: false,
                output: None,
                message: Some(EMPTY_CODE_MESSAGE.to_string()),
                verdict: Some(Verdict::Rejected),
            },
        );
    }

    let result = pipeline.compile_and_run(&request.code, request.input.as_deref());
    let message = (!result.success).then(|| FAILURE_MESSAGE.to_string());

    (
        ResponseStatus::Ok,
        CompileResponse {
            success: result.success,
            output: Some(result.output),
            message,
            verdict: Some(result.verdict),
        },
    )
}

/// Crate and compiler versions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionInfo {
    pub cppbox: String,
    /// `None` when no compiler resolves
    pub compiler: Option<String>,
    pub compiler_path: Option<String>,
}

impl VersionInfo {
    pub fn collect(pipeline: &Pipeline) -> Self {
        let handle = pipeline.toolchain().ok();
        let compiler = handle.as_ref().and_then(|h| match h.version() {
            Ok(version) => Some(version),
            Err(e) => {
                log::warn!("Compiler version probe failed: {}", e);
                None
            }
        });

        Self {
            cppbox: env!("CARGO_PKG_VERSION").to_string(),
            compiler,
            compiler_path: handle.map(|h| h.path().display().to_string()),
        }
    }
}
