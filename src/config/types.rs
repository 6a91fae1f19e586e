/// Core configuration and error types for the cppbox pipeline
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How the toolchain and the produced program are launched
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum InvocationStyle {
    /// Spawn the compiler and the program directly
    #[default]
    #[serde(rename = "direct")]
    Direct,
    /// Route both stages through `shell -c`, with file-based stdio capture
    #[serde(rename = "shell_wrapped")]
    ShellWrapped,
}

/// Pipeline configuration.
///
/// Immutable once handed to [`crate::pipeline::Pipeline::new`]; every value the
/// pipeline consumes from its environment lives here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ordered compiler candidates. Absolute paths are probed directly,
    /// bare names are searched on `PATH`.
    pub compiler_candidates: Vec<PathBuf>,
    /// Extra flags placed before `<source> -o <binary>`
    pub compiler_flags: Vec<String>,
    /// Directory housing every per-request workspace
    pub scratch_dir: PathBuf,
    /// Wall-clock budget for the executed program
    pub execution_timeout_ms: u64,
    /// Wall-clock budget for compilation (`None` leaves it unbounded)
    pub compile_timeout_ms: Option<u64>,
    /// Launch style for both stages
    pub invocation: InvocationStyle,
    /// Shell used by [`InvocationStyle::ShellWrapped`]
    pub shell: PathBuf,
    /// Maximum captured stdout bytes per stage
    pub max_stdout_bytes: usize,
    /// Maximum captured stderr bytes per stage
    pub max_stderr_bytes: usize,
    /// How long to wait for stream collectors after the child is gone
    pub collection_timeout_ms: u64,
    /// Remove leftover workspaces older than this at startup
    pub stale_workspace_max_age_secs: Option<u64>,
}

impl PipelineConfig {
    /// Scratch root scoped by effective UID so root and non-root runs never
    /// share a directory.
    pub fn runtime_root_dir() -> PathBuf {
        let euid = unsafe { libc::geteuid() };
        std::env::temp_dir().join(format!("cppbox-uid-{}", euid))
    }

    /// Platform default compiler search order
    pub fn default_compiler_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("/usr/bin/g++"),
            PathBuf::from("/usr/local/bin/g++"),
        ];
        if cfg!(target_os = "macos") {
            candidates.push(PathBuf::from("/opt/homebrew/bin/g++"));
            candidates.push(PathBuf::from("/usr/bin/clang++"));
        }
        candidates.push(PathBuf::from("g++"));
        candidates
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Option<Duration> {
        self.compile_timeout_ms.map(Duration::from_millis)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.collection_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compiler_candidates: Self::default_compiler_candidates(),
            compiler_flags: Vec::new(),
            scratch_dir: Self::runtime_root_dir(),
            execution_timeout_ms: 30_000,
            compile_timeout_ms: Some(60_000),
            invocation: InvocationStyle::Direct,
            shell: PathBuf::from("/bin/sh"),
            max_stdout_bytes: 8 * 1024 * 1024,
            max_stderr_bytes: 2 * 1024 * 1024,
            collection_timeout_ms: 2_000,
            stale_workspace_max_age_secs: Some(3_600),
        }
    }
}

/// Custom error types for cppbox
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("No usable C++ compiler found (searched: {})", format_searched(.searched))]
    ToolchainUnavailable { searched: Vec<PathBuf> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn format_searched(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return "no candidates configured".to_string();
    }
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<nix::errno::Errno> for PipelineError {
    fn from(err: nix::errno::Errno) -> Self {
        PipelineError::Process(err.to_string())
    }
}

/// Result type alias for cppbox operations
pub type Result<T> = std::result::Result<T, PipelineError>;
