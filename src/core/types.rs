use crate::utils::output::OutputIntegrity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw result of one child-process invocation, shared by both stages.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageOutcome {
    /// Exit code when the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal when the process was killed by one
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output_integrity: OutputIntegrity,
    pub wall_time_ms: u64,
}

impl StageOutcome {
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0) && self.signal.is_none()
    }
}

/// Outcome of the compile stage as seen by the result assembler
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileOutcome {
    /// No candidate compiler exists; nothing was compiled
    ToolchainUnavailable { searched: Vec<PathBuf> },
    /// Compiler exited zero and the binary is on disk
    Succeeded(StageOutcome),
    /// Compiler exited non-zero, was signalled, or left no binary behind
    Failed(StageOutcome),
    /// Compiler exceeded the compile budget and was killed
    TimedOut { partial: StageOutcome, limit_ms: u64 },
}

/// Outcome of the execution stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Finished(StageOutcome),
    /// Wall-clock budget expired; the process group was killed
    TimedOut { partial: StageOutcome, limit_ms: u64 },
}

/// Closed verdict taxonomy carried alongside every result
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    /// Program exited zero
    #[serde(rename = "OK")]
    Ok,
    /// No working compiler on this host
    #[serde(rename = "TU")]
    ToolchainUnavailable,
    /// Compilation failed or timed out
    #[serde(rename = "CE")]
    CompileError,
    /// Execution exceeded the wall-clock budget
    #[serde(rename = "TLE")]
    TimeLimit,
    /// Classified crash signature (memory violation, abort)
    #[serde(rename = "SIG")]
    Crashed,
    /// Non-zero exit or unclassified signal
    #[serde(rename = "RE")]
    RuntimeError,
    /// Workspace or process plumbing failed
    #[serde(rename = "IE")]
    InternalError,
    /// Request rejected before any work was done
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Verdict::Ok => "OK",
            Verdict::ToolchainUnavailable => "TU",
            Verdict::CompileError => "CE",
            Verdict::TimeLimit => "TLE",
            Verdict::Crashed => "SIG",
            Verdict::RuntimeError => "RE",
            Verdict::InternalError => "IE",
            Verdict::Rejected => "REJECTED",
        };
        f.write_str(code)
    }
}

/// The single value crossing the pipeline boundary.
///
/// `success == true` means `output` is exactly the program's stdout.
/// Otherwise `output` is a non-empty explanation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileResult {
    pub success: bool,
    pub output: String,
    pub verdict: Verdict,
}

impl CompileResult {
    pub fn succeeded(stdout: String) -> Self {
        Self {
            success: true,
            output: stdout,
            verdict: Verdict::Ok,
        }
    }

    /// Failed result; blank explanations are replaced so output is never empty
    pub fn failed(verdict: Verdict, output: String) -> Self {
        let output = if output.trim().is_empty() {
            format!("Request failed ({})", verdict)
        } else {
            output
        };
        Self {
            success: false,
            output,
            verdict,
        }
    }
}

/// Signal escalation report for timeout/forced termination paths.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    /// SIGKILL delivered to the whole process group
    pub group_kill_sent: bool,
    /// SIGKILL delivered to the direct child only (group kill failed)
    pub direct_kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

impl KillReport {
    /// One-line description for timeout logs
    pub fn summary(&self) -> String {
        let action = if self.group_kill_sent {
            "group SIGKILL"
        } else if self.direct_kill_sent {
            "direct SIGKILL"
        } else {
            "no signal sent"
        };

        if self.notes.is_empty() {
            format!("{} in {}ms", action, self.waited_ms)
        } else {
            format!("{} in {}ms ({})", action, self.waited_ms, self.notes.join("; "))
        }
    }
}
