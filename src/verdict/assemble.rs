/// Result assembly
///
/// Folds the two stage outcomes into the single `CompileResult` a caller
/// sees. Precedence is fixed: toolchain, compile, timeout, crash, non-zero
/// exit, success.
use crate::config::types::PipelineError;
use crate::core::types::{
    CompileOutcome, CompileResult, ExecutionOutcome, StageOutcome, Verdict,
};
use crate::verdict::classify::{signal_name, CrashSignature};
use std::path::PathBuf;

pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(compile: &CompileOutcome, execution: Option<&ExecutionOutcome>) -> CompileResult {
        match compile {
            CompileOutcome::ToolchainUnavailable { searched } => Self::toolchain_unavailable(searched),
            CompileOutcome::Failed(stage) => Self::compile_failed(stage),
            CompileOutcome::TimedOut { partial, limit_ms } => {
                let mut text = format!("Compilation timed out after {}", format_limit(*limit_ms));
                push_section(&mut text, &diagnostics(partial));
                CompileResult::failed(Verdict::CompileError, text)
            }
            CompileOutcome::Succeeded(_) => match execution {
                Some(ExecutionOutcome::TimedOut { partial, limit_ms }) => {
                    Self::execution_timed_out(partial, *limit_ms)
                }
                Some(ExecutionOutcome::Finished(stage)) => Self::execution_finished(stage),
                None => CompileResult::failed(
                    Verdict::InternalError,
                    "Error: compilation succeeded but the program was never executed".to_string(),
                ),
            },
        }
    }

    /// Fold a plumbing failure into a result
    pub fn internal_failure(err: &PipelineError) -> CompileResult {
        match err {
            PipelineError::ToolchainUnavailable { searched } => Self::toolchain_unavailable(searched),
            PipelineError::InvalidRequest(message) => {
                CompileResult::failed(Verdict::Rejected, message.clone())
            }
            other => CompileResult::failed(Verdict::InternalError, format!("Error: {}", other)),
        }
    }

    fn toolchain_unavailable(searched: &[PathBuf]) -> CompileResult {
        let err = PipelineError::ToolchainUnavailable {
            searched: searched.to_vec(),
        };
        CompileResult::failed(Verdict::ToolchainUnavailable, err.to_string())
    }

    fn compile_failed(stage: &StageOutcome) -> CompileResult {
        let text = diagnostics(stage);
        if !text.is_empty() {
            return CompileResult::failed(Verdict::CompileError, text);
        }

        let text = match (stage.exit_code, stage.signal) {
            (_, Some(signal)) => format!(
                "Compiler terminated by signal {} ({})",
                signal,
                signal_name(signal)
            ),
            (Some(0), None) => "Compiler exited successfully but produced no binary".to_string(),
            (Some(code), None) => format!("Compilation failed with exit code {}", code),
            (None, None) => "Compilation failed".to_string(),
        };
        CompileResult::failed(Verdict::CompileError, text)
    }

    fn execution_timed_out(partial: &StageOutcome, limit_ms: u64) -> CompileResult {
        let mut text = format!("Execution timed out after {}", format_limit(limit_ms));
        if !partial.stdout.is_empty() {
            text.push_str("\nOutput before timeout:\n");
            text.push_str(&partial.stdout);
        }
        CompileResult::failed(Verdict::TimeLimit, text)
    }

    fn execution_finished(stage: &StageOutcome) -> CompileResult {
        if let Some(signal) = stage.signal {
            if let Some(crash) = CrashSignature::from_signal(signal) {
                let mut text = format!("{} [{}]", crash.description(), signal_name(signal));
                push_section(&mut text, &stage.stdout);
                return CompileResult::failed(Verdict::Crashed, text);
            }

            let text = format!(
                "Program terminated by signal {} ({}){}",
                signal,
                signal_name(signal),
                captured_output(stage)
            );
            return CompileResult::failed(Verdict::RuntimeError, text);
        }

        match stage.exit_code {
            Some(0) => CompileResult::succeeded(stage.stdout.clone()),
            Some(code) => CompileResult::failed(
                Verdict::RuntimeError,
                format!("Program exited with code {}{}", code, captured_output(stage)),
            ),
            None => CompileResult::failed(
                Verdict::InternalError,
                "Error: program finished without an exit status".to_string(),
            ),
        }
    }
}

/// Compiler diagnostics: stderr first, then stdout
fn diagnostics(stage: &StageOutcome) -> String {
    [stage.stderr.trim_end(), stage.stdout.trim_end()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

fn captured_output(stage: &StageOutcome) -> String {
    let mut text = String::new();
    if !stage.stdout.is_empty() {
        text.push('\n');
        text.push_str(&stage.stdout);
    }
    if !stage.stderr.is_empty() {
        text.push_str("\nErrors: ");
        text.push_str(&stage.stderr);
    }
    text
}

fn push_section(text: &mut String, section: &str) {
    if !section.is_empty() {
        text.push('\n');
        text.push_str(section);
    }
}

fn format_limit(limit_ms: u64) -> String {
    if limit_ms % 1000 == 0 {
        let secs = limit_ms / 1000;
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    } else {
        format!("{}ms", limit_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(code: i32, stdout: &str, stderr: &str) -> StageOutcome {
        StageOutcome {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    fn signalled(signal: i32, stdout: &str) -> StageOutcome {
        StageOutcome {
            signal: Some(signal),
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    fn compiled() -> CompileOutcome {
        CompileOutcome::Succeeded(exited(0, "", ""))
    }

    #[test]
    fn test_toolchain_unavailable_wins() {
        let result = ResultAssembler::assemble(
            &CompileOutcome::ToolchainUnavailable {
                searched: vec![PathBuf::from("/usr/bin/g++")],
            },
            None,
        );
        assert!(!result.success);
        assert_eq!(result.verdict, Verdict::ToolchainUnavailable);
        assert!(result.output.contains("/usr/bin/g++"));
    }

    #[test]
    fn test_compile_diagnostics_stderr_then_stdout() {
        let stage = exited(1, "note: from stdout\n", "main.cpp:1: error: expected ')'\n");
        let result = ResultAssembler::assemble(&CompileOutcome::Failed(stage), None);
        assert_eq!(result.verdict, Verdict::CompileError);
        assert_eq!(
            result.output,
            "main.cpp:1: error: expected ')'\nnote: from stdout"
        );
    }

    #[test]
    fn test_compile_failure_without_diagnostics_mentions_code() {
        let result = ResultAssembler::assemble(&CompileOutcome::Failed(exited(4, "", "")), None);
        assert_eq!(result.output, "Compilation failed with exit code 4");

        let no_binary = ResultAssembler::assemble(&CompileOutcome::Failed(exited(0, "", "")), None);
        assert!(no_binary.output.contains("no binary"));
    }

    #[test]
    fn test_compile_timeout() {
        let result = ResultAssembler::assemble(
            &CompileOutcome::TimedOut {
                partial: StageOutcome::default(),
                limit_ms: 60_000,
            },
            None,
        );
        assert_eq!(result.verdict, Verdict::CompileError);
        assert_eq!(result.output, "Compilation timed out after 60 seconds");
    }

    #[test]
    fn test_execution_timeout_includes_partial_stdout() {
        let result = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::TimedOut {
                partial: signalled(libc::SIGKILL, "tick\n"),
                limit_ms: 1_000,
            }),
        );
        assert_eq!(result.verdict, Verdict::TimeLimit);
        assert_eq!(
            result.output,
            "Execution timed out after 1 second\nOutput before timeout:\ntick\n"
        );
    }

    #[test]
    fn test_crash_description_precedes_output() {
        let result = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::Finished(signalled(libc::SIGSEGV, "before\n"))),
        );
        assert_eq!(result.verdict, Verdict::Crashed);
        assert!(result.output.starts_with("Runtime error: memory access violation"));
        assert!(result.output.contains("[SIGSEGV]"));
        assert!(result.output.ends_with("before\n"));
    }

    #[test]
    fn test_abort_is_classified_crash() {
        let result = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::Finished(signalled(libc::SIGABRT, ""))),
        );
        assert_eq!(result.verdict, Verdict::Crashed);
        assert!(result.output.contains("SIGABRT"));
    }

    #[test]
    fn test_unclassified_signal_is_runtime_error() {
        let result = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::Finished(signalled(libc::SIGTERM, ""))),
        );
        assert_eq!(result.verdict, Verdict::RuntimeError);
        assert_eq!(result.output, "Program terminated by signal 15 (SIGTERM)");
    }

    #[test]
    fn test_nonzero_exit_reports_code_and_streams() {
        let result = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::Finished(exited(1, "partial\n", "oops\n"))),
        );
        assert_eq!(result.verdict, Verdict::RuntimeError);
        assert_eq!(result.output, "Program exited with code 1\npartial\n\nErrors: oops\n");
    }

    #[test]
    fn test_zero_exit_returns_stdout_exactly() {
        let result = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::Finished(exited(0, "Hello\n", "warning\n"))),
        );
        assert!(result.success);
        assert_eq!(result.output, "Hello\n");

        let empty = ResultAssembler::assemble(
            &compiled(),
            Some(&ExecutionOutcome::Finished(exited(0, "", ""))),
        );
        assert!(empty.success);
        assert_eq!(empty.output, "");
    }

    #[test]
    fn test_missing_execution_is_internal_error() {
        let result = ResultAssembler::assemble(&compiled(), None);
        assert_eq!(result.verdict, Verdict::InternalError);
    }

    #[test]
    fn test_internal_failure_prefixes_error() {
        let err = PipelineError::Workspace("disk full".to_string());
        let result = ResultAssembler::internal_failure(&err);
        assert_eq!(result.verdict, Verdict::InternalError);
        assert!(result.output.starts_with("Error: "));
        assert!(result.output.contains("disk full"));
    }
}
