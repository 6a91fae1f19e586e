/// Execution stage
use crate::config::types::{PipelineConfig, PipelineError, Result};
use crate::core::types::{ExecutionOutcome, StageOutcome};
use crate::exec::compile::CompiledBinary;
use crate::exec::process::{run_stage, StreamLimits};
use crate::safety::workspace::Workspace;
use crate::toolchain::Invocation;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

/// Runs `$0` with stdin from `$1` and records `$?` in `$2`. Stdout stays on
/// the wrapper's pipe so the capture limit applies while the program runs.
const SHELL_RUN_SCRIPT: &str = "\"$0\" <\"$1\"; echo $? >\"$2\"";

const EXEC_PATH: &str = "/usr/bin:/bin";

/// Run a compiled program inside its workspace under the execution budget.
///
/// Non-empty `input` is delivered byte for byte on stdin; otherwise stdin is
/// empty.
pub fn execute(
    binary: &CompiledBinary,
    workspace: &Workspace,
    input: Option<&str>,
    config: &PipelineConfig,
) -> Result<ExecutionOutcome> {
    let input_path = match input {
        Some(text) if !text.is_empty() => Some(workspace.write_input(text)?),
        _ => None,
    };

    let mut cmd = match binary.invocation() {
        Invocation::Direct => {
            let mut cmd = Command::new(binary.path());
            let stdin = match &input_path {
                Some(path) => Stdio::from(File::open(path).map_err(|e| {
                    PipelineError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to open {}: {}", path.display(), e),
                    ))
                })?),
                None => Stdio::null(),
            };
            cmd.stdin(stdin);
            cmd
        }
        Invocation::ShellWrapped { shell } => {
            let stdin_source = input_path
                .as_deref()
                .unwrap_or_else(|| Path::new("/dev/null"));
            let mut cmd = Command::new(shell);
            cmd.arg("-c")
                .arg(SHELL_RUN_SCRIPT)
                .arg(binary.path())
                .arg(stdin_source)
                .arg(workspace.exit_code_path())
                .stdin(Stdio::null());
            cmd
        }
    };

    cmd.current_dir(workspace.run_dir())
        .env_clear()
        .env("PATH", EXEC_PATH)
        .env("HOME", workspace.run_dir())
        .env("LANG", "C");

    let timeout = config.execution_timeout();
    let run = run_stage(
        cmd,
        "execute",
        Some(timeout),
        StreamLimits::from_config(config),
    )?;

    let mut outcome = run.outcome;
    if let Invocation::ShellWrapped { .. } = binary.invocation() {
        if !run.timed_out {
            apply_recorded_status(&mut outcome, workspace);
        }
    }

    if !outcome.output_integrity.is_complete() {
        log::info!(
            "[{}] Program output {}",
            workspace.token(),
            outcome.output_integrity
        );
    }

    if run.timed_out {
        if let Some(kill) = &run.kill_report {
            log::warn!(
                "[{}] Program timed out after {}ms: {}",
                workspace.token(),
                timeout.as_millis(),
                kill.summary()
            );
        }
        return Ok(ExecutionOutcome::TimedOut {
            partial: outcome,
            limit_ms: timeout.as_millis() as u64,
        });
    }

    log::debug!(
        "[{}] Program finished in {}ms (exit {:?}, signal {:?})",
        workspace.token(),
        outcome.wall_time_ms,
        outcome.exit_code,
        outcome.signal
    );
    Ok(ExecutionOutcome::Finished(outcome))
}

/// Replace the wrapper shell's status with the one it recorded for the
/// program. A missing or unreadable record keeps the shell's own status.
fn apply_recorded_status(outcome: &mut StageOutcome, workspace: &Workspace) {
    let recorded = std::fs::read_to_string(workspace.exit_code_path())
        .ok()
        .and_then(|text| text.trim().parse::<i32>().ok());

    if let Some(code) = recorded {
        let (exit_code, signal) = decode_shell_status(code);
        outcome.exit_code = exit_code;
        outcome.signal = signal;
    }
}

/// Shells report death by signal N as exit status 128+N
pub fn decode_shell_status(code: i32) -> (Option<i32>, Option<i32>) {
    if code > 128 && code < 128 + 65 {
        (None, Some(code - 128))
    } else {
        (Some(code), None)
    }
}
