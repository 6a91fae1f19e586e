/// Compile stage
use crate::config::types::{PipelineConfig, Result};
use crate::core::types::{CompileOutcome, KillReport};
use crate::exec::process::{run_stage, StreamLimits};
use crate::safety::workspace::Workspace;
use crate::toolchain::{Invocation, ToolchainHandle};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Forwards the compiler path and its arguments through `sh -c`
const SHELL_EXEC_SCRIPT: &str = "exec \"$0\" \"$@\"";

/// Proof that the compile stage produced a binary.
///
/// Only [`compile`] can construct one, so the execution stage cannot be
/// started without a successful compilation:
///
/// ```compile_fail
/// use cppbox::exec::compile::CompiledBinary;
/// use cppbox::toolchain::Invocation;
///
/// let forged = CompiledBinary {
///     path: std::path::PathBuf::from("/tmp/program"),
///     invocation: Invocation::Direct,
/// };
/// ```
#[derive(Debug)]
pub struct CompiledBinary {
    path: PathBuf,
    invocation: Invocation,
}

impl CompiledBinary {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }
}

#[derive(Debug)]
pub struct CompileReport {
    pub outcome: CompileOutcome,
    binary: Option<CompiledBinary>,
}

impl CompileReport {
    /// Present only for [`CompileOutcome::Succeeded`]
    pub fn binary(&self) -> Option<&CompiledBinary> {
        self.binary.as_ref()
    }
}

/// Write `code` into the workspace and run the toolchain on it.
pub fn compile(
    code: &str,
    workspace: &Workspace,
    toolchain: &ToolchainHandle,
    config: &PipelineConfig,
) -> Result<CompileReport> {
    let source = workspace.write_source(code)?;
    let binary_path = workspace.binary_path();

    let mut args: Vec<&OsStr> = config.compiler_flags.iter().map(OsStr::new).collect();
    args.extend([source.as_os_str(), OsStr::new("-o"), binary_path.as_os_str()]);

    let mut cmd = match toolchain.invocation() {
        Invocation::Direct => {
            let mut cmd = Command::new(toolchain.path());
            cmd.args(&args);
            cmd
        }
        Invocation::ShellWrapped { shell } => {
            let mut cmd = Command::new(shell);
            cmd.arg("-c")
                .arg(SHELL_EXEC_SCRIPT)
                .arg(toolchain.path())
                .args(&args);
            cmd
        }
    };
    cmd.current_dir(workspace.run_dir()).stdin(Stdio::null());
    if let Some(path) = toolchain.augmented_path_env() {
        cmd.env("PATH", path);
    }

    log::debug!(
        "[{}] Compiling with {}",
        workspace.token(),
        toolchain.path().display()
    );

    let timeout = config.compile_timeout();
    let run = run_stage(cmd, "compile", timeout, StreamLimits::from_config(config))?;

    if run.timed_out {
        let limit_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
        let kill = run
            .kill_report
            .as_ref()
            .map(KillReport::summary)
            .unwrap_or_default();
        log::warn!(
            "[{}] Compilation timed out after {}ms: {}",
            workspace.token(),
            limit_ms,
            kill
        );
        return Ok(CompileReport {
            outcome: CompileOutcome::TimedOut {
                partial: run.outcome,
                limit_ms,
            },
            binary: None,
        });
    }

    // Exit status alone is not enough under a shell wrapper
    if run.outcome.exited_cleanly() && binary_path.is_file() {
        log::debug!(
            "[{}] Compilation succeeded in {}ms",
            workspace.token(),
            run.outcome.wall_time_ms
        );
        return Ok(CompileReport {
            outcome: CompileOutcome::Succeeded(run.outcome),
            binary: Some(CompiledBinary {
                path: binary_path,
                invocation: toolchain.invocation().clone(),
            }),
        });
    }

    log::debug!(
        "[{}] Compilation failed (exit {:?}, signal {:?})",
        workspace.token(),
        run.outcome.exit_code,
        run.outcome.signal
    );
    Ok(CompileReport {
        outcome: CompileOutcome::Failed(run.outcome),
        binary: None,
    })
}
