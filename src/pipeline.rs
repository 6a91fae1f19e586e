/// Compile-and-run pipeline
///
/// Owns the immutable configuration, the scratch directory and the cached
/// toolchain. Every request gets its own workspace, which is released on
/// every exit path, panics included.
use crate::config::types::{PipelineConfig, PipelineError, Result};
use crate::config::validator::validate_config;
use crate::core::types::{CompileOutcome, CompileResult, Verdict};
use crate::exec::compile::compile;
use crate::exec::execute::execute;
use crate::safety::workspace::{Workspace, WorkspaceManager};
use crate::toolchain::{ToolchainHandle, ToolchainLocator};
use crate::verdict::ResultAssembler;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

pub const EMPTY_CODE_MESSAGE: &str = "Code cannot be empty";

pub struct Pipeline {
    config: PipelineConfig,
    workspaces: WorkspaceManager,
    locator: ToolchainLocator,
}

impl Pipeline {
    /// Validate `config`, prepare the scratch directory and sweep stale
    /// workspaces when configured.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let validation = validate_config(&config)?;
        for warning in &validation.warnings {
            log::warn!("Config: {}", warning);
        }

        let workspaces = WorkspaceManager::new(config.scratch_dir.clone())?;
        if let Some(max_age) = config.stale_workspace_max_age_secs {
            match workspaces.sweep_stale(Duration::from_secs(max_age)) {
                Ok(0) => {}
                Ok(n) => log::info!("Removed {} stale workspace(s)", n),
                Err(e) => log::warn!("Stale workspace sweep failed: {}", e),
            }
        }

        let locator = ToolchainLocator::from_config(&config);

        Ok(Self {
            config,
            workspaces,
            locator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Resolved compiler, cached after the first success
    pub fn toolchain(&self) -> Result<ToolchainHandle> {
        self.locator.locate()
    }

    /// Compile `code`, run it with optional stdin, and report one result.
    ///
    /// Never fails: every error kind becomes a `CompileResult`.
    pub fn compile_and_run(&self, code: &str, input: Option<&str>) -> CompileResult {
        if code.trim().is_empty() {
            let err = PipelineError::InvalidRequest(EMPTY_CODE_MESSAGE.to_string());
            return ResultAssembler::internal_failure(&err);
        }

        self.run_in_workspace(|workspace| self.run_stages(code, input, workspace))
    }

    /// Run `stages` in a fresh workspace, folding errors and panics into a
    /// result and releasing the workspace afterwards.
    fn run_in_workspace<F>(&self, stages: F) -> CompileResult
    where
        F: FnOnce(&Workspace) -> Result<CompileResult>,
    {
        let started = Instant::now();
        let workspace = match self.workspaces.acquire() {
            Ok(workspace) => workspace,
            Err(e) => {
                log::error!("Failed to acquire workspace: {}", e);
                return ResultAssembler::internal_failure(&e);
            }
        };
        let token = workspace.token().to_string();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| stages(&workspace)));

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("[{}] Request failed: {}", token, e);
                ResultAssembler::internal_failure(&e)
            }
            Err(_) => {
                log::error!("[{}] Request panicked", token);
                CompileResult::failed(
                    Verdict::InternalError,
                    "Error: internal failure while processing request".to_string(),
                )
            }
        };

        let report = workspace.release();
        if !report.is_clean() {
            log::warn!(
                "[{}] {} artifact(s) could not be removed",
                token,
                report.failures.len()
            );
        }

        log::info!(
            "[{}] {} in {}ms",
            token,
            result.verdict,
            started.elapsed().as_millis()
        );
        result
    }

    fn run_stages(
        &self,
        code: &str,
        input: Option<&str>,
        workspace: &Workspace,
    ) -> Result<CompileResult> {
        let toolchain = match self.locator.locate() {
            Ok(handle) => handle,
            Err(PipelineError::ToolchainUnavailable { searched }) => {
                log::error!("[{}] No usable C++ compiler", workspace.token());
                return Ok(ResultAssembler::assemble(
                    &CompileOutcome::ToolchainUnavailable { searched },
                    None,
                ));
            }
            Err(e) => return Err(e),
        };

        let report = compile(code, workspace, &toolchain, &self.config)?;
        let execution = match report.binary() {
            Some(binary) => Some(execute(binary, workspace, input, &self.config)?),
            None => None,
        };

        Ok(ResultAssembler::assemble(&report.outcome, execution.as_ref()))
    }
}
