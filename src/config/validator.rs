// Startup config validation: errors are fatal, warnings are logged by the caller.

use crate::config::types::{InvocationStyle, PipelineConfig, PipelineError, Result};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate config before the pipeline is constructed
pub fn validate_config(config: &PipelineConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_toolchain(config, &mut result);
    validate_timeouts(config, &mut result);
    validate_output_limits(config, &mut result);
    validate_paths(config, &mut result);

    if !result.is_valid() {
        return Err(PipelineError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_toolchain(config: &PipelineConfig, result: &mut ValidationResult) {
    if config.compiler_candidates.is_empty() {
        result.add_error("compiler_candidates cannot be empty".to_string());
    }

    for candidate in &config.compiler_candidates {
        if candidate.as_os_str().is_empty() {
            result.add_error("compiler_candidates contains an empty entry".to_string());
        } else if candidate.is_relative() && candidate.components().count() > 1 {
            result.add_error(format!(
                "compiler candidate must be absolute or a bare name: {}",
                candidate.display()
            ));
        }
    }

    if config.compiler_flags.iter().any(|flag| flag == "-o") {
        result.add_error("compiler_flags must not contain -o; the output path is managed".to_string());
    }
}

fn validate_timeouts(config: &PipelineConfig, result: &mut ValidationResult) {
    if config.execution_timeout_ms == 0 {
        result.add_error("execution_timeout_ms cannot be zero".to_string());
    } else if config.execution_timeout_ms > 10 * 60 * 1000 {
        result.add_warning(format!(
            "execution_timeout_ms {} is above 10 minutes; runaway programs hold a thread that long",
            config.execution_timeout_ms
        ));
    }

    match config.compile_timeout_ms {
        Some(0) => result.add_error("compile_timeout_ms cannot be zero".to_string()),
        Some(_) => {}
        None => result.add_warning("compile_timeout_ms is unset; compilation is unbounded".to_string()),
    }

    if config.collection_timeout_ms == 0 {
        result.add_warning(
            "collection_timeout_ms is zero; output from exited programs may be dropped".to_string(),
        );
    }
}

fn validate_output_limits(config: &PipelineConfig, result: &mut ValidationResult) {
    if config.max_stdout_bytes == 0 {
        result.add_error("max_stdout_bytes cannot be zero".to_string());
    }
    if config.max_stderr_bytes == 0 {
        result.add_error("max_stderr_bytes cannot be zero".to_string());
    }
}

fn validate_paths(config: &PipelineConfig, result: &mut ValidationResult) {
    if !config.scratch_dir.is_absolute() {
        result.add_error(format!(
            "scratch_dir must be absolute path: {:?}",
            config.scratch_dir
        ));
    }

    if config.invocation == InvocationStyle::ShellWrapped && !config.shell.is_absolute() {
        result.add_error(format!(
            "shell must be an absolute path for shell_wrapped invocation: {:?}",
            config.shell
        ));
    }
}
