use crate::api::{handle, CompileRequest, VersionInfo};
use crate::config::types::PipelineConfig;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file (defaults to ./cppbox.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a C++ program, printing the JSON response
    Run {
        /// Source code as string
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,
        /// Read source code from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Input data to pass to stdin
        #[arg(long, conflicts_with = "stdin_file")]
        stdin: Option<String>,
        /// Read stdin data from a file
        #[arg(long)]
        stdin_file: Option<PathBuf>,
        /// Execution wall-clock limit in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Probe compiler candidates and report the one that resolves
    CheckToolchain {
        /// Print every candidate and its status
        #[arg(long)]
        verbose: bool,
    },
    /// Print crate and compiler versions as JSON
    Version,
    /// Remove leftover workspaces from the scratch directory
    Sweep {
        /// Minimum age in seconds
        #[arg(long, default_value_t = 3600)]
        max_age: u64,
    },
}

extern "C" fn signal_handler(sig: i32) {
    // Only async-signal-safe calls: kill(2), write(2), _exit(2)
    if let Some(pgid) = crate::exec::process::active_process_group() {
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }

    let msg = b"cppbox: signal received, exiting\n";
    unsafe {
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::_exit(128 + sig);
    }
}

fn setup_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as usize);
        libc::signal(libc::SIGINT, signal_handler as usize);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load_from_file(path)?,
        None => PipelineConfig::load_default()?,
    };
    Ok(config)
}

/// `--timeout` seconds as milliseconds, saturating instead of wrapping
fn timeout_secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

pub fn run() -> Result<()> {
    setup_signal_handlers();
    env_logger::init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            code,
            file,
            stdin,
            stdin_file,
            timeout,
        } => {
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read source file {}", path.display()))?,
                (None, None) => anyhow::bail!("either --code or --file is required"),
            };
            let input = match (stdin, stdin_file) {
                (Some(text), _) => Some(text),
                (None, Some(path)) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read stdin file {}", path.display()))?,
                ),
                (None, None) => None,
            };
            if let Some(secs) = timeout {
                config.execution_timeout_ms = timeout_secs_to_ms(secs);
            }

            let pipeline = Pipeline::new(config)?;
            let (status, response) = handle(&pipeline, &CompileRequest { code, input });
            println!("{}", serde_json::to_string_pretty(&response)?);

            if !response.success {
                log::debug!("Request finished with status {}", status.http_code());
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::CheckToolchain { verbose } => {
            let pipeline = Pipeline::new(config)?;

            if verbose {
                for candidate in &pipeline.config().compiler_candidates {
                    let single = crate::toolchain::ToolchainLocator::new(
                        vec![candidate.clone()],
                        crate::toolchain::Invocation::Direct,
                    );
                    match single.probe() {
                        Ok(handle) => {
                            println!("  {} -> {}", candidate.display(), handle.path().display())
                        }
                        Err(_) => println!("  {} -> NOT FOUND", candidate.display()),
                    }
                }
            }

            match pipeline.toolchain() {
                Ok(handle) => {
                    let version = handle
                        .version()
                        .unwrap_or_else(|e| format!("version unavailable ({})", e));
                    println!("C++ toolchain: {} ({})", handle.path().display(), version);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Version => {
            let pipeline = Pipeline::new(config)?;
            let info = VersionInfo::collect(&pipeline);
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
        Commands::Sweep { max_age } => {
            // Sweep explicitly rather than on construction
            config.stale_workspace_max_age_secs = None;
            let pipeline = Pipeline::new(config)?;
            let removed = pipeline
                .workspaces()
                .sweep_stale(Duration::from_secs(max_age))?;
            eprintln!(
                "Removed {} stale workspace(s) from {}",
                removed,
                pipeline.workspaces().base_dir().display()
            );
            Ok(())
        }
    }
}
