use crate::config::types::{InvocationStyle, PipelineConfig, PipelineError, Result};
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// How child processes for both stages are launched.
///
/// Resolved once alongside the handle so call sites never branch on platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    Direct,
    ShellWrapped { shell: PathBuf },
}

impl Invocation {
    pub fn for_config(config: &PipelineConfig) -> Self {
        match config.invocation {
            InvocationStyle::Direct => Invocation::Direct,
            InvocationStyle::ShellWrapped => Invocation::ShellWrapped {
                shell: config.shell.clone(),
            },
        }
    }
}

/// A verified compiler executable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolchainHandle {
    path: PathBuf,
    invocation: Invocation,
}

impl ToolchainHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// `PATH` with the compiler's directory prepended, when it is not already
    /// on it. The driver needs this to find `cc1plus`, `as` and `ld` next to
    /// an out-of-PATH install.
    pub fn augmented_path_env(&self) -> Option<OsString> {
        let dir = self.path.parent()?;
        let current = std::env::var_os("PATH").unwrap_or_default();
        let mut entries: Vec<PathBuf> = std::env::split_paths(&current).collect();

        if entries.iter().any(|entry| entry == dir) {
            return None;
        }

        entries.insert(0, dir.to_path_buf());
        std::env::join_paths(entries).ok()
    }

    /// First line of `<compiler> --version`
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.path)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                PipelineError::Process(format!(
                    "Failed to run {} --version: {}",
                    self.path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(PipelineError::Process(format!(
                "{} --version exited with {}",
                self.path.display(),
                output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }
}

/// Probes candidate locations and caches the first hit for the process
/// lifetime. Failures are not cached, so installing a compiler later is
/// picked up by the next request.
pub struct ToolchainLocator {
    candidates: Vec<PathBuf>,
    invocation: Invocation,
    resolved: OnceLock<ToolchainHandle>,
}

impl ToolchainLocator {
    pub fn new(candidates: Vec<PathBuf>, invocation: Invocation) -> Self {
        Self {
            candidates,
            invocation,
            resolved: OnceLock::new(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.compiler_candidates.clone(),
            Invocation::for_config(config),
        )
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Cached resolution
    pub fn locate(&self) -> Result<ToolchainHandle> {
        if let Some(handle) = self.resolved.get() {
            return Ok(handle.clone());
        }

        let handle = self.probe()?;
        // A concurrent caller may have won; both resolved the same list
        let _ = self.resolved.set(handle.clone());
        log::info!("Resolved C++ toolchain: {}", handle.path.display());
        Ok(handle)
    }

    /// Uncached resolution
    pub fn probe(&self) -> Result<ToolchainHandle> {
        for candidate in &self.candidates {
            match resolve_candidate(candidate) {
                Some(path) => {
                    log::debug!("Toolchain candidate {} -> {}", candidate.display(), path.display());
                    return Ok(ToolchainHandle {
                        path,
                        invocation: self.invocation.clone(),
                    });
                }
                None => log::debug!("Toolchain candidate {} not usable", candidate.display()),
            }
        }

        Err(PipelineError::ToolchainUnavailable {
            searched: self.candidates.clone(),
        })
    }
}

fn resolve_candidate(candidate: &Path) -> Option<PathBuf> {
    if candidate.as_os_str().is_empty() {
        return None;
    }

    let is_bare_name = !candidate.is_absolute() && candidate.components().count() == 1;
    if !is_bare_name {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .filter(|dir| dir.is_absolute())
        .map(|dir| dir.join(candidate))
        .find(|path| is_executable_file(path))
}

fn is_executable_file(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_compiler(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\necho 'fake g++ 1.0'\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        let second = fake_compiler(dir.path(), "second", 0o755);
        let third = fake_compiler(dir.path(), "third", 0o755);

        let locator = ToolchainLocator::new(
            vec![dir.path().join("missing"), second.clone(), third],
            Invocation::Direct,
        );
        assert_eq!(locator.locate().unwrap().path(), second.as_path());
    }

    #[test]
    fn test_non_executable_candidate_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let plain = fake_compiler(dir.path(), "plain", 0o644);
        let locator = ToolchainLocator::new(vec![plain], Invocation::Direct);

        match locator.locate() {
            Err(PipelineError::ToolchainUnavailable { searched }) => assert_eq!(searched.len(), 1),
            other => panic!("expected ToolchainUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_candidate_list_is_unavailable() {
        let locator = ToolchainLocator::new(Vec::new(), Invocation::Direct);
        assert!(matches!(
            locator.locate(),
            Err(PipelineError::ToolchainUnavailable { .. })
        ));
    }

    #[test]
    fn test_resolution_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = fake_compiler(dir.path(), "g++", 0o755);
        let locator = ToolchainLocator::new(vec![compiler.clone()], Invocation::Direct);

        let first = locator.locate().unwrap();
        fs::remove_file(&compiler).unwrap();
        assert_eq!(locator.locate().unwrap(), first);
        assert!(locator.probe().is_err());
    }

    #[test]
    fn test_version_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = fake_compiler(dir.path(), "g++", 0o755);
        let locator = ToolchainLocator::new(vec![compiler], Invocation::Direct);
        assert_eq!(locator.locate().unwrap().version().unwrap(), "fake g++ 1.0");
    }

    #[test]
    fn test_path_is_augmented_for_out_of_path_install() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = fake_compiler(dir.path(), "g++", 0o755);
        let handle = ToolchainLocator::new(vec![compiler], Invocation::Direct)
            .locate()
            .unwrap();

        let path = handle.augmented_path_env().unwrap();
        let first = std::env::split_paths(&path).next().unwrap();
        assert_eq!(first, dir.path());
    }

    #[test]
    fn test_invocation_follows_config() {
        let mut config = PipelineConfig::default();
        assert_eq!(Invocation::for_config(&config), Invocation::Direct);

        config.invocation = InvocationStyle::ShellWrapped;
        config.shell = PathBuf::from("/bin/sh");
        assert_eq!(
            Invocation::for_config(&config),
            Invocation::ShellWrapped {
                shell: PathBuf::from("/bin/sh")
            }
        );
    }
}
