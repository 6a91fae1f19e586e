/// Workspace management for request-scoped artifacts
use crate::config::types::{PipelineError, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const SOURCE_FILE: &str = "source.cpp";
const BINARY_FILE: &str = "program";
const OUTPUT_FILE: &str = "stdout.txt";
const INPUT_FILE: &str = "stdin.txt";
const EXIT_CODE_FILE: &str = "exit_code";

/// What `release` managed to delete
#[derive(Debug, Default, Clone)]
pub struct ReleaseReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scratch area owned by exactly one request.
///
/// Every path is derived from a random UUIDv4 token, never from request
/// content. Files are created lazily; `release` tolerates any of them being
/// absent.
pub struct Workspace {
    token: String,
    run_dir: PathBuf,
    released: bool,
}

impl Workspace {
    fn create(base_dir: &Path) -> Result<Self> {
        let token = Uuid::new_v4().to_string();
        let run_dir = base_dir.join(&token);

        // create_dir (not create_dir_all) so an existing path is an error
        fs::DirBuilder::new()
            .mode(0o700)
            .create(&run_dir)
            .map_err(|e| {
                PipelineError::Workspace(format!(
                    "Failed to create workspace directory {}: {}",
                    run_dir.display(),
                    e
                ))
            })?;

        log::debug!("Acquired workspace {}", token);

        Ok(Self {
            token,
            run_dir,
            released: false,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn source_path(&self) -> PathBuf {
        self.run_dir.join(SOURCE_FILE)
    }

    pub fn binary_path(&self) -> PathBuf {
        self.run_dir.join(BINARY_FILE)
    }

    /// Reserved capture path; stdout normally stays on a pipe
    pub fn output_path(&self) -> PathBuf {
        self.run_dir.join(OUTPUT_FILE)
    }

    pub fn input_path(&self) -> PathBuf {
        self.run_dir.join(INPUT_FILE)
    }

    pub fn exit_code_path(&self) -> PathBuf {
        self.run_dir.join(EXIT_CODE_FILE)
    }

    /// All file paths this workspace owns, in removal order
    pub fn owned_paths(&self) -> Vec<PathBuf> {
        vec![
            self.source_path(),
            self.binary_path(),
            self.output_path(),
            self.input_path(),
            self.exit_code_path(),
        ]
    }

    /// Write source text verbatim
    pub fn write_source(&self, code: &str) -> Result<PathBuf> {
        let path = self.source_path();
        write_artifact(&path, code.as_bytes())?;
        Ok(path)
    }

    /// Write stdin bytes verbatim (no terminator added)
    pub fn write_input(&self, input: &str) -> Result<PathBuf> {
        let path = self.input_path();
        write_artifact(&path, input.as_bytes())?;
        Ok(path)
    }

    /// Delete every owned artifact and the run directory.
    ///
    /// Failures are recorded and logged, never returned.
    pub fn release(mut self) -> ReleaseReport {
        self.release_inner()
    }

    fn release_inner(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        // The program shares our uid and may have chmod'ed its own directory
        restore_owner_access(&self.run_dir);

        for path in self.owned_paths() {
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!(
                        "[{}] Failed to remove {}: {}",
                        self.token,
                        path.display(),
                        e
                    );
                    report.failures.push((path, e.to_string()));
                }
            }
        }

        // Anything the program itself dropped into its working directory
        match remove_tree(&self.run_dir) {
            Ok(()) => report.removed.push(self.run_dir.clone()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(
                    "[{}] Failed to remove workspace directory {}: {}",
                    self.token,
                    self.run_dir.display(),
                    e
                );
                report.failures.push((self.run_dir.clone(), e.to_string()));
            }
        }

        log::debug!(
            "Released workspace {} ({} removed, {} failures)",
            self.token,
            report.removed.len(),
            report.failures.len()
        );
        report
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release_inner();
        }
    }
}

/// Make `dir` and every directory below it owner-rwx so the tree can be
/// removed. Symlinks are never followed.
fn restore_owner_access(dir: &Path) {
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        _ => return,
    }
    if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
        log::debug!("Failed to reset permissions on {}: {}", dir.display(), e);
        return;
    }

    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            restore_owner_access(&entry.path());
        }
    }
}

/// `remove_dir_all` after restoring owner access to the whole subtree
fn remove_tree(dir: &Path) -> std::io::Result<()> {
    restore_owner_access(dir);
    fs::remove_dir_all(dir)
}

fn write_artifact(path: &Path, content: &[u8]) -> Result<()> {
    fs::write(path, content).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", path.display(), e),
        ))
    })
}

/// Allocates workspaces under one scratch directory
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| {
            PipelineError::Workspace(format!(
                "Failed to create scratch directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Allocate a fresh workspace with a new random token
    pub fn acquire(&self) -> Result<Workspace> {
        Workspace::create(&self.base_dir)
    }

    /// Remove leftover workspaces older than `max_age`.
    ///
    /// Only directories whose names parse as UUIDs are touched, so unrelated
    /// content sharing the scratch directory survives.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<usize> {
        let mut cleaned = 0;
        let now = SystemTime::now();

        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(PipelineError::Workspace(format!(
                    "Failed to read scratch directory {}: {}",
                    self.base_dir.display(),
                    e
                )))
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let is_workspace = entry
                .file_name()
                .to_str()
                .map(|name| Uuid::parse_str(name).is_ok())
                .unwrap_or(false);
            if !is_workspace {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) if m.is_dir() => m,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Failed to get metadata for {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = match metadata.modified().map(|m| now.duration_since(m)) {
                Ok(Ok(age)) => age,
                // Unreadable or future timestamp
                _ => continue,
            };

            if age >= max_age {
                log::info!("Removing stale workspace: {}", path.display());
                match remove_tree(&path) {
                    Ok(()) => cleaned += 1,
                    Err(e) => {
                        log::warn!("Failed to remove stale workspace {}: {}", path.display(), e)
                    }
                }
            }
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, WorkspaceManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path().join("scratch")).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_workspace_paths_are_derived_from_token() {
        let (_dir, manager) = manager();
        let workspace = manager.acquire().unwrap();

        assert!(workspace.run_dir().is_dir());
        assert!(workspace.run_dir().ends_with(workspace.token()));
        for path in workspace.owned_paths() {
            assert_eq!(path.parent(), Some(workspace.run_dir()));
        }
        workspace.release();
    }

    #[test]
    fn test_tokens_never_collide() {
        let (_dir, manager) = manager();
        let a = manager.acquire().unwrap();
        let b = manager.acquire().unwrap();
        assert_ne!(a.token(), b.token());
        assert_ne!(a.source_path(), b.source_path());
    }

    #[test]
    fn test_release_removes_everything() {
        let (_dir, manager) = manager();
        let workspace = manager.acquire().unwrap();
        let source = workspace.write_source("int main() {}").unwrap();
        workspace.write_input("John Doe").unwrap();
        std::fs::write(workspace.run_dir().join("stray.txt"), b"left by program").unwrap();
        let run_dir = workspace.run_dir().to_path_buf();

        let report = workspace.release();
        assert!(report.is_clean());
        assert!(!source.exists());
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_release_tolerates_missing_files() {
        let (_dir, manager) = manager();
        let workspace = manager.acquire().unwrap();
        // Nothing but the directory was ever created
        let report = workspace.release();
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 1);
    }

    #[test]
    fn test_release_recovers_from_revoked_permissions() {
        let (_dir, manager) = manager();
        let workspace = manager.acquire().unwrap();
        workspace.write_source("int main() {}").unwrap();
        let nested = workspace.run_dir().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("f"), b"x").unwrap();
        std::fs::set_permissions(&nested, fs::Permissions::from_mode(0o000)).unwrap();
        std::fs::set_permissions(workspace.run_dir(), fs::Permissions::from_mode(0o000)).unwrap();
        let run_dir = workspace.run_dir().to_path_buf();

        let report = workspace.release();
        assert!(report.is_clean(), "{:?}", report.failures);
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_sweep_removes_locked_workspace() {
        let (_dir, manager) = manager();
        let stale = manager.base_dir().join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(stale.join("inner")).unwrap();
        std::fs::set_permissions(stale.join("inner"), fs::Permissions::from_mode(0o000)).unwrap();
        std::fs::set_permissions(&stale, fs::Permissions::from_mode(0o000)).unwrap();

        assert_eq!(manager.sweep_stale(Duration::from_secs(0)).unwrap(), 1);
        assert!(!stale.exists());
    }

    #[test]
    fn test_drop_releases_workspace() {
        let (_dir, manager) = manager();
        let run_dir = {
            let workspace = manager.acquire().unwrap();
            workspace.write_source("x").unwrap();
            workspace.run_dir().to_path_buf()
        };
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_input_written_byte_for_byte() {
        let (_dir, manager) = manager();
        let workspace = manager.acquire().unwrap();
        let path = workspace.write_input("no newline").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"no newline");
    }

    #[test]
    fn test_sweep_only_touches_uuid_directories() {
        let (_dir, manager) = manager();
        let stale = manager.base_dir().join(Uuid::new_v4().to_string());
        std::fs::create_dir(&stale).unwrap();
        let unrelated = manager.base_dir().join("keep-me");
        std::fs::create_dir(&unrelated).unwrap();

        let cleaned = manager.sweep_stale(Duration::from_secs(0)).unwrap();
        assert_eq!(cleaned, 1);
        assert!(!stale.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_sweep_keeps_fresh_workspaces() {
        let (_dir, manager) = manager();
        let workspace = manager.acquire().unwrap();
        let cleaned = manager.sweep_stale(Duration::from_secs(3600)).unwrap();
        assert_eq!(cleaned, 0);
        assert!(workspace.run_dir().exists());
    }
}
