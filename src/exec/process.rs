/// Scoped child-process handle with process-group termination
use crate::config::types::{PipelineConfig, PipelineError, Result};
use crate::core::types::{KillReport, StageOutcome};
use crate::utils::output::{CollectedStream, StreamCollector};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Most recently spawned, not yet reaped process group (0 when none).
/// Read from signal handlers, so it is a plain atomic.
static ACTIVE_GROUP: AtomicI32 = AtomicI32::new(0);

/// Process group a signal handler should kill before exiting
pub fn active_process_group() -> Option<i32> {
    match ACTIVE_GROUP.load(Ordering::SeqCst) {
        0 => None,
        pgid => Some(pgid),
    }
}

/// Capture budget applied to both streams of one child
#[derive(Clone, Debug)]
pub struct StreamLimits {
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
    /// Grace period for collectors once the child has been reaped
    pub collection: Duration,
}

impl StreamLimits {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            stdout_bytes: config.max_stdout_bytes,
            stderr_bytes: config.max_stderr_bytes,
            collection: config.collection_timeout(),
        }
    }
}

#[derive(Debug)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut { status: ExitStatus, kill: KillReport },
}

/// A child that leads its own process group.
///
/// Dropping an unreaped handle kills the whole group and reaps the leader, so
/// no early return can leak a running process.
pub struct ScopedChild {
    child: Child,
    label: String,
    pgid: Pid,
    started: Instant,
    stdout: Option<StreamCollector>,
    stderr: Option<StreamCollector>,
    limits: StreamLimits,
    early_status: Option<ExitStatus>,
    reaped: bool,
}

impl ScopedChild {
    /// Spawn `cmd` as leader of a new process group with piped stdout/stderr.
    /// Stdin is left as the caller configured it.
    pub fn spawn(mut cmd: Command, label: &str, limits: StreamLimits) -> Result<Self> {
        cmd.process_group(0)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::Process(format!("spawn({}): {}", label, e)))?;

        let pgid = Pid::from_raw(child.id() as i32);
        let stdout = child
            .stdout
            .take()
            .map(|s| StreamCollector::spawn(s, limits.stdout_bytes));
        let stderr = child
            .stderr
            .take()
            .map(|s| StreamCollector::spawn(s, limits.stderr_bytes));

        ACTIVE_GROUP.store(pgid.as_raw(), Ordering::SeqCst);
        log::debug!("Spawned {} as pid {}", label, pgid);

        Ok(Self {
            child,
            label: label.to_string(),
            pgid,
            started: Instant::now(),
            stdout,
            stderr,
            limits,
            early_status: None,
            reaped: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Block until the child exits or `timeout` expires.
    ///
    /// On normal exit any remaining group members are killed before the
    /// leader is reaped. On expiry the whole group is killed.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome> {
        loop {
            if self.poll_exited()? {
                self.sweep_descendants();
                let status = self.reap()?;
                return Ok(WaitOutcome::Exited(status));
            }

            if let Some(limit) = timeout {
                if self.started.elapsed() >= limit {
                    log::warn!(
                        "{} (pid {}) exceeded {}ms; killing process group",
                        self.label,
                        self.pgid,
                        limit.as_millis()
                    );
                    let kill = self.kill_tree();
                    let status = self.reap()?;
                    return Ok(WaitOutcome::TimedOut { status, kill });
                }
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// SIGKILL the whole process group, falling back to the direct child.
    pub fn kill_tree(&mut self) -> KillReport {
        let mut report = KillReport::default();
        let start = Instant::now();

        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) => report.group_kill_sent = true,
            Err(Errno::ESRCH) => report.notes.push("process group already gone".to_string()),
            Err(e) => {
                report.notes.push(format!("group SIGKILL failed: {}", e));
                match self.child.kill() {
                    Ok(()) => report.direct_kill_sent = true,
                    Err(e) => report.notes.push(format!("direct SIGKILL failed: {}", e)),
                }
            }
        }

        report.waited_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Collect both streams and build the stage outcome.
    pub fn finish(mut self, status: ExitStatus) -> StageOutcome {
        let deadline = Instant::now() + self.limits.collection;
        let stdout = self
            .stdout
            .take()
            .map(|c| c.finish(deadline))
            .unwrap_or_default();
        let stderr = self
            .stderr
            .take()
            .map(|c| c.finish(deadline))
            .unwrap_or_default();

        build_outcome(status, stdout, stderr, self.started.elapsed())
    }

    #[cfg(target_os = "linux")]
    fn poll_exited(&mut self) -> Result<bool> {
        // WNOWAIT leaves the leader a zombie, which keeps the pgid reserved
        // until the descendant sweep has run.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::waitid(
                libc::P_PID,
                self.child.id() as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
            )
        };

        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(PipelineError::Process(format!("waitid({}): {}", self.label, err)));
        }

        Ok(unsafe { info.si_pid() } != 0)
    }

    #[cfg(not(target_os = "linux"))]
    fn poll_exited(&mut self) -> Result<bool> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.early_status = Some(status);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(PipelineError::Process(format!("wait({}): {}", self.label, e))),
        }
    }

    fn sweep_descendants(&mut self) {
        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => log::debug!("Descendant sweep for {} failed: {}", self.label, e),
        }
    }

    fn reap(&mut self) -> Result<ExitStatus> {
        let status = match self.early_status.take() {
            Some(status) => status,
            None => self
                .child
                .wait()
                .map_err(|e| PipelineError::Process(format!("wait({}): {}", self.label, e)))?,
        };
        self.reaped = true;
        let _ = ACTIVE_GROUP.compare_exchange(
            self.pgid.as_raw(),
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        Ok(status)
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        if !self.reaped {
            let report = self.kill_tree();
            if !report.notes.is_empty() {
                log::debug!("Drop kill for {}: {}", self.label, report.notes.join("; "));
            }
            let _ = self.child.wait();
            let _ = ACTIVE_GROUP.compare_exchange(
                self.pgid.as_raw(),
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }
}

fn build_outcome(
    status: ExitStatus,
    stdout: CollectedStream,
    stderr: CollectedStream,
    elapsed: Duration,
) -> StageOutcome {
    let output_integrity = stdout.integrity.clone().combine(stderr.integrity.clone());
    StageOutcome {
        exit_code: status.code(),
        signal: status.signal(),
        stdout: stdout.into_text(),
        stderr: stderr.into_text(),
        output_integrity,
        wall_time_ms: elapsed.as_millis() as u64,
    }
}

/// Result of running one stage to completion
#[derive(Debug)]
pub struct StageRun {
    pub outcome: StageOutcome,
    pub timed_out: bool,
    pub kill_report: Option<KillReport>,
}

/// Spawn, wait with an optional budget, and collect output.
pub fn run_stage(
    cmd: Command,
    label: &str,
    timeout: Option<Duration>,
    limits: StreamLimits,
) -> Result<StageRun> {
    let mut child = ScopedChild::spawn(cmd, label, limits)?;

    match child.wait(timeout)? {
        WaitOutcome::Exited(status) => Ok(StageRun {
            outcome: child.finish(status),
            timed_out: false,
            kill_report: None,
        }),
        WaitOutcome::TimedOut { status, kill } => Ok(StageRun {
            outcome: child.finish(status),
            timed_out: true,
            kill_report: Some(kill),
        }),
    }
}
