/// Bounded output collection for child-process streams
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

/// Output integrity classification
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    /// Stream exceeded its byte limit; the excess was discarded
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
    /// Stream was still open when collection gave up (an escaped descendant
    /// kept the pipe alive)
    #[serde(rename = "abandoned")]
    Abandoned,
    #[serde(rename = "read_error")]
    ReadError,
}

impl OutputIntegrity {
    fn severity(&self) -> u8 {
        match self {
            OutputIntegrity::Complete => 0,
            OutputIntegrity::TruncatedByLimit => 1,
            OutputIntegrity::Abandoned => 2,
            OutputIntegrity::ReadError => 3,
        }
    }

    /// Worst of two states
    pub fn combine(self, other: OutputIntegrity) -> OutputIntegrity {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, OutputIntegrity::Complete)
    }
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
            OutputIntegrity::Abandoned => write!(f, "abandoned"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Bytes gathered from one stream
#[derive(Debug, Clone, Default)]
pub struct CollectedStream {
    pub data: Vec<u8>,
    pub integrity: OutputIntegrity,
}

impl CollectedStream {
    pub fn into_text(self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[derive(Default)]
struct SharedBuffer {
    data: Vec<u8>,
    integrity: OutputIntegrity,
}

/// Background reader for one child stream.
///
/// The reader keeps draining past the limit so the child never blocks on a
/// full pipe; only the first `limit` bytes are kept.
pub struct StreamCollector {
    shared: Arc<Mutex<SharedBuffer>>,
    done: Receiver<()>,
}

impl StreamCollector {
    pub fn spawn<R: Read + Send + 'static>(stream: R, limit: usize) -> Self {
        let shared = Arc::new(Mutex::new(SharedBuffer::default()));
        let (tx, done) = channel();
        let worker_shared = Arc::clone(&shared);

        thread::spawn(move || {
            collect_stream(stream, limit, &worker_shared);
            let _ = tx.send(());
        });

        Self { shared, done }
    }

    /// Wait for EOF until `deadline`, then hand back whatever was read.
    pub fn finish(self, deadline: Instant) -> CollectedStream {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let abandoned = match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
            Err(RecvTimeoutError::Timeout) => true,
        };

        let mut guard = match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut integrity = std::mem::take(&mut guard.integrity);
        if abandoned {
            log::warn!("Stream collector did not reach EOF before deadline; keeping partial output");
            integrity = integrity.combine(OutputIntegrity::Abandoned);
        }

        CollectedStream {
            data: std::mem::take(&mut guard.data),
            integrity,
        }
    }
}

/// Collect from a single stream with limit
fn collect_stream<R: Read>(mut stream: R, limit: usize, shared: &Mutex<SharedBuffer>) {
    let mut chunk = [0u8; 8192];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let Ok(mut buffer) = shared.lock() else { break };
                let room = limit.saturating_sub(buffer.data.len());
                if room >= n {
                    buffer.data.extend_from_slice(&chunk[..n]);
                } else {
                    buffer.data.extend_from_slice(&chunk[..room]);
                    buffer.integrity = OutputIntegrity::TruncatedByLimit;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Stream read failed: {}", e);
                if let Ok(mut buffer) = shared.lock() {
                    buffer.integrity = buffer.integrity.clone().combine(OutputIntegrity::ReadError);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn collects_small_stream_completely() {
        let collector = StreamCollector::spawn(Cursor::new(b"hello\n".to_vec()), 1024);
        let collected = collector.finish(deadline());
        assert_eq!(collected.data, b"hello\n");
        assert_eq!(collected.integrity, OutputIntegrity::Complete);
    }

    #[test]
    fn truncates_at_limit_but_drains() {
        let payload = vec![b'x'; 100_000];
        let collector = StreamCollector::spawn(Cursor::new(payload), 10);
        let collected = collector.finish(deadline());
        assert_eq!(collected.data.len(), 10);
        assert_eq!(collected.integrity, OutputIntegrity::TruncatedByLimit);
    }

    #[test]
    fn integrity_combine_keeps_worst() {
        assert_eq!(
            OutputIntegrity::Complete.combine(OutputIntegrity::TruncatedByLimit),
            OutputIntegrity::TruncatedByLimit
        );
        assert_eq!(
            OutputIntegrity::ReadError.combine(OutputIntegrity::Abandoned),
            OutputIntegrity::ReadError
        );
    }

    #[test]
    fn output_integrity_display() {
        assert_eq!(format!("{}", OutputIntegrity::Complete), "complete");
        assert_eq!(format!("{}", OutputIntegrity::TruncatedByLimit), "truncated_by_limit");
        assert_eq!(format!("{}", OutputIntegrity::Abandoned), "abandoned");
        assert_eq!(format!("{}", OutputIntegrity::ReadError), "read_error");
    }
}
