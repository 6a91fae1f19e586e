/// Crash signature classification for terminating signals
use nix::sys::signal::Signal;

/// Signals that mark abnormal termination rather than a deliberate exit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrashSignature {
    /// SIGSEGV / SIGBUS: invalid memory access, including stack overflow
    MemoryViolation,
    /// SIGABRT: abort(), failed assertion, uncaught exception
    AbnormalAbort,
}

impl CrashSignature {
    pub fn from_signal(signal: i32) -> Option<Self> {
        match Signal::try_from(signal).ok()? {
            Signal::SIGSEGV | Signal::SIGBUS => Some(CrashSignature::MemoryViolation),
            Signal::SIGABRT => Some(CrashSignature::AbnormalAbort),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CrashSignature::MemoryViolation => {
                "Runtime error: memory access violation (segmentation fault or stack overflow)"
            }
            CrashSignature::AbnormalAbort => {
                "Runtime error: program aborted (failed assertion, uncaught exception or stack exhaustion)"
            }
        }
    }
}

/// `SIGSEGV`-style name, or `signal N` for numbers nix does not know
pub fn signal_name(signal: i32) -> String {
    match Signal::try_from(signal) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("signal {}", signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_signatures() {
        assert_eq!(
            CrashSignature::from_signal(libc::SIGSEGV),
            Some(CrashSignature::MemoryViolation)
        );
        assert_eq!(
            CrashSignature::from_signal(libc::SIGBUS),
            Some(CrashSignature::MemoryViolation)
        );
        assert_eq!(
            CrashSignature::from_signal(libc::SIGABRT),
            Some(CrashSignature::AbnormalAbort)
        );
        assert_eq!(CrashSignature::from_signal(libc::SIGTERM), None);
        assert_eq!(CrashSignature::from_signal(9999), None);
    }

    #[test]
    fn test_signal_name() {
        assert_eq!(signal_name(libc::SIGSEGV), "SIGSEGV");
        assert_eq!(signal_name(9999), "signal 9999");
    }
}
