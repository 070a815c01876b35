//! Anti-debug guard.
//!
//! On Apple platforms a traced program can ask the kernel to refuse any later
//! attach with `PT_DENY_ATTACH`, which also hides it from dynamic tracing.
//! The guard answers that request with success and never forwards it. Other
//! platforms have no such request (Linux uses 31 for `PTRACE_SYSEMU`), so
//! there every request goes through unchanged. All calls are reported.

use hookmon_core::{Reporter, Tag, util};
use libc::c_int;

pub const MODULE_NAME: &str = "anti-debug";

/// Darwin `ptrace` request preventing future attaches.
pub const PT_DENY_ATTACH: c_int = 31;

/// Request neutralized on the current platform.
#[cfg(target_vendor = "apple")]
pub const DENIED_REQUEST: Option<c_int> = Some(PT_DENY_ATTACH);
#[cfg(not(target_vendor = "apple"))]
pub const DENIED_REQUEST: Option<c_int> = None;

pub struct PtraceGuard<'a, R> {
    reporter: &'a R,
    denied: Option<c_int>,
}

impl<'a, R: Reporter> PtraceGuard<'a, R> {
    pub fn new(reporter: &'a R) -> Self {
        Self::with_denied(reporter, DENIED_REQUEST)
    }

    /// A guard swallowing `denied` instead of the platform's request.
    pub fn with_denied(reporter: &'a R, denied: Option<c_int>) -> Self {
        Self { reporter, denied }
    }

    /// Reports the call, then either swallows it or runs `forward`, which
    /// performs the real call.
    ///
    /// A swallowed request returns the zero value of `T` without `forward`
    /// being run at all.
    pub fn ptrace<T: Default>(&self, request: c_int, forward: impl FnOnce() -> T) -> T {
        util::preserve_errno(|| util::shielded(|| self.reporter.emit(Tag::Ptrace, "")));
        if self.denied == Some(request) {
            log::debug!(target: MODULE_NAME, "ignoring PT_DENY_ATTACH");
            return T::default();
        }
        forward()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use hookmon_core::{config::ProcessConfig, test_utils::RecordingReporter};

    use super::*;

    #[test]
    fn deny_attach_is_swallowed() {
        let reporter = RecordingReporter::new(ProcessConfig::default());
        let forwarded = Cell::new(false);
        let guard = PtraceGuard::with_denied(&reporter, Some(PT_DENY_ATTACH));
        let ret: c_int = guard.ptrace(PT_DENY_ATTACH, || {
            forwarded.set(true);
            -1
        });

        assert_eq!(ret, 0);
        assert!(!forwarded.get());
        assert_eq!(reporter.payloads(), ["PTRACE:"]);
    }

    #[test]
    fn deny_attach_succeeds_without_real_ptrace() {
        let reporter = RecordingReporter::new(ProcessConfig::default());
        let guard = PtraceGuard::with_denied(&reporter, Some(PT_DENY_ATTACH));
        let ret: libc::c_long = guard.ptrace(PT_DENY_ATTACH, || {
            util::set_errno(libc::ENOSYS);
            -1
        });
        assert_eq!(ret, 0);
    }

    #[test]
    fn other_requests_are_forwarded() {
        let reporter = RecordingReporter::new(ProcessConfig::default());
        let guard = PtraceGuard::with_denied(&reporter, Some(PT_DENY_ATTACH));
        for request in [0, 7, 16, 30, 32] {
            let ret: c_int = guard.ptrace(request, || request + 100);
            assert_eq!(ret, request + 100);
        }
        assert_eq!(reporter.records().len(), 5);
        assert!(reporter.records()[0].body().ends_with(")  : "));
    }

    #[cfg(target_vendor = "apple")]
    #[test]
    fn platform_guard_denies_attach() {
        let reporter = RecordingReporter::new(ProcessConfig::default());
        let ret: c_int = PtraceGuard::new(&reporter).ptrace(PT_DENY_ATTACH, || -1);
        assert_eq!(ret, 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sysemu_is_forwarded_on_linux() {
        let reporter = RecordingReporter::new(ProcessConfig::default());
        let forwarded = Cell::new(false);
        // PTRACE_SYSEMU
        let ret: libc::c_long = PtraceGuard::new(&reporter).ptrace(31, || {
            forwarded.set(true);
            42
        });

        assert_eq!(ret, 42);
        assert!(forwarded.get());
        assert_eq!(reporter.payloads(), ["PTRACE:"]);
    }
}
