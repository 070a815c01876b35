//! Exported symbols shadowing libc.
//!
//! Each export takes the reentrancy guard and runs the hook, or forwards
//! straight to the real call when the monitor itself is the caller.

use std::ffi::{CStr, c_char};

use hookmon_core::{MonitorContext, util};

#[cfg(feature = "file-activity")]
mod files;
#[cfg(feature = "process-lifecycle")]
mod process;
#[cfg(all(feature = "anti-debug", any(target_os = "linux", target_vendor = "apple")))]
mod ptrace;

/// State shared by every hook of the process.
static CONTEXT: MonitorContext = MonitorContext::new();

/// Borrows a path argument, `None` if null.
///
/// # Safety
///
/// A non null `path` is a valid C string for `'a`.
#[allow(dead_code)]
unsafe fn c_path<'a>(path: *const c_char) -> Option<&'a CStr> {
    // SAFETY: checked non null, validity per contract.
    (!path.is_null()).then(|| unsafe { CStr::from_ptr(path) })
}

/// Result of a call given a null path.
#[allow(dead_code)]
fn bad_address() -> libc::c_int {
    util::set_errno(libc::EFAULT);
    -1
}
