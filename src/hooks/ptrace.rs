use anti_debug::PtraceGuard;
use libc::pid_t;

use super::CONTEXT;
use crate::{guard::hooked, libc_calls::Libc};

#[cfg(target_os = "linux")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptrace(
    request: libc::c_uint,
    pid: pid_t,
    addr: *mut libc::c_void,
    data: *mut libc::c_void,
) -> libc::c_long {
    // SAFETY: forwarded from the caller.
    let forward = move || unsafe { Libc.ptrace(request, pid, addr, data) };
    hooked(
        || PtraceGuard::new(&CONTEXT).ptrace(request as libc::c_int, forward),
        forward,
    )
}

#[cfg(target_vendor = "apple")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ptrace(
    request: libc::c_int,
    pid: pid_t,
    addr: *mut libc::c_char,
    data: libc::c_int,
) -> libc::c_int {
    // SAFETY: forwarded from the caller.
    let forward = move || unsafe { Libc.ptrace(request, pid, addr, data) };
    hooked(|| PtraceGuard::new(&CONTEXT).ptrace(request, forward), forward)
}
