use std::ffi::c_char;

use file_activity::{FileActivity, FileCalls, open_mode};
use hookmon_core::MonitorContext;
use libc::{c_int, c_uint, c_void, iovec, mode_t, off_t, size_t, ssize_t};

use super::{CONTEXT, bad_address, c_path};
use crate::{guard::hooked, libc_calls::Libc};

fn activity<C: FileCalls>(calls: &C) -> FileActivity<'_, MonitorContext, C> {
    FileActivity::new(&CONTEXT, calls)
}

unsafe fn open_with<C: FileCalls>(
    calls: &C,
    path: *const c_char,
    flags: c_int,
    mode: c_uint,
) -> c_int {
    // SAFETY: `path` is the caller's C string.
    let Some(path) = (unsafe { c_path(path) }) else {
        return bad_address();
    };
    let mode = open_mode(flags, mode);
    hooked(
        || activity(calls).open(path, flags, mode),
        || calls.open(path, flags, mode),
    )
}

unsafe fn creat_with<C: FileCalls>(calls: &C, path: *const c_char, mode: mode_t) -> c_int {
    // SAFETY: `path` is the caller's C string.
    let Some(path) = (unsafe { c_path(path) }) else {
        return bad_address();
    };
    hooked(
        || activity(calls).creat(path, mode),
        || calls.creat(path, mode),
    )
}

unsafe fn pwrite_with<C: FileCalls>(
    calls: &C,
    fd: c_int,
    buf: *const c_void,
    nbyte: size_t,
    offset: off_t,
) -> ssize_t {
    hooked(
        // SAFETY: forwarded from the caller.
        || unsafe { activity(calls).pwrite(fd, buf, nbyte, offset) },
        || unsafe { calls.pwrite(fd, buf, nbyte, offset) },
    )
}

/// `mode` stands in for the variadic argument and is ignored unless the flags
/// ask for creation. Where variadic arguments go on the stack (Apple arm64)
/// the value read for a creating call is unreliable.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: c_uint) -> c_int {
    // SAFETY: forwarded from the caller.
    unsafe { open_with(&Libc, path, flags, mode) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn creat(path: *const c_char, mode: mode_t) -> c_int {
    // SAFETY: forwarded from the caller.
    unsafe { creat_with(&Libc, path, mode) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn unlink(path: *const c_char) -> c_int {
    // SAFETY: `path` is the caller's C string.
    let Some(path) = (unsafe { c_path(path) }) else {
        return bad_address();
    };
    hooked(|| activity(&Libc).unlink(path), || Libc.unlink(path))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn rename(old: *const c_char, new: *const c_char) -> c_int {
    // SAFETY: both are the caller's C strings.
    let (Some(old), Some(new)) = (unsafe { c_path(old) }, unsafe { c_path(new) }) else {
        return bad_address();
    };
    hooked(
        || activity(&Libc).rename(old, new),
        || Libc.rename(old, new),
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, nbyte: size_t) -> ssize_t {
    hooked(
        // SAFETY: forwarded from the caller.
        || unsafe { activity(&Libc).write(fd, buf, nbyte) },
        || unsafe { Libc.write(fd, buf, nbyte) },
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn pwrite(
    fd: c_int,
    buf: *const c_void,
    nbyte: size_t,
    offset: off_t,
) -> ssize_t {
    // SAFETY: forwarded from the caller.
    unsafe { pwrite_with(&Libc, fd, buf, nbyte, offset) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn writev(fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
    hooked(
        // SAFETY: forwarded from the caller.
        || unsafe { activity(&Libc).writev(fd, iov, iovcnt) },
        || unsafe { Libc.writev(fd, iov, iovcnt) },
    )
}

#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
mod large_file {
    use super::*;
    use crate::libc_calls::LargeFile;

    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: c_uint) -> c_int {
        // SAFETY: forwarded from the caller.
        unsafe { open_with(&LargeFile, path, flags, mode) }
    }

    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn creat64(path: *const c_char, mode: mode_t) -> c_int {
        // SAFETY: forwarded from the caller.
        unsafe { creat_with(&LargeFile, path, mode) }
    }

    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn pwrite64(
        fd: c_int,
        buf: *const c_void,
        nbyte: size_t,
        offset: off_t,
    ) -> ssize_t {
        // SAFETY: forwarded from the caller.
        unsafe { pwrite_with(&LargeFile, fd, buf, nbyte, offset) }
    }
}
