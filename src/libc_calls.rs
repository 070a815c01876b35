//! The real libc calls behind every hook.
//!
//! A symbol that cannot be resolved fails the call with `ENOSYS`.

#[cfg(any(feature = "file-activity", feature = "process-lifecycle"))]
use hookmon_core::util;
#[allow(unused_imports)]
use libc::{c_char, c_int, c_void, pid_t};

#[allow(unused_imports)]
use crate::resolve::real;

/// Calls through to the next definition of each symbol.
#[derive(Debug, Clone, Copy)]
pub struct Libc;

#[cfg(any(feature = "file-activity", feature = "process-lifecycle"))]
fn unresolved<T: From<i8>>(symbol: &str) -> T {
    log::debug!("{symbol} could not be resolved");
    util::set_errno(libc::ENOSYS);
    T::from(-1)
}

#[cfg(feature = "file-activity")]
mod files {
    use std::ffi::CStr;

    use file_activity::FileCalls;
    use libc::{c_uint, iovec, mode_t, off_t, size_t, ssize_t};

    use super::*;

    type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
    type CreatFn = unsafe extern "C" fn(*const c_char, mode_t) -> c_int;
    type UnlinkFn = unsafe extern "C" fn(*const c_char) -> c_int;
    type RenameFn = unsafe extern "C" fn(*const c_char, *const c_char) -> c_int;
    type WriteFn = unsafe extern "C" fn(c_int, *const c_void, size_t) -> ssize_t;
    type PwriteFn = unsafe extern "C" fn(c_int, *const c_void, size_t, off_t) -> ssize_t;
    type WritevFn = unsafe extern "C" fn(c_int, *const iovec, c_int) -> ssize_t;

    impl FileCalls for Libc {
        fn open(&self, path: &CStr, flags: c_int, mode: c_uint) -> c_int {
            match real!(c"open", OpenFn) {
                // SAFETY: valid path, mode is read only with O_CREAT or O_TMPFILE.
                Some(open) => unsafe { open(path.as_ptr(), flags, mode) },
                None => unresolved("open"),
            }
        }

        fn creat(&self, path: &CStr, mode: mode_t) -> c_int {
            match real!(c"creat", CreatFn) {
                // SAFETY: valid path.
                Some(creat) => unsafe { creat(path.as_ptr(), mode) },
                None => unresolved("creat"),
            }
        }

        fn unlink(&self, path: &CStr) -> c_int {
            match real!(c"unlink", UnlinkFn) {
                // SAFETY: valid path.
                Some(unlink) => unsafe { unlink(path.as_ptr()) },
                None => unresolved("unlink"),
            }
        }

        fn rename(&self, old: &CStr, new: &CStr) -> c_int {
            match real!(c"rename", RenameFn) {
                // SAFETY: valid paths.
                Some(rename) => unsafe { rename(old.as_ptr(), new.as_ptr()) },
                None => unresolved("rename"),
            }
        }

        unsafe fn write(&self, fd: c_int, buf: *const c_void, nbyte: size_t) -> ssize_t {
            match real!(c"write", WriteFn) {
                // SAFETY: forwarded from the caller.
                Some(write) => unsafe { write(fd, buf, nbyte) },
                None => unresolved("write"),
            }
        }

        unsafe fn pwrite(
            &self,
            fd: c_int,
            buf: *const c_void,
            nbyte: size_t,
            offset: off_t,
        ) -> ssize_t {
            match real!(c"pwrite", PwriteFn) {
                // SAFETY: forwarded from the caller.
                Some(pwrite) => unsafe { pwrite(fd, buf, nbyte, offset) },
                None => unresolved("pwrite"),
            }
        }

        unsafe fn writev(&self, fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
            match real!(c"writev", WritevFn) {
                // SAFETY: forwarded from the caller.
                Some(writev) => unsafe { writev(fd, iov, iovcnt) },
                None => unresolved("writev"),
            }
        }
    }

    /// The large-file entry points glibc programs built with 64-bit offsets
    /// call instead of `open`, `creat` and `pwrite`.
    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[derive(Debug, Clone, Copy)]
    pub struct LargeFile;

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    impl FileCalls for LargeFile {
        fn open(&self, path: &CStr, flags: c_int, mode: c_uint) -> c_int {
            match real!(c"open64", OpenFn) {
                // SAFETY: valid path, mode is read only with O_CREAT or O_TMPFILE.
                Some(open64) => unsafe { open64(path.as_ptr(), flags, mode) },
                None => unresolved("open64"),
            }
        }

        fn creat(&self, path: &CStr, mode: mode_t) -> c_int {
            match real!(c"creat64", CreatFn) {
                // SAFETY: valid path.
                Some(creat64) => unsafe { creat64(path.as_ptr(), mode) },
                None => unresolved("creat64"),
            }
        }

        fn unlink(&self, path: &CStr) -> c_int {
            Libc.unlink(path)
        }

        fn rename(&self, old: &CStr, new: &CStr) -> c_int {
            Libc.rename(old, new)
        }

        unsafe fn write(&self, fd: c_int, buf: *const c_void, nbyte: size_t) -> ssize_t {
            // SAFETY: forwarded from the caller.
            unsafe { Libc.write(fd, buf, nbyte) }
        }

        unsafe fn pwrite(
            &self,
            fd: c_int,
            buf: *const c_void,
            nbyte: size_t,
            offset: off_t,
        ) -> ssize_t {
            match real!(c"pwrite64", PwriteFn) {
                // SAFETY: forwarded from the caller, `off64_t` is `off_t` here.
                Some(pwrite64) => unsafe { pwrite64(fd, buf, nbyte, offset) },
                None => unresolved("pwrite64"),
            }
        }

        unsafe fn writev(&self, fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
            // SAFETY: forwarded from the caller.
            unsafe { Libc.writev(fd, iov, iovcnt) }
        }
    }
}

// Only the exports use it, and they are compiled out under test.
#[cfg(all(feature = "file-activity", target_os = "linux", target_pointer_width = "64"))]
#[cfg_attr(test, allow(unused_imports))]
pub use files::LargeFile;

#[cfg(feature = "process-lifecycle")]
mod process {
    use libc::{posix_spawn_file_actions_t, posix_spawnattr_t};
    use process_lifecycle::{ProcessCalls, SpawnKind};

    use super::*;

    type ForkFn = unsafe extern "C" fn() -> pid_t;
    type SpawnFn = unsafe extern "C" fn(
        *mut pid_t,
        *const c_char,
        *const posix_spawn_file_actions_t,
        *const posix_spawnattr_t,
        *const *mut c_char,
        *const *mut c_char,
    ) -> c_int;

    impl ProcessCalls for Libc {
        fn fork(&self) -> pid_t {
            match real!(c"fork", ForkFn) {
                // SAFETY: plain libc call.
                Some(fork) => unsafe { fork() },
                None => unresolved("fork"),
            }
        }

        unsafe fn spawn(
            &self,
            kind: SpawnKind,
            pid: *mut pid_t,
            path: *const c_char,
            file_actions: *const posix_spawn_file_actions_t,
            attrp: *const posix_spawnattr_t,
            argv: *const *mut c_char,
            envp: *const *mut c_char,
        ) -> c_int {
            let real = match kind {
                SpawnKind::PosixSpawn => real!(c"posix_spawn", SpawnFn),
                SpawnKind::PosixSpawnp => real!(c"posix_spawnp", SpawnFn),
            };
            match real {
                // SAFETY: forwarded from the caller.
                Some(spawn) => unsafe { spawn(pid, path, file_actions, attrp, argv, envp) },
                None => {
                    log::debug!("{kind} could not be resolved");
                    // Spawn calls return the error instead of setting errno.
                    libc::ENOSYS
                }
            }
        }
    }
}

#[cfg(all(feature = "anti-debug", target_os = "linux"))]
impl Libc {
    /// # Safety
    ///
    /// Same contract as `ptrace(2)`.
    pub unsafe fn ptrace(
        &self,
        request: libc::c_uint,
        pid: pid_t,
        addr: *mut c_void,
        data: *mut c_void,
    ) -> libc::c_long {
        type PtraceFn =
            unsafe extern "C" fn(libc::c_uint, pid_t, *mut c_void, *mut c_void) -> libc::c_long;
        match real!(c"ptrace", PtraceFn) {
            // SAFETY: forwarded from the caller.
            Some(ptrace) => unsafe { ptrace(request, pid, addr, data) },
            None => {
                hookmon_core::util::set_errno(libc::ENOSYS);
                -1
            }
        }
    }
}

#[cfg(all(feature = "anti-debug", target_vendor = "apple"))]
impl Libc {
    /// # Safety
    ///
    /// Same contract as `ptrace(2)`.
    pub unsafe fn ptrace(&self, request: c_int, pid: pid_t, addr: *mut c_char, data: c_int) -> c_int {
        type PtraceFn = unsafe extern "C" fn(c_int, pid_t, *mut c_char, c_int) -> c_int;
        match real!(c"ptrace", PtraceFn) {
            // SAFETY: forwarded from the caller.
            Some(ptrace) => unsafe { ptrace(request, pid, addr, data) },
            None => {
                hookmon_core::util::set_errno(libc::ENOSYS);
                -1
            }
        }
    }
}
