//! File activity hooks.
//!
//! Every operation runs the same way: observe the arguments, report them,
//! copy evidence into the results store where needed, then forward to the
//! real implementation and hand its result back untouched.
//!
//! | Call | Reported | Replicated |
//! |---|---|---|
//! | `open` | access mode, creation of a missing file, failure | no |
//! | `creat` | creation | no |
//! | `unlink` | deletion | before the call |
//! | `rename` | deletion of the old name, creation of the new one | old name, before the call |
//! | `write`, `pwrite` | written path and the first bytes of the buffer | after the call |
//! | `writev` | written path | after the call |
//!
//! Paths in the monitor's private storage are not reported by `open`,
//! `creat` and the write family.

use std::{
    ffi::{CStr, OsStr},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use hookmon_core::{
    EventRecord, Reporter, Tag,
    util::{self, HEX_DUMP_LIMIT},
};
use libc::{c_int, c_uint, c_void, iovec, mode_t, off_t, size_t, ssize_t};
use strum::Display;

pub const MODULE_NAME: &str = "file-activity";

/// The real file calls, as resolved by the interposition layer.
pub trait FileCalls {
    fn open(&self, path: &CStr, flags: c_int, mode: c_uint) -> c_int;

    fn creat(&self, path: &CStr, mode: mode_t) -> c_int;

    fn unlink(&self, path: &CStr) -> c_int;

    fn rename(&self, old: &CStr, new: &CStr) -> c_int;

    /// # Safety
    ///
    /// Same contract as `write(2)`.
    unsafe fn write(&self, fd: c_int, buf: *const c_void, nbyte: size_t) -> ssize_t;

    /// # Safety
    ///
    /// Same contract as `pwrite(2)`.
    unsafe fn pwrite(
        &self,
        fd: c_int,
        buf: *const c_void,
        nbyte: size_t,
        offset: off_t,
    ) -> ssize_t;

    /// # Safety
    ///
    /// Same contract as `writev(2)`.
    unsafe fn writev(&self, fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t;

    /// Path of the file behind `fd`, if it is a named file.
    fn descriptor_path(&self, fd: c_int) -> Option<PathBuf> {
        util::descriptor_path(fd).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        util::exists(path)
    }
}

/// Access mode of an `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn from_flags(flags: c_int) -> Self {
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => Access::Write,
            libc::O_RDWR => Access::ReadWrite,
            _ => Access::Read,
        }
    }
}

/// Whether `open` received a mode argument, which only happens when the file
/// may be created.
pub fn takes_mode(flags: c_int) -> bool {
    #[cfg(target_os = "linux")]
    if flags & libc::O_TMPFILE == libc::O_TMPFILE {
        return true;
    }
    flags & libc::O_CREAT != 0
}

/// The `mode` argument of `open`, or 0 when the caller passed none and the
/// register holds garbage.
pub fn open_mode(flags: c_int, mode: c_uint) -> c_uint {
    if takes_mode(flags) { mode } else { 0 }
}

/// File activity hooks bound to a reporter and the real calls.
pub struct FileActivity<'a, R, C> {
    reporter: &'a R,
    calls: &'a C,
}

impl<'a, R: Reporter, C: FileCalls> FileActivity<'a, R, C> {
    pub fn new(reporter: &'a R, calls: &'a C) -> Self {
        Self { reporter, calls }
    }

    pub fn open(&self, path: &CStr, flags: c_int, mode: c_uint) -> c_int {
        let name = as_path(path);
        observe(|| {
            if self.reporter.is_private(name) {
                return;
            }
            let access = Access::from_flags(flags);
            self.reporter
                .emit(Tag::FileActivity, format_args!("{access} - {}", name.display()));
            // Probed before the call: afterwards the file always exists.
            if flags & libc::O_CREAT != 0 && !self.calls.exists(name) {
                self.reporter.emit(Tag::FileCreate, name.display());
            }
        });

        let fd = self.calls.open(path, flags, mode);
        if fd == -1 {
            observe(|| {
                self.reporter.emit(
                    Tag::FileActivity,
                    format_args!("Open failed on {}", name.display()),
                )
            });
        }
        fd
    }

    pub fn creat(&self, path: &CStr, mode: mode_t) -> c_int {
        let name = as_path(path);
        observe(|| {
            if !self.reporter.is_private(name) {
                self.reporter.emit(Tag::FileCreate, name.display());
            }
        });
        self.calls.creat(path, mode)
    }

    /// Deletions are always reported, and the file is saved first.
    pub fn unlink(&self, path: &CStr) -> c_int {
        let name = as_path(path);
        observe(|| {
            self.reporter.emit(Tag::FileDelete, name.display());
            self.replicate(name);
        });
        self.calls.unlink(path)
    }

    /// A move is reported as the deletion of `old` followed by the creation
    /// of `new`. The content is saved under the old name.
    pub fn rename(&self, old: &CStr, new: &CStr) -> c_int {
        let (old_name, new_name) = (as_path(old), as_path(new));
        observe(|| {
            self.reporter.emit(Tag::FileDelete, old_name.display());
            self.replicate(old_name);
            self.reporter.emit(Tag::FileCreate, new_name.display());
        });
        self.calls.rename(old, new)
    }

    /// # Safety
    ///
    /// `buf` must be valid for reads of `nbyte` bytes, as for `write(2)`.
    pub unsafe fn write(&self, fd: c_int, buf: *const c_void, nbyte: size_t) -> ssize_t {
        observe(|| unsafe { self.report_write(fd, buf, nbyte) });
        // SAFETY: arguments are forwarded as received.
        unsafe { self.calls.write(fd, buf, nbyte) }
    }

    /// # Safety
    ///
    /// `buf` must be valid for reads of `nbyte` bytes, as for `pwrite(2)`.
    pub unsafe fn pwrite(
        &self,
        fd: c_int,
        buf: *const c_void,
        nbyte: size_t,
        offset: off_t,
    ) -> ssize_t {
        // The dump covers the caller's buffer, the file offset plays no part.
        observe(|| unsafe { self.report_write(fd, buf, nbyte) });
        // SAFETY: arguments are forwarded as received.
        unsafe { self.calls.pwrite(fd, buf, nbyte, offset) }
    }

    /// # Safety
    ///
    /// `iov` must point to `iovcnt` valid buffers, as for `writev(2)`.
    pub unsafe fn writev(&self, fd: c_int, iov: *const iovec, iovcnt: c_int) -> ssize_t {
        observe(|| {
            if let Some(path) = self.public_descriptor(fd) {
                self.reporter.emit(Tag::FileWrite, path.display());
                self.replicate(&path);
            }
        });
        // SAFETY: arguments are forwarded as received.
        unsafe { self.calls.writev(fd, iov, iovcnt) }
    }

    /// Reports a plain or positioned write and saves the file as it stands
    /// before the data lands.
    unsafe fn report_write(&self, fd: c_int, buf: *const c_void, nbyte: size_t) {
        if nbyte == 0 {
            return;
        }
        let Some(path) = self.public_descriptor(fd) else {
            return;
        };
        self.reporter.emit(Tag::FileWrite, path.display());
        if !buf.is_null() {
            // SAFETY: the caller guarantees `nbyte` readable bytes, we read
            // no more than that.
            let shown = unsafe {
                std::slice::from_raw_parts(buf.cast::<u8>(), nbyte.min(HEX_DUMP_LIMIT))
            };
            self.reporter.send(EventRecord::bare(
                Tag::FileWrite,
                format!("Bytes Written: {}", util::hex_dump(shown)),
            ));
        }
        self.replicate(&path);
    }

    fn public_descriptor(&self, fd: c_int) -> Option<PathBuf> {
        self.calls
            .descriptor_path(fd)
            .filter(|path| !self.reporter.is_private(path))
    }

    /// Copies `path` into the results store. Failures only end up in the
    /// diagnostics.
    fn replicate(&self, path: &Path) {
        let results = &self.reporter.config().results;
        if results.as_os_str().is_empty() {
            log::debug!(target: MODULE_NAME, "no results store, not saving {}", path.display());
            return;
        }
        match util::replicate(path, results) {
            Ok(dest) => {
                log::debug!(target: MODULE_NAME, "saved {} as {}", path.display(), dest.display())
            }
            Err(err) => hookmon_core::log_error("Replication skipped", err),
        }
    }
}

fn as_path(path: &CStr) -> &Path {
    Path::new(OsStr::from_bytes(path.to_bytes()))
}

/// Runs observation code without letting it unwind or change `errno`.
/// Returns `None` if the observation panicked.
fn observe<T>(f: impl FnOnce() -> T) -> Option<T> {
    util::preserve_errno(|| {
        let mut out = None;
        util::shielded(|| out = Some(f()));
        out
    })
}
