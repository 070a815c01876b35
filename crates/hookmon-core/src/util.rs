//! Small helpers shared by the hooks.

use std::{
    fmt::Display,
    fs::{self, File},
    io,
    os::unix::fs::MetadataExt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use chrono::{DateTime, TimeZone};

use crate::error::HookError;

/// Hex dumps never cover more than this many bytes of a buffer.
pub const HEX_DUMP_LIMIT: usize = 100;

/// `asctime(3)` layout.
const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Renders the first [HEX_DUMP_LIMIT] bytes of `buf` as `\xNN` sequences.
pub fn hex_dump(buf: &[u8]) -> String {
    let shown = &buf[..buf.len().min(HEX_DUMP_LIMIT)];
    let encoded = hex::encode(shown);
    let mut out = String::with_capacity(shown.len() * 4);
    for (index, digit) in encoded.chars().enumerate() {
        if index % 2 == 0 {
            out.push_str("\\x");
        }
        out.push(digit);
    }
    out
}

pub fn timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Existence probe: only a "not found" answer means the path is absent.
pub fn exists(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(_) => true,
        Err(err) => err.kind() != io::ErrorKind::NotFound,
    }
}

/// Copies `src` into `dir`, keeping its base name and overwriting any
/// previous copy. Returns the destination path.
///
/// A source that already is the destination is left untouched.
pub fn replicate(src: &Path, dir: &Path) -> Result<PathBuf, HookError> {
    let wrap = |source: io::Error, to: &Path| HookError::Replicate {
        source,
        from: src.to_path_buf(),
        to: to.to_path_buf(),
    };
    let name = src.file_name().ok_or_else(|| {
        wrap(
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            dir,
        )
    })?;
    let dest = dir.join(name);
    let mut reader = File::open(src).map_err(|err| wrap(err, &dest))?;
    if same_file(&reader, &dest) {
        return Ok(dest);
    }
    let mut writer = File::create(&dest).map_err(|err| wrap(err, &dest))?;
    io::copy(&mut reader, &mut writer).map_err(|err| wrap(err, &dest))?;
    Ok(dest)
}

fn same_file(file: &File, other: &Path) -> bool {
    match (file.metadata(), fs::metadata(other)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

/// Returns the path a descriptor refers to.
///
/// Only descriptors backed by a named file resolve: sockets, pipes and
/// anonymous inodes fail.
#[cfg(target_os = "linux")]
pub fn descriptor_path(fd: i32) -> Result<PathBuf, HookError> {
    let link = format!("/proc/self/fd/{fd}");
    let target = fs::read_link(&link).map_err(|source| HookError::Descriptor { source, fd })?;
    if target.is_absolute() && !target.as_os_str().to_string_lossy().ends_with(" (deleted)") {
        Ok(target)
    } else {
        Err(HookError::Descriptor {
            source: io::Error::new(io::ErrorKind::InvalidData, "not a named file"),
            fd,
        })
    }
}

#[cfg(target_vendor = "apple")]
pub fn descriptor_path(fd: i32) -> Result<PathBuf, HookError> {
    use std::{ffi::CStr, os::unix::ffi::OsStrExt};

    let mut buf = [0 as libc::c_char; libc::PATH_MAX as usize];
    // SAFETY: F_GETPATH writes at most PATH_MAX bytes, NUL terminated.
    let ret = unsafe { libc::fcntl(fd, libc::F_GETPATH, buf.as_mut_ptr()) };
    if ret == -1 {
        return Err(HookError::Descriptor {
            source: io::Error::last_os_error(),
            fd,
        });
    }
    // SAFETY: the buffer is NUL terminated on success.
    let path = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(PathBuf::from(std::ffi::OsStr::from_bytes(path.to_bytes())))
}

#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
pub fn descriptor_path(fd: i32) -> Result<PathBuf, HookError> {
    Err(HookError::Descriptor {
        source: io::Error::from(io::ErrorKind::Unsupported),
        fd,
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn errno_location() -> *mut libc::c_int {
    // SAFETY: always valid for the calling thread.
    unsafe { libc::__errno_location() }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn errno_location() -> *mut libc::c_int {
    // SAFETY: always valid for the calling thread.
    unsafe { libc::__error() }
}

pub fn errno() -> libc::c_int {
    // SAFETY: thread local errno slot.
    unsafe { *errno_location() }
}

pub fn set_errno(value: libc::c_int) {
    // SAFETY: thread local errno slot.
    unsafe { *errno_location() = value }
}

/// Runs `f` and restores `errno` afterwards, so that reporting done after a
/// real call never changes what the caller observes.
pub fn preserve_errno<T>(f: impl FnOnce() -> T) -> T {
    let saved = errno();
    let result = f();
    set_errno(saved);
    result
}

/// Runs observation code that must never unwind into the monitored program.
pub fn shielded(f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::debug!("observation panicked, ignoring");
    }
}
