//! Where the monitor itself lives, so children can load it again.

use std::{
    env,
    ffi::{CStr, OsStr, OsString, c_void},
    mem,
    os::unix::ffi::OsStrExt,
    path::PathBuf,
    sync::OnceLock,
};

use process_lifecycle::env::{INSERT_VAR, InjectedVar, injected_vars};

/// Path of the shared object this function was loaded from.
pub fn own_path() -> Option<PathBuf> {
    // SAFETY: all-zero is a valid `Dl_info`.
    let mut info: libc::Dl_info = unsafe { mem::zeroed() };
    let addr = own_path as fn() -> Option<PathBuf> as *const c_void;
    // SAFETY: `addr` is an address inside this object, `info` is writable.
    if unsafe { libc::dladdr(addr, &mut info) } == 0 || info.dli_fname.is_null() {
        return None;
    }
    // SAFETY: `dli_fname` is NUL terminated and owned by the loader.
    let name = unsafe { CStr::from_ptr(info.dli_fname) };
    (!name.is_empty()).then(|| PathBuf::from(OsStr::from_bytes(name.to_bytes())))
}

/// The library children must insert: whatever the loader variable holds in
/// this process, or this library's own path once the variable is gone.
pub fn insertion_library() -> Option<OsString> {
    env::var_os(INSERT_VAR)
        .filter(|value| !value.is_empty())
        .or_else(|| own_path().map(PathBuf::into_os_string))
}

/// Definitions added to the environment of spawned children, computed once.
pub fn launch_vars() -> &'static [InjectedVar] {
    static VARS: OnceLock<Vec<InjectedVar>> = OnceLock::new();
    VARS.get_or_init(|| {
        let library = insertion_library();
        if library.is_none() {
            log::warn!("no library to insert in children, they will run unmonitored");
        }
        injected_vars(library.as_deref())
    })
}
