//! Environment of spawned children.
//!
//! The dynamic loader only keeps the monitor in a child if the insertion
//! variables are still in its environment. Spawn calls get a copy of the
//! caller's environment with the missing definitions appended.

use std::{
    ffi::{CStr, CString, OsStr, c_char},
    marker::PhantomData,
    os::unix::ffi::OsStrExt,
    ptr,
};

/// Variable naming the libraries the loader inserts.
#[cfg(target_vendor = "apple")]
pub const INSERT_VAR: &str = "DYLD_INSERT_LIBRARIES";
#[cfg(not(target_vendor = "apple"))]
pub const INSERT_VAR: &str = "LD_PRELOAD";

/// Interposed symbols only win over two-level namespace bindings with this
/// set.
#[cfg(target_vendor = "apple")]
pub const FLAT_NAMESPACE_VAR: &str = "DYLD_FORCE_FLAT_NAMESPACE";

/// A `NAME=value` definition added to children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedVar {
    name: &'static str,
    definition: CString,
}

impl InjectedVar {
    /// Returns `None` if the value holds a NUL byte.
    pub fn new(name: &'static str, value: impl AsRef<OsStr>) -> Option<Self> {
        let mut definition = Vec::with_capacity(name.len() + 1 + value.as_ref().len());
        definition.extend_from_slice(name.as_bytes());
        definition.push(b'=');
        definition.extend_from_slice(value.as_ref().as_bytes());
        CString::new(definition)
            .ok()
            .map(|definition| Self { name, definition })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn definition(&self) -> &CStr {
        &self.definition
    }

    /// True if `entry` defines this variable, whatever its value.
    pub fn is_defined_by(&self, entry: &[u8]) -> bool {
        entry
            .strip_prefix(self.name.as_bytes())
            .is_some_and(|rest| rest.first() == Some(&b'='))
    }
}

/// The definitions the monitor adds to every child, given the library the
/// loader should insert.
pub fn injected_vars(library: Option<&OsStr>) -> Vec<InjectedVar> {
    let mut vars = Vec::with_capacity(2);
    #[cfg(target_vendor = "apple")]
    vars.extend(InjectedVar::new(FLAT_NAMESPACE_VAR, "1"));
    if let Some(library) = library {
        vars.extend(InjectedVar::new(INSERT_VAR, library));
    }
    vars
}

/// Reads a `NULL` terminated environment array.
///
/// # Safety
///
/// `envp` is null or points to a `NULL` terminated array of valid C strings
/// living at least as long as `'a`.
pub unsafe fn environment_entries<'a>(envp: *const *mut c_char) -> Vec<&'a CStr> {
    let mut entries = Vec::new();
    if envp.is_null() {
        return entries;
    }
    let mut cursor = envp;
    loop {
        // SAFETY: the array is NULL terminated, we stop at the terminator.
        let entry = unsafe { *cursor };
        if entry.is_null() {
            return entries;
        }
        // SAFETY: every entry is a valid C string.
        entries.push(unsafe { CStr::from_ptr(entry) });
        cursor = unsafe { cursor.add(1) };
    }
}

/// Environment array handed to the real spawn call.
///
/// Holds pointers into the caller's strings and into the injected
/// definitions, both outliving the value.
pub struct LaunchEnvironment<'a> {
    pointers: Vec<*mut c_char>,
    _borrowed: PhantomData<&'a CStr>,
}

impl<'a> LaunchEnvironment<'a> {
    /// Copies the caller's entries in order and appends each injected
    /// definition the caller does not already carry. A null `envp` yields
    /// the injected definitions alone.
    ///
    /// # Safety
    ///
    /// Same as [environment_entries].
    pub unsafe fn new(envp: *const *mut c_char, inject: &'a [InjectedVar]) -> Self {
        // SAFETY: forwarded to the caller.
        let original = unsafe { environment_entries(envp) };
        let mut present = vec![false; inject.len()];
        let mut pointers = Vec::with_capacity(original.len() + inject.len() + 1);
        for entry in &original {
            let bytes = entry.to_bytes();
            for (found, var) in present.iter_mut().zip(inject) {
                *found |= var.is_defined_by(bytes);
            }
            pointers.push(entry.as_ptr().cast_mut());
        }
        for (found, var) in present.into_iter().zip(inject) {
            if !found {
                pointers.push(var.definition().as_ptr().cast_mut());
            }
        }
        pointers.push(ptr::null_mut());
        Self {
            pointers,
            _borrowed: PhantomData,
        }
    }

    /// `NULL` terminated array, valid while `self` lives.
    pub fn as_ptr(&self) -> *const *mut c_char {
        self.pointers.as_ptr()
    }

    pub fn entries(&self) -> Vec<&CStr> {
        // SAFETY: built from valid C strings and NULL terminated.
        unsafe { environment_entries(self.as_ptr()) }
    }
}
