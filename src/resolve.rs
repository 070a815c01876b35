//! Lookup of the implementations the hooks shadow.

use std::{
    cell::Cell,
    ffi::CStr,
    sync::atomic::{AtomicUsize, Ordering},
};

thread_local! {
    static RESOLVING: Cell<bool> = const { Cell::new(false) };
}

/// Address of the next definition of `name` after this library, cached in
/// `slot`.
///
/// Returns `None` when the symbol does not exist, and for any lookup started
/// while the same thread is already inside `dlsym` (which may itself call
/// hooked functions).
pub fn lookup(name: &CStr, slot: &AtomicUsize) -> Option<usize> {
    let cached = slot.load(Ordering::Acquire);
    if cached != 0 {
        return Some(cached);
    }
    if RESOLVING.try_with(|flag| flag.replace(true)).unwrap_or(true) {
        return None;
    }
    // SAFETY: `name` is NUL terminated.
    let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) };
    let _ = RESOLVING.try_with(|flag| flag.set(false));
    if sym.is_null() {
        return None;
    }
    slot.store(sym as usize, Ordering::Release);
    Some(sym as usize)
}

/// Resolves the real implementation of a libc symbol as a typed function
/// pointer.
macro_rules! real {
    ($name:literal, $ty:ty) => {{
        static SLOT: ::std::sync::atomic::AtomicUsize = ::std::sync::atomic::AtomicUsize::new(0);
        $crate::resolve::lookup($name, &SLOT)
            // SAFETY: the symbol has the C signature `$ty`.
            .map(|addr| unsafe { ::std::mem::transmute::<usize, $ty>(addr) })
    }};
}

pub(crate) use real;
