use std::cell::Cell;

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running hook code. Calls reaching a hook
/// while a guard is alive on the same thread come from the monitor itself.
pub struct ReentrancyGuard;

impl ReentrancyGuard {
    /// Returns `None` if the thread already holds a guard, or if its
    /// thread-local storage is gone.
    pub fn enter() -> Option<Self> {
        IN_HOOK
            .try_with(|flag| (!flag.replace(true)).then_some(ReentrancyGuard))
            .ok()
            .flatten()
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let _ = IN_HOOK.try_with(|flag| flag.set(false));
    }
}

/// Runs `observed` for calls made by the host program and `direct` for the
/// monitor's own calls.
pub fn hooked<T>(observed: impl FnOnce() -> T, direct: impl FnOnce() -> T) -> T {
    match ReentrancyGuard::enter() {
        Some(_guard) => observed(),
        None => direct(),
    }
}
