use std::ffi::c_char;

use hookmon_core::MonitorContext;
use libc::{c_int, pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use process_lifecycle::{ProcessCalls, ProcessLifecycle, SpawnKind};

use super::CONTEXT;
use crate::{guard::hooked, libc_calls::Libc, library};

/// Hooks for forks, which keep the environment as is.
fn forks() -> ProcessLifecycle<'static, MonitorContext, Libc> {
    ProcessLifecycle::new(&CONTEXT, &Libc, &[])
}

fn spawns() -> ProcessLifecycle<'static, MonitorContext, Libc> {
    ProcessLifecycle::new(&CONTEXT, &Libc, library::launch_vars())
}

#[unsafe(no_mangle)]
pub extern "C" fn fork() -> pid_t {
    hooked(|| forks().fork(), || Libc.fork())
}

/// Serviced by the real `fork`: the child of a real `vfork` would return
/// through this frame and corrupt the stack it shares with the parent.
#[unsafe(no_mangle)]
pub extern "C" fn vfork() -> pid_t {
    hooked(|| forks().vfork(), || Libc.fork())
}

#[allow(clippy::too_many_arguments)]
unsafe fn spawn(
    kind: SpawnKind,
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *mut c_char,
    envp: *const *mut c_char,
) -> c_int {
    hooked(
        // SAFETY: forwarded from the caller.
        || unsafe { spawns().spawn(kind, pid, path, file_actions, attrp, argv, envp) },
        || unsafe { Libc.spawn(kind, pid, path, file_actions, attrp, argv, envp) },
    )
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_spawn(
    pid: *mut pid_t,
    path: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *mut c_char,
    envp: *const *mut c_char,
) -> c_int {
    // SAFETY: forwarded from the caller.
    unsafe {
        spawn(
            SpawnKind::PosixSpawn,
            pid,
            path,
            file_actions,
            attrp,
            argv,
            envp,
        )
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_spawnp(
    pid: *mut pid_t,
    file: *const c_char,
    file_actions: *const posix_spawn_file_actions_t,
    attrp: *const posix_spawnattr_t,
    argv: *const *mut c_char,
    envp: *const *mut c_char,
) -> c_int {
    // SAFETY: forwarded from the caller.
    unsafe {
        spawn(
            SpawnKind::PosixSpawnp,
            pid,
            file,
            file_actions,
            attrp,
            argv,
            envp,
        )
    }
}
