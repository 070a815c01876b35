//! hookmon is a runtime monitor loaded into a process through dynamic linker
//! interposition (`LD_PRELOAD`, or `DYLD_INSERT_LIBRARIES` on macOS).
//!
//! It shadows a fixed set of libc entry points and reports what the process
//! does to a sandbox controller:
//!
//! - file activity: opens, creations, deletions, renames and writes, with
//!   deleted and written files copied into the results store;
//! - process creation: new children are stopped with `SIGSTOP` and announced,
//!   spawned children inherit the loader variables so they stay monitored;
//! - anti-debugging: on macOS, `PT_DENY_ATTACH` requests are answered with
//!   success and never reach the kernel.
//!
//! The controller drops a `<pid>.conf` file in the temporary directory before
//! resuming a monitored process, see [hookmon_core::config]. Events are
//! written as text lines to the FIFO it names, see [hookmon_core::event].
//!
//! Every hook returns the real call's result and `errno` unchanged. Failures
//! of the monitor itself are never visible to the process: set `HOOKMON_LOG`
//! (for example `HOOKMON_LOG=debug`) to get them on stderr.
//!
//! ## Feature flags
//!
//! - `default`: Enables `full`.
//! - `full`: Enables all the hook families listed below.
//! - `file-activity`: `open`, `creat`, `unlink`, `rename`, `write`, `pwrite`
//!   and `writev` (plus `open64`, `creat64` and `pwrite64` on 64-bit Linux).
//! - `process-lifecycle`: `fork`, `vfork`, `posix_spawn` and `posix_spawnp`.
//! - `anti-debug`: `ptrace`.

mod guard;
#[cfg(not(test))]
mod hooks;
mod libc_calls;
#[cfg(feature = "process-lifecycle")]
mod library;
mod resolve;
