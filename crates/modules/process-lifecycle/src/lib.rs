//! Process creation hooks.
//!
//! Every new child is frozen with `SIGSTOP` right after the creating call
//! returns and then announced to the controller with a `PROCESS` record. The
//! controller attaches to the stopped child and resumes it. Spawned children
//! also get the loader variables that keep the monitor inserted.
//!
//! A failed creation call reports nothing and signals nothing.

use std::ffi::c_char;

use hookmon_core::{EventRecord, Pid, Reporter, Tag, util};
use libc::{c_int, pid_t, posix_spawn_file_actions_t, posix_spawnattr_t};
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::getpid,
};
use strum::{Display, IntoStaticStr};

pub mod env;

use env::{InjectedVar, LaunchEnvironment};

pub const MODULE_NAME: &str = "process-lifecycle";

/// The spawn flavour, named after its libc symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SpawnKind {
    PosixSpawn,
    PosixSpawnp,
}

/// The real process calls, as resolved by the interposition layer.
pub trait ProcessCalls {
    fn fork(&self) -> pid_t;

    /// # Safety
    ///
    /// Same contract as `posix_spawn(3)`.
    #[allow(clippy::too_many_arguments)]
    unsafe fn spawn(
        &self,
        kind: SpawnKind,
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *mut c_char,
        envp: *const *mut c_char,
    ) -> c_int;

    fn stop(&self, pid: Pid) -> Result<(), Errno> {
        signal::kill(pid, Signal::SIGSTOP)
    }

    fn stop_self(&self) -> Result<(), Errno> {
        self.stop(getpid())
    }
}

/// Process creation hooks bound to a reporter, the real calls and the
/// definitions injected in children.
pub struct ProcessLifecycle<'a, R, C> {
    reporter: &'a R,
    calls: &'a C,
    inject: &'a [InjectedVar],
}

impl<'a, R: Reporter, C: ProcessCalls> ProcessLifecycle<'a, R, C> {
    pub fn new(reporter: &'a R, calls: &'a C, inject: &'a [InjectedVar]) -> Self {
        Self {
            reporter,
            calls,
            inject,
        }
    }

    /// The parent freezes and announces the child, the child also stops
    /// itself so it never runs before the controller attached.
    pub fn fork(&self) -> pid_t {
        let pid = self.calls.fork();
        match pid {
            0 => util::preserve_errno(|| {
                if let Err(err) = self.calls.stop_self() {
                    hookmon_core::log_error("Child could not stop itself", err);
                }
            }),
            pid if pid > 0 => self.announce(Pid::from_raw(pid)),
            _ => {}
        }
        pid
    }

    /// Lightweight fork: only the parent freezes the child.
    ///
    /// Callers must service this with a real `fork`, never `vfork`: the
    /// child of a `vfork` would return through this frame on the parent's
    /// stack.
    pub fn vfork(&self) -> pid_t {
        let pid = self.calls.fork();
        if pid > 0 {
            self.announce(Pid::from_raw(pid));
        }
        pid
    }

    /// # Safety
    ///
    /// Same contract as `posix_spawn(3)`. `pid` may be null.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn spawn(
        &self,
        kind: SpawnKind,
        pid: *mut pid_t,
        path: *const c_char,
        file_actions: *const posix_spawn_file_actions_t,
        attrp: *const posix_spawnattr_t,
        argv: *const *mut c_char,
        envp: *const *mut c_char,
    ) -> c_int {
        // SAFETY: `envp` is a valid environment array or null.
        let environment = unsafe { LaunchEnvironment::new(envp, self.inject) };
        // The child has to be frozen even when the caller does not ask for
        // its pid.
        let mut child: pid_t = 0;
        // SAFETY: arguments are forwarded, with a local pid slot and the
        // rewritten environment kept alive until the call returns.
        let rc = unsafe {
            self.calls.spawn(
                kind,
                &mut child,
                path,
                file_actions,
                attrp,
                argv,
                environment.as_ptr(),
            )
        };
        if rc != 0 {
            log::debug!(target: MODULE_NAME, "{kind} failed: {}", Errno::from_i32(rc));
            return rc;
        }
        if !pid.is_null() {
            // SAFETY: a non null `pid` is writable per contract.
            unsafe { *pid = child };
        }
        if child > 0 {
            self.announce(Pid::from_raw(child));
        }
        rc
    }

    /// Freezes `child`, then reports it. The stop signal is the first thing
    /// done after the creating call returned.
    fn announce(&self, child: Pid) {
        util::preserve_errno(|| {
            if let Err(err) = self.calls.stop(child) {
                hookmon_core::log_error("Child could not be stopped", err);
            }
            util::shielded(|| {
                self.reporter
                    .send(EventRecord::bare(Tag::Process, format!(" {child}")))
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        ffi::CString,
        ptr,
        sync::{Arc, Mutex},
    };

    use hookmon_core::{
        config::ProcessConfig,
        test_utils::{Journal, RecordingReporter},
    };

    use super::*;

    /// Process calls that never create anything, logging what would happen
    /// into a journal shared with the reporter.
    struct FakeCalls {
        journal: Journal,
        child: pid_t,
        spawn_rc: c_int,
        environment: RefCell<Vec<String>>,
        spawned: Cell<Option<SpawnKind>>,
    }

    impl FakeCalls {
        fn new(journal: &Journal, child: pid_t) -> Self {
            Self {
                journal: journal.clone(),
                child,
                spawn_rc: 0,
                environment: RefCell::default(),
                spawned: Cell::new(None),
            }
        }

        fn note(&self, entry: String) {
            self.journal.lock().unwrap().push(entry);
        }
    }

    impl ProcessCalls for FakeCalls {
        fn fork(&self) -> pid_t {
            self.note("fork".to_string());
            self.child
        }

        unsafe fn spawn(
            &self,
            kind: SpawnKind,
            pid: *mut pid_t,
            _path: *const c_char,
            _file_actions: *const posix_spawn_file_actions_t,
            _attrp: *const posix_spawnattr_t,
            _argv: *const *mut c_char,
            envp: *const *mut c_char,
        ) -> c_int {
            self.note(format!("{kind}"));
            self.spawned.set(Some(kind));
            let entries = unsafe { env::environment_entries(envp) };
            *self.environment.borrow_mut() = entries
                .iter()
                .map(|e| e.to_string_lossy().into_owned())
                .collect();
            if self.spawn_rc == 0 {
                unsafe { *pid = self.child };
            }
            self.spawn_rc
        }

        fn stop(&self, pid: Pid) -> Result<(), Errno> {
            self.note(format!("stop {pid}"));
            Ok(())
        }

        fn stop_self(&self) -> Result<(), Errno> {
            self.note("stop self".to_string());
            Ok(())
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn reporter(journal: &Journal) -> RecordingReporter {
        RecordingReporter::new(ProcessConfig::default()).with_journal(journal.clone())
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    fn inject() -> Vec<InjectedVar> {
        vec![InjectedVar::new(env::INSERT_VAR, "/opt/libhookmon.so").unwrap()]
    }

    #[test]
    fn fork_stops_child_before_reporting() {
        let journal = journal();
        let reporter = reporter(&journal);
        let calls = FakeCalls::new(&journal, 4321);

        let pid = ProcessLifecycle::new(&reporter, &calls, &[]).fork();

        assert_eq!(pid, 4321);
        assert_eq!(entries(&journal), ["fork", "stop 4321", "emit PROCESS: 4321"]);
        assert_eq!(reporter.lines(), ["PROCESS: 4321"]);
    }

    #[test]
    fn forked_child_stops_itself() {
        let journal = journal();
        let reporter = reporter(&journal);
        let calls = FakeCalls::new(&journal, 0);

        assert_eq!(ProcessLifecycle::new(&reporter, &calls, &[]).fork(), 0);
        assert_eq!(entries(&journal), ["fork", "stop self"]);
    }

    #[test]
    fn failed_fork_does_nothing() {
        let journal = journal();
        let reporter = reporter(&journal);
        let calls = FakeCalls::new(&journal, -1);
        let hooks = ProcessLifecycle::new(&reporter, &calls, &[]);

        assert_eq!(hooks.fork(), -1);
        assert_eq!(hooks.vfork(), -1);
        assert_eq!(entries(&journal), ["fork", "fork"]);
    }

    #[test]
    fn vfork_freezes_from_parent_only() {
        let journal = journal();
        let reporter = reporter(&journal);
        let child = FakeCalls::new(&journal, 0);
        assert_eq!(ProcessLifecycle::new(&reporter, &child, &[]).vfork(), 0);

        let parent = FakeCalls::new(&journal, 77);
        assert_eq!(ProcessLifecycle::new(&reporter, &parent, &[]).vfork(), 77);
        assert_eq!(
            entries(&journal),
            ["fork", "fork", "stop 77", "emit PROCESS: 77"]
        );
    }

    #[test]
    fn spawn_rewrites_environment_and_freezes_child() {
        let journal = journal();
        let reporter = reporter(&journal);
        let calls = FakeCalls::new(&journal, 900);
        let inject = inject();

        let strings = [CString::new("HOME=/root").unwrap()];
        let envp = [strings[0].as_ptr().cast_mut(), ptr::null_mut()];
        let mut pid: pid_t = 0;
        let rc = unsafe {
            ProcessLifecycle::new(&reporter, &calls, &inject).spawn(
                SpawnKind::PosixSpawnp,
                &mut pid,
                c"ls".as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                envp.as_ptr(),
            )
        };

        assert_eq!(rc, 0);
        assert_eq!(pid, 900);
        assert_eq!(calls.spawned.get(), Some(SpawnKind::PosixSpawnp));
        assert_eq!(
            *calls.environment.borrow(),
            [
                "HOME=/root".to_string(),
                format!("{}=/opt/libhookmon.so", env::INSERT_VAR),
            ]
        );
        assert_eq!(
            entries(&journal),
            ["posix_spawnp", "stop 900", "emit PROCESS: 900"]
        );
    }

    #[test]
    fn spawn_without_pid_slot_still_freezes() {
        let journal = journal();
        let reporter = reporter(&journal);
        let calls = FakeCalls::new(&journal, 901);

        let rc = unsafe {
            ProcessLifecycle::new(&reporter, &calls, &[]).spawn(
                SpawnKind::PosixSpawn,
                ptr::null_mut(),
                c"/bin/true".as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };

        assert_eq!(rc, 0);
        assert!(calls.environment.borrow().is_empty());
        assert_eq!(reporter.lines(), ["PROCESS: 901"]);
    }

    #[test]
    fn failed_spawn_reports_nothing() {
        let journal = journal();
        let reporter = reporter(&journal);
        let mut calls = FakeCalls::new(&journal, 902);
        calls.spawn_rc = libc::ENOENT;

        let mut pid: pid_t = -7;
        let rc = unsafe {
            ProcessLifecycle::new(&reporter, &calls, &inject()).spawn(
                SpawnKind::PosixSpawn,
                &mut pid,
                c"/missing".as_ptr(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };

        assert_eq!(rc, libc::ENOENT);
        assert_eq!(pid, -7);
        assert_eq!(entries(&journal), ["posix_spawn"]);
        assert!(reporter.records().is_empty());
    }

    #[test]
    fn spawn_kind_names() {
        let name: &'static str = SpawnKind::PosixSpawnp.into();
        assert_eq!(name, "posix_spawnp");
        assert_eq!(SpawnKind::PosixSpawn.to_string(), "posix_spawn");
    }
}
