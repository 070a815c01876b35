use std::{
    fs::{File, OpenOptions},
    io::Write,
    os::{fd::AsRawFd, unix::fs::OpenOptionsExt},
    path::Path,
    sync::{Mutex, MutexGuard, TryLockError},
    thread,
    time::{Duration, Instant},
};

use nix::fcntl::{FcntlArg, OFlag, fcntl};

use crate::{error::HookError, event::EventRecord};

/// Pause between two attempts at taking the channel.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Longest wait for the channel before a record is dropped.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// The single outbound channel of a process.
///
/// At most one record is in flight at any time: writers take the channel,
/// open the endpoint, write the whole line at once and close it again. The
/// endpoint is never created by the monitor, records sent before the
/// controller set it up are lost.
#[derive(Debug)]
pub struct EventChannel {
    busy: Mutex<()>,
    timeout: Duration,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub const fn new() -> Self {
        Self::with_timeout(LOCK_TIMEOUT)
    }

    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            busy: Mutex::new(()),
            timeout,
        }
    }

    /// Writes `record` to `endpoint`.
    pub fn send(&self, endpoint: &Path, record: &EventRecord) -> Result<(), HookError> {
        if endpoint.as_os_str().is_empty() {
            return Err(HookError::NoEndpoint);
        }
        let _busy = self.acquire()?;
        let mut file = open_endpoint(endpoint)?;
        file.write_all(record.to_line().as_bytes())
            .and_then(|()| file.flush())
            .map_err(HookError::EndpointWrite)
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>, HookError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.busy.try_lock() {
                Ok(guard) => return Ok(guard),
                // A writer panicking mid-record leaves nothing to clean up.
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(HookError::LockTimeout(self.timeout));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
            }
        }
    }
}

/// Opens the endpoint for appending without ever blocking: a FIFO without
/// reader fails right away with `ENXIO`. The returned file is switched back
/// to blocking mode so the record is written completely.
fn open_endpoint(path: &Path) -> Result<File, HookError> {
    let file = OpenOptions::new()
        .append(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|source| HookError::EndpointOpen {
            source,
            path: path.to_path_buf(),
        })?;
    let fd = file.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags - OFlag::O_NONBLOCK))?;
    Ok(file)
}
