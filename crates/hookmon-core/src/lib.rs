//! Shared building blocks of the hookmon interposition library.
//!
//! Every hook family (file activity, process lifecycle, anti-debug) is
//! written against the types in this crate:
//!
//! - [config]: the per-process `key=value` configuration written by the
//!   sandbox controller, loaded lazily and exactly once.
//! - [classifier]: decides whether a path belongs to the monitor's own
//!   private storage and must not be reported.
//! - [event] and [channel]: the wire records and the single outbound
//!   endpoint they are written to.
//! - [context]: the process-scoped [MonitorContext] tying the above
//!   together, and the [Reporter] seam hooks are generic over.
//! - [util]: hex dumps, timestamps, descriptor resolution, file replication.
//!
//! Nothing here ever returns an error to the monitored program. Failures are
//! logged through the `log` facade (silent unless `HOOKMON_LOG` is set) and
//! the hooked call proceeds.

pub mod channel;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod util;

pub use context::{MonitorContext, Reporter};
pub use error::HookError;
pub use event::{EventRecord, Tag};

pub use nix::unistd::Pid;

/// Utility function to log an error together with its sources.
///
/// By default Rust won't print the source of an error message, so we use
/// anyhow as an error pretty-printer.
pub fn log_error<E: std::error::Error + Send + Sync + 'static>(msg: &str, err: E) {
    log::debug!("{}: {:?}", msg, anyhow::Error::from(err));
}
