use std::{os::unix::ffi::OsStrExt, path::Path};

use crate::config::ProcessConfig;

/// Returns true if `path` belongs to the monitor's private storage: it
/// contains the results directory or the event endpoint path.
///
/// Activity on these paths is the monitor's own bookkeeping and reporting it
/// would feed the channel with its own writes.
pub fn is_private(config: &ProcessConfig, path: &Path) -> bool {
    contains(path, &config.results) || contains(path, &config.pipe)
}

/// Substring match on the raw bytes. An empty needle never matches.
fn contains(haystack: &Path, needle: &Path) -> bool {
    let needle = needle.as_os_str().as_bytes();
    !needle.is_empty()
        && haystack
            .as_os_str()
            .as_bytes()
            .windows(needle.len())
            .any(|window| window == needle)
}
