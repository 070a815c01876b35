use std::env;

use env_logger::{Env, Target};

/// Environment variable holding the diagnostics filter.
pub const LOG_ENV: &str = "HOOKMON_LOG";

/// Init logger. Diagnostics are off unless `HOOKMON_LOG` is set, in which
/// case its value is used as an `env_logger` filter and lines go to stderr.
///
/// A logger already installed by the host program is left in place.
pub fn init_logger() {
    if env::var_os(LOG_ENV).is_none() {
        return;
    }
    let _ = env_logger::Builder::from_env(Env::new().filter(LOG_ENV))
        .target(Target::Stderr)
        .format_module_path(true)
        .try_init();
}
