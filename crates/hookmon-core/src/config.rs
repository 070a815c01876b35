//! Per-process configuration written by the sandbox controller.
//!
//! The controller drops a `<pid>.conf` file in the temporary directory before
//! resuming a monitored process. Its content is a list of `key=value` lines:
//!
//! ```text
//! host-ip=192.168.56.1
//! host-port=2042
//! pipe=/tmp/cuckoo.pipe
//! results=/tmp/results/
//! analyzer=/tmp/analyzer
//! first-process=1
//! startup-time=1500
//! ```

use std::{
    collections::HashMap,
    env,
    fmt::Display,
    fs, io,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    str::FromStr,
};

use nix::unistd::{Pid, getpid, getppid};
use thiserror::Error;

use crate::error::HookError;

/// Raw `key=value` pairs of a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    inner: HashMap<String, String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl ConfigMap {
    /// Parses the content of a configuration file.
    ///
    /// Each line is cut at its first carriage return or newline, then split
    /// at the first `=`. Lines without `=` are skipped and later duplicates
    /// win.
    pub fn parse(content: &str) -> Self {
        let mut map = Self::default();
        for line in content.split('\n') {
            let line = line.split('\r').next().unwrap_or_default();
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.to_string(), value.to_string());
            }
        }
        map
    }

    /// Inserts a new configuration value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.inner.insert(key, value)
    }

    /// Returns an option of raw configuration value.
    pub fn get_raw(&self, config_name: &str) -> Option<&str> {
        self.inner.get(config_name).map(String::as_str)
    }

    /// Returns an optional typed configuration value.
    pub fn optional<T>(&self, config_name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .map(|value| parse(value, config_name))
            .transpose()
    }

    /// Returns a typed configuration value, or `default` if the field is missing.
    pub fn with_default<T>(&self, config_name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        Ok(self.optional(config_name)?.unwrap_or(default))
    }

    /// A flag is set when its value starts with `1`.
    pub fn flag(&self, config_name: &str) -> bool {
        self.get_raw(config_name)
            .is_some_and(|value| value.starts_with('1'))
    }
}

fn parse<T>(value: &str, config_name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    T::from_str(value).map_err(|err| ConfigError::InvalidValue {
        field: config_name.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

/// Process-wide configuration of the monitor.
///
/// Every field keeps its zero value when the controller did not provide it,
/// so a process without configuration file ends up with an empty `pipe` and
/// all events are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Event channel endpoint (a FIFO created by the controller).
    pub pipe: PathBuf,
    /// Results store receiving replicated files.
    pub results: PathBuf,
    /// Directory of the in-guest analyzer.
    pub analyzer: PathBuf,
    pub first_process: bool,
    pub startup_time: i64,
    pub retaddr_check: bool,
    pub host_ip: Ipv4Addr,
    pub host_port: u16,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            pipe: PathBuf::new(),
            results: PathBuf::new(),
            analyzer: PathBuf::new(),
            first_process: false,
            startup_time: 0,
            retaddr_check: false,
            host_ip: Ipv4Addr::UNSPECIFIED,
            host_port: 0,
        }
    }
}

impl From<&ConfigMap> for ProcessConfig {
    /// Malformed values are logged and leave the field at its default.
    fn from(config: &ConfigMap) -> Self {
        let defaults = ProcessConfig::default();
        Self {
            pipe: lenient(config, "pipe", defaults.pipe),
            results: lenient(config, "results", defaults.results),
            analyzer: lenient(config, "analyzer", defaults.analyzer),
            first_process: config.flag("first-process"),
            startup_time: lenient(config, "startup-time", defaults.startup_time),
            retaddr_check: config.flag("retaddr-check"),
            host_ip: lenient(config, "host-ip", defaults.host_ip),
            host_port: lenient(config, "host-port", defaults.host_port),
        }
    }
}

fn lenient<T>(config: &ConfigMap, config_name: &str, default: T) -> T
where
    T: FromStr + Clone,
    <T as FromStr>::Err: Display,
{
    config
        .with_default(config_name, default.clone())
        .unwrap_or_else(|err| {
            log::warn!("{err}, using default");
            default
        })
}

/// Where the configuration of a process lives.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    dir: PathBuf,
    pid: Pid,
    ppid: Pid,
}

impl ConfigSource {
    pub fn new(dir: impl Into<PathBuf>, pid: Pid, ppid: Pid) -> Self {
        Self {
            dir: dir.into(),
            pid,
            ppid,
        }
    }

    /// Source of the calling process: `TMPDIR` (or the system default) and
    /// the current pid/ppid.
    pub fn from_env() -> Self {
        Self::new(env::temp_dir(), getpid(), getppid())
    }

    /// Candidate files, in lookup order.
    pub fn candidates(&self) -> [PathBuf; 2] {
        [
            config_file(&self.dir, self.pid),
            config_file(&self.dir, self.ppid),
        ]
    }

    /// Loads the first candidate file that exists.
    ///
    /// The file is left in place: siblings forked from the same parent may
    /// still need to read it.
    pub fn load(&self) -> ProcessConfig {
        for path in self.candidates() {
            match fs::read(&path) {
                Ok(content) => {
                    let map = ConfigMap::parse(&String::from_utf8_lossy(&content));
                    return ProcessConfig::from(&map);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    crate::log_error("Skipping configuration", HookError::ConfigRead { source, path })
                }
            }
        }
        log::debug!("no configuration found for process {}", self.pid);
        ProcessConfig::default()
    }
}

fn config_file(dir: &Path, pid: Pid) -> PathBuf {
    dir.join(format!("{pid}.conf"))
}
