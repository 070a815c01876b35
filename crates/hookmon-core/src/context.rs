use std::{fmt::Display, path::Path, sync::OnceLock};

use crate::{
    channel::EventChannel,
    classifier,
    config::{ConfigSource, ProcessConfig},
    event::{EventRecord, Tag},
    logging, util,
};

/// What a hook needs from its surroundings: the process configuration and a
/// way to ship records to the controller.
pub trait Reporter {
    fn config(&self) -> &ProcessConfig;

    /// Ships a record. Never fails: undeliverable records are dropped.
    fn send(&self, record: EventRecord);

    fn is_private(&self, path: &Path) -> bool {
        classifier::is_private(self.config(), path)
    }

    /// Ships a stamped record.
    fn emit(&self, tag: Tag, payload: impl Display) {
        self.send(EventRecord::stamped(tag, payload))
    }
}

/// Process-scoped monitor state.
///
/// Lives in a `static` of the interposition library: configuration is loaded
/// on first use and kept for the lifetime of the process, a forked child
/// inherits whatever its parent already loaded.
#[derive(Debug)]
pub struct MonitorContext {
    source: Option<ConfigSource>,
    config: OnceLock<ProcessConfig>,
    channel: EventChannel,
}

impl Default for MonitorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorContext {
    /// Context reading its configuration from the environment of the
    /// process at the time of first use.
    pub const fn new() -> Self {
        Self {
            source: None,
            config: OnceLock::new(),
            channel: EventChannel::new(),
        }
    }

    pub fn with_source(source: ConfigSource) -> Self {
        Self {
            source: Some(source),
            config: OnceLock::new(),
            channel: EventChannel::new(),
        }
    }

    /// Context with an already known configuration.
    pub fn with_config(config: ProcessConfig) -> Self {
        Self {
            source: None,
            config: OnceLock::from(config),
            channel: EventChannel::new(),
        }
    }

    fn load(&self) -> ProcessConfig {
        logging::init_logger();
        match &self.source {
            Some(source) => source.load(),
            None => ConfigSource::from_env().load(),
        }
    }
}

impl Reporter for MonitorContext {
    fn config(&self) -> &ProcessConfig {
        self.config.get_or_init(|| self.load())
    }

    fn send(&self, record: EventRecord) {
        util::shielded(|| {
            let endpoint = &self.config().pipe;
            if let Err(err) = self.channel.send(endpoint, &record) {
                log::debug!("dropping {}", record.tag());
                crate::log_error("Event not delivered", err);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use nix::unistd::Pid;

    use super::*;

    #[test]
    fn loads_configuration_once() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("77.conf");
        fs::write(&conf, "pipe=/tmp/first\n").unwrap();

        let context =
            MonitorContext::with_source(ConfigSource::new(dir.path(), Pid::from_raw(77), Pid::from_raw(1)));
        assert_eq!(context.config().pipe, Path::new("/tmp/first"));

        fs::write(&conf, "pipe=/tmp/second\n").unwrap();
        assert_eq!(context.config().pipe, Path::new("/tmp/first"));
    }

    #[test]
    fn emits_to_configured_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = dir.path().join("events");
        fs::write(&endpoint, b"").unwrap();
        let context = MonitorContext::with_config(ProcessConfig {
            pipe: endpoint.clone(),
            results: dir.path().join("results/"),
            ..Default::default()
        });

        context.emit(Tag::FileDelete, "/tmp/a.txt");
        context.send(EventRecord::bare(Tag::Process, " 12"));

        let content = fs::read_to_string(&endpoint).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("FILE_DELETE:"));
        assert!(lines[0].ends_with(&format!("({})  : /tmp/a.txt", nix::unistd::getpid())));
        assert_eq!(lines[1], "PROCESS: 12");
    }

    #[test]
    fn unconfigured_context_drops_silently() {
        let context = MonitorContext::with_config(ProcessConfig::default());
        context.emit(Tag::Ptrace, "");
        assert!(!context.is_private(Path::new("/tmp/a.txt")));
    }
}
