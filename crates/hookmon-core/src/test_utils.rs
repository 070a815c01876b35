//! Helpers for testing hooks without a controller.

use std::sync::{Arc, Mutex};

use crate::{config::ProcessConfig, context::Reporter, event::EventRecord};

/// Ordered log shared between a [RecordingReporter] and test doubles, so
/// tests can assert on the interleaving of records and side effects.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// [Reporter] keeping every record in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    config: ProcessConfig,
    records: Mutex<Vec<EventRecord>>,
    journal: Option<Journal>,
}

impl RecordingReporter {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            records: Mutex::default(),
            journal: None,
        }
    }

    /// Also appends `emit <line>` to `journal` for every record.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records as `TAG:body`, without the trailing newline.
    pub fn lines(&self) -> Vec<String> {
        self.records().iter().map(ToString::to_string).collect()
    }

    /// Records with their timestamp and pid prefix cut off, as
    /// `TAG:payload`. Bare records are returned whole.
    pub fn payloads(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|record| match record.body().split_once(")  : ") {
                Some((_, payload)) => format!("{}:{payload}", record.tag()),
                None => record.to_string(),
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn config(&self) -> &ProcessConfig {
        &self.config
    }

    fn send(&self, record: EventRecord) {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("emit {record}"));
        }
        self.records.lock().unwrap().push(record);
    }
}
