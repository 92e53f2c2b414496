//! Output sinks for phase duration records

use crate::correlation::Outcome;
use crate::models::PhaseDurationRecord;
use std::sync::Arc;

/// Destination for measured phase durations
///
/// Emission is fire-and-forget: sinks do not acknowledge or buffer.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: &PhaseDurationRecord);

    /// Called once per processed event, whether or not a record was emitted
    fn observe(&self, _outcome: &Outcome) {}
}

/// Forwards every record to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RecordSink for FanoutSink {
    fn emit(&self, record: &PhaseDurationRecord) {
        for sink in &self.sinks {
            sink.emit(record);
        }
    }

    fn observe(&self, outcome: &Outcome) {
        for sink in &self.sinks {
            sink.observe(outcome);
        }
    }
}
