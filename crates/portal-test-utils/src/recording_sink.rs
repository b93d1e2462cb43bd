//! Metric sink that keeps every event for inspection.

use portal_service::observability::{MetricDetails, MetricEvent, MetricSink};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MetricEvent>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the emitting thread for `delay` whenever an event named `name`
    /// is emitted. Needs a multi-thread runtime to let other tasks progress.
    pub fn delay_on(&self, name: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(name.to_string(), delay);
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Details of every `duration` event named `name`, in emission order.
    pub fn durations(&self, name: &str) -> Vec<MetricDetails> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::Duration { name: n, details, .. } if n == name => Some(details),
                _ => None,
            })
            .collect()
    }

    /// Details of every `normal` event named `name`, in emission order.
    pub fn normals(&self, name: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::Normal { name: n, details, .. } if n == name => Some(details),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl MetricSink for RecordingSink {
    fn emit(&self, event: &MetricEvent) {
        let delay = self.delays.lock().unwrap().get(event.name()).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.events.lock().unwrap().push(event.clone());
    }
}
