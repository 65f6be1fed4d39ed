//! Recorder capturing counter values, for tests

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Counters keyed by `name{label=value,...}` with labels sorted by name
#[derive(Debug, Default)]
pub(crate) struct CapturingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

fn render(name: &str, labels: &[(&str, &str)]) -> String {
    let mut labels: Vec<_> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    labels.sort();
    format!("{}{{{}}}", name, labels.join(","))
}

impl CapturingRecorder {
    /// Current value of a counter, zero if never touched
    pub(crate) fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(&render(name, labels))
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl Recorder for CapturingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let labels: Vec<_> = key.labels().map(|l| (l.key(), l.value())).collect();
        let rendered = render(key.name(), &labels);
        let counter = self
            .counters
            .lock()
            .unwrap()
            .entry(rendered)
            .or_default()
            .clone();
        Counter::from_arc(counter)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
