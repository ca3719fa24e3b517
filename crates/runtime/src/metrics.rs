use std::collections::BTreeMap;
use std::fmt::Write as _;

/// In-process counters, gauges and latency summaries.
///
/// Names are kept in sorted maps so snapshots and log summaries have a
/// stable ordering.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Metrics {
    counters: BTreeMap<&'static str, u64>,
    gauges: BTreeMap<&'static str, i64>,
    latencies: BTreeMap<&'static str, Summary>,
}

/// Running count/min/max/mean over observed values.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&mut self, name: &'static str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&mut self, name: &'static str, by: u64) {
        *self.counters.entry(name).or_insert(0) += by;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn set_gauge(&mut self, name: &'static str, value: i64) {
        self.gauges.insert(name, value);
    }

    pub fn gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).copied()
    }

    pub fn observe(&mut self, name: &'static str, value: f64) {
        self.latencies.entry(name).or_default().observe(value);
    }

    pub fn summary(&self, name: &str) -> Option<Summary> {
        self.latencies.get(name).copied()
    }

    /// One-line `name=value` rendering for debug logs.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.counters {
            let _ = write!(out, "{k}={v} ");
        }
        for (k, v) in &self.gauges {
            let _ = write!(out, "{k}={v} ");
        }
        for (k, s) in &self.latencies {
            if let Some(mean) = s.mean() {
                let _ = write!(out, "{k}.mean={mean:.1} {k}.max={:.1} ", s.max);
            }
        }
        out.trim_end().to_string()
    }
}
