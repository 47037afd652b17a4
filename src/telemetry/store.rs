//! Thread-safe labelled metric store.
//!
//! Backs the default meter. Every series is keyed by name plus a sorted
//! label set; values live in atomics so the hot path only takes a read lock.
//! The store can render itself in exposition format, which is what the
//! built-in `system` source publishes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A metric name with its label set, labels sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        labels.sort();
        Self { name: name.to_string(), labels }
    }

    /// Series identifier in exposition syntax, e.g. `name{a="1"}`.
    pub fn id(&self) -> String {
        self.id_with_suffix("")
    }

    fn id_with_suffix(&self, suffix: &str) -> String {
        if self.labels.is_empty() {
            return format!("{}{}", self.name, suffix);
        }
        let labels: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
            .collect();
        format!("{}{}{{{}}}", self.name, suffix, labels.join(","))
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Snapshot of all series at a point in time, keyed by series id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary statistics for a histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSummary {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

struct HistogramData {
    count: AtomicU64,
    sum: AtomicU64, // f64 bits
    min: AtomicU64, // f64 bits
    max: AtomicU64, // f64 bits
}

impl HistogramData {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(f64::to_bits(0.0)),
            min: AtomicU64::new(f64::to_bits(f64::MAX)),
            max: AtomicU64::new(f64::to_bits(f64::MIN)),
        }
    }

    fn record(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        update_f64(&self.sum, |current| Some(current + value));
        update_f64(&self.min, |current| (value < current).then_some(value));
        update_f64(&self.max, |current| (value > current).then_some(value));
    }

    fn to_summary(&self) -> HistogramSummary {
        let count = self.count.load(Ordering::Relaxed);
        let sum = f64::from_bits(self.sum.load(Ordering::Relaxed));
        let min = f64::from_bits(self.min.load(Ordering::Relaxed));
        let max = f64::from_bits(self.max.load(Ordering::Relaxed));

        HistogramSummary {
            count,
            sum,
            min: if count == 0 { 0.0 } else { min },
            max: if count == 0 { 0.0 } else { max },
        }
    }
}

/// CAS loop over an f64 stored as bits. `next` returns None to leave it unchanged.
fn update_f64(atomic: &AtomicU64, next: impl Fn(f64) -> Option<f64>) {
    let _ = atomic.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        next(f64::from_bits(bits)).map(f64::to_bits)
    });
}

/// Thread-safe labelled metric store.
pub struct MetricsStore {
    counters: RwLock<BTreeMap<SeriesKey, AtomicU64>>,
    gauges: RwLock<BTreeMap<SeriesKey, AtomicU64>>,
    histograms: RwLock<BTreeMap<SeriesKey, HistogramData>>,
    descriptions: RwLock<BTreeMap<String, String>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
            descriptions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Attach help text to a metric name.
    pub fn describe(&self, name: &str, description: &str) {
        self.descriptions
            .write()
            .entry(name.to_string())
            .or_insert_with(|| description.to_string());
    }

    /// Increment a counter series by the given value.
    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let key = SeriesKey::new(name, labels);
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(&key) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Set a gauge series to the given value.
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.with_gauge(name, labels, |gauge| gauge.store(f64::to_bits(value), Ordering::Relaxed));
    }

    /// Add a signed delta to a gauge series.
    pub fn add_gauge(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        self.with_gauge(name, labels, |gauge| update_f64(gauge, |current| Some(current + delta)));
    }

    fn with_gauge(&self, name: &str, labels: &[(&str, &str)], apply: impl Fn(&AtomicU64)) {
        let key = SeriesKey::new(name, labels);
        {
            let gauges = self.gauges.read();
            if let Some(gauge) = gauges.get(&key) {
                apply(gauge);
                return;
            }
        }
        let mut gauges = self.gauges.write();
        let gauge = gauges
            .entry(key)
            .or_insert_with(|| AtomicU64::new(f64::to_bits(0.0)));
        apply(gauge);
    }

    /// Record a histogram observation.
    pub fn record_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(name, labels);
        {
            let histograms = self.histograms.read();
            if let Some(histogram) = histograms.get(&key) {
                histogram.record(value);
                return;
            }
        }
        self.histograms
            .write()
            .entry(key)
            .or_insert_with(HistogramData::new)
            .record(value);
    }

    /// Take a snapshot of all series.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            counters: self
                .counters
                .read()
                .iter()
                .map(|(k, v)| (k.id(), v.load(Ordering::Relaxed)))
                .collect(),
            gauges: self
                .gauges
                .read()
                .iter()
                .map(|(k, v)| (k.id(), f64::from_bits(v.load(Ordering::Relaxed))))
                .collect(),
            histograms: self
                .histograms
                .read()
                .iter()
                .map(|(k, v)| (k.id(), v.to_summary()))
                .collect(),
        }
    }

    /// Render every series in exposition format.
    ///
    /// Histograms are published as summaries without quantiles (`_count`,
    /// `_sum`), followed by `<name>_min` and `<name>_max` gauge families.
    pub fn render_exposition(&self) -> String {
        let descriptions = self.descriptions.read();
        let mut out = String::new();

        let counters = self.counters.read();
        let mut last_name = None;
        for (key, value) in counters.iter() {
            if last_name != Some(&key.name) {
                write_header(&mut out, &descriptions, &key.name, "counter");
                last_name = Some(&key.name);
            }
            let _ = writeln!(out, "{} {}", key.id(), value.load(Ordering::Relaxed));
        }

        let gauges = self.gauges.read();
        let mut last_name = None;
        for (key, value) in gauges.iter() {
            if last_name != Some(&key.name) {
                write_header(&mut out, &descriptions, &key.name, "gauge");
                last_name = Some(&key.name);
            }
            let _ = writeln!(out, "{} {}", key.id(), f64::from_bits(value.load(Ordering::Relaxed)));
        }

        let histograms = self.histograms.read();
        let mut families: Vec<(&str, Vec<(&SeriesKey, HistogramSummary)>)> = Vec::new();
        for (key, data) in histograms.iter() {
            let summary = data.to_summary();
            match families.last_mut() {
                Some((name, series)) if *name == key.name => series.push((key, summary)),
                _ => families.push((key.name.as_str(), vec![(key, summary)])),
            }
        }
        for (name, series) in &families {
            write_histogram_family(&mut out, &descriptions, name, series);
        }

        out
    }

    /// Drop every series.
    pub fn clear(&self) {
        self.counters.write().clear();
        self.gauges.write().clear();
        self.histograms.write().clear();
    }
}

fn write_header(out: &mut String, descriptions: &BTreeMap<String, String>, name: &str, kind: &str) {
    if let Some(help) = descriptions.get(name) {
        let _ = writeln!(out, "# HELP {} {}", name, help);
    }
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

type SummaryField = fn(&HistogramSummary) -> f64;

fn write_histogram_family(
    out: &mut String,
    descriptions: &BTreeMap<String, String>,
    name: &str,
    series: &[(&SeriesKey, HistogramSummary)],
) {
    write_header(out, descriptions, name, "summary");
    for (key, summary) in series {
        let _ = writeln!(out, "{} {}", key.id_with_suffix("_count"), summary.count);
        let _ = writeln!(out, "{} {}", key.id_with_suffix("_sum"), summary.sum);
    }

    let extremes: [(&str, &str, SummaryField); 2] = [
        ("_min", "Smallest", |s| s.min),
        ("_max", "Largest", |s| s.max),
    ];
    for (suffix, adjective, field) in extremes {
        let _ = writeln!(out, "# HELP {}{} {} observed value of {}", name, suffix, adjective, name);
        let _ = writeln!(out, "# TYPE {}{} gauge", name, suffix);
        for (key, summary) in series {
            let _ = writeln!(out, "{} {}", key.id_with_suffix(suffix), field(summary));
        }
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}
