//! Metrics collection and reporting using metrics-rs.
//!
//! Servers and the harness record counters through the `metrics` facade;
//! nothing is stored unless a recorder is installed. The CLI installs [`CliRecorder`]
//! when `--metrics` is passed and prints a summary on exit.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter,
};
use parking_lot::RwLock;

// ============================================================================
// Metric descriptions
// ============================================================================

/// Initialize metric descriptions.
///
/// Call this once at startup to register metric descriptions.
pub fn init() {
    describe_counter!(
        "rspdiff_packets_total",
        Unit::Count,
        "Framed packets received"
    );
    describe_counter!(
        "rspdiff_commands_total",
        Unit::Count,
        "Commands dispatched by the server"
    );
    describe_counter!(
        "rspdiff_checksum_failures_total",
        Unit::Count,
        "Packets rejected with a negative acknowledgment"
    );
    describe_counter!(
        "rspdiff_exchanges_total",
        Unit::Count,
        "Commands sent to both reference and candidate"
    );
    describe_counter!(
        "rspdiff_divergences_total",
        Unit::Count,
        "Exchanges whose replies differed"
    );
}

// ============================================================================
// Metric recording functions
// ============================================================================

/// Record one framed packet received by a server.
pub fn record_packet() {
    counter!("rspdiff_packets_total").increment(1);
}

/// Record a dispatched command.
pub fn record_command(name: &'static str) {
    counter!("rspdiff_commands_total", "command" => name).increment(1);
}

/// Record a packet rejected because of its checksum.
pub fn record_checksum_failure() {
    counter!("rspdiff_checksum_failures_total").increment(1);
}

/// Record one paired exchange and whether it diverged.
pub fn record_exchange(diverged: bool) {
    counter!("rspdiff_exchanges_total").increment(1);
    if diverged {
        counter!("rspdiff_divergences_total").increment(1);
    }
}

// ============================================================================
// CLI Recorder for terminal output
// ============================================================================

/// Storage for counter values.
#[derive(Default)]
struct CounterStorage {
    values: RwLock<HashMap<String, u64>>,
}

struct CliCounter {
    key: String,
    storage: Arc<CounterStorage>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        let mut values = self.storage.values.write();
        *values.entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        let mut values = self.storage.values.write();
        values.insert(self.key.clone(), value);
    }
}

/// CLI recorder that stores counters for terminal output.
///
/// Only counters are recorded; gauges and histograms are discarded.
#[derive(Default)]
pub struct CliRecorder {
    counters: Arc<CounterStorage>,
}

impl CliRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle reading this recorder's values.
    pub fn handle(&self) -> CliRecorderHandle {
        CliRecorderHandle {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Install this recorder as the global metrics recorder.
    ///
    /// Returns `None` if another recorder is already installed.
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

fn key_to_string(key: &Key) -> String {
    let name = key.name();
    let labels = key.labels();
    if labels.len() == 0 {
        name.to_string()
    } else {
        let label_str: Vec<String> = labels
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        format!("{}{{{}}}", name, label_str.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Handle for accessing recorded metrics after installing the CLI recorder.
pub struct CliRecorderHandle {
    counters: Arc<CounterStorage>,
}

impl CliRecorderHandle {
    /// Get a counter value by key, e.g. `rspdiff_commands_total{command=step}`.
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters.values.read().get(key).copied()
    }

    /// Print all collected counters in a human-readable format.
    pub fn print_summary(&self) {
        let counters = self.counters.values.read();

        if counters.is_empty() {
            println!("No metrics collected.");
            return;
        }

        println!();
        println!("## Metrics Summary");
        println!();
        println!("### Counters");
        let mut keys: Vec<_> = counters.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = counters.get(key) {
                println!("  {key}: {value}");
            }
        }
        println!();
    }
}
