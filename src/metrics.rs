//! Inference metrics and statistics tracking for the dashboard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Per-model bookkeeping
#[derive(Debug, Default, Clone)]
struct ModelRecord {
    calls: u64,
    rows: u64,
    failures: u64,
    /// Invocation times (in microseconds)
    times_us: Vec<u64>,
}

/// Metrics collector shared by every render pass of a session
pub struct InferenceMetrics {
    /// Render passes started
    pub renders: AtomicU64,
    /// Render passes halted by a load failure
    pub load_failures: AtomicU64,
    /// Sections that rendered an error banner instead of content
    pub section_failures: AtomicU64,
    models: RwLock<HashMap<String, ModelRecord>>,
    start_time: Instant,
}

impl InferenceMetrics {
    pub fn new() -> Self {
        Self {
            renders: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            section_failures: AtomicU64::new(0),
            models: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_section_failure(&self) {
        self.section_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one model invocation
    pub fn record_model_call(&self, model_name: &str, rows: usize, duration: Duration, ok: bool) {
        if let Ok(mut models) = self.models.write() {
            let record = models.entry(model_name.to_string()).or_default();
            record.calls += 1;
            record.rows += rows as u64;
            if !ok {
                record.failures += 1;
            }
            record.times_us.push(duration.as_micros() as u64);
            // Keep only last 1000 per model
            if record.times_us.len() > 1000 {
                record.times_us.drain(0..500);
            }
        }
    }

    /// Total invocations across every model
    pub fn total_model_calls(&self) -> u64 {
        self.models
            .read()
            .map(|models| models.values().map(|r| r.calls).sum())
            .unwrap_or(0)
    }

    /// Get model performance stats
    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let Ok(models) = self.models.read() else {
            return HashMap::new();
        };

        models
            .iter()
            .map(|(model, record)| {
                let mut sorted = record.times_us.clone();
                sorted.sort_unstable();
                let count = sorted.len();

                let (mean_us, p50_us, p99_us) = if count == 0 {
                    (0, 0, 0)
                } else {
                    (
                        sorted.iter().sum::<u64>() / count as u64,
                        sorted[count / 2],
                        sorted[((count as f64 * 0.99) as usize).min(count - 1)],
                    )
                };

                (
                    model.clone(),
                    ModelStats {
                        calls: record.calls,
                        rows: record.rows,
                        failures: record.failures,
                        mean_us,
                        p50_us,
                        p99_us,
                    },
                )
            })
            .collect()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let renders = self.renders.load(Ordering::Relaxed);
        let load_failures = self.load_failures.load(Ordering::Relaxed);
        let section_failures = self.section_failures.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs_f64();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            SUPPLY CHAIN DASHBOARD - INFERENCE SUMMARY        ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Render Passes: {:>6}  │  Load Failures: {:>4}  │  {:>7.2}s ║",
            renders, load_failures, uptime
        );
        info!("║ Section Failures: {:>6}                                     ║", section_failures);
        info!("╚══════════════════════════════════════════════════════════════╝");

        let model_stats = self.get_model_stats();
        if !model_stats.is_empty() {
            info!("Model Inference Times (μs):");
            for (model, stats) in &model_stats {
                info!(
                    "  {}: mean={} p50={} p99={} (calls={}, rows={}, failures={})",
                    model, stats.mean_us, stats.p50_us, stats.p99_us, stats.calls, stats.rows, stats.failures
                );
            }
        }
    }
}

impl Default for InferenceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model-specific statistics
#[derive(Debug)]
pub struct ModelStats {
    pub calls: u64,
    pub rows: u64,
    pub failures: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}
