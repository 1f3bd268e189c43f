use crate::model::{ErrorCode, ModelResult};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

// Histogram covers 1ms .. 10min at 3 significant digits.
const HIST_LOW_MS: u64 = 1;
const HIST_HIGH_MS: u64 = 10 * 60 * 1000;
const HIST_SIGFIG: u8 = 3;

/// Upper bound on distinct model ids the registry will track.
pub const DEFAULT_MAX_TRACKED_MODELS: usize = 256;

#[derive(Debug)]
pub struct ModelStats {
    pub request_count: AtomicU64,
    pub error_count: AtomicU64,
    // EWMA of latency (microseconds)
    pub ewma_latency_us: AtomicU64,
    latency_ms: Mutex<Histogram<u64>>,
}

impl ModelStats {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            ewma_latency_us: AtomicU64::new(0),
            latency_ms: Mutex::new(new_histogram()),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let latency_us = latency.as_micros() as u64;

        // new_avg = (old_avg * 7 + new_val) / 8  (Alpha = 1/8)
        let mut old = self.ewma_latency_us.load(Ordering::Relaxed);
        loop {
            let new_val = if old == 0 { latency_us } else { (old * 7 + latency_us) / 8 };

            match self
                .ewma_latency_us
                .compare_exchange_weak(old, new_val, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(x) => old = x,
            }
        }

        let ms = (latency.as_millis() as u64).clamp(HIST_LOW_MS, HIST_HIGH_MS);
        let mut hist = self.latency_ms.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Clamped into range above, so this cannot fail.
        let _ = hist.record(ms);
    }

    pub fn record_failure(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, model: &str) -> ModelStatsSnapshot {
        let hist = self.latency_ms.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (p50, p99) = if hist.is_empty() {
            (0, 0)
        } else {
            (hist.value_at_quantile(0.5), hist.value_at_quantile(0.99))
        };

        ModelStatsSnapshot {
            model: model.to_string(),
            requests: self.request_count.load(Ordering::Relaxed),
            errors: self.error_count.load(Ordering::Relaxed),
            ewma_latency_ms: self.ewma_latency_us.load(Ordering::Relaxed) / 1000,
            p50_latency_ms: p50,
            p99_latency_ms: p99,
        }
    }
}

impl Default for ModelStats {
    fn default() -> Self {
        Self::new()
    }
}

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(HIST_LOW_MS, HIST_HIGH_MS, HIST_SIGFIG)
        .expect("histogram bounds are constant and valid")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatsSnapshot {
    pub model: String,
    pub requests: u64,
    pub errors: u64,
    pub ewma_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p99_latency_ms: u64,
}

/// Latency and error counters per model id, fed from finished batches.
///
/// Model ids come straight from callers, so ids no provider serves are never
/// tracked and the number of tracked ids is capped.
#[derive(Debug)]
pub struct StatsRegistry {
    models: RwLock<HashMap<String, Arc<ModelStats>>>,
    max_models: usize,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::with_max_models(DEFAULT_MAX_TRACKED_MODELS)
    }

    pub fn with_max_models(max_models: usize) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            max_models,
        }
    }

    fn entry(&self, model: &str) -> Option<Arc<ModelStats>> {
        if let Some(stats) = self.models.read().unwrap_or_else(|p| p.into_inner()).get(model) {
            return Some(stats.clone());
        }
        let mut models = self.models.write().unwrap_or_else(|p| p.into_inner());
        if let Some(stats) = models.get(model) {
            return Some(stats.clone());
        }
        if models.len() >= self.max_models {
            return None;
        }
        let stats = Arc::new(ModelStats::new());
        models.insert(model.to_string(), stats.clone());
        Some(stats)
    }

    pub fn record(&self, result: &ModelResult) {
        if result.error_code() == Some(ErrorCode::UnsupportedModel) {
            return;
        }
        let Some(stats) = self.entry(result.model()) else {
            debug!(model = result.model(), "stats registry full, result not tracked");
            return;
        };
        match result {
            ModelResult::Success(s) => {
                stats.record_success(Duration::from_millis(s.response_time_ms))
            }
            ModelResult::Failure(_) => stats.record_failure(),
        }
    }

    pub fn record_batch(&self, results: &[ModelResult]) {
        for result in results {
            self.record(result);
        }
    }

    /// Snapshots sorted by model id.
    pub fn snapshot(&self) -> Vec<ModelStatsSnapshot> {
        let models = self.models.read().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<ModelStatsSnapshot> =
            models.iter().map(|(id, s)| s.snapshot(id)).collect();
        out.sort_by(|a, b| a.model.cmp(&b.model));
        out
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
