use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::types::{GenerationMetrics, LoadMetrics, MetricsSnapshot};
use super::MAX_METRICS_HISTORY;
use crate::model::LoadOutcome;
use crate::types::{FinishReason, GenerationResult};

/// Collects bridge metrics. Cheap to call from the worker thread.
pub struct MetricsCollector {
    enabled: bool,
    state: RwLock<MetricsState>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct MetricsState {
    total_generations: usize,
    total_tokens: u64,
    completed: usize,
    stopped_by_token: usize,
    cancelled: usize,
    failed: usize,

    // bounded windows
    tokens_per_second: Vec<f64>,
    latencies: Vec<Duration>,
    load_times: Vec<Duration>,

    loaded: usize,
    tolerated: usize,
    load_failed: usize,

    errors: HashMap<String, usize>,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: RwLock::new(MetricsState::default()),
            start_time: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the outcome of a load attempt. `AlreadyLoaded` and `NoRunner` are not loads.
    pub fn record_load(&self, outcome: &LoadOutcome) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.write();
        match outcome {
            LoadOutcome::Loaded(elapsed) => {
                state.loaded += 1;
                push_bounded(&mut state.load_times, *elapsed);
            }
            LoadOutcome::Tolerated(_) => state.tolerated += 1,
            LoadOutcome::Failed(_) => state.load_failed += 1,
            LoadOutcome::AlreadyLoaded | LoadOutcome::NoRunner => {}
        }
    }

    /// Record a finished generation
    pub fn record_generation(&self, result: &GenerationResult, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.write();
        state.total_generations += 1;
        state.total_tokens += result.total_tokens;

        match (result.success, result.finish_reason) {
            (false, _) => state.failed += 1,
            (true, Some(FinishReason::StopToken)) => state.stopped_by_token += 1,
            (true, Some(FinishReason::Cancelled)) => state.cancelled += 1,
            (true, _) => state.completed += 1,
        }

        push_bounded(&mut state.latencies, elapsed);
        let secs = elapsed.as_secs_f64();
        if result.total_tokens > 0 && secs > 0.0 {
            let tps = result.total_tokens as f64 / secs;
            push_bounded(&mut state.tokens_per_second, tps);
        }
    }

    /// Record an error under its kind label
    pub fn record_error(&self, kind: &str) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.write();
        *state.errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read();

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            generation: GenerationMetrics {
                total_generations: state.total_generations,
                total_tokens: state.total_tokens,
                average_tokens_per_second: average(&state.tokens_per_second),
                average_latency: average_duration(&state.latencies),
                completed: state.completed,
                stopped_by_token: state.stopped_by_token,
                cancelled: state.cancelled,
                failed: state.failed,
            },
            load: LoadMetrics {
                loaded: state.loaded,
                tolerated: state.tolerated,
                failed: state.load_failed,
                average_load_time: average_duration(&state.load_times),
            },
            errors: state.errors.clone(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

fn push_bounded<T>(window: &mut Vec<T>, value: T) {
    if window.len() >= MAX_METRICS_HISTORY {
        window.remove(0);
    }
    window.push(value);
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn average_duration(values: &[Duration]) -> Duration {
    if values.is_empty() {
        return Duration::ZERO;
    }
    values.iter().sum::<Duration>() / values.len() as u32
}
