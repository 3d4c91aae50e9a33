use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Timing report of one generation, as produced by the native runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub generated_tokens: u64,
    pub inference_end_ms: u64,
    pub prompt_eval_end_ms: u64,
    /// Generated tokens over the decode window (prompt evaluation excluded)
    pub tokens_per_second: f64,
}

#[derive(Deserialize)]
struct RuntimeStatsReport {
    generated_tokens: u64,
    inference_end_ms: u64,
    prompt_eval_end_ms: u64,
}

impl GenerationStats {
    /// Parse the runtime's JSON stats document
    pub fn from_runtime_json(json: &str) -> Result<Self> {
        let report: RuntimeStatsReport = serde_json::from_str(json)?;
        let decode_ms = report.inference_end_ms.saturating_sub(report.prompt_eval_end_ms);
        let tokens_per_second = if decode_ms > 0 {
            report.generated_tokens as f64 / decode_ms as f64 * 1000.0
        } else {
            0.0
        };

        Ok(Self {
            generated_tokens: report.generated_tokens,
            inference_end_ms: report.inference_end_ms,
            prompt_eval_end_ms: report.prompt_eval_end_ms,
            tokens_per_second,
        })
    }
}

/// Counts per load outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub loaded: usize,
    /// Failed with the tolerated code and treated as usable
    pub tolerated: usize,
    pub failed: usize,
    pub average_load_time: Duration,
}

/// Generation counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub total_generations: usize,
    pub total_tokens: u64,
    pub average_tokens_per_second: f64,
    pub average_latency: Duration,
    pub completed: usize,
    pub stopped_by_token: usize,
    pub cancelled: usize,
    pub failed: usize,
}

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub generation: GenerationMetrics,
    pub load: LoadMetrics,
    /// Error count per error kind label
    pub errors: HashMap<String, usize>,
}

impl MetricsSnapshot {
    pub fn error_count(&self) -> usize {
        self.errors.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stats_from_runtime_json() {
        let stats = GenerationStats::from_runtime_json(
            r#"{"generated_tokens": 50, "inference_end_ms": 3000, "prompt_eval_end_ms": 500, "model_load_start_ms": 0}"#,
        )
        .unwrap();
        assert_eq!(stats.generated_tokens, 50);
        assert_eq!(stats.tokens_per_second, 20.0);
    }

    #[test]
    fn test_stats_empty_window() {
        let stats = GenerationStats::from_runtime_json(
            r#"{"generated_tokens": 5, "inference_end_ms": 100, "prompt_eval_end_ms": 100}"#,
        )
        .unwrap();
        assert_eq!(stats.tokens_per_second, 0.0);
    }

    #[test]
    fn test_stats_rejects_malformed() {
        assert!(GenerationStats::from_runtime_json("{}").is_err());
        assert!(GenerationStats::from_runtime_json("not json").is_err());
    }

    #[test]
    fn test_error_count() {
        let snapshot = MetricsSnapshot {
            uptime: Duration::ZERO,
            generation: GenerationMetrics::default(),
            load: LoadMetrics::default(),
            errors: HashMap::from([("load".to_string(), 2), ("generation".to_string(), 1)]),
        };
        assert_eq!(snapshot.error_count(), 3);
    }
}
