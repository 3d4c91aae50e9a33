//! Generation and load metrics

mod collector;
mod types;

pub use collector::MetricsCollector;
pub use types::{GenerationMetrics, GenerationStats, LoadMetrics, MetricsSnapshot};

pub(crate) const MAX_METRICS_HISTORY: usize = 1000;
