//! LLM Bridge - session orchestration between a host application and an on-device
//! LLM runtime
//!
//! The crate classifies model checkpoints into families, keeps one runner per modality,
//! builds prompts from a bounded conversation history and streams generated tokens back
//! to the host in batches. The runtime itself is plugged in through
//! [`RunnerFactory`](model::RunnerFactory).

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod processing;
pub mod types;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_RUST_VERSION: &str = "1.70.0";

pub use config::BridgeConfig;
pub use engine::{deliver, BridgeBuilder, HostChannel, LlmBridge};
pub use error::{BridgeError, Result};
pub use metrics::{GenerationStats, MetricsCollector, MetricsSnapshot};
pub use model::{
    InferenceRunner, ModelConfig, ModelFamily, RunnerConfig, RunnerFactory, RunnerSpec,
    RuntimeError, TokenFlow,
};
pub use types::{
    BridgeEvent, BridgeStatus, FinishReason, GenerationConfig, GenerationHandle,
    GenerationResult, MemoryInfo, ModelResponse, TokenBatch,
};
