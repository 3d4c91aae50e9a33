//! Streaming generation: token filtering, batching and cancellation

mod batch;
mod common;
mod stream;

pub use batch::{TokenBatcher, DEFAULT_BATCH_THRESHOLD};
pub use common::{CancellationFlag, PipelineState};
pub use stream::{GenerationPipeline, PipelineOutcome};
