//! Model module: family classification, conversation history and runner lifecycle

mod family;
mod history;
mod pool;
mod runner;

#[cfg(test)]
pub(crate) use runner::mock;

pub use family::{apply_template, Modality, ModelFamily, PROMPT_PLACEHOLDER};
pub use history::ConversationHistory;
pub use pool::{LoadOutcome, LoadPolicy, ModelConfig, RunnerHandle, RunnerPool};
pub use runner::{
    InferenceRunner, RunnerConfig, RunnerFactory, RunnerSpec, RunnerState, RuntimeError,
    TokenFlow,
};

/// Runtime error code reported when tokenizer initialization trips during load
pub const TOKENIZER_QUIRK_ERROR_CODE: i32 = 32;

pub(crate) const DEFAULT_HISTORY_CAPACITY: usize = 20;
pub(crate) const DEFAULT_TEMPERATURE: f32 = 0.7;
