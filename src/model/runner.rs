// Location: src/model/runner.rs

//! Contract of the native inference runtime consumed by the bridge.
//!
//! The runtime itself (weight loading, kernels, backend selection) lives outside this
//! crate. Hosts plug it in through [`RunnerFactory`], which builds one
//! [`InferenceRunner`] per modality slot.

use std::fmt;
use std::path::PathBuf;

use super::family::Modality;

/// Error raised by the native runtime, carrying its numeric code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub code: i32,
    pub message: String,
}

impl RuntimeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Answer of the token consumer to the producing runtime.
///
/// Returning [`TokenFlow::Stop`] is how the bridge calls the runtime's stop operation;
/// a runner must end generation promptly once it sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFlow {
    Continue,
    Stop,
}

/// Per-call generation settings handed to the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub sequence_length: usize,
    pub maximum_new_tokens: Option<usize>,
}

/// Everything the runtime needs to construct a session
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSpec {
    pub modality: Modality,
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub temperature: f32,
    pub special_tokens: Vec<String>,
}

/// One native inference session.
pub trait InferenceRunner: Send {
    /// Load weights and tokenizer. May be slow.
    fn load(&mut self) -> Result<(), RuntimeError>;

    fn is_loaded(&self) -> bool;

    /// Generate tokens for `prompt`, handing each raw token to `on_token` in order.
    fn generate(
        &mut self,
        prompt: &str,
        config: &RunnerConfig,
        on_token: &mut dyn FnMut(&str) -> TokenFlow,
    ) -> Result<(), RuntimeError>;

    /// Drop cached KV state between conversations.
    fn reset(&mut self) {}

    /// Stats report of the last generation, as the runtime's JSON document.
    fn stats_json(&self) -> Option<String> {
        None
    }
}

/// Builds runners for the pool. Construction never fails; failures surface on `load`.
pub trait RunnerFactory: Send + Sync {
    fn create(&self, spec: &RunnerSpec) -> Box<dyn InferenceRunner>;
}

impl<F> RunnerFactory for F
where
    F: Fn(&RunnerSpec) -> Box<dyn InferenceRunner> + Send + Sync,
{
    fn create(&self, spec: &RunnerSpec) -> Box<dyn InferenceRunner> {
        self(spec)
    }
}

/// Load state of a [`RunnerHandle`](super::pool::RunnerHandle)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Constructed, weights not loaded yet
    Created,
    Loaded,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerState::Created => write!(f, "created"),
            RunnerState::Loaded => write!(f, "loaded"),
        }
    }
}
