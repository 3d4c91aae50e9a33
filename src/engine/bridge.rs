use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::builder::BridgeBuilder;
use super::worker::{Command, Shared};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::metrics::MetricsSnapshot;
use crate::model::{ModelConfig, RunnerFactory};
use crate::types::{BridgeStatus, GenerationConfig, GenerationHandle, MemoryInfo, ModelResponse};
use crate::utils::HostEnvironment;

/// Host-facing entry point.
///
/// Load, generate, unload and reset are queued to a single worker thread and run in
/// submission order. Status, stop and memory queries are answered directly.
pub struct LlmBridge {
    config: Arc<BridgeConfig>,
    commands: Sender<Command>,
    shared: Arc<Shared>,
    environment: Arc<dyn HostEnvironment>,
    worker: Option<JoinHandle<()>>,
}

impl LlmBridge {
    /// Create a new bridge builder
    pub fn builder<F>(factory: F) -> BridgeBuilder
    where
        F: RunnerFactory + 'static,
    {
        BridgeBuilder::new(factory)
    }

    pub(crate) fn from_parts(
        config: Arc<BridgeConfig>,
        commands: Sender<Command>,
        shared: Arc<Shared>,
        environment: Arc<dyn HostEnvironment>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            config,
            commands,
            shared,
            environment,
            worker: Some(worker),
        }
    }

    /// Validate, stage and classify a model. Weights load lazily unless preload is on.
    pub async fn load_model(&self, config: ModelConfig) -> ModelResponse {
        let (reply, response) = oneshot::channel();
        if let Err(e) = self.submit(Command::Load { config, reply }) {
            return ModelResponse::failure(e.to_string());
        }
        response
            .await
            .unwrap_or_else(|_| ModelResponse::failure(BridgeError::WorkerUnavailable.to_string()))
    }

    /// Queue a generation. Events and the terminal response arrive through the handle.
    pub fn generate_text(
        &self,
        prompt: impl Into<String>,
        config: GenerationConfig,
    ) -> GenerationHandle {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();
        let command = Command::Generate {
            prompt: prompt.into(),
            config,
            events,
            reply,
        };

        match self.submit(command) {
            Ok(()) => GenerationHandle::new(event_rx, response),
            Err(e) => GenerationHandle::rejected(&e),
        }
    }

    /// Ask the running generation to stop at its next token. Returns immediately.
    pub fn stop_generation(&self) {
        debug!("Stop requested");
        self.shared.cancel.set();
    }

    /// Release the runners and forget the model type
    pub async fn unload_model(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.submit(Command::Unload { reply })?;
        done.await.map_err(|_| BridgeError::WorkerUnavailable)
    }

    /// Forget the conversation history without unloading
    pub async fn reset_conversation(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.submit(Command::ResetConversation { reply })?;
        done.await.map_err(|_| BridgeError::WorkerUnavailable)
    }

    pub fn is_model_loaded(&self) -> bool {
        self.shared.status.read().model_loaded
    }

    pub fn status(&self) -> BridgeStatus {
        self.shared.status.read().clone()
    }

    pub fn memory_info(&self) -> MemoryInfo {
        self.environment.memory_info()
    }

    pub fn validate_file_path(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let exists = self.environment.file_exists(path);
        debug!("Validating file path {}: exists {}", path.display(), exists);
        exists
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::WorkerUnavailable)
    }
}

impl Drop for LlmBridge {
    fn drop(&mut self) {
        self.shared.begin_shutdown();
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Bridge worker panicked");
            }
        }
        info!("Bridge shut down");
    }
}
