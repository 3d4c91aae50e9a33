//! The bridge worker: one thread that owns the session and runs model-affecting
//! commands one at a time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Level};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorExt};
use crate::metrics::MetricsCollector;
use crate::model::{
    ConversationHistory, LoadOutcome, Modality, ModelConfig, ModelFamily, RunnerConfig,
    RunnerFactory, RunnerPool,
};
use crate::processing::{CancellationFlag, GenerationPipeline};
use crate::types::{BridgeEvent, BridgeStatus, GenerationConfig, ModelResponse};
use crate::utils::{AssetStager, FileDiagnostics, HostEnvironment};

pub(crate) const SETUP_COMPLETE_MESSAGE: &str = "Model setup completed - will load on first generation";
pub(crate) const SETUP_FAILED_MESSAGE: &str = "Failed to setup model";

/// Work queued for the worker thread
pub(crate) enum Command {
    Load {
        config: ModelConfig,
        reply: oneshot::Sender<ModelResponse>,
    },
    Generate {
        prompt: String,
        config: GenerationConfig,
        events: mpsc::UnboundedSender<BridgeEvent>,
        reply: oneshot::Sender<ModelResponse>,
    },
    Unload {
        reply: oneshot::Sender<()>,
    },
    ResetConversation {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// State readable from outside the worker without queueing
pub(crate) struct Shared {
    pub cancel: CancellationFlag,
    pub status: RwLock<BridgeStatus>,
    pub metrics: MetricsCollector,
    closing: AtomicBool,
}

impl Shared {
    pub fn new(metrics_enabled: bool) -> Self {
        Self {
            cancel: CancellationFlag::new(),
            status: RwLock::new(BridgeStatus::default()),
            metrics: MetricsCollector::new(metrics_enabled),
            closing: AtomicBool::new(false),
        }
    }

    /// Stop the running generation and refuse everything still queued.
    /// The closing flag is raised before the cancel flag.
    pub fn begin_shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.cancel.set();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

/// Everything a loaded model needs between calls. Only the worker touches it.
pub(crate) struct Session {
    config: Arc<BridgeConfig>,
    pool: RunnerPool,
    history: ConversationHistory,
    family: Option<ModelFamily>,
    stager: AssetStager,
    environment: Arc<dyn HostEnvironment>,
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(
        config: Arc<BridgeConfig>,
        factory: Arc<dyn RunnerFactory>,
        environment: Arc<dyn HostEnvironment>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            pool: RunnerPool::new(factory, config.load_policy()),
            history: ConversationHistory::with_capacity(config.history.capacity),
            family: None,
            stager: AssetStager::from_config(&config.staging),
            environment,
            shared,
            config,
        }
    }

    pub fn load_model(&mut self, config: ModelConfig) -> ModelResponse {
        info!("Setting up model {}", config.model_path.display());
        match self.setup(config) {
            Ok(response) => response,
            Err(e) => {
                error!("Model setup failed: {}", e);
                self.shared.metrics.record_error(e.kind());
                ModelResponse::failure(e.to_string()).with_message(SETUP_FAILED_MESSAGE)
            }
        }
    }

    fn setup(&mut self, config: ModelConfig) -> crate::error::Result<ModelResponse> {
        if config.model_path.as_os_str().is_empty() || config.tokenizer_path.as_os_str().is_empty() {
            return Err(BridgeError::configuration(
                "model_config",
                "Model or tokenizer path is missing",
            ));
        }

        let model_path = self.stage(&config.model_path, "model_path")?;
        let tokenizer_path = self.stage(&config.tokenizer_path, "tokenizer_path")?;

        if !self.environment.file_exists(&model_path) {
            return Err(BridgeError::configuration("model_path", "Model file not found"));
        }
        if !self.environment.file_exists(&tokenizer_path) {
            return Err(BridgeError::configuration("tokenizer_path", "Tokenizer file not found"));
        }

        if tracing::enabled!(Level::DEBUG) {
            FileDiagnostics::inspect(&model_path).log("Model");
            FileDiagnostics::inspect(&tokenizer_path).log("Tokenizer");
        }

        let staged = ModelConfig {
            model_path,
            tokenizer_path,
            temperature: config.temperature,
        };
        let family = ModelFamily::classify(&staged.model_path);
        info!("Detected model type: {}", family);

        let handle = self.pool.provision(&staged, family);
        debug!("Runner {} ready in state {}", handle.id(), handle.state());
        self.family = Some(family);

        let mut response = ModelResponse::ok(SETUP_COMPLETE_MESSAGE);
        if self.config.runtime.preload {
            let outcome = self.pool.try_load(family.modality());
            self.shared.metrics.record_load(&outcome);
            response = match outcome {
                LoadOutcome::Loaded(elapsed) => {
                    ModelResponse::ok("Model loaded").with_load_time(elapsed.as_secs_f64())
                }
                LoadOutcome::AlreadyLoaded => ModelResponse::ok("Model already loaded"),
                LoadOutcome::Tolerated(e) => {
                    ModelResponse::ok(format!("Model loaded with tolerated error: {}", e))
                }
                LoadOutcome::Failed(e) => return Err(BridgeError::LoadFailure(e)),
                LoadOutcome::NoRunner => return Err(BridgeError::NoRunner),
            };
        }

        self.publish_status(false);
        Ok(response)
    }

    fn stage(&self, path: &Path, parameter: &str) -> crate::error::Result<std::path::PathBuf> {
        self.stager
            .stage(path)
            .map_err(|e| BridgeError::configuration(parameter, format!("{e:#}")))
    }

    pub fn generate(
        &mut self,
        prompt: String,
        config: GenerationConfig,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> ModelResponse {
        self.shared.cancel.reset();
        if self.shared.is_closing() {
            return self.reject(BridgeError::WorkerUnavailable, &events);
        }

        let Some(family) = self.family else {
            return self.reject(BridgeError::ModelTypeUnknown, &events);
        };

        self.history.append(prompt);
        let modality = family.modality();

        let outcome = self.pool.try_load(modality);
        self.shared.metrics.record_load(&outcome);
        match &outcome {
            LoadOutcome::Failed(e) => {
                warn!("Runner not loaded ({}), attempting generation anyway", e);
                self.shared.metrics.record_error("load");
            }
            LoadOutcome::Tolerated(e) => debug!("Proceeding past tolerated load error: {}", e),
            _ => {}
        }

        let runner_config = RunnerConfig {
            sequence_length: self.config.sequence_length_for(family, config.sequence_length),
            maximum_new_tokens: config.maximum_new_tokens,
        };
        debug!(
            "Generating with {} (sequence length {}, {} history entries)",
            family,
            runner_config.sequence_length,
            self.history.len()
        );

        if self.pool.handle(modality).is_none() {
            return self.reject(BridgeError::NoRunner, &events);
        }

        self.publish_status(true);
        let mut pipeline = GenerationPipeline::new(
            family,
            self.shared.cancel.clone(),
            self.config.streaming.batch_threshold,
            events,
        );
        pipeline.format(self.config.template_for(family), &self.history.render());
        let outcome = match self.pool.handle_mut(modality) {
            Some(handle) => pipeline.run(handle.runner_mut(), &runner_config),
            None => return ModelResponse::failure(BridgeError::NoRunner.to_string()),
        };

        if let Some(e) = &outcome.runtime_error {
            if self.config.load_policy().is_tolerated_load_error(e.code) {
                warn!(
                    code = e.code,
                    "Generation failed with the tokenizer-initialization code; the tokenizer may not be set up"
                );
            }
            self.shared
                .metrics
                .record_error(BridgeError::RuntimeGenerationFailure(e.clone()).kind());
        }
        self.shared
            .metrics
            .record_generation(&outcome.result, outcome.elapsed);
        self.publish_status(false);

        info!(
            "Generation done: {} tokens, success {}",
            outcome.result.total_tokens, outcome.result.success
        );
        ModelResponse::from(&outcome.result)
    }

    pub fn unload(&mut self) {
        info!("Unloading model");
        self.pool.release();
        self.family = None;
        if self.config.history.clear_on_unload {
            self.history.clear();
        }
        self.publish_status(false);
    }

    pub fn reset_conversation(&mut self) {
        debug!("Clearing {} history entries", self.history.len());
        self.history.clear();
        for modality in [Modality::Text, Modality::Multimodal] {
            if let Some(handle) = self.pool.handle_mut(modality) {
                handle.runner_mut().reset();
            }
        }
        self.publish_status(false);
    }

    fn reject(
        &mut self,
        error: BridgeError,
        events: &mpsc::UnboundedSender<BridgeEvent>,
    ) -> ModelResponse {
        warn!("Generation rejected: {}", error);
        self.shared.metrics.record_error(error.kind());
        let _ = events.send(BridgeEvent::Error {
            message: error.to_string(),
        });
        ModelResponse::failure(error.to_string())
    }

    /// Answer a command queued behind a shutdown without running it
    fn discard(&mut self, command: Command) {
        let error = BridgeError::WorkerUnavailable;
        match command {
            Command::Load { reply, .. } => {
                let _ = reply.send(ModelResponse::failure(error.to_string()));
            }
            Command::Generate { events, reply, .. } => {
                let _ = reply.send(self.reject(error, &events));
            }
            Command::Unload { reply } | Command::ResetConversation { reply } => {
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn publish_status(&self, generating: bool) {
        let mut status = self.shared.status.write();
        *status = BridgeStatus {
            model_loaded: self.pool.is_loaded(),
            generating,
            model_family: self.family,
            model_path: self.pool.current_config().map(|c| c.model_path.clone()),
            history_len: self.history.len(),
        };
    }
}

/// Start the worker thread
pub(crate) fn spawn(session: Session, commands: Receiver<Command>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("llm-bridge-worker".to_string())
        .spawn(move || run(session, commands))
}

fn run(mut session: Session, commands: Receiver<Command>) {
    debug!("Bridge worker started");
    while let Ok(command) = commands.recv() {
        if matches!(command, Command::Shutdown) {
            break;
        }
        if session.shared.is_closing() {
            session.discard(command);
            continue;
        }
        match command {
            Command::Load { config, reply } => {
                let _ = reply.send(session.load_model(config));
            }
            Command::Generate {
                prompt,
                config,
                events,
                reply,
            } => {
                let response = session.generate(prompt, config, events);
                let _ = reply.send(response);
            }
            Command::Unload { reply } => {
                session.unload();
                let _ = reply.send(());
            }
            Command::ResetConversation { reply } => {
                session.reset_conversation();
                let _ = reply.send(());
            }
            Command::Shutdown => break,
        }
    }
    session.pool.release();
    debug!("Bridge worker stopped");
}
