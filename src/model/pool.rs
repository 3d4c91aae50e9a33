use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::family::{Modality, ModelFamily};
use super::runner::{InferenceRunner, RunnerFactory, RunnerSpec, RunnerState, RuntimeError};
use super::TOKENIZER_QUIRK_ERROR_CODE;

/// Identifies the weights and tokenizer to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default)]
    pub model_path: PathBuf,
    #[serde(default)]
    pub tokenizer_path: PathBuf,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    super::DEFAULT_TEMPERATURE
}

impl ModelConfig {
    pub fn new(model_path: impl Into<PathBuf>, tokenizer_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_path: tokenizer_path.into(),
            temperature: default_temperature(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Two configs needing the same runner share this key
    pub fn reload_key(&self) -> String {
        format!(
            "{}|{}",
            self.model_path.display(),
            self.tokenizer_path.display()
        )
    }
}

/// Decides which load failures still leave a runner usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPolicy {
    tolerated_code: Option<i32>,
}

impl LoadPolicy {
    pub fn new(tolerated_code: Option<i32>) -> Self {
        Self { tolerated_code }
    }

    /// Strict policy: every load failure is fatal
    pub fn strict() -> Self {
        Self::new(None)
    }

    /// Runtimes report a tokenizer-initialization failure with this code even though
    /// generation works afterwards. Revisit when the runtime version changes.
    pub fn is_tolerated_load_error(&self, code: i32) -> bool {
        self.tolerated_code == Some(code)
    }

    pub fn tolerated_code(&self) -> Option<i32> {
        self.tolerated_code
    }
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self::new(Some(TOKENIZER_QUIRK_ERROR_CODE))
    }
}

/// Result of asking the pool to make a runner ready
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    AlreadyLoaded,
    Loaded(Duration),
    /// Load failed with the tolerated code; generation is attempted anyway
    Tolerated(RuntimeError),
    Failed(RuntimeError),
    NoRunner,
}

impl LoadOutcome {
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            LoadOutcome::AlreadyLoaded | LoadOutcome::Loaded(_) | LoadOutcome::Tolerated(_)
        )
    }

    pub fn load_time(&self) -> Option<Duration> {
        match self {
            LoadOutcome::Loaded(elapsed) => Some(*elapsed),
            _ => None,
        }
    }
}

/// A runner bound to one modality slot and one model config
pub struct RunnerHandle {
    id: u64,
    modality: Modality,
    config: ModelConfig,
    state: RunnerState,
    runner: Box<dyn InferenceRunner>,
}

impl RunnerHandle {
    /// Pool-unique id; a reused handle keeps its id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.runner.is_loaded()
    }

    pub fn runner_mut(&mut self) -> &mut dyn InferenceRunner {
        self.runner.as_mut()
    }

    pub fn runner(&self) -> &dyn InferenceRunner {
        self.runner.as_ref()
    }
}

impl fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("id", &self.id)
            .field("modality", &self.modality)
            .field("model_path", &self.config.model_path)
            .field("state", &self.state)
            .finish()
    }
}

/// Owns at most one runner per modality for a single logical model
pub struct RunnerPool {
    factory: Arc<dyn RunnerFactory>,
    policy: LoadPolicy,
    text: Option<RunnerHandle>,
    multimodal: Option<RunnerHandle>,
    config: Option<ModelConfig>,
    family: Option<ModelFamily>,
    reload_key: Option<String>,
    next_id: u64,
}

impl RunnerPool {
    pub fn new(factory: Arc<dyn RunnerFactory>, policy: LoadPolicy) -> Self {
        Self {
            factory,
            policy,
            text: None,
            multimodal: None,
            config: None,
            family: None,
            reload_key: None,
            next_id: 0,
        }
    }

    /// Return the runner for `family`'s modality, creating it if needed.
    ///
    /// A changed reload key tears down both slots first. Weights are not loaded here.
    pub fn provision(&mut self, config: &ModelConfig, family: ModelFamily) -> &mut RunnerHandle {
        let key = config.reload_key();
        let needs_reload = self.reload_key.as_deref() != Some(key.as_str());
        debug!("Provisioning {} runner, needs reload: {}", family, needs_reload);

        if needs_reload {
            if self.text.is_some() || self.multimodal.is_some() {
                info!("Model paths changed, clearing runners");
            }
            self.clear_slots();
            self.reload_key = Some(key);
        } else {
            debug!("Reload key unchanged, reusing existing runners");
        }
        self.config = Some(config.clone());
        self.family = Some(family);

        let modality = family.modality();
        let handle = match self.slot_mut(modality).take() {
            Some(existing) => existing,
            None => self.create_handle(config, family),
        };
        self.slot_mut(modality).insert(handle)
    }

    /// Make the runner for `modality` ready, applying the load policy.
    pub fn try_load(&mut self, modality: Modality) -> LoadOutcome {
        if self.slot(modality).is_none() {
            // Recreate from the stored config, e.g. after a slot was torn down
            match (self.config.clone(), self.family) {
                (Some(config), Some(family)) if family.modality() == modality => {
                    let handle = self.create_handle(&config, family);
                    *self.slot_mut(modality) = Some(handle);
                }
                _ => {
                    error!("No {} runner available and no model configured", modality);
                    return LoadOutcome::NoRunner;
                }
            }
        }

        let policy = self.policy;
        let Some(handle) = self.slot_mut(modality) else {
            return LoadOutcome::NoRunner;
        };

        if handle.runner.is_loaded() {
            debug!("{} runner {} already loaded", modality, handle.id);
            handle.state = RunnerState::Loaded;
            return LoadOutcome::AlreadyLoaded;
        }

        info!("Loading {} runner {}", modality, handle.id);
        let start = Instant::now();
        match handle.runner.load() {
            Ok(()) => {
                let elapsed = start.elapsed();
                handle.state = RunnerState::Loaded;
                info!("{} runner loaded in {:.2}s", modality, elapsed.as_secs_f64());
                LoadOutcome::Loaded(elapsed)
            }
            Err(err) if policy.is_tolerated_load_error(err.code) => {
                warn!(
                    code = err.code,
                    "Load failed after {:.2}s with tolerated error ({}), treating runner as usable",
                    start.elapsed().as_secs_f64(),
                    err
                );
                LoadOutcome::Tolerated(err)
            }
            Err(err) => {
                error!(
                    code = err.code,
                    "Load failed after {:.2}s: {}",
                    start.elapsed().as_secs_f64(),
                    err
                );
                LoadOutcome::Failed(err)
            }
        }
    }

    /// `true` when the runner is loaded or its load failure is tolerated
    pub fn ensure_loaded(&mut self, modality: Modality) -> bool {
        self.try_load(modality).is_usable()
    }

    pub fn active_text_handle(&self) -> Option<&RunnerHandle> {
        self.text.as_ref()
    }

    pub fn active_multimodal_handle(&self) -> Option<&RunnerHandle> {
        self.multimodal.as_ref()
    }

    pub fn handle(&self, modality: Modality) -> Option<&RunnerHandle> {
        self.slot(modality)
    }

    pub fn handle_mut(&mut self, modality: Modality) -> Option<&mut RunnerHandle> {
        self.slot_mut(modality).as_mut()
    }

    pub fn current_config(&self) -> Option<&ModelConfig> {
        self.config.as_ref()
    }

    pub fn reload_key(&self) -> Option<&str> {
        self.reload_key.as_deref()
    }

    /// Any slot reports loaded weights
    pub fn is_loaded(&self) -> bool {
        self.text.as_ref().map_or(false, RunnerHandle::is_loaded)
            || self.multimodal.as_ref().map_or(false, RunnerHandle::is_loaded)
    }

    /// Tear down both slots and forget the model. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.text.is_some() || self.multimodal.is_some() {
            info!("Releasing runners");
        }
        self.clear_slots();
        self.config = None;
        self.family = None;
        self.reload_key = None;
    }

    fn create_handle(&mut self, config: &ModelConfig, family: ModelFamily) -> RunnerHandle {
        let modality = family.modality();
        let spec = RunnerSpec {
            modality,
            model_path: config.model_path.clone(),
            tokenizer_path: config.tokenizer_path.clone(),
            temperature: config.temperature,
            special_tokens: family.special_tokens(),
        };
        self.next_id += 1;
        info!(
            "Creating {} runner {} for {}, will load on first generation",
            modality, self.next_id, family
        );
        RunnerHandle {
            id: self.next_id,
            modality,
            config: config.clone(),
            state: RunnerState::Created,
            runner: self.factory.create(&spec),
        }
    }

    fn clear_slots(&mut self) {
        self.text = None;
        self.multimodal = None;
    }

    fn slot(&self, modality: Modality) -> Option<&RunnerHandle> {
        match modality {
            Modality::Text => self.text.as_ref(),
            Modality::Multimodal => self.multimodal.as_ref(),
        }
    }

    fn slot_mut(&mut self, modality: Modality) -> &mut Option<RunnerHandle> {
        match modality {
            Modality::Text => &mut self.text,
            Modality::Multimodal => &mut self.multimodal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::runner::mock::{Script, ScriptedFactory};

    fn create_test_pool(script: &Arc<Script>) -> RunnerPool {
        let factory = Arc::new(ScriptedFactory {
            script: script.clone(),
        });
        RunnerPool::new(factory, LoadPolicy::default())
    }

    fn llama_config() -> ModelConfig {
        ModelConfig::new("/m/llama3.pte", "/m/tokenizer.model")
    }

    #[test]
    fn test_reload_key() {
        assert_eq!(llama_config().reload_key(), "/m/llama3.pte|/m/tokenizer.model");
        // temperature is not part of the key
        assert_eq!(
            llama_config().with_temperature(0.1).reload_key(),
            llama_config().reload_key()
        );
    }

    #[test]
    fn test_provision_reuses_handle_for_same_key() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);

        let first = pool.provision(&llama_config(), ModelFamily::Llama).id();
        let second = pool
            .provision(&llama_config().with_temperature(0.2), ModelFamily::Llama)
            .id();

        assert_eq!(first, second);
        assert_eq!(script.created(), 1);
        assert_eq!(pool.active_text_handle().unwrap().state(), RunnerState::Created);
    }

    #[test]
    fn test_provision_tears_down_both_slots_on_key_change() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);

        let config = ModelConfig::new("/m/gemma3.pte", "/m/tokenizer.model");
        pool.provision(&config, ModelFamily::Gemma3);
        // same key, other modality: both slots populated
        pool.provision(&config, ModelFamily::Llama);
        assert!(pool.active_text_handle().is_some());
        assert!(pool.active_multimodal_handle().is_some());

        let other = ModelConfig::new("/m/qwen3.pte", "/m/tokenizer.model");
        let id = pool.provision(&other, ModelFamily::Qwen3).id();

        assert!(pool.active_multimodal_handle().is_none());
        assert_eq!(pool.active_text_handle().unwrap().id(), id);
        assert_eq!(script.created(), 3);
        assert_eq!(pool.reload_key(), Some("/m/qwen3.pte|/m/tokenizer.model"));
    }

    #[test]
    fn test_tokenizer_change_counts_as_reload() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);

        let first = pool.provision(&llama_config(), ModelFamily::Llama).id();
        let changed = ModelConfig::new("/m/llama3.pte", "/m/other-tokenizer.model");
        let second = pool.provision(&changed, ModelFamily::Llama).id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_llama_runner_gets_special_tokens() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);
        pool.provision(&llama_config(), ModelFamily::Llama);
        pool.provision(
            &ModelConfig::new("/m/phi4.pte", "/m/tokenizer.model"),
            ModelFamily::Phi4,
        );

        let specs = script.specs.lock();
        assert_eq!(specs[0].special_tokens.len(), 265);
        assert!(specs[1].special_tokens.is_empty());
        assert_eq!(specs[1].modality, Modality::Text);
    }

    #[test]
    fn test_ensure_loaded_success_is_idempotent() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);
        pool.provision(&llama_config(), ModelFamily::Llama);

        assert!(matches!(pool.try_load(Modality::Text), LoadOutcome::Loaded(_)));
        assert_eq!(pool.try_load(Modality::Text), LoadOutcome::AlreadyLoaded);
        assert!(pool.ensure_loaded(Modality::Text));
        assert_eq!(script.loads(), 1);
        assert!(pool.is_loaded());
        assert_eq!(pool.active_text_handle().unwrap().state(), RunnerState::Loaded);
    }

    #[test]
    fn test_ensure_loaded_tolerates_tokenizer_quirk() {
        let script = Script::with_tokens(&[]);
        script.fail_load(32);
        let mut pool = create_test_pool(&script);
        pool.provision(&llama_config(), ModelFamily::Llama);

        assert!(pool.ensure_loaded(Modality::Text));
        assert!(!pool.is_loaded());
        assert_eq!(pool.active_text_handle().unwrap().state(), RunnerState::Created);
    }

    #[test]
    fn test_ensure_loaded_fails_on_other_codes() {
        let script = Script::with_tokens(&[]);
        script.fail_load(17);
        let mut pool = create_test_pool(&script);
        pool.provision(&llama_config(), ModelFamily::Llama);

        assert!(!pool.ensure_loaded(Modality::Text));
        assert!(matches!(
            pool.try_load(Modality::Text),
            LoadOutcome::Failed(RuntimeError { code: 17, .. })
        ));
    }

    #[test]
    fn test_strict_policy_rejects_quirk() {
        let script = Script::with_tokens(&[]);
        script.fail_load(32);
        let factory = Arc::new(ScriptedFactory {
            script: script.clone(),
        });
        let mut pool = RunnerPool::new(factory, LoadPolicy::strict());
        pool.provision(&llama_config(), ModelFamily::Llama);
        assert!(!pool.ensure_loaded(Modality::Text));
    }

    #[test]
    fn test_handle_mut_reaches_provisioned_runner() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);
        assert!(pool.handle_mut(Modality::Text).is_none());

        let id = pool.provision(&llama_config(), ModelFamily::Llama).id();
        assert!(pool.handle_mut(Modality::Multimodal).is_none());

        let handle = pool.handle_mut(Modality::Text).unwrap();
        assert_eq!(handle.id(), id);
        handle.runner_mut().load().unwrap();
        assert!(handle.runner().is_loaded());
        assert_eq!(script.loads(), 1);
    }

    #[test]
    fn test_ensure_loaded_without_model() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);
        assert_eq!(pool.try_load(Modality::Text), LoadOutcome::NoRunner);
        assert!(!pool.ensure_loaded(Modality::Multimodal));
    }

    #[test]
    fn test_release_is_idempotent() {
        let script = Script::with_tokens(&[]);
        let mut pool = create_test_pool(&script);
        pool.provision(&llama_config(), ModelFamily::Llama);
        pool.ensure_loaded(Modality::Text);

        pool.release();
        pool.release();

        assert!(pool.active_text_handle().is_none());
        assert!(pool.current_config().is_none());
        assert!(pool.reload_key().is_none());
        assert!(!pool.is_loaded());

        // same key after release creates a fresh runner
        pool.provision(&llama_config(), ModelFamily::Llama);
        assert_eq!(script.created(), 2);
    }

    #[test]
    fn test_load_outcome_usability() {
        assert!(LoadOutcome::Tolerated(RuntimeError::new(32, "quirk")).is_usable());
        assert!(!LoadOutcome::NoRunner.is_usable());
        assert_eq!(
            LoadOutcome::Loaded(Duration::from_millis(5)).load_time(),
            Some(Duration::from_millis(5))
        );
        assert_eq!(LoadOutcome::AlreadyLoaded.load_time(), None);
    }
}
