use std::sync::Arc;

use tracing::info;

use super::bridge::LlmBridge;
use super::worker::{self, Session, Shared};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::model::RunnerFactory;
use crate::utils::{setup_logging, HostEnvironment, LogConfig, SystemEnvironment};

/// Builder for constructing an [`LlmBridge`]
pub struct BridgeBuilder {
    factory: Arc<dyn RunnerFactory>,
    config: Option<BridgeConfig>,
    environment: Option<Arc<dyn HostEnvironment>>,
    install_logging: bool,
}

impl BridgeBuilder {
    pub fn new<F>(factory: F) -> Self
    where
        F: RunnerFactory + 'static,
    {
        Self {
            factory: Arc::new(factory),
            config: None,
            environment: None,
            install_logging: false,
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the operating-system environment used for file checks and memory figures
    pub fn with_environment(mut self, environment: Arc<dyn HostEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Install the global `tracing` subscriber from `monitoring.log_level` during `build`.
    /// Hosts with their own subscriber leave this off.
    pub fn with_logging(mut self) -> Self {
        self.install_logging = true;
        self
    }

    /// Validate the configuration and start the worker thread
    pub fn build(self) -> Result<LlmBridge> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        if self.install_logging {
            setup_logging(&LogConfig::from(&config.monitoring))?;
        }
        let config = Arc::new(config);

        let environment = self
            .environment
            .unwrap_or_else(|| Arc::new(SystemEnvironment::new()) as Arc<dyn HostEnvironment>);
        let shared = Arc::new(Shared::new(config.monitoring.enable_metrics));
        let session = Session::new(
            config.clone(),
            self.factory,
            environment.clone(),
            shared.clone(),
        );

        let (commands, receiver) = crossbeam_channel::unbounded();
        let handle = worker::spawn(session, receiver).map_err(|source| BridgeError::Io {
            path: "llm-bridge-worker".into(),
            source,
        })?;

        info!("Bridge started");
        Ok(LlmBridge::from_parts(config, commands, shared, environment, handle))
    }
}
