// Location: src/processing/stream.rs

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::batch::TokenBatcher;
use super::common::{CancellationFlag, PipelineState};
use crate::metrics::GenerationStats;
use crate::model::{
    apply_template, InferenceRunner, ModelFamily, RunnerConfig, RuntimeError, TokenFlow,
};
use crate::types::{BridgeEvent, FinishReason, GenerationResult};

/// What a finished pipeline hands back to the worker
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub result: GenerationResult,
    pub stats: Option<GenerationStats>,
    pub elapsed: Duration,
    /// Set when the runtime itself failed
    pub runtime_error: Option<RuntimeError>,
}

/// Drives one streaming generation.
///
/// The runtime pushes raw tokens into [`on_token`](Self::on_token); the pipeline filters
/// stop tokens and prompt echoes, batches the rest and emits [`BridgeEvent`]s in order,
/// ending with exactly one terminal event.
pub struct GenerationPipeline {
    family: ModelFamily,
    prompt: String,
    cancel: CancellationFlag,
    batcher: TokenBatcher,
    events: mpsc::UnboundedSender<BridgeEvent>,
    full_text: String,
    token_count: u64,
    state: PipelineState,
    finish_reason: FinishReason,
}

impl GenerationPipeline {
    pub fn new(
        family: ModelFamily,
        cancel: CancellationFlag,
        batch_threshold: usize,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            family,
            prompt: String::new(),
            cancel,
            batcher: TokenBatcher::new(batch_threshold),
            events,
            full_text: String::new(),
            token_count: 0,
            state: PipelineState::Idle,
            finish_reason: FinishReason::Completed,
        }
    }

    /// Wrap `text` in `template` and keep the result as the prompt sent to the runtime
    pub fn format(&mut self, template: &str, text: &str) -> &str {
        self.state = PipelineState::Formatting;
        self.prompt = apply_template(template, text);
        &self.prompt
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Consume one raw token from the runtime
    pub fn on_token(&mut self, token: &str) -> TokenFlow {
        if self.cancel.is_set() {
            if self.state != PipelineState::Stopped {
                debug!("Cancellation observed after {} tokens", self.token_count);
                self.finish_reason = FinishReason::Cancelled;
                self.state = PipelineState::Stopped;
            }
            return TokenFlow::Stop;
        }

        if self.family.is_stop_token(token) {
            debug!("Stop token {:?} for {}", token, self.family);
            self.cancel.set();
            self.finish_reason = FinishReason::StopToken;
            self.state = PipelineState::Stopped;
            return TokenFlow::Stop;
        }

        if token == self.prompt {
            trace!("Discarding echoed prompt");
            return TokenFlow::Continue;
        }

        trace!("Token received: {:?}", token);
        self.state = PipelineState::Streaming;
        self.token_count += 1;
        self.full_text.push_str(token);
        if let Some(batch) = self.batcher.push(token, self.token_count) {
            self.emit(BridgeEvent::TokenGenerated(batch));
        }
        TokenFlow::Continue
    }

    /// Run the whole generation on `runner`, emitting events as tokens arrive
    pub fn run(mut self, runner: &mut dyn InferenceRunner, config: &RunnerConfig) -> PipelineOutcome {
        let start = Instant::now();
        let prompt = self.prompt.clone();
        self.state = PipelineState::Streaming;

        let status = runner.generate(&prompt, config, &mut |token: &str| self.on_token(token));
        let elapsed = start.elapsed();

        match status {
            Ok(()) => {
                if let Some(batch) = self.batcher.finish(self.token_count) {
                    self.emit(BridgeEvent::TokenGenerated(batch));
                }
                if self.state != PipelineState::Stopped {
                    self.state = PipelineState::Completed;
                }

                let stats = runner.stats_json().and_then(|json| {
                    GenerationStats::from_runtime_json(&json)
                        .map_err(|e| warn!("Ignoring unreadable runtime stats: {}", e))
                        .ok()
                });

                debug!(
                    "Generation finished ({:?}): {} tokens in {:?}",
                    self.finish_reason, self.token_count, elapsed
                );

                self.emit(BridgeEvent::GenerationComplete {
                    full_text: self.full_text.clone(),
                    total_tokens: self.token_count,
                    finish_reason: self.finish_reason,
                    stats: stats.clone(),
                });

                PipelineOutcome {
                    result: GenerationResult::completed(
                        std::mem::take(&mut self.full_text),
                        self.token_count,
                        self.finish_reason,
                    ),
                    stats,
                    elapsed,
                    runtime_error: None,
                }
            }
            Err(error) => {
                self.state = PipelineState::Failed;
                warn!(
                    "Runtime failed after {} tokens (code {}): {}",
                    self.token_count, error.code, error.message
                );
                self.emit(BridgeEvent::Error {
                    message: error.message.clone(),
                });

                PipelineOutcome {
                    result: GenerationResult::failed(error.message.clone()),
                    stats: None,
                    elapsed,
                    runtime_error: Some(error),
                }
            }
        }
    }

    fn emit(&self, event: BridgeEvent) {
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}
