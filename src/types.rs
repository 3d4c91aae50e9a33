//! Common type definitions shared between the bridge and its host

use std::path::PathBuf;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::BridgeError;
use crate::metrics::GenerationStats;
use crate::model::ModelFamily;

/// Per-request generation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Context window; family default when absent
    #[serde(default)]
    pub sequence_length: Option<usize>,
    #[serde(default)]
    pub maximum_new_tokens: Option<usize>,
}

impl GenerationConfig {
    pub fn with_sequence_length(mut self, sequence_length: usize) -> Self {
        self.sequence_length = Some(sequence_length);
        self
    }

    pub fn with_maximum_new_tokens(mut self, maximum_new_tokens: usize) -> Self {
        self.maximum_new_tokens = Some(maximum_new_tokens);
        self
    }
}

/// A group of streamed tokens delivered together. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBatch {
    pub text: String,
    /// Tokens accepted so far in this generation, including this batch
    pub cumulative_token_count: u64,
    /// Throughput since the previous batch; 0 for the trailing batch
    pub tokens_per_second: f64,
}

/// Why a generation stopped producing tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The runtime ran out of tokens or hit its own limit
    Completed,
    StopToken,
    Cancelled,
}

/// Terminal outcome of one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    pub full_text: String,
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl GenerationResult {
    pub fn completed(full_text: String, total_tokens: u64, finish_reason: FinishReason) -> Self {
        Self {
            success: true,
            full_text,
            total_tokens,
            error_message: None,
            finish_reason: Some(finish_reason),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            full_text: String::new(),
            total_tokens: 0,
            error_message: Some(error.into()),
            finish_reason: None,
        }
    }
}

/// Reply to a request/response operation. Failures travel inside, never as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub success: bool,
    pub error: Option<String>,
    pub message: Option<String>,
    /// Seconds spent loading weights, when a load happened
    pub load_time: Option<f64>,
}

impl ModelResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: Some(message.into()),
            load_time: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
            load_time: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_load_time(mut self, seconds: f64) -> Self {
        self.load_time = Some(seconds);
        self
    }
}

impl From<&GenerationResult> for ModelResponse {
    fn from(result: &GenerationResult) -> Self {
        match (&result.error_message, result.finish_reason) {
            (Some(error), _) => ModelResponse::failure(error.clone()),
            (None, Some(FinishReason::Cancelled)) => {
                ModelResponse::ok(BridgeError::UserCancellation.to_string())
            }
            (None, _) => ModelResponse::ok("Generation completed"),
        }
    }
}

/// Host process memory figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    #[serde(rename = "usedMemoryMB")]
    pub used_memory_mb: u64,
    #[serde(rename = "availableMemoryMB")]
    pub available_memory_mb: u64,
}

/// Events streamed to the host while a generation runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    TokenGenerated(TokenBatch),
    #[serde(rename_all = "camelCase")]
    GenerationComplete {
        full_text: String,
        total_tokens: u64,
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stats: Option<GenerationStats>,
    },
    Error {
        message: String,
    },
}

/// Read-only view of the session, answered without queueing behind the worker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub model_loaded: bool,
    pub generating: bool,
    pub model_family: Option<ModelFamily>,
    pub model_path: Option<PathBuf>,
    pub history_len: usize,
}

/// Everything one generation produced, gathered by [`GenerationHandle::collect`]
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTranscript {
    pub batches: Vec<TokenBatch>,
    pub result: GenerationResult,
    pub stats: Option<GenerationStats>,
    pub response: ModelResponse,
}

/// Handle for one queued generation
#[derive(Debug)]
pub struct GenerationHandle {
    events: mpsc::UnboundedReceiver<BridgeEvent>,
    response: oneshot::Receiver<ModelResponse>,
}

impl GenerationHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<BridgeEvent>,
        response: oneshot::Receiver<ModelResponse>,
    ) -> Self {
        Self { events, response }
    }

    /// A handle that already carries its failure
    pub(crate) fn rejected(error: &BridgeError) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = oneshot::channel();
        let _ = event_tx.send(BridgeEvent::Error {
            message: error.to_string(),
        });
        let _ = response_tx.send(ModelResponse::failure(error.to_string()));
        Self::new(event_rx, response_rx)
    }

    /// Next event in generation order; `None` once the generation has finished
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.events.recv().await
    }

    /// Terminal response. Events not yet read are discarded.
    pub async fn response(self) -> ModelResponse {
        self.response
            .await
            .unwrap_or_else(|_| ModelResponse::failure(BridgeError::WorkerUnavailable.to_string()))
    }

    /// Drain all events, then wait for the terminal response
    pub async fn collect(mut self) -> GenerationTranscript {
        let mut batches = Vec::new();
        let mut result = None;
        let mut stats = None;

        while let Some(event) = self.events.recv().await {
            match event {
                BridgeEvent::TokenGenerated(batch) => batches.push(batch),
                BridgeEvent::GenerationComplete {
                    full_text,
                    total_tokens,
                    finish_reason,
                    stats: reported,
                } => {
                    result = Some(GenerationResult::completed(full_text, total_tokens, finish_reason));
                    stats = reported;
                }
                BridgeEvent::Error { message } => {
                    result = Some(GenerationResult::failed(message));
                }
            }
        }

        let response = self.response().await;
        let result = result.unwrap_or_else(|| {
            GenerationResult::failed(
                response
                    .error
                    .clone()
                    .unwrap_or_else(|| BridgeError::WorkerUnavailable.to_string()),
            )
        });

        GenerationTranscript {
            batches,
            result,
            stats,
            response,
        }
    }

    /// Split into the raw event receiver and the response receiver
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<BridgeEvent>,
        oneshot::Receiver<ModelResponse>,
    ) {
        (self.events, self.response)
    }

    /// Events as a stream; the terminal response is dropped
    pub fn into_event_stream(self) -> impl Stream<Item = BridgeEvent> {
        stream::unfold(self.events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_response_from_result() {
        let done = GenerationResult::completed("hi".into(), 1, FinishReason::StopToken);
        assert_eq!(ModelResponse::from(&done), ModelResponse::ok("Generation completed"));

        let stopped = GenerationResult::completed(String::new(), 0, FinishReason::Cancelled);
        assert_eq!(
            ModelResponse::from(&stopped).message.as_deref(),
            Some("Generation stopped by user")
        );

        let failed = GenerationResult::failed("boom");
        let response = ModelResponse::from(&failed);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_wire_names() {
        let batch = TokenBatch {
            text: "abc".into(),
            cumulative_token_count: 3,
            tokens_per_second: 1.5,
        };
        let json = serde_json::to_value(BridgeEvent::TokenGenerated(batch)).unwrap();
        assert_eq!(json["event"], "tokenGenerated");
        assert_eq!(json["cumulativeTokenCount"], 3);

        let memory = serde_json::to_value(MemoryInfo {
            used_memory_mb: 10,
            available_memory_mb: 20,
        })
        .unwrap();
        assert_eq!(memory["usedMemoryMB"], 10);
        assert_eq!(memory["availableMemoryMB"], 20);

        let config: GenerationConfig =
            serde_json::from_str(r#"{"sequenceLength": 256}"#).unwrap();
        assert_eq!(config, GenerationConfig::default().with_sequence_length(256));
    }

    #[tokio::test]
    async fn test_collect_orders_events() {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = oneshot::channel();
        let handle = GenerationHandle::new(event_rx, response_rx);

        event_tx
            .send(BridgeEvent::TokenGenerated(TokenBatch {
                text: "Hello".into(),
                cumulative_token_count: 1,
                tokens_per_second: 0.0,
            }))
            .unwrap();
        event_tx
            .send(BridgeEvent::GenerationComplete {
                full_text: "Hello".into(),
                total_tokens: 1,
                finish_reason: FinishReason::Completed,
                stats: None,
            })
            .unwrap();
        drop(event_tx);
        response_tx.send(ModelResponse::ok("Generation completed")).unwrap();

        let transcript = handle.collect().await;
        assert_eq!(transcript.batches.len(), 1);
        assert_eq!(transcript.result.full_text, "Hello");
        assert!(transcript.response.success);
    }

    #[tokio::test]
    async fn test_rejected_handle() {
        let handle = GenerationHandle::rejected(&BridgeError::WorkerUnavailable);
        let events: Vec<_> = handle.into_event_stream().collect().await;
        assert_eq!(
            events,
            vec![BridgeEvent::Error {
                message: "Bridge worker is not running".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_dropped_worker_yields_failure() {
        let (_event_tx, event_rx) = mpsc::unbounded_channel::<BridgeEvent>();
        let (response_tx, response_rx) = oneshot::channel();
        drop(response_tx);
        let response = GenerationHandle::new(event_rx, response_rx).response().await;
        assert!(!response.success);
    }
}
