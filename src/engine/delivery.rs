use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::metrics::GenerationStats;
use crate::types::{BridgeEvent, GenerationHandle, GenerationResult, ModelResponse, TokenBatch};

/// Messaging channel back to the host application
#[async_trait]
pub trait HostChannel: Send + Sync {
    async fn on_token_generated(&self, batch: TokenBatch);

    async fn on_generation_complete(&self, result: GenerationResult, stats: Option<GenerationStats>);

    async fn on_error(&self, message: String);
}

/// Forward one generation's events to `channel` in order, on a tokio task.
/// The task resolves to the terminal response once every event was delivered.
pub fn deliver(mut handle: GenerationHandle, channel: Arc<dyn HostChannel>) -> JoinHandle<ModelResponse> {
    tokio::spawn(async move {
        while let Some(event) = handle.next_event().await {
            match event {
                BridgeEvent::TokenGenerated(batch) => channel.on_token_generated(batch).await,
                BridgeEvent::GenerationComplete {
                    full_text,
                    total_tokens,
                    finish_reason,
                    stats,
                } => {
                    let result = GenerationResult::completed(full_text, total_tokens, finish_reason);
                    channel.on_generation_complete(result, stats).await;
                }
                BridgeEvent::Error { message } => channel.on_error(message).await,
            }
        }
        handle.response().await
    })
}
