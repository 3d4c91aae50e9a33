use std::io::Write;

use anyhow::Result;
use llm_bridge::{
    BridgeConfig, BridgeEvent, GenerationConfig, InferenceRunner, LlmBridge, ModelConfig,
    RunnerConfig, RunnerSpec, RuntimeError, TokenFlow,
};
use tracing::info;

/// Stand-in runtime: answers with the words of the last prompt line, then a stop token
struct EchoRunner {
    loaded: bool,
}

impl InferenceRunner for EchoRunner {
    fn load(&mut self) -> Result<(), RuntimeError> {
        self.loaded = true;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn generate(
        &mut self,
        prompt: &str,
        _config: &RunnerConfig,
        on_token: &mut dyn FnMut(&str) -> TokenFlow,
    ) -> Result<(), RuntimeError> {
        let last_line = prompt
            .trim_end_matches("<end_of_turn>\n<start_of_turn>model")
            .lines()
            .last()
            .unwrap_or_default()
            .to_string();
        for word in last_line.split_whitespace() {
            if on_token(&format!("{word} ")) == TokenFlow::Stop {
                return Ok(());
            }
        }
        on_token("<end_of_turn>");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dir = std::env::temp_dir().join("llm-bridge-demo");
    std::fs::create_dir_all(&dir)?;
    let model = dir.join("gemma3-demo.pte");
    let tokenizer = dir.join("tokenizer.model");
    std::fs::write(&model, b"PTE0")?;
    std::fs::write(&tokenizer, b"TOK0")?;

    let bridge = LlmBridge::builder(|_spec: &RunnerSpec| {
        Box::new(EchoRunner { loaded: false }) as Box<dyn InferenceRunner>
    })
    .with_config(BridgeConfig::default())
    .with_logging()
    .build()?;

    let response = bridge.load_model(ModelConfig::new(&model, &tokenizer)).await;
    info!(?response, "Model setup");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input == "exit" {
            break;
        }

        let mut handle = bridge.generate_text(input, GenerationConfig::default());
        while let Some(event) = handle.next_event().await {
            match event {
                BridgeEvent::TokenGenerated(batch) => {
                    print!("{}", batch.text);
                    std::io::stdout().flush()?;
                }
                BridgeEvent::GenerationComplete { total_tokens, .. } => {
                    println!();
                    info!(tokens = total_tokens, "Generation complete");
                }
                BridgeEvent::Error { message } => eprintln!("error: {message}"),
            }
        }
    }

    info!("Shutting down...");
    bridge.unload_model().await?;
    Ok(())
}
