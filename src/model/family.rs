//! Model family classification and per-family prompt rules

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GEMMA3_TEMPLATE: &str = "<start_of_turn>user\n{}<end_of_turn>\n<start_of_turn>model";
const LLAMA3_TEMPLATE: &str = concat!(
    "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n",
    "You are a helpful on-device assistant.\n",
    "Always respond clearly, helpfully, and in a friendly tone.\n",
    "Avoid unnecessary repetition and focus on providing actionable, precise answers.\n",
    "<|start_header_id|>user<|end_header_id|>\n",
    "{}\n",
    "<|eot_id|><|start_header_id|>assistant<|end_header_id|>",
);
const LLAVA_TEMPLATE: &str = "USER: {} ASSISTANT: ";
const PHI4_TEMPLATE: &str = "<|user|>{}<|end|><|assistant|>";
const QWEN3_TEMPLATE: &str = "<|im_start|>system\nYou are a helpful assistant.\n<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n<think>\n\n</think>\n\n\n";
const SMOLLM3_TEMPLATE: &str =
    "<|im_start|>system\n/no_think\n<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n";
const VOXTRAL_TEMPLATE: &str = "{}[/INST]";

/// Placeholder substituted by [`ModelFamily::format_prompt`]
pub const PROMPT_PLACEHOLDER: &str = "{}";

const LLAMA_SPECIAL_TOKENS: &[&str] = &[
    "<|begin_of_text|>",
    "<|end_of_text|>",
    "<|reserved_special_token_0|>",
    "<|reserved_special_token_1|>",
    "<|finetune_right_pad_id|>",
    "<|step_id|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
    "<|eom_id|>",
    "<|eot_id|>",
    "<|python_tag|>",
];

/// Which runner slot a family needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Multimodal,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Multimodal => write!(f, "multimodal"),
        }
    }
}

/// Checkpoint families sharing a prompt template and stop-token set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Gemma3,
    Llama,
    Llava,
    Qwen3,
    Phi4,
    #[serde(rename = "smollm3")]
    SmolLm3,
    Voxtral,
}

impl ModelFamily {
    /// Every family, in classification priority order
    pub const ALL: [ModelFamily; 7] = [
        ModelFamily::Gemma3,
        ModelFamily::Llama,
        ModelFamily::Llava,
        ModelFamily::Qwen3,
        ModelFamily::Phi4,
        ModelFamily::SmolLm3,
        ModelFamily::Voxtral,
    ];

    /// Classify a model file by its name. Unknown names fall back to Llama.
    pub fn classify(path: impl AsRef<Path>) -> ModelFamily {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let family = if filename.starts_with("gemma3") {
            Some(ModelFamily::Gemma3)
        } else if filename.starts_with("llama") {
            Some(ModelFamily::Llama)
        } else if filename.starts_with("llava") {
            Some(ModelFamily::Llava)
        } else if filename.starts_with("qwen3") {
            Some(ModelFamily::Qwen3)
        } else if filename.starts_with("phi4") {
            Some(ModelFamily::Phi4)
        } else if filename.contains("smollm3") {
            Some(ModelFamily::SmolLm3)
        } else if filename.starts_with("voxtral") {
            Some(ModelFamily::Voxtral)
        } else {
            None
        };

        match family {
            Some(family) => {
                debug!("Detected model family {} for {}", family, path.display());
                family
            }
            None => {
                warn!(
                    "Unknown model type in path: {}, falling back to {}",
                    path.display(),
                    ModelFamily::Llama
                );
                ModelFamily::Llama
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Gemma3 => "gemma3",
            ModelFamily::Llama => "llama",
            ModelFamily::Llava => "llava",
            ModelFamily::Qwen3 => "qwen3",
            ModelFamily::Phi4 => "phi4",
            ModelFamily::SmolLm3 => "smollm3",
            ModelFamily::Voxtral => "voxtral",
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            ModelFamily::Llama | ModelFamily::Qwen3 | ModelFamily::Phi4 | ModelFamily::SmolLm3 => {
                Modality::Text
            }
            ModelFamily::Llava | ModelFamily::Gemma3 | ModelFamily::Voxtral => Modality::Multimodal,
        }
    }

    /// Built-in prompt template with a single `{}` placeholder
    pub fn prompt_template(&self) -> &'static str {
        match self {
            ModelFamily::Gemma3 => GEMMA3_TEMPLATE,
            ModelFamily::Llama => LLAMA3_TEMPLATE,
            ModelFamily::Llava => LLAVA_TEMPLATE,
            ModelFamily::Qwen3 => QWEN3_TEMPLATE,
            ModelFamily::Phi4 => PHI4_TEMPLATE,
            ModelFamily::SmolLm3 => SMOLLM3_TEMPLATE,
            ModelFamily::Voxtral => VOXTRAL_TEMPLATE,
        }
    }

    /// Stop tokens in match order. Voxtral has none; its runtime ends generation itself.
    pub fn stop_tokens(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::Gemma3 => &["<end_of_turn>"],
            ModelFamily::Llama => &["<|eot_id|>", "<|end_of_text|>"],
            ModelFamily::Phi4 => &["<|end|>"],
            ModelFamily::Qwen3 | ModelFamily::SmolLm3 => &["<|im_end|>"],
            ModelFamily::Llava => &["</s>"],
            ModelFamily::Voxtral => &[],
        }
    }

    pub fn default_sequence_length(&self) -> usize {
        match self {
            ModelFamily::Llava | ModelFamily::Gemma3 | ModelFamily::Voxtral => 768,
            ModelFamily::Llama | ModelFamily::Phi4 => 128,
            _ => 768,
        }
    }

    /// Reserved tokens the runtime tokenizer must be told about. Only Llama has any.
    pub fn special_tokens(&self) -> Vec<String> {
        match self {
            ModelFamily::Llama => LLAMA_SPECIAL_TOKENS
                .iter()
                .map(|t| t.to_string())
                .chain((2..256).map(|n| format!("<|reserved_special_token_{n}|>")))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn format_prompt(&self, text: &str) -> String {
        apply_template(self.prompt_template(), text)
    }

    pub fn is_stop_token(&self, token: &str) -> bool {
        self.stop_tokens().contains(&token)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Substitute `text` for the first placeholder in `template`.
pub fn apply_template(template: &str, text: &str) -> String {
    template.replacen(PROMPT_PLACEHOLDER, text, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_classification() {
        let cases = [
            ("/models/gemma3-1b.pte", ModelFamily::Gemma3),
            ("/models/llama3_2-1b.pte", ModelFamily::Llama),
            ("/models/llava-7b.pte", ModelFamily::Llava),
            ("/models/qwen3-0.6b.pte", ModelFamily::Qwen3),
            ("/models/phi4-mini.pte", ModelFamily::Phi4),
            ("/models/voxtral-mini.pte", ModelFamily::Voxtral),
        ];
        for (path, expected) in cases {
            assert_eq!(ModelFamily::classify(path), expected, "{path}");
        }
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        assert_eq!(ModelFamily::classify("/x/Gemma3-IT.pte"), ModelFamily::Gemma3);
        assert_eq!(ModelFamily::classify("QWEN3.pte"), ModelFamily::Qwen3);
    }

    #[test]
    fn test_smollm3_matches_substring() {
        assert_eq!(ModelFamily::classify("hf-SmolLM3-3B.pte"), ModelFamily::SmolLm3);
        assert_eq!(ModelFamily::classify("smollm3.pte"), ModelFamily::SmolLm3);
    }

    #[test]
    fn test_only_filename_is_considered() {
        assert_eq!(ModelFamily::classify("/gemma3/weights/model.pte"), ModelFamily::Llama);
        assert_eq!(ModelFamily::classify("/llama/phi4-q4.pte"), ModelFamily::Phi4);
    }

    #[test]
    fn test_prefix_priority() {
        // "llama" is checked before the smollm3 substring rule
        assert_eq!(ModelFamily::classify("llama-smollm3.pte"), ModelFamily::Llama);
        // prefix rules only match at the start
        assert_eq!(ModelFamily::classify("my-gemma3.pte"), ModelFamily::Llama);
    }

    #[test]
    fn test_unknown_falls_back_to_llama() {
        assert_eq!(ModelFamily::classify("mistral-7b.pte"), ModelFamily::Llama);
        assert_eq!(ModelFamily::classify(""), ModelFamily::Llama);
        assert_eq!(ModelFamily::classify("/"), ModelFamily::Llama);
    }

    #[test]
    fn test_modalities() {
        let text: Vec<_> = ModelFamily::ALL
            .iter()
            .filter(|f| f.modality() == Modality::Text)
            .collect();
        assert_eq!(
            text,
            vec![&ModelFamily::Llama, &ModelFamily::Qwen3, &ModelFamily::Phi4, &ModelFamily::SmolLm3]
        );
    }

    #[test]
    fn test_every_template_has_one_placeholder() {
        for family in ModelFamily::ALL {
            assert_eq!(
                family.prompt_template().matches(PROMPT_PLACEHOLDER).count(),
                1,
                "{family}"
            );
        }
    }

    #[test]
    fn test_format_prompt() {
        assert_eq!(
            ModelFamily::Gemma3.format_prompt("Hi"),
            "<start_of_turn>user\nHi<end_of_turn>\n<start_of_turn>model"
        );
        assert_eq!(ModelFamily::Phi4.format_prompt("Hi"), "<|user|>Hi<|end|><|assistant|>");
        assert_eq!(ModelFamily::Voxtral.format_prompt("Hi"), "Hi[/INST]");
    }

    #[test]
    fn test_format_prompt_substitutes_once() {
        // braces in user text stay untouched
        assert_eq!(ModelFamily::Llava.format_prompt("a {} b"), "USER: a {} b ASSISTANT: ");
    }

    #[test]
    fn test_stop_tokens() {
        assert!(ModelFamily::Gemma3.is_stop_token("<end_of_turn>"));
        assert!(ModelFamily::Llama.is_stop_token("<|eot_id|>"));
        assert!(ModelFamily::Llama.is_stop_token("<|end_of_text|>"));
        assert!(ModelFamily::Phi4.is_stop_token("<|end|>"));
        assert!(ModelFamily::Qwen3.is_stop_token("<|im_end|>"));
        assert!(ModelFamily::SmolLm3.is_stop_token("<|im_end|>"));
        assert!(ModelFamily::Llava.is_stop_token("</s>"));

        // exact match only
        assert!(!ModelFamily::Gemma3.is_stop_token("<end_of_turn> "));
        assert!(!ModelFamily::Gemma3.is_stop_token("<|eot_id|>"));
    }

    #[test]
    fn test_voxtral_never_stops_on_content() {
        for family in ModelFamily::ALL {
            for token in family.stop_tokens() {
                assert!(!ModelFamily::Voxtral.is_stop_token(token));
            }
        }
    }

    #[test]
    fn test_default_sequence_lengths() {
        assert_eq!(ModelFamily::Gemma3.default_sequence_length(), 768);
        assert_eq!(ModelFamily::Llava.default_sequence_length(), 768);
        assert_eq!(ModelFamily::Voxtral.default_sequence_length(), 768);
        assert_eq!(ModelFamily::Llama.default_sequence_length(), 128);
        assert_eq!(ModelFamily::Phi4.default_sequence_length(), 128);
        assert_eq!(ModelFamily::Qwen3.default_sequence_length(), 768);
        assert_eq!(ModelFamily::SmolLm3.default_sequence_length(), 768);
    }

    #[test]
    fn test_llama_special_tokens() {
        let tokens = ModelFamily::Llama.special_tokens();
        assert_eq!(tokens.len(), 11 + 254);
        assert_eq!(tokens[0], "<|begin_of_text|>");
        assert_eq!(tokens[11], "<|reserved_special_token_2|>");
        assert_eq!(tokens.last().unwrap(), "<|reserved_special_token_255|>");
        assert!(ModelFamily::Qwen3.special_tokens().is_empty());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ModelFamily::SmolLm3).unwrap();
        assert_eq!(json, "\"smollm3\"");
        let family: ModelFamily = serde_json::from_str("\"gemma3\"").unwrap();
        assert_eq!(family, ModelFamily::Gemma3);
    }
}
