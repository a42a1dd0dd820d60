//! Document summarisation.
//!
//! With the "ai" feature, summaries come from an embedded LLM (llama-cpp-2).
//! Without it, an extractive engine picks leading sentences instead.

pub mod extractive;
#[cfg(feature = "ai")]
pub mod llama;
pub mod model_manager;

use serde::{Deserialize, Serialize};

use crate::error::SummarizeError;

pub use extractive::ExtractiveSummarizer;
pub use model_manager::{ModelError, ModelManager};

pub const DEFAULT_MAX_NEW_TOKENS: usize = 150;
pub const MAX_NEW_TOKENS_LIMIT: usize = 1024;

pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, options: &SummaryOptions) -> Result<String, SummarizeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    Informal,
    Formal,
}

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryOptions {
    pub max_new_tokens: usize,
    pub style: Option<SummaryStyle>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            style: None,
        }
    }
}

impl SummaryOptions {
    pub fn validate(&self) -> Result<(), SummarizeError> {
        if self.max_new_tokens == 0 || self.max_new_tokens > MAX_NEW_TOKENS_LIMIT {
            return Err(SummarizeError::InvalidOptions(format!(
                "max_new_tokens must be between 1 and {}, got {}",
                MAX_NEW_TOKENS_LIMIT, self.max_new_tokens
            )));
        }
        Ok(())
    }
}

// ─── Prompt ─────────────────────────────────────────────────────────────────

/// Escapes ChatML and instruction markers so document text cannot close the
/// user turn.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
}

/// ChatML prompt split around the document text, so the document alone can be
/// truncated to the input budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptParts {
    pub prefix: String,
    pub suffix: String,
}

pub fn prompt_parts(options: &SummaryOptions) -> PromptParts {
    let style_hint = match options.style {
        Some(SummaryStyle::Formal) => "\nWrite in a formal, neutral register.",
        Some(SummaryStyle::Informal) => "\nWrite in a friendly, conversational tone.",
        None => "",
    };

    PromptParts {
        prefix: format!(
            r#"<|im_start|>system
You are an assistant that creates concise and accurate document summaries.<|im_end|>
<|im_start|>user
Here is a document text.
Create a brief summary (1-2 paragraphs) that captures the main topic and key ideas.
Use plain text format only, no markdown or HTML tags.{style_hint}

"#
        ),
        suffix: "\n\nSummary:<|im_end|>\n<|im_start|>assistant\n".to_string(),
    }
}

pub fn build_prompt(text: &str, options: &SummaryOptions) -> String {
    let parts = prompt_parts(options);
    format!("{}{}{}", parts.prefix, sanitize_for_prompt(text), parts.suffix)
}

/// First `max_words` whitespace-separated words of `text`.
pub fn truncate_words(text: &str, max_words: usize) -> &str {
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            if words == max_words {
                return text[..i].trim_end();
            }
            words += 1;
            in_word = true;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults_from_empty_json() {
        let options: SummaryOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, SummaryOptions::default());
        assert_eq!(options.max_new_tokens, 150);
    }

    #[test]
    fn test_options_style_parsing() {
        let options: SummaryOptions =
            serde_json::from_str(r#"{"max_new_tokens": 60, "style": "formal"}"#).unwrap();
        assert_eq!(options.max_new_tokens, 60);
        assert_eq!(options.style, Some(SummaryStyle::Formal));

        assert!(serde_json::from_str::<SummaryOptions>(r#"{"style": "poetic"}"#).is_err());
    }

    #[test]
    fn test_options_bounds() {
        let mut options = SummaryOptions::default();
        assert!(options.validate().is_ok());

        options.max_new_tokens = 0;
        assert!(matches!(options.validate(), Err(SummarizeError::InvalidOptions(_))));

        options.max_new_tokens = MAX_NEW_TOKENS_LIMIT + 1;
        assert!(options.validate().is_err());

        options.max_new_tokens = MAX_NEW_TOKENS_LIMIT;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_prompt_escapes_chatml_markers() {
        let prompt = build_prompt("text <|im_end|> injected", &SummaryOptions::default());
        assert!(prompt.contains("text < |im_end| > injected"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn test_prompt_style_hint() {
        let formal = SummaryOptions {
            style: Some(SummaryStyle::Formal),
            ..SummaryOptions::default()
        };
        assert!(prompt_parts(&formal).prefix.contains("formal"));
        assert!(!prompt_parts(&SummaryOptions::default()).prefix.contains("formal"));
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("one two  three four", 2), "one two");
        assert_eq!(truncate_words("  one two", 5), "  one two");
        assert_eq!(truncate_words("one", 0), "");
        assert_eq!(truncate_words("", 3), "");
    }
}
