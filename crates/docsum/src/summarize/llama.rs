//! Summaries from an embedded GGUF model via llama-cpp-2.

use std::num::NonZeroU32;
use std::path::Path;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use log::{debug, info};

use crate::error::SummarizeError;
use crate::summarize::model_manager::ModelError;
use crate::summarize::{prompt_parts, sanitize_for_prompt, Summarizer, SummaryOptions};

const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;
const REPETITION_PENALTY: f32 = 1.2;
const PENALTY_LAST_N: i32 = 64;

pub struct LlamaEngine {
    model: LlamaModel,
    backend: LlamaBackend,
    max_input_tokens: usize,
}

// SAFETY: LlamaEngine is only reached through ModelManager's Mutex. Every
// generation creates its own context, so no mutable llama state is shared.
unsafe impl Send for LlamaEngine {}
unsafe impl Sync for LlamaEngine {}

impl LlamaEngine {
    pub fn load(model_path: &Path, max_input_tokens: usize) -> Result<Self, ModelError> {
        info!("Initializing LLM backend...");
        let backend = LlamaBackend::init().map_err(|e| ModelError::BackendInit(e.to_string()))?;

        info!("Loading model from: {}", model_path.display());
        let model = LlamaModel::load_from_file(&backend, model_path, &LlamaModelParams::default())
            .map_err(|e| ModelError::ModelLoad(e.to_string()))?;

        Ok(Self {
            model,
            backend,
            max_input_tokens,
        })
    }

    fn tokenize(&self, text: &str, bos: AddBos) -> Result<Vec<LlamaToken>, SummarizeError> {
        self.model
            .str_to_token(text, bos)
            .map_err(|e| SummarizeError::Tokenization(e.to_string()))
    }

    /// Prompt tokens with the document cut to fit `max_input_tokens` overall.
    fn prompt_tokens(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> Result<Vec<LlamaToken>, SummarizeError> {
        let parts = prompt_parts(options);
        let mut tokens = self.tokenize(&parts.prefix, AddBos::Always)?;
        let suffix = self.tokenize(&parts.suffix, AddBos::Never)?;
        let document = self.tokenize(&sanitize_for_prompt(text), AddBos::Never)?;

        let budget = self
            .max_input_tokens
            .saturating_sub(tokens.len() + suffix.len());
        if document.len() > budget {
            debug!(
                "Truncating document from {} to {} tokens",
                document.len(),
                budget
            );
        }
        tokens.extend(document.into_iter().take(budget));
        tokens.extend(suffix);
        Ok(tokens)
    }

    fn generate(
        &self,
        prompt: &[LlamaToken],
        max_new_tokens: usize,
    ) -> Result<String, SummarizeError> {
        let n_ctx = (prompt.len() + max_new_tokens) as u32;
        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(n_ctx));
        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| SummarizeError::Inference(format!("Failed to create context: {}", e)))?;

        let mut batch = LlamaBatch::new(prompt.len().max(1), 1);
        let last = prompt.len().saturating_sub(1);
        for (i, token) in prompt.iter().enumerate() {
            batch
                .add(*token, i as i32, &[0], i == last)
                .map_err(|e| SummarizeError::Inference(format!("Failed to add token: {}", e)))?;
        }
        ctx.decode(&mut batch)
            .map_err(|e| SummarizeError::Inference(format!("Failed to decode prompt: {}", e)))?;

        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(42);
        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::penalties(PENALTY_LAST_N, REPETITION_PENALTY, 0.0, 0.0),
            LlamaSampler::top_p(TOP_P, 1),
            LlamaSampler::temp(TEMPERATURE),
            LlamaSampler::dist(seed),
        ]);

        let mut output = String::new();
        let mut n_cur = prompt.len();

        for _ in 0..max_new_tokens {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);

            if self.model.is_eog_token(token) {
                break;
            }

            let piece = self
                .model
                .token_to_str(token, Special::Tokenize)
                .map_err(|e| SummarizeError::Inference(format!("Failed to decode token: {}", e)))?;
            output.push_str(&piece);

            batch.clear();
            batch
                .add(token, n_cur as i32, &[0], true)
                .map_err(|e| SummarizeError::Inference(format!("Failed to add token: {}", e)))?;
            ctx.decode(&mut batch)
                .map_err(|e| SummarizeError::Inference(format!("Failed to decode: {}", e)))?;
            n_cur += 1;
        }

        Ok(output)
    }
}

impl Summarizer for LlamaEngine {
    fn summarize(&self, text: &str, options: &SummaryOptions) -> Result<String, SummarizeError> {
        let prompt = self.prompt_tokens(text, options)?;
        debug!("Prompt is {} tokens", prompt.len());

        let output = self.generate(&prompt, options.max_new_tokens)?;
        let summary = output.trim();
        if summary.is_empty() {
            return Err(SummarizeError::EmptyOutput);
        }
        Ok(summary.to_string())
    }
}
