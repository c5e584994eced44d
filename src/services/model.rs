//! Summarisation/translation capability and its LLM adapter.
//!
//! Every method takes a batch and answers with one string per input, in
//! input order. The pipeline relies on that order to re-associate replies
//! with pages and elements, so the adapter uses
//! [`futures::StreamExt::buffered`] (ordered) rather than
//! `buffer_unordered`, even though requests overlap in flight.
//!
//! ## No retries
//!
//! A failed request fails the batch and the run. Rate-limit handling, if
//! wanted, belongs in the provider passed in.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::encode::image_data_from_file;
use crate::pipeline::postprocess::clean_model_output;
use crate::prompts;
use crate::state::BatchItem;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Default model when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One text request: page content plus the language to answer in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRequest {
    pub context: String,
    pub output_language: String,
}

/// Which kind of crop a multimodal batch carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    Figure,
    Table,
}

impl VisualKind {
    /// Task label used in errors and logs.
    pub fn task(self) -> &'static str {
        match self {
            VisualKind::Figure => "summarize_images",
            VisualKind::Table => "summarize_tables",
        }
    }
}

/// Batch-in, ordered-batch-out model service.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Translate each page text into its `output_language`.
    async fn translate(&self, requests: &[TextRequest]) -> Result<Vec<String>, PipelineError>;

    /// Summarise each page text in its `output_language`.
    async fn summarize_text(&self, requests: &[TextRequest])
        -> Result<Vec<String>, PipelineError>;

    /// Summarise each cropped figure or table, grounded in its page context.
    async fn summarize_visuals(
        &self,
        kind: VisualKind,
        items: &[BatchItem],
    ) -> Result<Vec<String>, PipelineError>;
}

/// [`ModelService`] backed by an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmModelService {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    concurrency: usize,
}

impl std::fmt::Debug for LlmModelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmModelService")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl LlmModelService {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            concurrency: config.concurrency.max(1),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// Send every conversation, keeping at most `concurrency` in flight, and
    /// return the cleaned replies in input order. Stops at the first failure.
    async fn run_batch(
        &self,
        task: &'static str,
        conversations: Vec<Vec<ChatMessage>>,
    ) -> Result<Vec<String>, PipelineError> {
        let total = conversations.len();
        let options = self.options();
        let provider = &self.provider;
        let options = &options;

        let replies: Vec<String> = stream::iter(conversations.into_iter().enumerate().map(
            move |(i, messages)| async move {
                let response = provider
                    .chat(&messages, Some(options))
                    .await
                    .map_err(|e| PipelineError::ModelServiceFailed {
                        task,
                        message: format!("request {} of {total}: {e}", i + 1),
                    })?;
                debug!(
                    "{task} {}/{total}: {} input tokens, {} output tokens",
                    i + 1,
                    response.prompt_tokens,
                    response.completion_tokens
                );
                Ok::<_, PipelineError>(clean_model_output(&response.content))
            },
        ))
        .buffered(self.concurrency)
        .try_collect()
        .await?;

        Ok(replies)
    }
}

/// Messages for one translation request.
pub fn translate_messages(req: &TextRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompts::TRANSLATE_SYSTEM_PROMPT),
        ChatMessage::user(prompts::translate_prompt(&req.context, &req.output_language)),
    ]
}

/// Messages for one page-summary request.
pub fn summary_messages(req: &TextRequest) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(prompts::SUMMARY_SYSTEM_PROMPT),
        ChatMessage::user(prompts::summary_prompt(&req.context, &req.output_language)),
    ]
}

/// System and user text for one crop.
pub fn visual_prompts(kind: VisualKind, item: &BatchItem) -> (String, String) {
    match kind {
        VisualKind::Figure => (
            prompts::image_system_prompt(&item.language),
            prompts::visual_user_prompt("image", &item.context, &item.language),
        ),
        VisualKind::Table => (
            prompts::table_system_prompt(&item.language),
            prompts::visual_user_prompt("image of table", &item.context, &item.language),
        ),
    }
}

#[async_trait]
impl ModelService for LlmModelService {
    async fn translate(&self, requests: &[TextRequest]) -> Result<Vec<String>, PipelineError> {
        self.run_batch("translate_text", requests.iter().map(translate_messages).collect())
            .await
    }

    async fn summarize_text(
        &self,
        requests: &[TextRequest],
    ) -> Result<Vec<String>, PipelineError> {
        self.run_batch("create_text_summary", requests.iter().map(summary_messages).collect())
            .await
    }

    async fn summarize_visuals(
        &self,
        kind: VisualKind,
        items: &[BatchItem],
    ) -> Result<Vec<String>, PipelineError> {
        let mut conversations = Vec::with_capacity(items.len());
        for item in items {
            let image = image_data_from_file(&item.path).await?;
            let (system, user) = visual_prompts(kind, item);
            conversations.push(vec![
                ChatMessage::system(system),
                ChatMessage::user_with_images(user, vec![image]),
            ]);
        }
        self.run_batch(kind.task(), conversations).await
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both non-empty.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, so a machine with several
///    keys defaults predictably.
/// 5. **Auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
