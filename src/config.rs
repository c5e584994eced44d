//! Configuration types for a document pipeline run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The subset that the graph itself depends on
//! (`batch_size`, `target_language`, `translate_enabled`) is copied into the
//! pipeline state at entry and never changes afterwards; the rest configures
//! the external-service adapters and rendering.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default endpoint of the document-analysis service.
pub const DEFAULT_ANALYSIS_ENDPOINT: &str = "https://api.upstage.ai/v1/document-ai/document-parse";

/// Resolution used when a PDF page is rasterised for cropping.
pub const DEFAULT_DPI: u32 = 300;

/// Configuration for a document pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_docai::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .batch_size(5)
///     .target_language("Korean")
///     .translate(true)
///     .build()
///     .unwrap();
/// assert!(config.translate_enabled);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum pages per PDF chunk sent to the analysis service. Default: 10.
    pub batch_size: usize,

    /// Language for translations and summaries. Default: "English".
    pub target_language: String,

    /// Insert the `translate_text` stage. Default: false.
    pub translate_enabled: bool,

    /// Rendering DPI used when rasterising PDF pages for cropping. Default: 300.
    pub dpi: u32,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for model calls. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per model call. Default: 2048.
    pub max_tokens: usize,

    /// Requests the model adapter keeps in flight within one batch. Default: 8.
    pub concurrency: usize,

    /// URL of the document-analysis service.
    pub analysis_endpoint: String,

    /// API key for the analysis service. Falls back to `UPSTAGE_API_KEY`.
    pub analysis_api_key: Option<String>,

    /// Path to a pdfium shared library. Falls back to `PDFIUM_LIB_PATH`.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            target_language: "English".to_string(),
            translate_enabled: false,
            dpi: DEFAULT_DPI,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            concurrency: 8,
            analysis_endpoint: DEFAULT_ANALYSIS_ENDPOINT.to_string(),
            analysis_api_key: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("batch_size", &self.batch_size)
            .field("target_language", &self.target_language)
            .field("translate_enabled", &self.translate_enabled)
            .field("dpi", &self.dpi)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("concurrency", &self.concurrency)
            .field("analysis_endpoint", &self.analysis_endpoint)
            .field("analysis_api_key", &self.analysis_api_key.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// API key for the analysis service, from config or `UPSTAGE_API_KEY`.
    pub fn resolved_analysis_key(&self) -> Option<String> {
        self.analysis_api_key
            .clone()
            .or_else(|| std::env::var("UPSTAGE_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    /// Pdfium library location, from config or `PDFIUM_LIB_PATH`.
    pub fn resolved_pdfium_path(&self) -> Option<PathBuf> {
        self.pdfium_lib_path.clone().or_else(|| {
            std::env::var("PDFIUM_LIB_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn translate(mut self, enabled: bool) -> Self {
        self.config.translate_enabled = enabled;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn analysis_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.analysis_endpoint = url.into();
        self
    }

    pub fn analysis_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.analysis_api_key = Some(key.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "Batch size must be ≥ 1".into(),
            ));
        }
        if c.target_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Target language must not be empty".into(),
            ));
        }
        if !(72..=600).contains(&c.dpi) {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !c.analysis_endpoint.starts_with("http://") && !c.analysis_endpoint.starts_with("https://") {
            return Err(PipelineError::InvalidConfig(format!(
                "Analysis endpoint must be an HTTP(S) URL, got '{}'",
                c.analysis_endpoint
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What kind of source document a run was started with.
///
/// Selects the entry stage: PDFs are split into page-range chunks, image
/// sets treat every image as a one-page chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A single PDF file.
    Pdf,
    /// One or more page images, in page order.
    ImageSet,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Pdf => f.write_str("pdf"),
            SourceKind::ImageSet => f.write_str("image_set"),
        }
    }
}
