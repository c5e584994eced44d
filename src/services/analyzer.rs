//! Document-analysis capability and its HTTP adapter.
//!
//! The analysis service takes one chunk file (a page-range PDF or a single
//! image) and answers with a JSON object whose `elements` array lists the
//! detected layout elements. Element shape is validated later, one element
//! at a time, so a single odd element never fails the whole chunk.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Raw reply of the analysis service for one chunk.
///
/// Only `elements` is interpreted; every other key is kept so the persisted
/// JSON is the service's full answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub elements: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Analyse one chunk and return its layout elements.
///
/// Implementations must not retry: a failed chunk fails the run.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(&self, chunk: &Path) -> Result<AnalysisResult, PipelineError>;
}

/// Upstage document-parse client.
#[derive(Clone)]
pub struct UpstageAnalyzer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for UpstageAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstageAnalyzer")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl UpstageAnalyzer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from config; the key comes from the config or `UPSTAGE_API_KEY`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let key = config
            .resolved_analysis_key()
            .ok_or_else(|| PipelineError::AnalyzerNotConfigured {
                hint: "Set UPSTAGE_API_KEY or pass an analysis API key.".to_string(),
            })?;
        Ok(Self::new(config.analysis_endpoint.clone(), key))
    }
}

#[async_trait]
impl DocumentAnalyzer for UpstageAnalyzer {
    async fn analyze(&self, chunk: &Path) -> Result<AnalysisResult, PipelineError> {
        let failed = |reason: String| PipelineError::AnalysisFailed {
            chunk: chunk.to_path_buf(),
            reason,
        };

        let bytes = tokio::fs::read(chunk)
            .await
            .map_err(|e| PipelineError::io(chunk, e))?;
        let file_name = chunk
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("document", part)
            .text("output_formats", "['html', 'markdown', 'text']");

        debug!("Uploading {} to {}", chunk.display(), self.endpoint);
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(failed(format!("API request failed: {status} {snippet}")));
        }

        resp.json::<AnalysisResult>()
            .await
            .map_err(|e| failed(format!("invalid JSON reply: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_keeps_unknown_keys() {
        let raw = serde_json::json!({
            "api": "2.0",
            "elements": [{ "category": "paragraph", "page": 1 }],
            "usage": { "pages": 1 }
        });
        let parsed: AnalysisResult = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(parsed.elements.len(), 1);
        assert_eq!(serde_json::to_value(&parsed).unwrap(), raw);
    }

    #[test]
    fn missing_elements_is_empty() {
        let parsed: AnalysisResult = serde_json::from_str("{}").unwrap();
        assert!(parsed.elements.is_empty());
    }

    #[test]
    fn from_config_needs_a_key() {
        let config = PipelineConfig::builder()
            .analysis_api_key("")
            .build()
            .unwrap();
        // an explicit empty key wins over the environment and counts as absent
        assert!(matches!(
            UpstageAnalyzer::from_config(&config),
            Err(PipelineError::AnalyzerNotConfigured { .. })
        ));
    }

    #[test]
    fn debug_hides_key() {
        let a = UpstageAnalyzer::new("https://example.test/parse", "sk-secret");
        assert!(!format!("{a:?}").contains("sk-secret"));
    }
}
