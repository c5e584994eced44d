//! Top-level driver: validate input, build services, run the graph.
//!
//! Input problems (wrong extension, two PDFs, a file that is not a PDF) are
//! reported before any service is contacted or configured. Use
//! [`crate::executor::Pipeline`] directly to inject your own services, and
//! [`crate::stream::process_document_stream`] to observe stages as events.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::{Pipeline, PipelineOutput};
use crate::pipeline::input::{resolve_input, DocumentInput};
use tracing::info;

/// Process one document end to end.
///
/// # Arguments
/// * `input` : one PDF, or an ordered list of page images
/// * `config`: pipeline configuration
///
/// # Errors
/// Any [`PipelineError`]; there are no partial results.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docai::{process_document, DocumentInput, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder()
///     .target_language("French")
///     .translate(true)
///     .build()?;
/// let output = process_document(&DocumentInput::pdf("report.pdf"), &config).await?;
/// println!("{} pages", output.state.page_numbers().map_or(0, Vec::len));
/// # Ok(())
/// # }
/// ```
pub async fn process_document(
    input: &DocumentInput,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let source = resolve_input(input)?;
    info!(
        "Processing {} ({} file(s), {:?})",
        source.primary_path().display(),
        source.paths.len(),
        source.kind
    );
    let pipeline = Pipeline::from_config(config)?;
    pipeline.run(source, config).await
}

/// Synchronous wrapper around [`process_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_document_sync(
    input: &DocumentInput,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_document(input, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected_before_services() {
        let config = PipelineConfig::builder()
            .analysis_api_key("")
            .build()
            .unwrap();
        let input = DocumentInput::images(Vec::<std::path::PathBuf>::new());
        let err = process_document_sync(&input, &config).unwrap_err();
        assert!(matches!(err, PipelineError::NoInput));
    }

    #[test]
    fn missing_file_is_rejected_before_services() {
        let config = PipelineConfig::builder()
            .analysis_api_key("")
            .build()
            .unwrap();
        let input = DocumentInput::pdf("/nonexistent/report.pdf");
        let err = tokio_test::block_on(process_document(&input, &config)).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound { .. }));
    }
}
