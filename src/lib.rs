//! # edgequake-docai
//!
//! Layout-aware document pipeline: split, analyse, crop, translate and
//! summarise PDFs and page images.
//!
//! ## Why this crate?
//!
//! Summarising a document page by page with a plain text extractor loses
//! what matters most in reports and papers: figures and tables. This crate
//! sends each page through a layout-analysis service, cuts every figure and
//! table out of the rendered page, and asks a multimodal model to summarise
//! each crop with the surrounding page summary as context. Text is extracted
//! per page, optionally translated, and summarised in the target language.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF or images
//!  │
//!  ├─ 1. Split      page-range chunks (PDF) or one chunk per image
//!  ├─ 2. Layout     chunk → analysis service → JSON on disk
//!  ├─ 3. Elements   global page numbers, element ids, category buckets
//!  ├─ 4. Crop       rasterise pages (pdfium / EXIF-aware) and cut figures, tables
//!  ├─ 5. Text       per-page markdown + retrieval documents
//!  ├─ 6. Translate  optional, one request per page
//!  ├─ 7. Summarise  page summaries, then crop summaries keyed by element id
//!  └─ 8. Output     markdown reports + zip archive of the scratch folder
//! ```
//!
//! Stages are nodes of a [`StageGraph`] chosen once per run; the
//! [`Pipeline`] executor runs them one at a time and merges each
//! [`StateUpdate`] into an accumulate-only [`PipelineState`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docai::{process_document, write_markdown_reports, DocumentInput, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // UPSTAGE_API_KEY for layout analysis; OPENAI_API_KEY (or another
//!     // provider key) for translation and summaries.
//!     let config = PipelineConfig::builder()
//!         .target_language("English")
//!         .build()?;
//!     let output = process_document(&DocumentInput::pdf("report.pdf"), &config).await?;
//!     for path in write_markdown_reports(&output.state)? {
//!         println!("{}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing with your own services
//!
//! [`DocumentAnalyzer`] and [`ModelService`] are the only seams to the
//! outside world. Build a [`Pipeline`] with [`Pipeline::new`] over fakes to
//! run the whole graph offline and deterministically.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docai` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-docai = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod services;
pub mod state;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, SourceKind};
pub use error::{ElementIssue, PipelineError};
pub use executor::{Pipeline, PipelineOutput, RunStats, StageReport};
pub use graph::{Stage, StageGraph};
pub use output::{clean_scratch, create_archive, write_markdown_reports};
pub use pipeline::input::DocumentInput;
pub use process::{process_document, process_document_sync};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, StageProgress};
pub use services::{
    AnalysisResult, DocumentAnalyzer, LlmModelService, ModelService, TextRequest,
    UpstageAnalyzer, VisualKind,
};
pub use state::{
    BatchItem, Coordinate, DocumentMetadata, ElementCategory, ElementId, LayoutElement,
    PageElements, PageGeometry, PageNumber, PipelineState, RetrievalDocument, SourceDocument,
    StateUpdate,
};
pub use stream::{process_document_stream, EventStream, PipelineEvent};
