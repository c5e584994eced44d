//! External collaborators of the pipeline, as injected capabilities.
//!
//! Stages never construct an HTTP client or an LLM provider themselves.
//! They call one of two narrow traits:
//!
//! * [`DocumentAnalyzer`]: "analyse this chunk, give me its layout elements"
//! * [`ModelService`]: "run this batch, give me one string per input, in order"
//!
//! Production runs wire in [`UpstageAnalyzer`] and [`LlmModelService`];
//! tests inject fakes and get a fully deterministic pipeline.

pub mod analyzer;
pub mod model;

pub use analyzer::{AnalysisResult, DocumentAnalyzer, UpstageAnalyzer};
pub use model::{resolve_provider, LlmModelService, ModelService, TextRequest, VisualKind};
