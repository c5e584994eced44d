//! Pipeline stages, one file per stage family.
//!
//! Every stage has the same shape: it reads what it needs from an immutable
//! [`PipelineState`](crate::state::PipelineState), may call an injected
//! service through the [`StageContext`], and returns a typed
//! [`StateUpdate`](crate::state::StateUpdate). Only the executor merges.
//!
//! ## Data Flow
//!
//! ```text
//! split / merge ──▶ layout ──▶ elements ──▶ crop ──▶ text ──▶ summarize
//!  (chunks)        (service)  (ids, pages)  (png)   (pages)  (model service)
//! ```
//!
//! 1. [`split`]    : cut a PDF into page-range chunks, or treat images as chunks
//! 2. [`layout`]   : send each chunk to the analysis service, persist the JSON
//! 3. [`elements`] : global page resolution, id assignment, classification
//! 4. [`crop`]     : rasterise pages and cut out figures and tables
//! 5. [`text`]     : per-page markdown text and retrieval documents
//! 6. [`summarize`]: translation, page summaries, crop batches and summaries
//!
//! Helpers used by several stages: [`input`] (driver-side validation),
//! [`render`] (pdfium and EXIF-aware image loading), [`encode`] (PNG and
//! base64), [`postprocess`] (model reply cleanup).

use crate::config::PipelineConfig;
use crate::services::{DocumentAnalyzer, ModelService};

pub mod crop;
pub mod elements;
pub mod encode;
pub mod input;
pub mod layout;
pub mod postprocess;
pub mod render;
pub mod split;
pub mod summarize;
pub mod text;

/// What a stage may use besides the state: run configuration and the two
/// injected services.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a PipelineConfig,
    pub analyzer: &'a dyn DocumentAnalyzer,
    pub model: &'a dyn ModelService,
}
