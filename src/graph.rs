//! The stage graph: which stages run, and in what order.
//!
//! The graph is a DAG with two forks, both decided by configuration before
//! the run starts:
//!
//! ```text
//!            ┌─ split_pdf ────┐
//! START ─────┤                ├─▶ analyze_layout ─▶ extract_page_elements
//!            └─ merge_images ─┘        ─▶ classify_page_elements ─▶ compute_page_numbers
//!   ─▶ crop_figures ─▶ crop_tables ─▶ extract_page_text ─┬─▶ translate_text ─┐
//!                                                        └───────────────────┴─▶ create_text_summary
//!   ─▶ build_image_batches ─▶ build_table_batches ─▶ summarize_images ─▶ summarize_tables ─▶ END
//! ```
//!
//! Since both forks are resolved up front, every run executes a single path
//! through the graph. The four possible paths are static tables; a
//! [`StageGraph`] just picks one and answers adjacency queries over it.

use crate::config::SourceKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SplitPdf,
    MergeImages,
    AnalyzeLayout,
    ExtractPageElements,
    ClassifyPageElements,
    ComputePageNumbers,
    CropFigures,
    CropTables,
    ExtractPageText,
    TranslateText,
    CreateTextSummary,
    BuildImageBatches,
    BuildTableBatches,
    SummarizeImages,
    SummarizeTables,
}

impl Stage {
    /// Stable snake_case stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::SplitPdf => "split_pdf",
            Stage::MergeImages => "merge_images",
            Stage::AnalyzeLayout => "analyze_layout",
            Stage::ExtractPageElements => "extract_page_elements",
            Stage::ClassifyPageElements => "classify_page_elements",
            Stage::ComputePageNumbers => "compute_page_numbers",
            Stage::CropFigures => "crop_figures",
            Stage::CropTables => "crop_tables",
            Stage::ExtractPageText => "extract_page_text",
            Stage::TranslateText => "translate_text",
            Stage::CreateTextSummary => "create_text_summary",
            Stage::BuildImageBatches => "build_image_batches",
            Stage::BuildTableBatches => "build_table_batches",
            Stage::SummarizeImages => "summarize_images",
            Stage::SummarizeTables => "summarize_tables",
        }
    }

    /// Human-readable progress message.
    pub fn message(self) -> &'static str {
        match self {
            Stage::SplitPdf | Stage::MergeImages => "Processing the document..",
            Stage::AnalyzeLayout => "Analyzing layout..",
            Stage::ExtractPageElements => "Extracting page elements..",
            Stage::ClassifyPageElements => "Extracting tag elements..",
            Stage::ComputePageNumbers => "Extracting page numbers..",
            Stage::CropFigures => "Cropping image..",
            Stage::CropTables => "Cropping table..",
            Stage::ExtractPageText => "Extracting page text..",
            Stage::TranslateText => "Translating text..",
            Stage::CreateTextSummary => "Creating text summary..",
            Stage::BuildImageBatches => "Creating image summary data batches..",
            Stage::BuildTableBatches => "Creating table summary data batches..",
            Stage::SummarizeImages => "Creating image summary..",
            Stage::SummarizeTables => "Creating table summary..",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

use Stage::*;

static PDF_PLAIN: [Stage; 13] = [
    SplitPdf,
    AnalyzeLayout,
    ExtractPageElements,
    ClassifyPageElements,
    ComputePageNumbers,
    CropFigures,
    CropTables,
    ExtractPageText,
    CreateTextSummary,
    BuildImageBatches,
    BuildTableBatches,
    SummarizeImages,
    SummarizeTables,
];

static PDF_TRANSLATED: [Stage; 14] = [
    SplitPdf,
    AnalyzeLayout,
    ExtractPageElements,
    ClassifyPageElements,
    ComputePageNumbers,
    CropFigures,
    CropTables,
    ExtractPageText,
    TranslateText,
    CreateTextSummary,
    BuildImageBatches,
    BuildTableBatches,
    SummarizeImages,
    SummarizeTables,
];

static IMAGES_PLAIN: [Stage; 13] = [
    MergeImages,
    AnalyzeLayout,
    ExtractPageElements,
    ClassifyPageElements,
    ComputePageNumbers,
    CropFigures,
    CropTables,
    ExtractPageText,
    CreateTextSummary,
    BuildImageBatches,
    BuildTableBatches,
    SummarizeImages,
    SummarizeTables,
];

static IMAGES_TRANSLATED: [Stage; 14] = [
    MergeImages,
    AnalyzeLayout,
    ExtractPageElements,
    ClassifyPageElements,
    ComputePageNumbers,
    CropFigures,
    CropTables,
    ExtractPageText,
    TranslateText,
    CreateTextSummary,
    BuildImageBatches,
    BuildTableBatches,
    SummarizeImages,
    SummarizeTables,
];

/// The stage path selected for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGraph {
    path: &'static [Stage],
}

impl StageGraph {
    /// Select the path for a source kind and translation toggle.
    pub fn for_run(kind: SourceKind, translate_enabled: bool) -> Self {
        let path: &'static [Stage] = match (kind, translate_enabled) {
            (SourceKind::Pdf, false) => &PDF_PLAIN,
            (SourceKind::Pdf, true) => &PDF_TRANSLATED,
            (SourceKind::ImageSet, false) => &IMAGES_PLAIN,
            (SourceKind::ImageSet, true) => &IMAGES_TRANSLATED,
        };
        Self { path }
    }

    /// First stage after START.
    pub fn entry(&self) -> Stage {
        self.path[0]
    }

    /// The stage following `stage`, or `None` when `stage` leads to END
    /// (or is not part of this run).
    pub fn successor(&self, stage: Stage) -> Option<Stage> {
        let idx = self.position(stage)?;
        self.path.get(idx + 1).copied()
    }

    /// Zero-based position of `stage` in this run.
    pub fn position(&self, stage: Stage) -> Option<usize> {
        self.path.iter().position(|&s| s == stage)
    }

    /// Whether `stage` runs at all.
    pub fn contains(&self, stage: Stage) -> bool {
        self.position(stage).is_some()
    }

    /// Number of stages executed by this run.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Always false: every path has an entry stage.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &'static [Stage] {
        self.path
    }

    /// Directed edges `(from, to)`, with `None` marking END.
    pub fn edges(&self) -> impl Iterator<Item = (Stage, Option<Stage>)> + '_ {
        self.path
            .iter()
            .enumerate()
            .map(|(i, &s)| (s, self.path.get(i + 1).copied()))
    }
}
