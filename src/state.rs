//! The shared state threaded through every pipeline stage.
//!
//! [`PipelineState`] is created once per run with its entry fields filled
//! in, then grows one [`StateUpdate`] at a time. Every produced field is an
//! `Option` that starts empty; [`PipelineState::merge`] fills it and refuses
//! to fill it twice, so a stage can only add to the state, never rewrite what
//! an earlier stage produced. Fields are private: stages and callers read
//! through the accessors, and the only write path is `merge`.
//!
//! The struct serialises with stable snake_case keys, which is the contract
//! presentation layers consume.

use crate::config::{PipelineConfig, SourceKind};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Process-wide unique element identifier, assigned once at ingestion.
pub type ElementId = u64;

/// Zero-based page index within the original, unsplit document.
pub type PageNumber = usize;

// ── Element model ─────────────────────────────────────────────────────────

/// One polygon vertex in fractional page coordinates (`0.0..=1.0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

/// Pixel dimensions of a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: u32,
    pub height: u32,
}

/// Layout category of an element.
///
/// Unrecognised tags fall into [`ElementCategory::Text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementCategory {
    Text,
    Table,
    Figure,
    Chart,
    Equation,
    Index,
}

impl ElementCategory {
    /// Map a service category tag to a bucket.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "figure" => ElementCategory::Figure,
            "table" => ElementCategory::Table,
            "chart" => ElementCategory::Chart,
            "equation" => ElementCategory::Equation,
            "index" => ElementCategory::Index,
            _ => ElementCategory::Text,
        }
    }
}

/// A layout element after global page resolution and id assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutElement {
    pub id: ElementId,
    /// Global page number.
    pub page: PageNumber,
    /// Raw category tag as returned by the analysis service.
    pub category: String,
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
    /// Raw content object; expected to carry a `markdown` string.
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

impl LayoutElement {
    /// Bucket this element is classified into.
    pub fn kind(&self) -> ElementCategory {
        ElementCategory::from_tag(&self.category)
    }

    /// The `content.markdown` string, if the element has the expected shape.
    pub fn markdown(&self) -> Option<&str> {
        self.content.as_ref()?.get("markdown")?.as_str()
    }
}

/// All elements of one page, partitioned by category.
///
/// `elements` keeps the unfiltered list in encounter order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageElements {
    pub text_elements: Vec<LayoutElement>,
    pub table_elements: Vec<LayoutElement>,
    pub image_elements: Vec<LayoutElement>,
    pub chart_elements: Vec<LayoutElement>,
    pub equation_elements: Vec<LayoutElement>,
    pub index_elements: Vec<LayoutElement>,
    pub elements: Vec<LayoutElement>,
}

impl PageElements {
    /// Elements of one category on this page.
    pub fn of(&self, category: ElementCategory) -> &[LayoutElement] {
        match category {
            ElementCategory::Text => &self.text_elements,
            ElementCategory::Table => &self.table_elements,
            ElementCategory::Figure => &self.image_elements,
            ElementCategory::Chart => &self.chart_elements,
            ElementCategory::Equation => &self.equation_elements,
            ElementCategory::Index => &self.index_elements,
        }
    }
}

// ── Batch / output model ──────────────────────────────────────────────────

/// One unit of work for the multimodal summarisation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: ElementId,
    /// Cropped figure or table image.
    pub path: PathBuf,
    /// Summary of the page the element sits on.
    pub context: String,
    pub page: PageNumber,
    pub language: String,
}

/// Retrieval metadata attached to each page document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub page: PageNumber,
    pub source: String,
}

/// A retrieval-ready page: its text plus page/source metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalDocument {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

// ── Entry ─────────────────────────────────────────────────────────────────

/// A validated source document: one PDF or an ordered set of images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub kind: SourceKind,
    pub paths: Vec<PathBuf>,
}

impl SourceDocument {
    /// The file naming the run: the PDF, or the first image.
    pub fn primary_path(&self) -> &Path {
        self.paths.first().map_or_else(|| Path::new(""), PathBuf::as_path)
    }

    /// File stem of [`Self::primary_path`].
    pub fn stem(&self) -> String {
        self.primary_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Per-document scratch folder: a sibling directory named after the stem.
    pub fn scratch_dir(&self) -> PathBuf {
        let parent = self.primary_path().parent().unwrap_or_else(|| Path::new(""));
        parent.join(self.stem())
    }
}

// ── State ─────────────────────────────────────────────────────────────────

/// Accumulate-only state threaded through the stage graph.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    source_path: Vec<PathBuf>,
    source_kind: SourceKind,
    batch_size: usize,
    target_language: String,
    translate_enabled: bool,

    sub_document_paths: Option<Vec<PathBuf>>,
    page_geometry: Option<BTreeMap<PageNumber, PageGeometry>>,
    analyzed_chunk_paths: Option<Vec<PathBuf>>,
    raw_page_elements: Option<BTreeMap<PageNumber, Vec<LayoutElement>>>,
    page_elements: Option<BTreeMap<PageNumber, PageElements>>,
    page_numbers: Option<Vec<PageNumber>>,
    cropped_figures: Option<BTreeMap<ElementId, PathBuf>>,
    cropped_tables: Option<BTreeMap<ElementId, PathBuf>>,
    page_text: Option<BTreeMap<PageNumber, String>>,
    documents: Option<Vec<RetrievalDocument>>,
    translated_text: Option<BTreeMap<PageNumber, String>>,
    page_text_summary: Option<BTreeMap<PageNumber, String>>,
    image_summary_batches: Option<Vec<BatchItem>>,
    table_summary_batches: Option<Vec<BatchItem>>,
    image_summaries: Option<BTreeMap<ElementId, String>>,
    table_summaries: Option<BTreeMap<ElementId, String>>,
}

/// A typed partial update returned by one stage.
///
/// Each variant names exactly the fields its stage produces.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    Chunks {
        sub_document_paths: Vec<PathBuf>,
        page_geometry: BTreeMap<PageNumber, PageGeometry>,
    },
    Analyzed {
        analyzed_chunk_paths: Vec<PathBuf>,
    },
    RawElements {
        raw_page_elements: BTreeMap<PageNumber, Vec<LayoutElement>>,
    },
    Classified {
        page_elements: BTreeMap<PageNumber, PageElements>,
    },
    PageNumbers {
        page_numbers: Vec<PageNumber>,
    },
    CroppedFigures {
        cropped_figures: BTreeMap<ElementId, PathBuf>,
    },
    CroppedTables {
        cropped_tables: BTreeMap<ElementId, PathBuf>,
    },
    PageText {
        page_text: BTreeMap<PageNumber, String>,
        documents: Vec<RetrievalDocument>,
    },
    Translated {
        translated_text: BTreeMap<PageNumber, String>,
    },
    TextSummary {
        page_text_summary: BTreeMap<PageNumber, String>,
    },
    ImageBatches {
        image_summary_batches: Vec<BatchItem>,
    },
    TableBatches {
        table_summary_batches: Vec<BatchItem>,
    },
    ImageSummaries {
        image_summaries: BTreeMap<ElementId, String>,
    },
    TableSummaries {
        table_summaries: BTreeMap<ElementId, String>,
    },
}

impl StateUpdate {
    /// State keys this update writes.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            StateUpdate::Chunks { .. } => &["sub_document_paths", "page_geometry"],
            StateUpdate::Analyzed { .. } => &["analyzed_chunk_paths"],
            StateUpdate::RawElements { .. } => &["raw_page_elements"],
            StateUpdate::Classified { .. } => &["page_elements"],
            StateUpdate::PageNumbers { .. } => &["page_numbers"],
            StateUpdate::CroppedFigures { .. } => &["cropped_figures"],
            StateUpdate::CroppedTables { .. } => &["cropped_tables"],
            StateUpdate::PageText { .. } => &["page_text", "documents"],
            StateUpdate::Translated { .. } => &["translated_text"],
            StateUpdate::TextSummary { .. } => &["page_text_summary"],
            StateUpdate::ImageBatches { .. } => &["image_summary_batches"],
            StateUpdate::TableBatches { .. } => &["table_summary_batches"],
            StateUpdate::ImageSummaries { .. } => &["image_summaries"],
            StateUpdate::TableSummaries { .. } => &["table_summaries"],
        }
    }
}

/// Read a produced field inside a stage, failing if its producer has not run.
macro_rules! need {
    ($state:expr, $field:ident) => {
        $state
            .$field()
            .ok_or($crate::error::PipelineError::MissingField {
                field: stringify!($field),
            })?
    };
}
pub(crate) use need;

fn fill<T>(slot: &mut Option<T>, value: T) {
    debug_assert!(slot.is_none());
    *slot = Some(value);
}

impl PipelineState {
    /// Create the entry state for a run.
    pub fn new(source: SourceDocument, config: &PipelineConfig) -> Self {
        Self {
            source_path: source.paths,
            source_kind: source.kind,
            batch_size: config.batch_size,
            target_language: config.target_language.clone(),
            translate_enabled: config.translate_enabled,
            sub_document_paths: None,
            page_geometry: None,
            analyzed_chunk_paths: None,
            raw_page_elements: None,
            page_elements: None,
            page_numbers: None,
            cropped_figures: None,
            cropped_tables: None,
            page_text: None,
            documents: None,
            translated_text: None,
            page_text_summary: None,
            image_summary_batches: None,
            table_summary_batches: None,
            image_summaries: None,
            table_summaries: None,
        }
    }

    /// Whether a named key has been produced. Entry keys are always present.
    pub fn has_field(&self, field: &str) -> bool {
        match field {
            "source_path" | "source_kind" | "batch_size" | "target_language"
            | "translate_enabled" => true,
            "sub_document_paths" => self.sub_document_paths.is_some(),
            "page_geometry" => self.page_geometry.is_some(),
            "analyzed_chunk_paths" => self.analyzed_chunk_paths.is_some(),
            "raw_page_elements" => self.raw_page_elements.is_some(),
            "page_elements" => self.page_elements.is_some(),
            "page_numbers" => self.page_numbers.is_some(),
            "cropped_figures" => self.cropped_figures.is_some(),
            "cropped_tables" => self.cropped_tables.is_some(),
            "page_text" => self.page_text.is_some(),
            "documents" => self.documents.is_some(),
            "translated_text" => self.translated_text.is_some(),
            "page_text_summary" => self.page_text_summary.is_some(),
            "image_summary_batches" => self.image_summary_batches.is_some(),
            "table_summary_batches" => self.table_summary_batches.is_some(),
            "image_summaries" => self.image_summaries.is_some(),
            "table_summaries" => self.table_summaries.is_some(),
            _ => false,
        }
    }

    /// Merge a stage's partial update into the state.
    ///
    /// Fails with [`PipelineError::FieldAlreadySet`] if any key of the update
    /// was already produced; in that case nothing is written.
    pub fn merge(&mut self, update: StateUpdate) -> Result<(), PipelineError> {
        if let Some(field) = update.fields().iter().copied().find(|f| self.has_field(f)) {
            return Err(PipelineError::FieldAlreadySet { field });
        }

        match update {
            StateUpdate::Chunks {
                sub_document_paths,
                page_geometry,
            } => {
                fill(&mut self.sub_document_paths, sub_document_paths);
                fill(&mut self.page_geometry, page_geometry);
            }
            StateUpdate::Analyzed { analyzed_chunk_paths } => {
                fill(&mut self.analyzed_chunk_paths, analyzed_chunk_paths);
            }
            StateUpdate::RawElements { raw_page_elements } => {
                fill(&mut self.raw_page_elements, raw_page_elements);
            }
            StateUpdate::Classified { page_elements } => {
                fill(&mut self.page_elements, page_elements);
            }
            StateUpdate::PageNumbers { page_numbers } => {
                fill(&mut self.page_numbers, page_numbers);
            }
            StateUpdate::CroppedFigures { cropped_figures } => {
                fill(&mut self.cropped_figures, cropped_figures);
            }
            StateUpdate::CroppedTables { cropped_tables } => {
                fill(&mut self.cropped_tables, cropped_tables);
            }
            StateUpdate::PageText {
                page_text,
                documents,
            } => {
                fill(&mut self.page_text, page_text);
                fill(&mut self.documents, documents);
            }
            StateUpdate::Translated { translated_text } => {
                fill(&mut self.translated_text, translated_text);
            }
            StateUpdate::TextSummary { page_text_summary } => {
                fill(&mut self.page_text_summary, page_text_summary);
            }
            StateUpdate::ImageBatches {
                image_summary_batches,
            } => {
                fill(&mut self.image_summary_batches, image_summary_batches);
            }
            StateUpdate::TableBatches {
                table_summary_batches,
            } => {
                fill(&mut self.table_summary_batches, table_summary_batches);
            }
            StateUpdate::ImageSummaries { image_summaries } => {
                fill(&mut self.image_summaries, image_summaries);
            }
            StateUpdate::TableSummaries { table_summaries } => {
                fill(&mut self.table_summaries, table_summaries);
            }
        }
        Ok(())
    }

    // ── Entry fields ──────────────────────────────────────────────────────

    pub fn source_path(&self) -> &[PathBuf] {
        &self.source_path
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn translate_enabled(&self) -> bool {
        self.translate_enabled
    }

    /// The source as a [`SourceDocument`] view.
    pub fn source(&self) -> SourceDocument {
        SourceDocument {
            kind: self.source_kind,
            paths: self.source_path.clone(),
        }
    }

    /// Scratch folder holding chunks, analysis results and crops.
    pub fn scratch_dir(&self) -> PathBuf {
        self.source().scratch_dir()
    }

    /// File stem of the source document.
    pub fn source_stem(&self) -> String {
        self.source().stem()
    }

    /// Text that feeds the page summaries: translated if translation ran.
    pub fn summary_input(&self) -> Option<&BTreeMap<PageNumber, String>> {
        if self.translate_enabled {
            self.translated_text.as_ref()
        } else {
            self.page_text.as_ref()
        }
    }
}

macro_rules! produced_accessors {
    ($($field:ident : $ty:ty),* $(,)?) => {
        impl PipelineState {
            $(
                #[doc = concat!("`", stringify!($field), "`, once its producing stage has run.")]
                pub fn $field(&self) -> Option<&$ty> {
                    self.$field.as_ref()
                }
            )*
        }
    };
}

produced_accessors! {
    sub_document_paths: Vec<PathBuf>,
    page_geometry: BTreeMap<PageNumber, PageGeometry>,
    analyzed_chunk_paths: Vec<PathBuf>,
    raw_page_elements: BTreeMap<PageNumber, Vec<LayoutElement>>,
    page_elements: BTreeMap<PageNumber, PageElements>,
    page_numbers: Vec<PageNumber>,
    cropped_figures: BTreeMap<ElementId, PathBuf>,
    cropped_tables: BTreeMap<ElementId, PathBuf>,
    page_text: BTreeMap<PageNumber, String>,
    documents: Vec<RetrievalDocument>,
    translated_text: BTreeMap<PageNumber, String>,
    page_text_summary: BTreeMap<PageNumber, String>,
    image_summary_batches: Vec<BatchItem>,
    table_summary_batches: Vec<BatchItem>,
    image_summaries: BTreeMap<ElementId, String>,
    table_summaries: BTreeMap<ElementId, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PipelineState {
        let source = SourceDocument {
            kind: SourceKind::ImageSet,
            paths: vec![PathBuf::from("/tmp/scan/page_a.png")],
        };
        PipelineState::new(source, &PipelineConfig::default())
    }

    #[test]
    fn category_from_tag() {
        assert_eq!(ElementCategory::from_tag("figure"), ElementCategory::Figure);
        assert_eq!(ElementCategory::from_tag("table"), ElementCategory::Table);
        assert_eq!(ElementCategory::from_tag("index"), ElementCategory::Index);
        assert_eq!(ElementCategory::from_tag("paragraph"), ElementCategory::Text);
        assert_eq!(ElementCategory::from_tag("mystery"), ElementCategory::Text);
    }

    #[test]
    fn markdown_requires_shape() {
        let mut el = LayoutElement {
            id: 0,
            page: 0,
            category: "paragraph".into(),
            coordinates: vec![],
            content: Some(serde_json::json!({ "markdown": "hello" })),
        };
        assert_eq!(el.markdown(), Some("hello"));
        el.content = Some(serde_json::json!({ "html": "<p>hello</p>" }));
        assert_eq!(el.markdown(), None);
        el.content = None;
        assert_eq!(el.markdown(), None);
    }

    #[test]
    fn merge_fills_fields() {
        let mut s = state();
        assert!(!s.has_field("page_numbers"));
        s.merge(StateUpdate::PageNumbers {
            page_numbers: vec![0, 1],
        })
        .unwrap();
        assert!(s.has_field("page_numbers"));
        assert_eq!(s.page_numbers(), Some(&vec![0, 1]));
    }

    #[test]
    fn merge_refuses_overwrite() {
        let mut s = state();
        s.merge(StateUpdate::PageNumbers {
            page_numbers: vec![0],
        })
        .unwrap();
        let err = s
            .merge(StateUpdate::PageNumbers {
                page_numbers: vec![0, 1],
            })
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::FieldAlreadySet {
                field: "page_numbers"
            }
        ));
        assert_eq!(s.page_numbers(), Some(&vec![0]));
    }

    #[test]
    fn scratch_dir_is_sibling_named_after_stem() {
        let s = state();
        assert_eq!(s.scratch_dir(), PathBuf::from("/tmp/scan/page_a"));
        assert_eq!(s.source_stem(), "page_a");
    }

    #[test]
    fn summary_input_follows_translate_flag() {
        let mut s = state();
        let mut text = BTreeMap::new();
        text.insert(0, "original".to_string());
        s.merge(StateUpdate::PageText {
            page_text: text,
            documents: vec![],
        })
        .unwrap();
        assert_eq!(s.summary_input().unwrap()[&0], "original");
    }

    #[test]
    fn serialises_with_contract_keys() {
        let s = state();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["source_kind"], "image_set");
        assert!(json.get("page_text_summary").is_some());
        assert!(json["page_text_summary"].is_null());
    }
}
