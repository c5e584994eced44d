//! Element ingestion: `extract_page_elements`, `classify_page_elements` and
//! `compute_page_numbers`.
//!
//! ## Global page numbers
//!
//! The analysis service numbers pages from 1 within each chunk. A PDF chunk's
//! start page is recovered from its file name, so an element on local page
//! `p` of the chunk starting at `s` lands on global page `s + p - 1`. An image
//! chunk is one page and its position in the input list is the page.
//!
//! ## Element ids
//!
//! Ids come from an [`IdAllocator`] threaded through the ingestion pass and
//! handed back with the elements. They follow encounter order across chunks
//! and are assigned only to elements that survive validation, so the id
//! sequence has no holes. Ids are scoped to one run.

use super::split::parse_page_range;
use super::StageContext;
use crate::config::SourceKind;
use crate::error::{ElementIssue, PipelineError};
use crate::services::AnalysisResult;
use crate::state::{
    need, Coordinate, ElementCategory, ElementId, LayoutElement, PageElements, PageNumber,
    PipelineState, StateUpdate,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

// ── Id allocation ────────────────────────────────────────────────────────

/// Hands out unique, monotonically increasing element ids.
///
/// One allocator serves one run and starts at 0, so ids are unique within
/// that run's state. Ids from two runs, even in the same process, are not
/// comparable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next: ElementId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume allocation after ids `0..next` were already handed out.
    #[cfg(test)]
    pub(crate) fn starting_at(next: ElementId) -> Self {
        Self { next }
    }

    pub fn allocate(&mut self) -> ElementId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids allocated so far (from zero).
    pub fn allocated(&self) -> ElementId {
        self.next
    }
}

// ── Raw element parsing ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPage {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(default)]
    category: String,
    #[serde(default)]
    page: Option<RawPage>,
    #[serde(default)]
    coordinates: Vec<Coordinate>,
    #[serde(default)]
    content: Option<serde_json::Value>,
}

/// Parse a 1-based local page number, as an integer or a numeric string.
fn local_page(raw: Option<&RawPage>) -> Option<PageNumber> {
    let n = match raw? {
        RawPage::Number(n) => *n,
        RawPage::Text(s) => s.trim().parse().ok()?,
    };
    usize::try_from(n).ok().filter(|&n| n >= 1)
}

fn describe(raw: Option<&RawPage>) -> String {
    match raw {
        Some(RawPage::Number(n)) => n.to_string(),
        Some(RawPage::Text(s)) => s.clone(),
        None => "<missing>".to_string(),
    }
}

/// Where a chunk sits in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOrigin {
    /// PDF chunk covering pages `start..=end`.
    PageRange { start: PageNumber, end: PageNumber },
    /// Image chunk; the position is the page.
    Image { position: PageNumber },
}

/// Resolve every element of one chunk to its global page and give it an id.
///
/// Elements that cannot be parsed, or whose page falls outside the chunk,
/// are logged and skipped before an id is drawn.
pub fn ingest_chunk(
    chunk_name: &str,
    origin: ChunkOrigin,
    result: &AnalysisResult,
    mut ids: IdAllocator,
    pages: &mut BTreeMap<PageNumber, Vec<LayoutElement>>,
) -> IdAllocator {
    for value in &result.elements {
        let raw: RawElement = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed element in '{}': {}", chunk_name, e);
                continue;
            }
        };

        let page = match origin {
            ChunkOrigin::Image { position } => position,
            ChunkOrigin::PageRange { start, end } => {
                match local_page(raw.page.as_ref()).map(|p| start + p - 1) {
                    Some(global) if global <= end => global,
                    _ => {
                        let issue = ElementIssue::BadPageNumber {
                            chunk: chunk_name.to_string(),
                            raw: describe(raw.page.as_ref()),
                        };
                        warn!("{}", issue);
                        continue;
                    }
                }
            }
        };

        let element = LayoutElement {
            id: ids.allocate(),
            page,
            category: raw.category,
            coordinates: raw.coordinates,
            content: raw.content,
        };
        pages.entry(page).or_default().push(element);
    }
    ids
}

fn read_result(path: &Path) -> Result<AnalysisResult, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::AnalysisFailed {
        chunk: path.to_path_buf(),
        reason: format!("stored analysis result is not valid JSON: {e}"),
    })
}

// ── Stages ───────────────────────────────────────────────────────────────

/// `extract_page_elements`: flat per-page element lists with global pages
/// and fresh ids.
///
/// Every page of the source gets an entry, even one with no elements, so
/// later per-page outputs cover the whole document.
pub async fn extract_page_elements(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let analyzed = need!(state, analyzed_chunk_paths);
    let geometry = need!(state, page_geometry);

    let mut raw_page_elements: BTreeMap<PageNumber, Vec<LayoutElement>> =
        geometry.keys().map(|&page| (page, Vec::new())).collect();
    let mut ids = IdAllocator::new();

    for (position, path) in analyzed.iter().enumerate() {
        let origin = match state.source_kind() {
            SourceKind::ImageSet => ChunkOrigin::Image { position },
            SourceKind::Pdf => {
                let (start, end) = parse_page_range(path).ok_or_else(|| {
                    PipelineError::Internal(format!(
                        "analysis result '{}' carries no page range",
                        path.display()
                    ))
                })?;
                ChunkOrigin::PageRange { start, end }
            }
        };

        let result = read_result(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ids = ingest_chunk(&name, origin, &result, ids, &mut raw_page_elements);
        debug!("Ingested {} ({:?})", name, origin);
    }

    info!(
        "Extracted {} elements over {} pages",
        ids.allocated(),
        raw_page_elements.len()
    );
    Ok(StateUpdate::RawElements { raw_page_elements })
}

/// Partition one page's elements by category, keeping the full list.
pub fn classify_page(elements: &[LayoutElement]) -> PageElements {
    let mut bundle = PageElements {
        elements: elements.to_vec(),
        ..Default::default()
    };
    for el in elements {
        let bucket = match el.kind() {
            ElementCategory::Figure => &mut bundle.image_elements,
            ElementCategory::Table => &mut bundle.table_elements,
            ElementCategory::Chart => &mut bundle.chart_elements,
            ElementCategory::Equation => &mut bundle.equation_elements,
            ElementCategory::Index => &mut bundle.index_elements,
            ElementCategory::Text => &mut bundle.text_elements,
        };
        bucket.push(el.clone());
    }
    bundle
}

/// `classify_page_elements`.
pub async fn classify_page_elements(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let raw = need!(state, raw_page_elements);
    let page_elements = raw
        .iter()
        .map(|(&page, elements)| (page, classify_page(elements)))
        .collect();
    Ok(StateUpdate::Classified { page_elements })
}

/// `compute_page_numbers`: the sorted keys of `page_elements`.
pub async fn compute_page_numbers(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let page_elements = need!(state, page_elements);
    Ok(StateUpdate::PageNumbers {
        page_numbers: page_elements.keys().copied().collect(),
    })
}
