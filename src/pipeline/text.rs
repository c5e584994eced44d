//! `extract_page_text`: one markdown string per page, plus retrieval documents.
//!
//! Text and table elements contribute their `content.markdown` in the order
//! they appear in the page's element list; blocks are separated by a blank
//! line. An element without markdown is logged and left out. A page with no
//! usable element still gets an entry (an empty string), so downstream
//! batches cover every page.

use super::StageContext;
use crate::error::{ElementIssue, PipelineError};
use crate::state::{
    need, DocumentMetadata, ElementCategory, PageElements, PageNumber, PipelineState,
    RetrievalDocument, StateUpdate,
};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Join the markdown of a page's text and table elements in encounter order.
///
/// Tables are not moved after the text: a table listed between two
/// paragraphs stays between them. Blocks are joined with a blank line rather
/// than concatenated, so a table never runs into the paragraph before it.
pub fn page_markdown(page: &PageElements) -> String {
    let mut blocks: Vec<&str> = Vec::new();
    for element in &page.elements {
        if !matches!(
            element.kind(),
            ElementCategory::Text | ElementCategory::Table
        ) {
            continue;
        }
        match element.markdown() {
            Some(md) => blocks.push(md),
            None => {
                let issue = ElementIssue::MissingMarkdown {
                    id: element.id,
                    page: element.page,
                };
                warn!("{}", issue);
            }
        }
    }
    blocks.join("\n\n")
}

pub async fn extract_page_text(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let page_numbers = need!(state, page_numbers);
    let page_elements = need!(state, page_elements);
    let source = state.source_stem();

    let page_text: BTreeMap<PageNumber, String> = page_numbers
        .iter()
        .map(|&page| {
            let text = page_elements.get(&page).map(page_markdown).unwrap_or_default();
            (page, text)
        })
        .collect();

    let documents = page_text
        .iter()
        .map(|(&page, text)| RetrievalDocument {
            page_content: text.clone(),
            metadata: DocumentMetadata {
                page,
                source: source.clone(),
            },
        })
        .collect();

    info!("Extracted text for {} pages", page_text.len());
    Ok(StateUpdate::PageText {
        page_text,
        documents,
    })
}
