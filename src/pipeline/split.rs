//! Entry stages: `split_pdf` and `merge_images`.
//!
//! Both produce the chunk list the analysis service works on and the pixel
//! geometry of every page. A PDF is cut into contiguous page-range chunks
//! whose file names carry their inclusive start/end pages; an image set is
//! already one page per file, so each image is its own chunk.

use super::render::{bind_pdfium, open_pdf, oriented_dimensions, page_pixels};
use super::StageContext;
use crate::error::PipelineError;
use crate::state::{PageGeometry, PageNumber, PipelineState, StateUpdate};
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Inclusive `(start, end)` page ranges of at most `batch_size` pages
/// covering `0..num_pages` in order.
pub fn plan_chunks(num_pages: usize, batch_size: usize) -> Vec<(PageNumber, PageNumber)> {
    let batch_size = batch_size.max(1);
    (0..num_pages)
        .step_by(batch_size)
        .map(|start| (start, (start + batch_size).min(num_pages) - 1))
        .collect()
}

/// File name of a chunk: `{stem}_{start:04}_{end:04}.pdf`.
pub fn chunk_file_name(stem: &str, start: PageNumber, end: PageNumber) -> String {
    format!("{stem}_{start:04}_{end:04}.pdf")
}

static RE_PAGE_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d+)_(\d+)$").unwrap());

/// Recover the inclusive page range encoded in a chunk (or its analysis
/// result) file name. Works on any extension since only the stem is read.
pub fn parse_page_range(path: &Path) -> Option<(PageNumber, PageNumber)> {
    let stem = path.file_stem()?.to_str()?;
    let caps = RE_PAGE_RANGE.captures(stem)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// `split_pdf`: cut the source PDF into chunks and record page geometry.
pub async fn split_pdf(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let source = state.source();
    let pdf_path = source.primary_path().to_path_buf();
    let scratch = source.scratch_dir();
    let stem = source.stem();
    let batch_size = state.batch_size();
    let dpi = ctx.config.dpi;
    let lib_path = ctx.config.resolved_pdfium_path();

    let (sub_document_paths, page_geometry) = tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(lib_path.as_deref())?;
        split_pdf_blocking(&pdfium, &pdf_path, &scratch, &stem, batch_size, dpi)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Split task panicked: {e}")))??;

    Ok(StateUpdate::Chunks {
        sub_document_paths,
        page_geometry,
    })
}

/// Blocking implementation of PDF splitting.
fn split_pdf_blocking(
    pdfium: &Pdfium,
    pdf_path: &Path,
    scratch: &Path,
    stem: &str,
    batch_size: usize,
    dpi: u32,
) -> Result<(Vec<PathBuf>, BTreeMap<PageNumber, PageGeometry>), PipelineError> {
    let document = open_pdf(pdfium, pdf_path)?;
    let num_pages = document.pages().len() as usize;
    info!("Total page count: {}", num_pages);

    let page_geometry: BTreeMap<PageNumber, PageGeometry> = document
        .pages()
        .iter()
        .enumerate()
        .map(|(idx, page)| (idx, page_pixels(&page, dpi)))
        .collect();

    std::fs::create_dir_all(scratch).map_err(|e| PipelineError::io(scratch, e))?;

    let corrupt = |detail: String| PipelineError::CorruptPdf {
        path: pdf_path.to_path_buf(),
        detail,
    };

    let mut chunks = Vec::new();
    for (start, end) in plan_chunks(num_pages, batch_size) {
        let output = scratch.join(chunk_file_name(stem, start, end));

        let mut chunk = pdfium
            .create_new_pdf()
            .map_err(|e| corrupt(format!("{e:?}")))?;
        chunk
            .pages_mut()
            .copy_page_range_from_document(&document, start as u16..=end as u16, 0)
            .map_err(|e| corrupt(format!("pages {start}-{end}: {e:?}")))?;
        chunk
            .save_to_file(&output)
            .map_err(|e| corrupt(format!("saving {}: {e:?}", output.display())))?;

        debug!("Split PDF created: {}", output.display());
        chunks.push(output);
    }

    Ok((chunks, page_geometry))
}

/// `merge_images`: every image is a one-page chunk; its position in the
/// input list is its global page number.
pub async fn merge_images(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let paths = state.source_path().to_vec();

    let page_geometry = paths
        .iter()
        .enumerate()
        .map(|(page, path)| oriented_dimensions(path, page).map(|g| (page, g)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    debug!("Merged {} image pages", paths.len());
    Ok(StateUpdate::Chunks {
        sub_document_paths: paths,
        page_geometry,
    })
}
