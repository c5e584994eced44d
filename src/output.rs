//! Output assembly: markdown reports and the scratch-folder archive.
//!
//! These run after the graph, on the final [`PipelineState`]. Nothing here
//! feeds back into the pipeline.
//!
//! ## Layout
//!
//! All files land in the scratch folder next to the crops:
//!
//! ```text
//! report/
//! ├── report_0000_0009.pdf      chunks (PDF input only)
//! ├── report_0000_0009.json     analysis results
//! ├── 7.png, 12.png, ...        crops, by element id
//! ├── report_translate.md       only when translation ran
//! ├── report_text_summary.md
//! ├── report_image_summary.md
//! ├── report_table_summary.md
//! └── report_markdown.zip       everything above
//! ```

use crate::config::SourceKind;
use crate::error::PipelineError;
use crate::state::{ElementId, PageNumber, PipelineState};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Placeholder image referenced when a crop is missing on disk.
pub const NO_IMAGE: &str = "no_image.png";

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,5}) ").unwrap());

// ── Atomic writes ────────────────────────────────────────────────────────

/// Write `bytes` to `path` via a sibling temp file and a rename, so readers
/// never see a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let fail = |e| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }

    let ext = path
        .extension()
        .map(|e| format!("{}.tmp", e.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    let tmp_path = path.with_extension(ext);

    std::fs::write(&tmp_path, bytes).map_err(fail)?;
    std::fs::rename(&tmp_path, path).map_err(fail)
}

// ── Markdown ─────────────────────────────────────────────────────────────

/// One `## Page N` section per page (1-based), page headings demoted a level.
pub fn page_markdown(pages: &BTreeMap<PageNumber, String>) -> String {
    pages
        .iter()
        .map(|(page, content)| {
            let body = RE_HEADING.replace_all(content, "#${1} ");
            format!("## Page {}\n\n{}", page + 1, body.trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One section per element: its crop, then its summary.
///
/// `scratch` is where crops live; a missing crop is shown as [`NO_IMAGE`].
pub fn element_markdown(scratch: &Path, summaries: &BTreeMap<ElementId, String>) -> String {
    summaries
        .iter()
        .map(|(id, summary)| {
            let file = format!("{id}.png");
            let image = if scratch.join(&file).exists() {
                file
            } else {
                NO_IMAGE.to_string()
            };
            format!("![{id}]({image})\n\n{}", summary.trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn report_path(scratch: &Path, stem: &str, kind: &str) -> PathBuf {
    scratch.join(format!("{stem}_{kind}.md"))
}

/// Write the markdown reports of a finished run into its scratch folder.
///
/// The translation report is written only when translation ran.
pub fn write_markdown_reports(state: &PipelineState) -> Result<Vec<PathBuf>, PipelineError> {
    let scratch = state.scratch_dir();
    let stem = state.source_stem();
    let missing = |field| PipelineError::MissingField { field };

    let mut reports: Vec<(&str, String)> = Vec::with_capacity(4);
    if let Some(translated) = state.translated_text() {
        reports.push(("translate", page_markdown(translated)));
    }
    let summaries = state
        .page_text_summary()
        .ok_or_else(|| missing("page_text_summary"))?;
    reports.push(("text_summary", page_markdown(summaries)));
    let images = state
        .image_summaries()
        .ok_or_else(|| missing("image_summaries"))?;
    reports.push(("image_summary", element_markdown(&scratch, images)));
    let tables = state
        .table_summaries()
        .ok_or_else(|| missing("table_summaries"))?;
    reports.push(("table_summary", element_markdown(&scratch, tables)));

    let mut written = Vec::with_capacity(reports.len());
    for (kind, body) in reports {
        let path = report_path(&scratch, &stem, kind);
        write_atomic(&path, body.as_bytes())?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }

    info!("Wrote {} reports to {}", written.len(), scratch.display());
    Ok(written)
}

// ── Archive ──────────────────────────────────────────────────────────────

/// Files under `dir`, recursively, sorted for a stable archive order.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Zip the scratch folder into `{scratch}/{stem}_markdown.zip`.
///
/// The archive never contains itself. Temporary files from an interrupted
/// write are left out too.
pub fn create_archive(scratch: &Path, stem: &str) -> Result<PathBuf, PipelineError> {
    if !scratch.is_dir() {
        return Err(PipelineError::ScratchFolderMissing {
            path: scratch.to_path_buf(),
        });
    }

    let archive_path = scratch.join(format!("{stem}_markdown.zip"));
    let archive_err = |detail: String| PipelineError::Archive {
        path: archive_path.clone(),
        detail,
    };

    let mut files = Vec::new();
    collect_files(scratch, &mut files).map_err(|e| PipelineError::io(scratch, e))?;

    let tmp_path = archive_path.with_extension("zip.tmp");
    let file = File::create(&tmp_path).map_err(|e| PipelineError::io(&tmp_path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut count = 0usize;
    for path in files {
        if path == archive_path || path == tmp_path || path.extension().is_some_and(|e| e == "tmp")
        {
            continue;
        }
        let name = path
            .strip_prefix(scratch)
            .map_err(|e| archive_err(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = std::fs::read(&path).map_err(|e| PipelineError::io(&path, e))?;
        zip.start_file(name, options)
            .map_err(|e| archive_err(e.to_string()))?;
        zip.write_all(&bytes)
            .map_err(|e| archive_err(e.to_string()))?;
        count += 1;
    }
    zip.finish().map_err(|e| archive_err(e.to_string()))?;

    std::fs::rename(&tmp_path, &archive_path).map_err(|e| PipelineError::OutputWriteFailed {
        path: archive_path.clone(),
        source: e,
    })?;

    info!("Archived {} files into {}", count, archive_path.display());
    Ok(archive_path)
}

// ── Cleanup ──────────────────────────────────────────────────────────────

fn remove_if_present(path: &Path) -> Result<bool, PipelineError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Remove intermediate files: chunk PDFs and analysis JSON.
///
/// Crops and reports stay. Image inputs are never touched, since for an
/// image set the chunks are the caller's own files.
pub fn clean_scratch(state: &PipelineState) -> Result<usize, PipelineError> {
    let mut removed = 0;

    if state.source_kind() == SourceKind::Pdf {
        for chunk in state.sub_document_paths().into_iter().flatten() {
            removed += usize::from(remove_if_present(chunk)?);
        }
    }
    for result in state.analyzed_chunk_paths().into_iter().flatten() {
        removed += usize::from(remove_if_present(result)?);
    }

    debug!("Removed {} intermediate files", removed);
    Ok(removed)
}
