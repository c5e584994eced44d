//! Error types for the edgequake-docai library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`PipelineError`] is **fatal**: the run cannot continue (bad input,
//!   analysis service refused a chunk, model service failed a batch). Any
//!   stage returning it aborts the whole run and no state is handed back.
//!
//! * [`ElementIssue`] is **non-fatal**: one layout element has an unexpected
//!   shape (no markdown content, empty polygon, unparsable page number). The
//!   stage logs it and skips that element; the page and the run continue.

use std::path::PathBuf;
use thiserror::Error;

use crate::state::ElementId;

/// All fatal errors returned by the edgequake-docai library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No input files were supplied.
    #[error("No input files given")]
    NoInput,

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is neither a PDF nor a supported image format.
    #[error("Unsupported file type for '{path}' (expected pdf, png, jpg, jpeg, bmp, gif, tif, tiff or webp)")]
    UnsupportedFileType { path: PathBuf },

    /// More than one PDF, or a PDF mixed with images, was supplied.
    #[error("Only a single PDF can be processed per run (got {count} files)")]
    MultiplePdfInputs { count: usize },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF / raster errors ───────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page could not be rasterised or an image could not be decoded.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── External service errors ───────────────────────────────────────────
    /// The document-analysis service has no credentials.
    #[error("Document analysis service is not configured.\n{hint}")]
    AnalyzerNotConfigured { hint: String },

    /// The document-analysis service rejected or failed a chunk.
    #[error("Layout analysis failed for '{chunk}': {reason}")]
    AnalysisFailed { chunk: PathBuf, reason: String },

    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model service failed a batch request.
    #[error("Model service failed during {task}: {message}")]
    ModelServiceFailed { task: &'static str, message: String },

    /// The model service returned a different number of outputs than inputs.
    #[error("Model service returned {got} outputs for {expected} inputs during {task}")]
    BatchLengthMismatch {
        task: &'static str,
        expected: usize,
        got: usize,
    },

    // ── State errors ──────────────────────────────────────────────────────
    /// A stage ran before the stage producing one of its inputs.
    #[error("State field '{field}' read before it was produced")]
    MissingField { field: &'static str },

    /// A stage tried to overwrite a field another stage already produced.
    #[error("State field '{field}' was already set by an earlier stage")]
    FieldAlreadySet { field: &'static str },

    /// A crop is recorded for an element id no page lists in that category.
    #[error("Cropped image recorded for unknown element {id}")]
    UnknownElement { id: ElementId },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a scratch file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scratch folder to package does not exist.
    #[error("The folder does not exist: '{path}'")]
    ScratchFolderMissing { path: PathBuf },

    /// Writing the zip archive failed.
    #[error("Failed to build archive '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal problem with a single layout element.
///
/// Produced while walking analysis results; the element is skipped and the
/// issue is logged at `warn` level.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElementIssue {
    /// The element has no `content.markdown` string.
    #[error("element {id} on page {page}: missing markdown content")]
    MissingMarkdown { id: ElementId, page: usize },

    /// The element's polygon has no points.
    #[error("element {id} on page {page}: empty coordinate list")]
    EmptyCoordinates { id: ElementId, page: usize },

    /// The element's `page` field is not a positive integer.
    #[error("element in '{chunk}': unparsable page number {raw:?}")]
    BadPageNumber { chunk: String, raw: String },
}
