//! End-to-end tests for edgequake-docai.
//!
//! These need a pdfium library and, for the live test, real service keys.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! The live test also needs `UPSTAGE_API_KEY`, an LLM provider key and a PDF
//! at `test_cases/sample.pdf`.

use async_trait::async_trait;
use edgequake_docai::{
    create_archive, process_document, write_markdown_reports, AnalysisResult, BatchItem,
    DocumentAnalyzer, DocumentInput, ModelService, Pipeline, PipelineConfig, PipelineError,
    TextRequest, VisualKind,
};
use edgequake_docai::pipeline::render::bind_pdfium;
use edgequake_docai::pipeline::split::parse_page_range;
use pdfium_render::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

/// Write a blank A4 PDF with `pages` pages.
fn blank_pdf(path: &Path, pages: usize) {
    let pdfium = bind_pdfium(std::env::var("PDFIUM_LIB_PATH").ok().as_deref().map(Path::new))
        .expect("pdfium should bind");
    let mut document = pdfium.create_new_pdf().unwrap();
    for _ in 0..pages {
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
    }
    document.save_to_file(path).unwrap();
}

/// One figure per page of each chunk, on the page's top-left quarter.
struct QuarterFigures;

#[async_trait]
impl DocumentAnalyzer for QuarterFigures {
    async fn analyze(&self, chunk: &Path) -> Result<AnalysisResult, PipelineError> {
        let (start, end) = parse_page_range(chunk).expect("chunk name carries its range");
        let elements: Vec<_> = (1..=end - start + 1)
            .map(|local| {
                json!({
                    "category": "figure",
                    "page": local.to_string(),
                    "coordinates": [
                        { "x": 0.0, "y": 0.0 }, { "x": 0.5, "y": 0.0 },
                        { "x": 0.5, "y": 0.5 }, { "x": 0.0, "y": 0.5 }
                    ]
                })
            })
            .collect();
        Ok(serde_json::from_value(json!({ "elements": elements })).unwrap())
    }
}

struct Echo;

#[async_trait]
impl ModelService for Echo {
    async fn translate(&self, r: &[TextRequest]) -> Result<Vec<String>, PipelineError> {
        Ok(r.iter().map(|r| r.context.clone()).collect())
    }
    async fn summarize_text(&self, r: &[TextRequest]) -> Result<Vec<String>, PipelineError> {
        Ok(r.iter().map(|_| "summary".to_string()).collect())
    }
    async fn summarize_visuals(
        &self,
        _: VisualKind,
        items: &[BatchItem],
    ) -> Result<Vec<String>, PipelineError> {
        Ok(items.iter().map(|i| format!("figure {}", i.id)).collect())
    }
}

// ── PDF path with fake services (pdfium only) ───────────────────────────────

#[tokio::test]
async fn pdf_is_split_analysed_and_cropped() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let pdf = dir.path().join("memo.pdf");
    blank_pdf(&pdf, 5);

    let config = PipelineConfig::builder()
        .batch_size(2)
        .dpi(72)
        .build()
        .unwrap();
    let pipeline = Pipeline::new(Arc::new(QuarterFigures), Arc::new(Echo));
    let output = pipeline
        .process(&DocumentInput::pdf(&pdf), &config)
        .await
        .expect("run should succeed");
    let state = &output.state;

    let names: Vec<String> = state
        .sub_document_paths()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["memo_0000_0001.pdf", "memo_0002_0003.pdf", "memo_0004_0004.pdf"]
    );

    assert_eq!(state.page_numbers().unwrap(), &vec![0, 1, 2, 3, 4]);
    let geometry = &state.page_geometry().unwrap()[&0];
    assert_eq!((geometry.width, geometry.height), (595, 842));

    let figures = state.cropped_figures().unwrap();
    assert_eq!(figures.len(), 5);
    for (id, path) in figures {
        let crop = image::open(path).unwrap();
        // pdfium may round the rendered size either way by one pixel
        assert!(
            (297..=298).contains(&crop.width()) && (420..=421).contains(&crop.height()),
            "crop {id} should be a quarter page, got {}x{}",
            crop.width(),
            crop.height()
        );
    }
    assert_eq!(state.image_summaries().unwrap().len(), 5);

    let reports = write_markdown_reports(state).unwrap();
    assert_eq!(reports.len(), 3);
    let archive = create_archive(&state.scratch_dir(), &state.source_stem()).unwrap();
    println!("archive: {}", archive.display());
}

#[tokio::test]
async fn garbage_pdf_is_rejected_up_front() {
    e2e_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let fake = dir.path().join("fake.pdf");
    std::fs::write(&fake, b"GIF89a not a pdf").unwrap();

    let pipeline = Pipeline::new(Arc::new(QuarterFigures), Arc::new(Echo));
    let err = pipeline
        .process(&DocumentInput::pdf(&fake), &PipelineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotAPdf { .. }));
}

// ── Live services ────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_run_summarises_every_page() {
    e2e_skip_unless_enabled!();
    let pdf = test_cases_dir().join("sample.pdf");
    if !pdf.exists() || std::env::var("UPSTAGE_API_KEY").is_err() {
        println!("SKIP: needs test_cases/sample.pdf and UPSTAGE_API_KEY");
        return;
    }

    let config = PipelineConfig::builder()
        .target_language("English")
        .translate(true)
        .build()
        .unwrap();
    let output = process_document(&DocumentInput::pdf(&pdf), &config)
        .await
        .expect("live run should succeed");
    let state = &output.state;

    let pages = state.page_numbers().unwrap();
    let summaries = state.page_text_summary().unwrap();
    assert_eq!(summaries.keys().copied().collect::<Vec<_>>(), *pages);
    assert!(summaries.values().all(|s| !s.trim().is_empty()));

    for path in write_markdown_reports(state).unwrap() {
        println!("wrote {}", path.display());
    }
    println!(
        "{} pages, {} stages, {}ms",
        pages.len(),
        output.stats.stages.len(),
        output.stats.total_duration_ms
    );
}
