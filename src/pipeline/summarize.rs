//! Model-service stages: translation, page summaries, crop batches and crop
//! summaries.
//!
//! ## Re-association
//!
//! Every batch is submitted in a fixed order and the replies come back in
//! that same order. Page replies are zipped onto `page_numbers` (ascending);
//! crop replies are zipped onto their batch items and keyed by element id,
//! so two crops on different pages never share a key. A reply count that
//! differs from the request count fails the stage with
//! [`PipelineError::BatchLengthMismatch`]; nothing is zipped short.

use super::StageContext;
use crate::error::PipelineError;
use crate::services::{TextRequest, VisualKind};
use crate::state::{
    need, BatchItem, ElementCategory, ElementId, PageNumber, PipelineState, StateUpdate,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

// ── Helpers ──────────────────────────────────────────────────────────────

/// Fail unless the service answered every request.
fn check_len(task: &'static str, expected: usize, got: usize) -> Result<(), PipelineError> {
    if expected != got {
        return Err(PipelineError::BatchLengthMismatch {
            task,
            expected,
            got,
        });
    }
    Ok(())
}

/// One request per page, ascending, each in `language`.
fn page_requests(
    pages: &[PageNumber],
    texts: &BTreeMap<PageNumber, String>,
    language: &str,
) -> Vec<TextRequest> {
    pages
        .iter()
        .map(|page| TextRequest {
            context: texts.get(page).cloned().unwrap_or_default(),
            output_language: language.to_string(),
        })
        .collect()
}

/// Zip ordered replies back onto the pages they were requested for.
pub fn zip_pages(
    task: &'static str,
    pages: &[PageNumber],
    outputs: Vec<String>,
) -> Result<BTreeMap<PageNumber, String>, PipelineError> {
    check_len(task, pages.len(), outputs.len())?;
    Ok(pages.iter().copied().zip(outputs).collect())
}

/// Zip ordered replies back onto the batch items and key them by element id.
pub fn zip_items(
    task: &'static str,
    items: &[BatchItem],
    outputs: Vec<String>,
) -> Result<BTreeMap<ElementId, String>, PipelineError> {
    check_len(task, items.len(), outputs.len())?;
    Ok(items.iter().map(|item| item.id).zip(outputs).collect())
}

fn sorted_pages(pages: &[PageNumber]) -> Vec<PageNumber> {
    let mut pages = pages.to_vec();
    pages.sort_unstable();
    pages.dedup();
    pages
}

// ── Text stages ──────────────────────────────────────────────────────────

pub async fn translate_text(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let pages = sorted_pages(need!(state, page_numbers));
    let page_text = need!(state, page_text);

    let requests = page_requests(&pages, page_text, state.target_language());
    let outputs = ctx.model.translate(&requests).await?;
    let translated_text = zip_pages("translate_text", &pages, outputs)?;

    info!(
        "Translated {} pages into {}",
        translated_text.len(),
        state.target_language()
    );
    Ok(StateUpdate::Translated { translated_text })
}

pub async fn create_text_summary(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let pages = sorted_pages(need!(state, page_numbers));
    let input = state.summary_input().ok_or(PipelineError::MissingField {
        field: if state.translate_enabled() {
            "translated_text"
        } else {
            "page_text"
        },
    })?;

    let requests = page_requests(&pages, input, state.target_language());
    let outputs = ctx.model.summarize_text(&requests).await?;
    let page_text_summary = zip_pages("create_text_summary", &pages, outputs)?;

    info!("Summarised {} pages", page_text_summary.len());
    Ok(StateUpdate::TextSummary { page_text_summary })
}

// ── Crop batches ─────────────────────────────────────────────────────────

/// Batch items for every cropped element of `category`, page by page.
///
/// Elements whose crop is missing (e.g. empty coordinates) are skipped. A
/// crop whose id no page lists under `category` fails with `UnknownElement`.
fn build_batches(
    state: &PipelineState,
    category: ElementCategory,
    crops: &BTreeMap<ElementId, PathBuf>,
) -> Result<Vec<BatchItem>, PipelineError> {
    let pages = sorted_pages(need!(state, page_numbers));
    let page_elements = need!(state, page_elements);
    let summaries = need!(state, page_text_summary);
    let language = state.target_language();

    let known: BTreeSet<ElementId> = page_elements
        .values()
        .flat_map(|bundle| bundle.of(category).iter().map(|e| e.id))
        .collect();
    if let Some(&id) = crops.keys().find(|id| !known.contains(*id)) {
        return Err(PipelineError::UnknownElement { id });
    }

    let mut items = Vec::new();
    for page in pages {
        let Some(bundle) = page_elements.get(&page) else {
            continue;
        };
        for element in bundle.of(category) {
            let Some(path) = crops.get(&element.id) else {
                warn!(
                    "page:{}, id:{}: no cropped image, not batched",
                    page, element.id
                );
                continue;
            };
            let context = summaries.get(&page).ok_or_else(|| {
                PipelineError::Internal(format!("page {page} has no text summary"))
            })?;
            items.push(BatchItem {
                id: element.id,
                path: path.clone(),
                context: context.clone(),
                page,
                language: language.to_string(),
            });
        }
    }

    debug!("{} {:?} batch items", items.len(), category);
    Ok(items)
}

pub async fn build_image_batches(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let crops = need!(state, cropped_figures);
    let image_summary_batches = build_batches(state, ElementCategory::Figure, crops)?;
    Ok(StateUpdate::ImageBatches {
        image_summary_batches,
    })
}

pub async fn build_table_batches(
    state: &PipelineState,
    _ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let crops = need!(state, cropped_tables);
    let table_summary_batches = build_batches(state, ElementCategory::Table, crops)?;
    Ok(StateUpdate::TableBatches {
        table_summary_batches,
    })
}

// ── Crop summaries ───────────────────────────────────────────────────────

async fn summarize_batch(
    ctx: &StageContext<'_>,
    kind: VisualKind,
    items: &[BatchItem],
) -> Result<BTreeMap<ElementId, String>, PipelineError> {
    if items.is_empty() {
        debug!("{}: empty batch, no request sent", kind.task());
        return Ok(BTreeMap::new());
    }
    let outputs = ctx.model.summarize_visuals(kind, items).await?;
    let summaries = zip_items(kind.task(), items, outputs)?;
    info!("{}: {} summaries", kind.task(), summaries.len());
    Ok(summaries)
}

pub async fn summarize_images(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let items = need!(state, image_summary_batches);
    let image_summaries = summarize_batch(ctx, VisualKind::Figure, items).await?;
    Ok(StateUpdate::ImageSummaries { image_summaries })
}

pub async fn summarize_tables(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let items = need!(state, table_summary_batches);
    let table_summaries = summarize_batch(ctx, VisualKind::Table, items).await?;
    Ok(StateUpdate::TableSummaries { table_summaries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, SourceKind};
    use crate::services::{AnalysisResult, DocumentAnalyzer, ModelService};
    use crate::state::{LayoutElement, PageElements, SourceDocument};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoAnalyzer;

    #[async_trait]
    impl DocumentAnalyzer for NoAnalyzer {
        async fn analyze(&self, chunk: &Path) -> Result<AnalysisResult, PipelineError> {
            Err(PipelineError::AnalysisFailed {
                chunk: chunk.to_path_buf(),
                reason: "not used".into(),
            })
        }
    }

    /// Echoes its input, optionally dropping the last reply.
    #[derive(Default)]
    struct EchoModel {
        drop_last: bool,
        calls: AtomicUsize,
    }

    impl EchoModel {
        fn reply(&self, mut out: Vec<String>) -> Result<Vec<String>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    #[async_trait]
    impl ModelService for EchoModel {
        async fn translate(&self, requests: &[TextRequest]) -> Result<Vec<String>, PipelineError> {
            self.reply(
                requests
                    .iter()
                    .map(|r| format!("[{}] {}", r.output_language, r.context))
                    .collect(),
            )
        }

        async fn summarize_text(
            &self,
            requests: &[TextRequest],
        ) -> Result<Vec<String>, PipelineError> {
            self.reply(requests.iter().map(|r| format!("sum:{}", r.context)).collect())
        }

        async fn summarize_visuals(
            &self,
            kind: VisualKind,
            items: &[BatchItem],
        ) -> Result<Vec<String>, PipelineError> {
            self.reply(
                items
                    .iter()
                    .map(|i| format!("{:?}:{}@{}", kind, i.id, i.page))
                    .collect(),
            )
        }
    }

    fn state(translate: bool) -> PipelineState {
        let config = PipelineConfig::builder()
            .target_language("German")
            .translate(translate)
            .build()
            .unwrap();
        let source = SourceDocument {
            kind: SourceKind::ImageSet,
            paths: vec![PathBuf::from("/tmp/scan/a.png")],
        };
        PipelineState::new(source, &config)
    }

    fn texts(pairs: &[(PageNumber, &str)]) -> BTreeMap<PageNumber, String> {
        pairs.iter().map(|(p, t)| (*p, t.to_string())).collect()
    }

    fn figure(id: ElementId, page: PageNumber) -> LayoutElement {
        LayoutElement {
            id,
            page,
            category: "figure".into(),
            coordinates: vec![],
            content: None,
        }
    }

    fn ctx<'a>(config: &'a PipelineConfig, model: &'a EchoModel) -> StageContext<'a> {
        StageContext {
            config,
            analyzer: &NoAnalyzer,
            model,
        }
    }

    #[test]
    fn zip_pages_keeps_order() {
        let zipped = zip_pages("t", &[1, 2, 3], vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(zipped[&1], "a");
        assert_eq!(zipped[&3], "c");
    }

    #[test]
    fn zip_pages_refuses_short_replies() {
        let err = zip_pages("translate_text", &[1, 2], vec!["a".into()]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BatchLengthMismatch {
                expected: 2,
                got: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn translation_maps_content_to_its_page() {
        let mut st = state(true);
        st.merge(StateUpdate::PageNumbers {
            page_numbers: vec![3, 1, 2],
        })
        .unwrap();
        st.merge(StateUpdate::PageText {
            page_text: texts(&[(3, "drei"), (1, "eins"), (2, "zwei")]),
            documents: vec![],
        })
        .unwrap();

        let model = EchoModel::default();
        let config = PipelineConfig::default();
        let update = translate_text(&st, &ctx(&config, &model))
            .await
            .unwrap();
        let StateUpdate::Translated { translated_text } = update else {
            panic!("wrong update");
        };
        assert_eq!(translated_text[&1], "[German] eins");
        assert_eq!(translated_text[&2], "[German] zwei");
        assert_eq!(translated_text[&3], "[German] drei");
    }

    #[tokio::test]
    async fn summary_covers_every_page() {
        let mut st = state(false);
        st.merge(StateUpdate::PageNumbers {
            page_numbers: (0..5).collect(),
        })
        .unwrap();
        st.merge(StateUpdate::PageText {
            page_text: texts(&[(0, "a"), (1, ""), (2, "c"), (3, "d"), (4, "e")]),
            documents: vec![],
        })
        .unwrap();

        let model = EchoModel::default();
        let config = PipelineConfig::default();
        let update = create_text_summary(&st, &ctx(&config, &model))
            .await
            .unwrap();
        let StateUpdate::TextSummary { page_text_summary } = update else {
            panic!("wrong update");
        };
        assert_eq!(page_text_summary.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(page_text_summary[&1], "sum:");
    }

    #[tokio::test]
    async fn summary_reads_translation_when_enabled() {
        let mut st = state(true);
        st.merge(StateUpdate::PageNumbers { page_numbers: vec![0] }).unwrap();
        st.merge(StateUpdate::PageText {
            page_text: texts(&[(0, "original")]),
            documents: vec![],
        })
        .unwrap();

        let model = EchoModel::default();
        let config = PipelineConfig::default();
        let err = create_text_summary(&st, &ctx(&config, &model))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingField {
                field: "translated_text"
            }
        ));

        st.merge(StateUpdate::Translated {
            translated_text: texts(&[(0, "translated")]),
        })
        .unwrap();
        let update = create_text_summary(&st, &ctx(&config, &model))
            .await
            .unwrap();
        let StateUpdate::TextSummary { page_text_summary } = update else {
            panic!("wrong update");
        };
        assert_eq!(page_text_summary[&0], "sum:translated");
    }

    fn state_with_figures() -> PipelineState {
        // 20 has no crop
        state_with_figure_crops(&[7, 12, 19])
    }

    fn state_with_figure_crops(cropped: &[ElementId]) -> PipelineState {
        let mut st = state(false);
        let mut pages = BTreeMap::new();
        pages.insert(
            0,
            PageElements {
                image_elements: vec![figure(7, 0), figure(12, 0)],
                ..Default::default()
            },
        );
        pages.insert(
            1,
            PageElements {
                image_elements: vec![figure(19, 1), figure(20, 1)],
                ..Default::default()
            },
        );
        st.merge(StateUpdate::Classified {
            page_elements: pages,
        })
        .unwrap();
        st.merge(StateUpdate::PageNumbers {
            page_numbers: vec![0, 1],
        })
        .unwrap();
        st.merge(StateUpdate::TextSummary {
            page_text_summary: texts(&[(0, "first"), (1, "second")]),
        })
        .unwrap();
        let crops = cropped
            .iter()
            .map(|&id| (id, PathBuf::from(format!("/tmp/scan/a/{id}.png"))))
            .collect();
        st.merge(StateUpdate::CroppedFigures {
            cropped_figures: crops,
        })
        .unwrap();
        st
    }

    #[tokio::test]
    async fn image_summaries_are_keyed_by_element() {
        let mut st = state_with_figures();
        let model = EchoModel::default();
        let config = PipelineConfig::default();

        let update = build_image_batches(&st, &ctx(&config, &model))
            .await
            .unwrap();
        let StateUpdate::ImageBatches {
            image_summary_batches,
        } = &update
        else {
            panic!("wrong update");
        };
        assert_eq!(image_summary_batches.len(), 3);
        assert_eq!(image_summary_batches[0].context, "first");
        assert_eq!(image_summary_batches[2].context, "second");
        assert_eq!(image_summary_batches[2].language, "German");
        st.merge(update).unwrap();

        let update = summarize_images(&st, &ctx(&config, &model))
            .await
            .unwrap();
        let StateUpdate::ImageSummaries { image_summaries } = update else {
            panic!("wrong update");
        };
        assert_eq!(image_summaries.keys().copied().collect::<Vec<_>>(), vec![7, 12, 19]);
        assert_eq!(image_summaries[&19], "Figure:19@1");
    }

    #[tokio::test]
    async fn crop_without_element_is_rejected() {
        let st = state_with_figure_crops(&[7, 99]);
        let model = EchoModel::default();
        let config = PipelineConfig::default();
        let err = build_image_batches(&st, &ctx(&config, &model))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownElement { id: 99 }));
    }

    #[tokio::test]
    async fn table_crop_of_a_figure_is_rejected() {
        let mut st = state_with_figures();
        st.merge(StateUpdate::CroppedTables {
            cropped_tables: [(12, PathBuf::from("/tmp/scan/a/12.png"))].into_iter().collect(),
        })
        .unwrap();
        let model = EchoModel::default();
        let config = PipelineConfig::default();
        let err = build_table_batches(&st, &ctx(&config, &model))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownElement { id: 12 }));
    }

    #[tokio::test]
    async fn short_visual_reply_fails() {
        let mut st = state_with_figures();
        let model = EchoModel {
            drop_last: true,
            ..Default::default()
        };
        let config = PipelineConfig::default();
        let update = build_image_batches(&st, &ctx(&config, &model))
            .await
            .unwrap();
        st.merge(update).unwrap();

        let err = summarize_images(&st, &ctx(&config, &model))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BatchLengthMismatch {
                task: "summarize_images",
                expected: 3,
                got: 2
            }
        ));
    }

    #[tokio::test]
    async fn empty_table_batch_skips_the_service() {
        let mut st = state_with_figures();
        st.merge(StateUpdate::TableBatches {
            table_summary_batches: vec![],
        })
        .unwrap();
        let model = EchoModel::default();
        let config = PipelineConfig::default();
        let update = summarize_tables(&st, &ctx(&config, &model))
            .await
            .unwrap();
        let StateUpdate::TableSummaries { table_summaries } = update else {
            panic!("wrong update");
        };
        assert!(table_summaries.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
