//! The executor: walks the stage graph and merges each stage's update.
//!
//! ## Run loop
//!
//! ```text
//! state = entry(source, config)
//! stage = graph.entry()
//! loop:
//!     update = stage(&state, ctx)     ── Err ─▶ on_run_failed, return Err
//!     state.merge(update)             ── Err ─▶ on_run_failed, return Err
//!     on_stage_complete(i / N)
//!     stage = graph.successor(stage)  ── None ─▶ on_run_complete, return state
//! ```
//!
//! Stages run strictly one after another. A failure ends the run at once:
//! no later stage executes and no partial state is returned.
//!
//! ## Why hold the services in `Arc`s?
//!
//! A [`Pipeline`] is built once and can serve many runs, including runs on
//! spawned tasks (see [`crate::stream`]). Stages only ever see plain
//! references through [`StageContext`].

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::graph::{Stage, StageGraph};
use crate::pipeline::input::{resolve_input, DocumentInput};
use crate::pipeline::{crop, elements, layout, split, summarize, text, StageContext};
use crate::progress::StageProgress;
use crate::services::{
    resolve_provider, DocumentAnalyzer, LlmModelService, ModelService, UpstageAnalyzer,
};
use crate::state::{PipelineState, SourceDocument, StateUpdate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub duration_ms: u64,
}

/// Timing of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Stages in execution order.
    pub stages: Vec<StageReport>,
    pub total_duration_ms: u64,
}

impl RunStats {
    /// Stages that ran, in order.
    pub fn executed(&self) -> Vec<Stage> {
        self.stages.iter().map(|r| r.stage).collect()
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Final accumulated state.
    pub state: PipelineState,
    pub stats: RunStats,
}

/// The document pipeline with its two external services.
#[derive(Clone)]
pub struct Pipeline {
    analyzer: Arc<dyn DocumentAnalyzer>,
    model: Arc<dyn ModelService>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("analyzer", &"<dyn DocumentAnalyzer>")
            .field("model", &"<dyn ModelService>")
            .finish()
    }
}

impl Pipeline {
    /// Build a pipeline over caller-supplied services.
    pub fn new(analyzer: Arc<dyn DocumentAnalyzer>, model: Arc<dyn ModelService>) -> Self {
        Self { analyzer, model }
    }

    /// Build a pipeline over the Upstage analyzer and an LLM provider, both
    /// resolved from `config` and the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let analyzer = UpstageAnalyzer::from_config(config)?;
        let provider = resolve_provider(config)?;
        let model = LlmModelService::new(provider, config);
        Ok(Self::new(Arc::new(analyzer), Arc::new(model)))
    }

    /// Validate `input`, then run it.
    pub async fn process(
        &self,
        input: &DocumentInput,
        config: &PipelineConfig,
    ) -> Result<PipelineOutput, PipelineError> {
        let source = resolve_input(input)?;
        self.run(source, config).await
    }

    /// Run the full stage graph over an already validated source.
    pub async fn run(
        &self,
        source: SourceDocument,
        config: &PipelineConfig,
    ) -> Result<PipelineOutput, PipelineError> {
        let run_start = Instant::now();
        let graph = StageGraph::for_run(source.kind, config.translate_enabled);
        let total = graph.len();
        let callback = config.progress_callback.as_ref();
        info!(
            "Starting run over {} ({} stages)",
            source.primary_path().display(),
            total
        );

        let ctx = StageContext {
            config,
            analyzer: self.analyzer.as_ref(),
            model: self.model.as_ref(),
        };
        let mut state = PipelineState::new(source, config);
        let mut stats = RunStats::default();

        if let Some(cb) = callback {
            cb.on_run_start(total);
        }

        let mut next = Some(graph.entry());
        while let Some(stage) = next {
            let index = stats.stages.len();
            if let Some(cb) = callback {
                cb.on_stage_start(stage, index, total);
            }
            info!("[{}/{}] {}", index + 1, total, stage.message());

            let stage_start = Instant::now();
            let outcome = match run_stage(stage, &state, &ctx).await {
                Ok(update) => state.merge(update),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                error!("Stage {} failed: {}", stage, e);
                if let Some(cb) = callback {
                    cb.on_run_failed(stage, &e.to_string());
                }
                return Err(e);
            }

            let duration_ms = stage_start.elapsed().as_millis() as u64;
            debug!("Stage {} finished in {}ms", stage, duration_ms);
            stats.stages.push(StageReport { stage, duration_ms });

            if let Some(cb) = callback {
                cb.on_stage_complete(StageProgress {
                    stage,
                    completed: index + 1,
                    total,
                });
            }
            next = graph.successor(stage);
        }

        stats.total_duration_ms = run_start.elapsed().as_millis() as u64;
        if let Some(cb) = callback {
            cb.on_run_complete(total);
        }
        info!(
            "Run complete: {} stages in {}ms",
            stats.stages.len(),
            stats.total_duration_ms
        );

        Ok(PipelineOutput { state, stats })
    }
}

/// Dispatch one stage.
pub async fn run_stage(
    stage: Stage,
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    match stage {
        Stage::SplitPdf => split::split_pdf(state, ctx).await,
        Stage::MergeImages => split::merge_images(state, ctx).await,
        Stage::AnalyzeLayout => layout::analyze_layout(state, ctx).await,
        Stage::ExtractPageElements => elements::extract_page_elements(state, ctx).await,
        Stage::ClassifyPageElements => elements::classify_page_elements(state, ctx).await,
        Stage::ComputePageNumbers => elements::compute_page_numbers(state, ctx).await,
        Stage::CropFigures => crop::crop_figures(state, ctx).await,
        Stage::CropTables => crop::crop_tables(state, ctx).await,
        Stage::ExtractPageText => text::extract_page_text(state, ctx).await,
        Stage::TranslateText => summarize::translate_text(state, ctx).await,
        Stage::CreateTextSummary => summarize::create_text_summary(state, ctx).await,
        Stage::BuildImageBatches => summarize::build_image_batches(state, ctx).await,
        Stage::BuildTableBatches => summarize::build_table_batches(state, ctx).await,
        Stage::SummarizeImages => summarize::summarize_images(state, ctx).await,
        Stage::SummarizeTables => summarize::summarize_tables(state, ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executed_follows_report_order() {
        let stats = RunStats {
            stages: vec![
                StageReport {
                    stage: Stage::MergeImages,
                    duration_ms: 1,
                },
                StageReport {
                    stage: Stage::AnalyzeLayout,
                    duration_ms: 40,
                },
            ],
            total_duration_ms: 41,
        };
        assert_eq!(stats.executed(), vec![Stage::MergeImages, Stage::AnalyzeLayout]);
    }

    #[test]
    fn from_config_without_analysis_key_fails() {
        let config = PipelineConfig::builder()
            .analysis_api_key("")
            .build()
            .unwrap();
        let err = Pipeline::from_config(&config).unwrap_err();
        assert!(matches!(err, PipelineError::AnalyzerNotConfigured { .. }));
    }
}
