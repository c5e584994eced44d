//! Streaming driver API: emit stage events as the run advances.
//!
//! ## Why stream?
//!
//! A run over a long PDF spends minutes in the analysis and model services.
//! A `Stream` of [`PipelineEvent`]s lets callers drive progress UIs or log
//! stage timings without implementing a callback, and fits `select!` loops.
//!
//! The run itself executes on a spawned task; events are forwarded through
//! an unbounded channel in the order the executor raises them. The stream
//! always ends with exactly one [`PipelineEvent::Finished`] or
//! [`PipelineEvent::Failed`].

use crate::config::PipelineConfig;
use crate::executor::{Pipeline, PipelineOutput};
use crate::graph::Stage;
use crate::pipeline::input::DocumentInput;
use crate::progress::{PipelineProgressCallback, ProgressCallback, StageProgress};
use serde::Serialize;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::info;

/// One observable step of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        total_stages: usize,
    },
    StageStarted {
        stage: Stage,
        index: usize,
        total: usize,
    },
    StageCompleted(StageProgress),
    Finished(Box<PipelineOutput>),
    /// The run failed. `stage` is `None` when the input was rejected before
    /// any stage ran.
    Failed {
        stage: Option<Stage>,
        error: String,
    },
}

/// A boxed stream of pipeline events.
pub type EventStream = Pin<Box<dyn Stream<Item = PipelineEvent> + Send>>;

/// Forwards executor callbacks into the channel, then to the caller's own
/// callback if one was configured.
struct ChannelCallback {
    tx: UnboundedSender<PipelineEvent>,
    inner: Option<ProgressCallback>,
    failed_stage: Mutex<Option<Stage>>,
}

impl ChannelCallback {
    fn send(&self, event: PipelineEvent) {
        // receiver dropped: the caller stopped listening, the run carries on
        let _ = self.tx.send(event);
    }
}

impl PipelineProgressCallback for ChannelCallback {
    fn on_run_start(&self, total_stages: usize) {
        self.send(PipelineEvent::Started { total_stages });
        if let Some(cb) = &self.inner {
            cb.on_run_start(total_stages);
        }
    }

    fn on_stage_start(&self, stage: Stage, index: usize, total: usize) {
        self.send(PipelineEvent::StageStarted {
            stage,
            index,
            total,
        });
        if let Some(cb) = &self.inner {
            cb.on_stage_start(stage, index, total);
        }
    }

    fn on_stage_complete(&self, progress: StageProgress) {
        self.send(PipelineEvent::StageCompleted(progress));
        if let Some(cb) = &self.inner {
            cb.on_stage_complete(progress);
        }
    }

    fn on_run_complete(&self, total_stages: usize) {
        if let Some(cb) = &self.inner {
            cb.on_run_complete(total_stages);
        }
    }

    fn on_run_failed(&self, stage: Stage, error: &str) {
        if let Ok(mut slot) = self.failed_stage.lock() {
            *slot = Some(stage);
        }
        if let Some(cb) = &self.inner {
            cb.on_run_failed(stage, error);
        }
    }
}

/// Run `input` through `pipeline`, yielding events as stages complete.
///
/// Must be called from within a tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use edgequake_docai::{process_document_stream, DocumentInput, Pipeline, PipelineConfig, PipelineEvent};
/// use std::sync::Arc;
/// use tokio_stream::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let pipeline = Arc::new(Pipeline::from_config(&config)?);
/// let mut events = process_document_stream(pipeline, DocumentInput::pdf("report.pdf"), config);
/// while let Some(event) = events.next().await {
///     if let PipelineEvent::StageCompleted(p) = event {
///         println!("{} ({:.0}%)", p.stage, p.percent());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_document_stream(
    pipeline: Arc<Pipeline>,
    input: DocumentInput,
    config: PipelineConfig,
) -> EventStream {
    let (tx, rx) = unbounded_channel();
    let callback = Arc::new(ChannelCallback {
        tx: tx.clone(),
        inner: config.progress_callback.clone(),
        failed_stage: Mutex::new(None),
    });

    let mut config = config;
    config.progress_callback = Some(callback.clone() as ProgressCallback);

    tokio::spawn(async move {
        let last = match pipeline.process(&input, &config).await {
            Ok(output) => {
                info!("Streaming run finished");
                PipelineEvent::Finished(Box::new(output))
            }
            Err(e) => PipelineEvent::Failed {
                stage: callback.failed_stage.lock().ok().and_then(|s| *s),
                error: e.to_string(),
            },
        };
        let _ = tx.send(last);
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
