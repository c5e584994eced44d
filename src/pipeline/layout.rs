//! `analyze_layout`: send every chunk to the analysis service.
//!
//! Chunks go out one at a time, in `sub_document_paths` order, and the first
//! failure ends the stage. Each reply is written next to the chunks as
//! `{chunk-stem}.json`; later stages read those files, not the reply held in
//! memory.

use super::StageContext;
use crate::error::PipelineError;
use crate::output::write_atomic;
use crate::state::{need, PipelineState, StateUpdate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the analysis result for `chunk` is stored.
///
/// Two image pages can share a file stem; `taken` tracks names already used
/// in this run and the chunk position is appended on a clash.
pub fn result_path(scratch: &Path, chunk: &Path, index: usize, taken: &mut HashSet<String>) -> PathBuf {
    let stem = chunk
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("chunk{index}"));
    let mut name = format!("{stem}.json");
    if !taken.insert(name.clone()) {
        name = format!("{stem}-{index}.json");
        taken.insert(name.clone());
    }
    scratch.join(name)
}

pub async fn analyze_layout(
    state: &PipelineState,
    ctx: &StageContext<'_>,
) -> Result<StateUpdate, PipelineError> {
    let chunks = need!(state, sub_document_paths);
    let scratch = state.scratch_dir();
    tokio::fs::create_dir_all(&scratch)
        .await
        .map_err(|e| PipelineError::io(&scratch, e))?;

    let mut taken = HashSet::new();
    let mut analyzed_chunk_paths = Vec::with_capacity(chunks.len());

    for (index, chunk) in chunks.iter().enumerate() {
        let result = ctx.analyzer.analyze(chunk).await?;
        debug!(
            "Chunk {}/{}: {} elements from {}",
            index + 1,
            chunks.len(),
            result.elements.len(),
            chunk.display()
        );

        let output = result_path(&scratch, chunk, index, &mut taken);
        let json = serde_json::to_vec(&result)
            .map_err(|e| PipelineError::Internal(format!("serialising analysis result: {e}")))?;
        write_atomic(&output, &json)?;
        analyzed_chunk_paths.push(output);
    }

    info!("Analysed {} chunks", analyzed_chunk_paths.len());
    Ok(StateUpdate::Analyzed {
        analyzed_chunk_paths,
    })
}
