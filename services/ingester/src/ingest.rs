//! Runs the pipeline over local files.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use ingestion::{IngestionError, Pipeline, RunSummary};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Outcome of one file.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<RunSummary, IngestionError>,
}

/// Read one file and run it through the pipeline.
pub async fn ingest_file(pipeline: &Pipeline, path: &Path) -> Result<RunSummary, IngestionError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.nc")
        .to_string();

    let data = tokio::fs::read(path).await.map_err(|e| {
        error!(source = %name, path = %path.display(), error = %e, "Failed to read file");
        IngestionError::Decode(format!("cannot read {}: {e}", path.display()))
    })?;
    info!(source = %name, bytes = data.len(), "Read forecast file");

    pipeline.process(Bytes::from(data), &name).await
}

/// Process `files` with at most `concurrency` runs in flight. A failed file
/// never stops the others.
pub async fn ingest_all(pipeline: &Pipeline, files: &[PathBuf], concurrency: usize) -> Vec<FileOutcome> {
    stream::iter(files)
        .map(|path| async move {
            FileOutcome {
                path: path.clone(),
                result: ingest_file(pipeline, path).await,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
