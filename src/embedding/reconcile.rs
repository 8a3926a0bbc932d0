use crate::embedding::ChunkEmbedding;
use crate::error::{MediaChunkError, Result};
use crate::store::{EmbeddingStore, SegmentRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of reconciling one media item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub media_id: String,
    pub chunks_total: usize,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    pub segments_written: usize,
    pub representative_updated: bool,
    /// `(chunk_index, message)` per failed chunk.
    pub errors: Vec<(usize, String)>,
    /// Why the primary vector could not be written, if it was attempted.
    pub representative_error: Option<String>,
}

/// The merged view of a media item's chunk embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledEmbedding {
    pub media_id: String,
    pub segments: Vec<SegmentRecord>,
    pub representative_vector: Option<Vec<f32>>,
}

/// Merges per-chunk embedding results into one logical media record.
pub struct Reconciler {
    store: Arc<dyn EmbeddingStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EmbeddingStore>) -> Self {
        Self { store }
    }

    /// Persist every chunk's segments and set the media's primary vector.
    ///
    /// Chunks are written independently: a failed chunk is logged and the
    /// next one is still attempted. The primary vector is the first segment
    /// of the first chunk that was stored. Errors only when every chunk
    /// failed, in which case the media record is left untouched.
    pub async fn reconcile(
        &self,
        media_id: &str,
        mut results: Vec<ChunkEmbedding>,
    ) -> Result<ReconcileReport> {
        let start_time = Instant::now();
        results.sort_by_key(|r| r.chunk_index);

        let mut report = ReconcileReport {
            media_id: media_id.to_string(),
            chunks_total: results.len(),
            ..Default::default()
        };

        info!(
            "Reconciling {} chunk result(s) for media {} into {} store",
            results.len(),
            media_id,
            self.store.name()
        );

        let mut stored = Vec::with_capacity(results.len());
        for chunk in &results {
            let rows = chunk_records(media_id, chunk);
            match self.store.insert_segments(&rows).await {
                Ok(()) => {
                    debug!("Chunk {}: stored {} segments", chunk.chunk_index, rows.len());
                    report.chunks_succeeded += 1;
                    report.segments_written += rows.len();
                    stored.push(chunk);
                }
                Err(e) => {
                    warn!(
                        "Chunk {} of media {} not stored: {}",
                        chunk.chunk_index, media_id, e
                    );
                    report.chunks_failed += 1;
                    report.errors.push((chunk.chunk_index, e.to_string()));
                }
            }
        }

        if report.chunks_total > 0 && report.chunks_succeeded == 0 {
            let messages: Vec<String> = report
                .errors
                .iter()
                .map(|(index, msg)| format!("chunk {index}: {msg}"))
                .collect();
            return Err(MediaChunkError::Storage(format!(
                "All {} chunks failed. Errors: {}",
                report.chunks_total,
                messages.join("; ")
            )));
        }

        if let Some(vector) = representative_vector(stored) {
            match self.store.set_primary_vector(media_id, vector).await {
                Ok(()) => report.representative_updated = true,
                Err(e) => {
                    warn!("Primary vector of media {} not updated: {}", media_id, e);
                    report.representative_error = Some(e.to_string());
                }
            }
        } else {
            warn!("Media {} has no stored segments, primary vector left unchanged", media_id);
        }

        info!(
            "Reconciled media {}: {}/{} chunks, {} segments in {:.2}s",
            media_id,
            report.chunks_succeeded,
            report.chunks_total,
            report.segments_written,
            start_time.elapsed().as_secs_f64()
        );

        Ok(report)
    }
}

/// Merge chunk results into segment rows on the source timeline.
///
/// Chunks are ordered by index; offsets are shifted by the chunk's
/// `start_seconds` when known.
pub fn merge(media_id: &str, mut results: Vec<ChunkEmbedding>) -> ReconciledEmbedding {
    results.sort_by_key(|r| r.chunk_index);

    ReconciledEmbedding {
        media_id: media_id.to_string(),
        segments: results
            .iter()
            .flat_map(|chunk| chunk_records(media_id, chunk))
            .collect(),
        representative_vector: representative_vector(&results).map(<[f32]>::to_vec),
    }
}

fn chunk_records(media_id: &str, chunk: &ChunkEmbedding) -> Vec<SegmentRecord> {
    let shift = chunk.start_seconds.unwrap_or(0.0);
    chunk
        .segments
        .iter()
        .enumerate()
        .map(|(i, segment)| SegmentRecord {
            id: SegmentRecord::synthetic_id(media_id, chunk.chunk_index, i + 1),
            media_id: media_id.to_string(),
            chunk_index: chunk.chunk_index,
            segment_index: i + 1,
            start_offset: shift + segment.start_offset,
            end_offset: shift + segment.end_offset,
            vector: segment.vector.clone(),
        })
        .collect()
}

/// First segment of the first chunk that has any. Chunks must be sorted.
fn representative_vector<'a>(
    chunks: impl IntoIterator<Item = &'a ChunkEmbedding>,
) -> Option<&'a [f32]> {
    chunks
        .into_iter()
        .find_map(|chunk| chunk.segments.first())
        .map(|segment| segment.vector.as_slice())
}
