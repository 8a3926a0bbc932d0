use tracing::debug;

use crate::config::SlicingPolicy;
use crate::error::{MediaChunkError, Result};

use super::{ChunkBoundary, ChunkPlan, MediaDurationInfo};

/// Plan overlapping chunk boundaries for a media file.
///
/// Chunks are sized evenly (`duration / ceil(duration / max)`) instead of
/// using `max` with a short trailing remainder. Each boundary is widened by
/// `overlap_seconds` on both sides and clamped to `[0, duration]`.
pub fn plan_chunks(
    duration_seconds: f64,
    max_chunk_seconds: f64,
    overlap_seconds: f64,
) -> Result<ChunkPlan> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(MediaChunkError::InvalidConfiguration(format!(
            "duration must be positive, got {duration_seconds}"
        )));
    }
    if !max_chunk_seconds.is_finite() || max_chunk_seconds <= 0.0 {
        return Err(MediaChunkError::InvalidConfiguration(format!(
            "max chunk duration must be positive, got {max_chunk_seconds}"
        )));
    }
    if !overlap_seconds.is_finite() || overlap_seconds < 0.0 {
        return Err(MediaChunkError::InvalidConfiguration(format!(
            "overlap must be zero or positive, got {overlap_seconds}"
        )));
    }

    if duration_seconds <= max_chunk_seconds {
        return Ok(ChunkPlan {
            duration_seconds,
            needs_slicing: false,
            boundaries: Vec::new(),
        });
    }

    let num_chunks = chunk_count(duration_seconds, max_chunk_seconds);
    let ideal = duration_seconds / num_chunks as f64;

    if overlap_seconds >= ideal {
        return Err(MediaChunkError::InvalidConfiguration(format!(
            "overlap {overlap_seconds}s must be smaller than the chunk length {ideal:.3}s"
        )));
    }

    let boundaries: Vec<ChunkBoundary> = (0..num_chunks)
        .map(|i| {
            let start = (i as f64 * ideal - overlap_seconds).max(0.0);
            let end = if i + 1 == num_chunks {
                duration_seconds
            } else {
                ((i + 1) as f64 * ideal + overlap_seconds).min(duration_seconds)
            };
            ChunkBoundary {
                index: i + 1,
                start_seconds: start,
                end_seconds: end,
            }
        })
        .collect();

    debug!(
        "Planned {} chunks of ~{:.2}s for {:.2}s (overlap {:.2}s)",
        num_chunks, ideal, duration_seconds, overlap_seconds
    );

    Ok(ChunkPlan {
        duration_seconds,
        needs_slicing: true,
        boundaries,
    })
}

/// Summarize whether a duration exceeds the policy limit.
pub fn duration_info(duration_seconds: f64, policy: &SlicingPolicy) -> MediaDurationInfo {
    let max = policy.max_chunk_seconds();
    let needs_slicing = duration_seconds > max;
    MediaDurationInfo {
        duration_seconds,
        needs_slicing,
        estimated_chunk_count: if needs_slicing {
            chunk_count(duration_seconds, max)
        } else {
            1
        },
    }
}

fn chunk_count(duration_seconds: f64, max_chunk_seconds: f64) -> usize {
    (duration_seconds / max_chunk_seconds).ceil() as usize
}
