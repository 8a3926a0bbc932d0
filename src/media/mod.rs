pub mod cut;
pub mod plan;
pub mod probe;

pub use cut::{chunk_file_name, cleanup_chunks, cut, cut_all, Cutter};
pub use plan::{duration_info, plan_chunks};
pub use probe::{check_ffmpeg, check_ffprobe, probe_duration, Prober};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Duration facts about a media file, recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaDurationInfo {
    pub duration_seconds: f64,
    pub needs_slicing: bool,
    pub estimated_chunk_count: usize,
}

/// One planned cut, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkBoundary {
    pub index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl ChunkBoundary {
    /// Get the duration of this boundary.
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Ordered cut plan for a media file.
///
/// Empty `boundaries` with `needs_slicing == false` means the file is
/// handled whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkPlan {
    pub duration_seconds: f64,
    pub needs_slicing: bool,
    pub boundaries: Vec<ChunkBoundary>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

/// A chunk written to disk by the cutter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFile {
    pub source_media_id: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub file_path: PathBuf,
    pub duration_seconds: f64,
    pub start_seconds: f64,
    pub end_seconds: f64,
}
