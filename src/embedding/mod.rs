pub mod reconcile;
pub mod response;

pub use reconcile::{ReconcileReport, Reconciler};
pub use response::{parse_embedding_response, EmbeddingResponse};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::ChunkFile;

/// One embedded time range of a chunk, offsets in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSegment {
    pub start_offset: f64,
    pub end_offset: f64,
    pub vector: Vec<f32>,
}

/// Embedding output for one uploaded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    /// 1-based, matching `ChunkFile::chunk_index`.
    pub chunk_index: usize,
    /// Position of the chunk in the source media. Segment offsets are
    /// chunk-local and get shifted by this when reconciled.
    #[serde(default)]
    pub start_seconds: Option<f64>,
    pub segments: Vec<EmbeddingSegment>,
}

impl ChunkEmbedding {
    /// Build from a raw embedding API response for `chunk`.
    pub fn from_response(chunk: &ChunkFile, response: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            chunk_index: chunk.chunk_index,
            start_seconds: Some(chunk.start_seconds),
            segments: parse_embedding_response(response, chunk.duration_seconds)?,
        })
    }
}
