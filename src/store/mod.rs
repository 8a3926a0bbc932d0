pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgEmbeddingStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// A persisted segment embedding of one logical media item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
    pub id: String,
    pub media_id: String,
    pub chunk_index: usize,
    pub segment_index: usize,
    pub start_offset: f64,
    pub end_offset: f64,
    pub vector: Vec<f32>,
}

impl SegmentRecord {
    /// Stable row id, so re-running a reconciliation overwrites instead of duplicating.
    pub fn synthetic_id(media_id: &str, chunk_index: usize, segment_index: usize) -> String {
        format!("{media_id}:{chunk_index:03}:{segment_index:03}")
    }
}

/// Persistence for segment vectors and the primary search vector.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Insert or replace segment rows.
    async fn insert_segments(&self, records: &[SegmentRecord]) -> Result<()>;

    /// Overwrite the primary vector of a media record.
    async fn set_primary_vector(&self, media_id: &str, vector: &[f32]) -> Result<()>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_id() {
        assert_eq!(SegmentRecord::synthetic_id("42", 1, 3), "42:001:003");
    }

    #[test]
    fn test_synthetic_ids_sort_by_position() {
        let mut ids = vec![
            SegmentRecord::synthetic_id("m", 2, 1),
            SegmentRecord::synthetic_id("m", 1, 10),
            SegmentRecord::synthetic_id("m", 1, 2),
        ];
        ids.sort();
        assert_eq!(ids, vec!["m:001:002", "m:001:010", "m:002:001"]);
    }
}
