use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{MediaChunkError, Result};

use super::{EmbeddingStore, SegmentRecord};

#[derive(Default)]
struct MemoryState {
    segments: BTreeMap<String, SegmentRecord>,
    primary: HashMap<String, Vec<f32>>,
    primary_updates: usize,
}

/// In-process store, used by the CLI dry run and by tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing_chunks: HashSet<usize>,
    failing_primary: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `insert_segments` batches touching any of `chunks`.
    pub fn with_failing_chunks(mut self, chunks: impl IntoIterator<Item = usize>) -> Self {
        self.failing_chunks = chunks.into_iter().collect();
        self
    }

    /// Reject every `set_primary_vector` call.
    pub fn with_failing_primary_update(mut self) -> Self {
        self.failing_primary = true;
        self
    }

    /// All segments ordered by id.
    pub async fn segments(&self) -> Vec<SegmentRecord> {
        self.state.lock().await.segments.values().cloned().collect()
    }

    pub async fn primary_vector(&self, media_id: &str) -> Option<Vec<f32>> {
        self.state.lock().await.primary.get(media_id).cloned()
    }

    /// Number of primary vector writes applied.
    pub async fn primary_updates(&self) -> usize {
        self.state.lock().await.primary_updates
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn insert_segments(&self, records: &[SegmentRecord]) -> Result<()> {
        if let Some(record) = records
            .iter()
            .find(|r| self.failing_chunks.contains(&r.chunk_index))
        {
            return Err(MediaChunkError::Storage(format!(
                "injected failure for chunk {}",
                record.chunk_index
            )));
        }

        let mut state = self.state.lock().await;
        for record in records {
            state.segments.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn set_primary_vector(&self, media_id: &str, vector: &[f32]) -> Result<()> {
        if self.failing_primary {
            return Err(MediaChunkError::Storage(format!(
                "injected failure for media {media_id}"
            )));
        }

        let mut state = self.state.lock().await;
        state.primary.insert(media_id.to_string(), vector.to_vec());
        state.primary_updates += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunk: usize, segment: usize) -> SegmentRecord {
        SegmentRecord {
            id: SegmentRecord::synthetic_id("m1", chunk, segment),
            media_id: "m1".to_string(),
            chunk_index: chunk,
            segment_index: segment,
            start_offset: 0.0,
            end_offset: 1.0,
            vector: vec![chunk as f32, segment as f32],
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = MemoryStore::new();
        store.insert_segments(&[record(1, 1), record(1, 2)]).await.unwrap();
        store.insert_segments(&[record(1, 1)]).await.unwrap();
        assert_eq!(store.segments().await.len(), 2);
    }

    #[tokio::test]
    async fn test_primary_vector() {
        let store = MemoryStore::new();
        assert!(store.primary_vector("m1").await.is_none());
        store.set_primary_vector("m1", &[0.5, 0.25]).await.unwrap();
        assert_eq!(store.primary_vector("m1").await, Some(vec![0.5, 0.25]));
        assert_eq!(store.primary_updates().await, 1);
    }

    #[tokio::test]
    async fn test_failing_chunk_writes_nothing() {
        let store = MemoryStore::new().with_failing_chunks([2]);
        store.insert_segments(&[record(1, 1)]).await.unwrap();

        let result = store.insert_segments(&[record(2, 1), record(2, 2)]).await;
        assert!(matches!(result, Err(MediaChunkError::Storage(_))));
        assert_eq!(store.segments().await.len(), 1);
    }
}
