//! PostgreSQL storage with pgvector columns.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::debug;

use crate::error::{MediaChunkError, Result};

use super::{EmbeddingStore, SegmentRecord};

/// Default segment table.
pub const DEFAULT_SEGMENT_TABLE: &str = "media_embedding_segments";

/// Default media table holding the primary `embedding` column.
pub const DEFAULT_MEDIA_TABLE: &str = "media";

/// Segment rows and primary vectors in PostgreSQL.
///
/// Expects `{segment_table}(id TEXT PRIMARY KEY, media_id TEXT, chunk_index INT,
/// segment_index INT, start_offset DOUBLE PRECISION, end_offset DOUBLE PRECISION,
/// embedding vector)` and a `{media_table}` with `id` and `embedding vector`.
pub struct PgEmbeddingStore {
    pool: PgPool,
    segment_table: String,
    media_table: String,
}

impl PgEmbeddingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            segment_table: DEFAULT_SEGMENT_TABLE.to_string(),
            media_table: DEFAULT_MEDIA_TABLE.to_string(),
        }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn with_tables(
        mut self,
        segment_table: impl Into<String>,
        media_table: impl Into<String>,
    ) -> Result<Self> {
        let segment_table = segment_table.into();
        let media_table = media_table.into();
        for table in [&segment_table, &media_table] {
            if !is_identifier(table) {
                return Err(MediaChunkError::InvalidConfiguration(format!(
                    "invalid table name '{table}'"
                )));
            }
        }
        self.segment_table = segment_table;
        self.media_table = media_table;
        Ok(self)
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    async fn insert_segments(&self, records: &[SegmentRecord]) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (id, media_id, chunk_index, segment_index, start_offset, end_offset, embedding)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                 start_offset = EXCLUDED.start_offset,
                 end_offset = EXCLUDED.end_offset,
                 embedding = EXCLUDED.embedding",
            self.segment_table
        );

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&query)
                .bind(&record.id)
                .bind(&record.media_id)
                .bind(record.chunk_index as i32)
                .bind(record.segment_index as i32)
                .bind(record.start_offset)
                .bind(record.end_offset)
                .bind(Vector::from(record.vector.clone()))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Stored {} segment rows in {}", records.len(), self.segment_table);
        Ok(())
    }

    async fn set_primary_vector(&self, media_id: &str, vector: &[f32]) -> Result<()> {
        let query = format!(
            "UPDATE {} SET embedding = $1 WHERE id::text = $2",
            self.media_table
        );
        let result = sqlx::query(&query)
            .bind(Vector::from(vector.to_vec()))
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MediaChunkError::Storage(format!(
                "media record {media_id} not found in {}",
                self.media_table
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("media_embedding_segments"));
        assert!(is_identifier("_t1"));
        assert!(!is_identifier("1media"));
        assert!(!is_identifier("media; DROP TABLE media"));
        assert!(!is_identifier(""));
    }

    #[tokio::test]
    async fn test_with_tables_rejects_injection() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let store = PgEmbeddingStore::new(pool);
        assert!(store.with_tables("segments", "media x").is_err());
    }
}
