pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod media;
pub mod store;
pub mod upload;

pub use config::{Config, SlicingPolicy};
pub use embedding::{ChunkEmbedding, EmbeddingSegment, ReconcileReport, Reconciler};
pub use error::{MediaChunkError, Result};
pub use media::{ChunkBoundary, ChunkFile, ChunkPlan, MediaDurationInfo};
pub use upload::{cleanup_upload, ProgressSink, UploadOrchestrator, UploadPlan, UploadStage};
