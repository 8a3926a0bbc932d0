use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaChunkError, Result};

use super::{ChunkBoundary, ChunkFile, ChunkPlan};

/// Longest stderr excerpt carried in `CutFailed`.
const STDERR_TAIL_CHARS: usize = 500;

/// Highest chunk count whose names still sort by index.
pub const MAX_CHUNKS: usize = 999;

/// Deterministic chunk file name: `{stem}_chunk_{index:03}_of_{total:03}{ext}`.
pub fn chunk_file_name(source: &Path, index: usize, total: usize) -> Result<String> {
    if total == 0 || total > MAX_CHUNKS || index == 0 || index > total {
        return Err(MediaChunkError::InvalidConfiguration(format!(
            "chunk {index} of {total} is out of range (max {MAX_CHUNKS} chunks)"
        )));
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "media".to_string());
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    Ok(format!("{stem}_chunk_{index:03}_of_{total:03}{ext}"))
}

/// Runs lossless stream-copy extraction with an external cut tool.
#[derive(Debug, Clone)]
pub struct Cutter {
    program: String,
    source_media_id: Option<String>,
}

impl Default for Cutter {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Cutter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            source_media_id: None,
        }
    }

    /// Tag produced chunks with the album media id they belong to.
    pub fn with_source_media_id(mut self, media_id: impl Into<String>) -> Self {
        self.source_media_id = Some(media_id.into());
        self
    }

    /// Extract `[start, end)` of `input` into `output_dir` without re-encoding.
    pub async fn cut(
        &self,
        input: &Path,
        boundary: &ChunkBoundary,
        total: usize,
        output_dir: &Path,
    ) -> Result<ChunkFile> {
        if !input.exists() {
            return Err(MediaChunkError::FileNotFound(input.display().to_string()));
        }

        let duration = boundary.duration();
        if duration <= 0.0 {
            return Err(MediaChunkError::InvalidConfiguration(format!(
                "chunk {} has non-positive length",
                boundary.index
            )));
        }

        let output = output_dir.join(chunk_file_name(input, boundary.index, total)?);
        let start_secs = format!("{:.3}", boundary.start_seconds);
        let duration_secs = format!("{:.3}", duration);

        debug!(
            "Cutting chunk {}/{}: start={}, duration={} -> {}",
            boundary.index,
            total,
            start_secs,
            duration_secs,
            output.display()
        );

        let result = Command::new(&self.program)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-ss"])
            .arg(&start_secs)
            .arg("-i")
            .arg(input)
            .arg("-t")
            .arg(&duration_secs)
            .args(["-map", "0", "-c", "copy", "-avoid_negative_ts", "make_zero"])
            .arg(&output)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MediaChunkError::CutFailed {
                index: boundary.index,
                stderr_tail: format!("Failed to run {}: {e}", self.program),
            })?;

        if !result.status.success() {
            return Err(MediaChunkError::CutFailed {
                index: boundary.index,
                stderr_tail: stderr_tail(&String::from_utf8_lossy(&result.stderr)),
            });
        }

        if !output.exists() {
            return Err(MediaChunkError::CutFailed {
                index: boundary.index,
                stderr_tail: "Output file was not created".to_string(),
            });
        }

        Ok(ChunkFile {
            source_media_id: self.source_media_id.clone(),
            chunk_index: boundary.index,
            total_chunks: total,
            file_path: output,
            duration_seconds: duration,
            start_seconds: boundary.start_seconds,
            end_seconds: boundary.end_seconds,
        })
    }

    /// Cut every boundary of `plan`, all or nothing.
    ///
    /// On any failure the chunks already written by this call are removed
    /// before the error is returned. Files that were in `output_dir` before
    /// the call are never removed. `cancel` is checked before each chunk.
    pub async fn cut_all(
        &self,
        input: &Path,
        plan: &ChunkPlan,
        output_dir: &Path,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<ChunkFile>> {
        let total = plan.len();
        let targets = plan
            .boundaries
            .iter()
            .map(|b| chunk_file_name(input, b.index, total).map(|name| output_dir.join(name)))
            .collect::<Result<Vec<PathBuf>>>()?;

        std::fs::create_dir_all(output_dir)?;
        info!(
            "Cutting {} chunks of {} into {}",
            total,
            input.display(),
            output_dir.display()
        );

        let mut chunks = Vec::with_capacity(total);
        for (boundary, target) in plan.boundaries.iter().zip(&targets) {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                discard(&chunks);
                return Err(MediaChunkError::Cancelled);
            }

            let preexisting = target.exists();
            match self.cut(input, boundary, total, output_dir).await {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    warn!(
                        "Chunk {}/{} failed, discarding {} written chunks",
                        boundary.index,
                        total,
                        chunks.len()
                    );
                    discard(&chunks);
                    if !preexisting {
                        remove_if_present(target);
                    }
                    return Err(e);
                }
            }
        }

        let produced = chunks.iter().filter(|c| c.file_path.exists()).count();
        if produced != total {
            discard(&chunks);
            return Err(MediaChunkError::SliceIncomplete {
                expected: total,
                produced,
            });
        }

        info!("Created {} chunks", chunks.len());
        Ok(chunks)
    }
}

/// Cut one boundary with the default `ffmpeg` binary.
pub async fn cut(
    input: &Path,
    boundary: &ChunkBoundary,
    total: usize,
    output_dir: &Path,
) -> Result<ChunkFile> {
    Cutter::default().cut(input, boundary, total, output_dir).await
}

/// Cut a whole plan with the default `ffmpeg` binary.
pub async fn cut_all(input: &Path, plan: &ChunkPlan, output_dir: &Path) -> Result<Vec<ChunkFile>> {
    Cutter::default().cut_all(input, plan, output_dir, None).await
}

/// Clean up chunk files. The source media is never touched.
pub fn cleanup_chunks(chunks: &[ChunkFile]) -> Result<()> {
    for chunk in chunks {
        if chunk.file_path.exists() {
            std::fs::remove_file(&chunk.file_path).map_err(|e| {
                MediaChunkError::Storage(format!(
                    "Failed to remove chunk file {}: {e}",
                    chunk.file_path.display()
                ))
            })?;
        }
    }
    Ok(())
}

fn discard(chunks: &[ChunkFile]) {
    if let Err(e) = cleanup_chunks(chunks) {
        warn!("Chunk cleanup incomplete: {}", e);
    }
}

fn remove_if_present(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partial chunk {}: {}", path.display(), e);
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
}
