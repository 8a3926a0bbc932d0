use crate::config::{Config, SlicingPolicy};
use crate::error::{MediaChunkError, Result};
use crate::media::{cleanup_chunks, plan_chunks, ChunkFile, Cutter, Prober};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Observer for upload preparation progress.
///
/// Purely observational: errors and panics raised here are logged and
/// swallowed.
pub trait ProgressSink {
    fn report(&self, stage: &str, percent: u8, message: &str) -> std::result::Result<(), String>;
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8, &str),
{
    fn report(&self, stage: &str, percent: u8, message: &str) -> std::result::Result<(), String> {
        self(stage, percent, message);
        Ok(())
    }
}

/// States of a single `prepare_for_upload` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Validate,
    Single,
    Slice,
    Done,
    Error,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStage::Validate => write!(f, "validate"),
            UploadStage::Single => write!(f, "single"),
            UploadStage::Slice => write!(f, "slice"),
            UploadStage::Done => write!(f, "done"),
            UploadStage::Error => write!(f, "error"),
        }
    }
}

/// What the caller should upload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadPlan {
    pub success: bool,
    /// Files to upload, chunks in index order.
    pub files: Vec<PathBuf>,
    pub is_chunked: bool,
    pub chunk_count: usize,
    /// Directory holding the chunks, for cleanup once uploads finish.
    pub chunk_dir: Option<PathBuf>,
    /// Whether `chunk_dir` was created by the orchestrator.
    pub owns_chunk_dir: bool,
    pub chunks: Vec<ChunkFile>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

impl UploadPlan {
    fn failed(duration_seconds: Option<f64>, message: String) -> Self {
        Self {
            success: false,
            duration_seconds,
            error: Some(message),
            ..Default::default()
        }
    }
}

/// Removes an orchestrator-owned chunk directory unless disarmed.
struct ChunkDirGuard {
    dir: PathBuf,
    owned: bool,
    armed: bool,
}

impl ChunkDirGuard {
    fn disarm(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.dir)
    }
}

impl Drop for ChunkDirGuard {
    fn drop(&mut self) {
        if !self.armed || !self.owned {
            return;
        }
        debug!("Removing chunk directory: {:?}", self.dir);
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!("Failed to remove chunk directory {:?}: {}", self.dir, e);
        }
    }
}

/// Decides whether a media file must be sliced and produces the files to upload.
pub struct UploadOrchestrator {
    prober: Prober,
    cutter: Cutter,
    policy: SlicingPolicy,
    cancelled: Option<Arc<AtomicBool>>,
}

impl UploadOrchestrator {
    pub fn new(policy: SlicingPolicy) -> Self {
        Self {
            prober: Prober::default(),
            cutter: Cutter::default(),
            policy,
            cancelled: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            prober: Prober::from_config(config),
            cutter: Cutter::new(config.ffmpeg_path.clone()),
            policy: config.slicing,
            cancelled: None,
        }
    }

    pub fn with_prober(mut self, prober: Prober) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_cutter(mut self, cutter: Cutter) -> Self {
        self.cutter = cutter;
        self
    }

    /// Cancellation flag checked before each chunk is cut.
    pub fn with_cancel(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(cancelled);
        self
    }

    pub fn policy(&self) -> &SlicingPolicy {
        &self.policy
    }

    /// Prepare `input` for upload, slicing it when it exceeds the policy limit.
    ///
    /// Never returns an error: failures are reported through
    /// `UploadPlan::error` with full detail left in the logs.
    pub async fn prepare_for_upload(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        progress: Option<&dyn ProgressSink>,
    ) -> UploadPlan {
        let start_time = Instant::now();
        let mut duration = None;

        match self.run(input, output_dir, progress, &mut duration).await {
            Ok(plan) => {
                info!(
                    "[{}] {} ready in {:.2}s: {} file(s)",
                    UploadStage::Done,
                    input.display(),
                    start_time.elapsed().as_secs_f64(),
                    plan.files.len()
                );
                plan
            }
            Err(e) => {
                error!("[{}] {}: {:?}", UploadStage::Error, input.display(), e);
                UploadPlan::failed(duration, e.to_string())
            }
        }
    }

    async fn run(
        &self,
        input: &Path,
        output_dir: Option<&Path>,
        progress: Option<&dyn ProgressSink>,
        duration_out: &mut Option<f64>,
    ) -> Result<UploadPlan> {
        self.policy.validate()?;

        info!("[{}] Probing {}", UploadStage::Validate, input.display());
        notify(progress, UploadStage::Validate, 0, "Checking media duration");

        let duration = self.prober.duration(input).await?;
        *duration_out = Some(duration);
        let max = self.policy.max_chunk_seconds();

        if duration <= max {
            info!(
                "[{}] {:.1}s is within the {:.0}s limit",
                UploadStage::Single,
                duration,
                max
            );
            notify(
                progress,
                UploadStage::Validate,
                100,
                &format!("Duration {:.1} min, no slicing needed", duration / 60.0),
            );
            return Ok(UploadPlan {
                success: true,
                files: vec![input.to_path_buf()],
                is_chunked: false,
                chunk_count: 1,
                duration_seconds: Some(duration),
                ..Default::default()
            });
        }

        let plan = plan_chunks(duration, max, self.policy.overlap_seconds)?;
        info!(
            "[{}] {:.1}s exceeds {:.0}s, cutting {} chunks",
            UploadStage::Slice,
            duration,
            max,
            plan.len()
        );
        notify(
            progress,
            UploadStage::Slice,
            10,
            &format!("Slicing into {} chunks", plan.len()),
        );

        if self.is_cancelled() {
            return Err(MediaChunkError::Cancelled);
        }

        let guard = acquire_chunk_dir(output_dir)?;
        let chunks = self
            .cutter
            .cut_all(input, &plan, &guard.dir, self.cancelled.as_deref())
            .await?;

        notify(
            progress,
            UploadStage::Slice,
            100,
            &format!("Created {} chunks", chunks.len()),
        );

        let owned = guard.owned;
        let chunk_dir = guard.disarm();
        Ok(UploadPlan {
            success: true,
            files: chunks.iter().map(|c| c.file_path.clone()).collect(),
            is_chunked: true,
            chunk_count: chunks.len(),
            chunk_dir: Some(chunk_dir),
            owns_chunk_dir: owned,
            chunks,
            duration_seconds: Some(duration),
            error: None,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }
}

/// Remove the chunks produced for an upload once the caller is done with them.
///
/// The source file is never removed; the chunk directory only when the
/// orchestrator created it.
pub fn cleanup_upload(plan: &UploadPlan) -> Result<()> {
    if !plan.is_chunked {
        return Ok(());
    }
    cleanup_chunks(&plan.chunks)?;
    if let (true, Some(dir)) = (plan.owns_chunk_dir, plan.chunk_dir.as_ref()) {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
    }
    Ok(())
}

fn acquire_chunk_dir(output_dir: Option<&Path>) -> Result<ChunkDirGuard> {
    match output_dir {
        Some(dir) => {
            let owned = !dir.exists();
            std::fs::create_dir_all(dir)?;
            Ok(ChunkDirGuard {
                dir: dir.to_path_buf(),
                owned,
                armed: true,
            })
        }
        None => {
            let dir = tempfile::Builder::new()
                .prefix("mediachunk_")
                .tempdir()?
                .keep();
            debug!("Using chunk directory: {:?}", dir);
            Ok(ChunkDirGuard {
                dir,
                owned: true,
                armed: true,
            })
        }
    }
}

fn notify(progress: Option<&dyn ProgressSink>, stage: UploadStage, percent: u8, message: &str) {
    let Some(sink) = progress else {
        return;
    };
    let stage = stage.to_string();
    match catch_unwind(AssertUnwindSafe(|| sink.report(&stage, percent, message))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Progress callback failed at {}@{}: {}", stage, percent, e),
        Err(_) => warn!("Progress callback panicked at {}@{}", stage, percent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_stage_display() {
        assert_eq!(UploadStage::Validate.to_string(), "validate");
        assert_eq!(UploadStage::Slice.to_string(), "slice");
    }

    #[test]
    fn test_notify_swallows_panics() {
        let sink = |_: &str, _: u8, _: &str| panic!("observer exploded");
        notify(Some(&sink), UploadStage::Validate, 0, "start");
    }

    #[test]
    fn test_notify_swallows_errors() {
        struct Failing;
        impl ProgressSink for Failing {
            fn report(&self, _: &str, _: u8, _: &str) -> std::result::Result<(), String> {
                Err("sink offline".to_string())
            }
        }
        notify(Some(&Failing), UploadStage::Slice, 10, "slicing");
    }

    #[test]
    fn test_notify_records_events() {
        let events = Mutex::new(Vec::new());
        let sink = |stage: &str, percent: u8, _: &str| {
            events.lock().unwrap().push((stage.to_string(), percent));
        };
        notify(Some(&sink), UploadStage::Slice, 10, "a");
        notify(Some(&sink), UploadStage::Slice, 100, "b");
        assert_eq!(
            *events.lock().unwrap(),
            vec![("slice".to_string(), 10), ("slice".to_string(), 100)]
        );
    }

    #[test]
    fn test_guard_removes_owned_dir() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("chunks");
        {
            let guard = acquire_chunk_dir(Some(&dir)).unwrap();
            assert!(guard.owned);
            std::fs::write(dir.join("x_chunk_001_of_002.mp4"), b"x").unwrap();
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_guard_keeps_caller_dir() {
        let dir = tempfile::tempdir().unwrap();
        {
            let guard = acquire_chunk_dir(Some(dir.path())).unwrap();
            assert!(!guard.owned);
        }
        assert!(dir.path().exists());
    }

    #[test]
    fn test_disarmed_guard_keeps_dir() {
        let guard = acquire_chunk_dir(None).unwrap();
        let dir = guard.disarm();
        assert!(dir.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_input_fails_without_slicing() {
        let orchestrator = UploadOrchestrator::new(SlicingPolicy::default());
        let plan = orchestrator
            .prepare_for_upload(Path::new("/nonexistent/video.mp4"), None, None)
            .await;
        assert!(!plan.success);
        assert!(plan.files.is_empty());
        assert!(plan.error.unwrap().contains("/nonexistent/video.mp4"));
    }

    #[tokio::test]
    async fn test_invalid_policy_reported() {
        let orchestrator = UploadOrchestrator::new(SlicingPolicy {
            max_chunk_minutes: -1.0,
            overlap_seconds: 5.0,
        });
        let plan = orchestrator
            .prepare_for_upload(Path::new("whatever.mp4"), None, None)
            .await;
        assert!(!plan.success);
        assert!(plan.error.unwrap().contains("Invalid configuration"));
    }

    #[test]
    fn test_cleanup_single_file_plan_is_noop() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let plan = UploadPlan {
            success: true,
            files: vec![file.path().to_path_buf()],
            chunk_count: 1,
            ..Default::default()
        };
        cleanup_upload(&plan).unwrap();
        assert!(file.path().exists());
    }
}
