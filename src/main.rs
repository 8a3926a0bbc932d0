use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mediachunk::cache::{FileBackend, UrlCache};
use mediachunk::config::Config;
use mediachunk::embedding::{ChunkEmbedding, Reconciler};
use mediachunk::media::{duration_info, plan_chunks, Cutter, Prober};
use mediachunk::store::{EmbeddingStore, MemoryStore, PgEmbeddingStore};
use mediachunk::upload::UploadOrchestrator;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "mediachunk")]
#[command(version, about = "Slice long videos for embedding and reconcile chunk embeddings")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Override the maximum chunk length in minutes
    #[arg(long, global = true)]
    max_chunk_minutes: Option<f64>,

    /// Override the overlap between chunks in seconds
    #[arg(long, global = true)]
    overlap_seconds: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print a media file's duration and whether it needs slicing
    Probe {
        input: PathBuf,
    },

    /// Print the chunk plan for a media file or a bare duration
    Plan {
        input: Option<PathBuf>,

        /// Plan for this many seconds instead of probing a file
        #[arg(long, conflicts_with = "input")]
        duration: Option<f64>,
    },

    /// Slice a media file for upload, printing the resulting plan as JSON
    Slice {
        input: PathBuf,

        /// Directory for chunk files (defaults to a fresh temp directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Album media id recorded on each chunk
        #[arg(long)]
        media_id: Option<String>,
    },

    /// Store chunk embedding results (JSON array) for one media item
    Reconcile {
        /// JSON file with `[{chunk_index, start_seconds, segments}]`
        results: PathBuf,

        #[arg(long)]
        media_id: String,

        /// PostgreSQL URL; without it results are reconciled in memory
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Remove stale entries from the URL cache file
    PurgeUrlCache {
        /// Cache file (defaults to the configured path)
        path: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(minutes) = cli.max_chunk_minutes {
        config.slicing.max_chunk_minutes = minutes;
    }
    if let Some(overlap) = cli.overlap_seconds {
        config.slicing.overlap_seconds = overlap;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    match cli.command {
        Command::Probe { input } => {
            let duration = Prober::from_config(&config)
                .duration(&input)
                .await
                .with_context(|| format!("Failed to probe {}", input.display()))?;
            let info = duration_info(duration, &config.slicing);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Command::Plan { input, duration } => {
            let duration = match (duration, input) {
                (Some(d), _) => d,
                (None, Some(input)) => Prober::from_config(&config)
                    .duration(&input)
                    .await
                    .with_context(|| format!("Failed to probe {}", input.display()))?,
                (None, None) => anyhow::bail!("Provide an input file or --duration"),
            };
            let plan = plan_chunks(
                duration,
                config.slicing.max_chunk_seconds(),
                config.slicing.overlap_seconds,
            )?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }

        Command::Slice {
            input,
            output_dir,
            media_id,
        } => {
            let cancelled = Arc::new(AtomicBool::new(false));
            let flag = cancelled.clone();
            ctrlc::set_handler(move || {
                flag.store(true, Ordering::Relaxed);
            })
            .context("Failed to install Ctrl+C handler")?;

            let mut orchestrator = UploadOrchestrator::from_config(&config).with_cancel(cancelled);
            if let Some(id) = media_id {
                orchestrator = orchestrator.with_cutter(
                    Cutter::new(config.ffmpeg_path.clone()).with_source_media_id(id),
                );
            }

            let pb = progress_bar();
            let sink = |stage: &str, percent: u8, message: &str| {
                pb.set_position(percent as u64);
                pb.set_message(format!("{stage}: {message}"));
            };

            let plan = orchestrator
                .prepare_for_upload(&input, output_dir.as_deref(), Some(&sink))
                .await;
            pb.finish_and_clear();

            println!("{}", serde_json::to_string_pretty(&plan)?);
            if let Some(error) = plan.error {
                anyhow::bail!("Slicing failed: {error}");
            }
        }

        Command::Reconcile {
            results,
            media_id,
            database_url,
        } => {
            let contents = std::fs::read_to_string(&results)
                .with_context(|| format!("Failed to read {}", results.display()))?;
            let chunks: Vec<ChunkEmbedding> =
                serde_json::from_str(&contents).context("Invalid chunk results JSON")?;

            let store: Arc<dyn EmbeddingStore> =
                match database_url.or_else(|| config.database_url.clone()) {
                    Some(url) => Arc::new(
                        PgEmbeddingStore::connect(&url)
                            .await
                            .context("Failed to connect to database")?,
                    ),
                    None => {
                        warn!("No database configured, reconciling in memory only");
                        Arc::new(MemoryStore::new())
                    }
                };

            let report = Reconciler::new(store).reconcile(&media_id, chunks).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::PurgeUrlCache { path } => {
            let path = path
                .or_else(|| config.url_cache_path.clone())
                .context("No URL cache path given or configured")?;
            let cache = UrlCache::new(FileBackend::open(&path)?);
            let removed = cache.purge_expired()?;
            info!("Removed {} stale URLs from {}", removed, path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_slice() {
        let cli = Cli::parse_from([
            "mediachunk",
            "slice",
            "movie.mp4",
            "--output-dir",
            "/tmp/chunks",
            "--overlap-seconds",
            "2",
        ]);
        assert_eq!(cli.overlap_seconds, Some(2.0));
        match cli.command {
            Command::Slice {
                input, output_dir, ..
            } => {
                assert_eq!(input, PathBuf::from("movie.mp4"));
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/chunks")));
            }
            _ => panic!("expected slice"),
        }
    }

    #[test]
    fn test_cli_plan_duration_conflicts_with_input() {
        let result = Cli::try_parse_from(["mediachunk", "plan", "a.mp4", "--duration", "10"]);
        assert!(result.is_err());
    }
}
