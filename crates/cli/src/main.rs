//! watchtrail CLI - video watch-progress tracking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use watchtrail_core::{SessionKey, TrackerConfig, VideoId, VideoRecord, ViewerId, WatchSession};
use watchtrail_progress::ProgressService;
use watchtrail_storage::{JsonStorage, VideoCatalog};

#[derive(Parser)]
#[command(name = "watchtrail")]
#[command(about = "Track which parts of a video each viewer has watched", long_about = None)]
struct Cli {
    /// Data directory
    #[arg(long, default_value = ".watchtrail")]
    data_dir: PathBuf,

    /// Seconds between reports still treated as continuous playback
    #[arg(long)]
    gap_tolerance: Option<f64>,

    /// Watched percentage that marks a video completed
    #[arg(long)]
    completion_threshold: Option<f64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a video and its duration
    AddVideo {
        /// Video ID
        id: String,
        /// Duration in seconds
        #[arg(long)]
        duration: f64,
        /// Title
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Report a playback position
    Report {
        /// Viewer ID
        viewer: String,
        /// Video ID
        video: String,
        /// Current playback time in seconds
        time: f64,
        /// Duration reported by the player
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Mark a video completed for a viewer
    Complete {
        /// Viewer ID
        viewer: String,
        /// Video ID
        video: String,
    },
    /// Show a watch session
    Show {
        /// Viewer ID
        viewer: String,
        /// Video ID
        video: String,
    },
    /// Summarize a viewer's sessions
    Summary {
        /// Viewer ID
        viewer: String,
    },
    /// List videos a viewer can resume
    Resume {
        /// Viewer ID
        viewer: String,
        /// Max entries
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let storage = Arc::new(JsonStorage::new(&cli.data_dir).await?);
    let config = load_config(&cli.data_dir, cli.gap_tolerance, cli.completion_threshold)?;
    debug!(?config, "tracker configuration");
    let service = ProgressService::new(storage.clone(), storage.clone(), config)?;

    match cli.command {
        Commands::AddVideo { id, duration, title } => {
            let record = VideoRecord::new(VideoId::parse(id)?, title, duration)?;
            storage.save_video(&record).await?;
            info!(video = %record.id, duration = record.duration_secs, "registered video");
            println!("Added video: {} ({}s)", record.id, record.duration_secs);
        }
        Commands::Report { viewer, video, time, duration } => {
            let key = SessionKey::parse(viewer, video)?;
            let outcome = service.report(&key, time, duration).await?;
            print_session(&outcome.session);
            if outcome.newly_completed {
                println!("  -> completed");
            }
        }
        Commands::Complete { viewer, video } => {
            let key = SessionKey::parse(viewer, video)?;
            let session = service.mark_completed(&key).await?;
            print_session(&session);
        }
        Commands::Show { viewer, video } => {
            let key = SessionKey::parse(viewer, video)?;
            match service.session(&key).await? {
                Some(session) => print_session(&session),
                None => println!("Session not found"),
            }
        }
        Commands::Summary { viewer } => {
            let viewer = ViewerId::parse(viewer)?;
            let summary = service.viewer_summary(&viewer).await?;

            println!("Summary for {}", viewer);
            println!("  Sessions: {}", summary.sessions);
            for status in watchtrail_core::CompletionStatus::ALL {
                println!("  {}: {}", status, summary.count(status));
            }
            println!("  Total watch time: {:.1}s", summary.total_watch_time);
            println!("  Average watched: {:.1}%", summary.average_percentage);
        }
        Commands::Resume { viewer, limit } => {
            let viewer = ViewerId::parse(viewer)?;
            let points = service.continue_watching(&viewer, limit).await?;

            println!("Continue watching ({})", points.len());
            for point in points {
                println!(
                    "  {} | at {:.1}s | {:.1}% | {}",
                    point.video_id, point.position, point.watched_percentage, point.last_watched_at,
                );
            }
        }
    }

    Ok(())
}

/// Read `config.json` from the data directory (if any) and apply CLI overrides.
fn load_config(
    data_dir: &Path,
    gap_tolerance: Option<f64>,
    completion_threshold: Option<f64>,
) -> Result<TrackerConfig> {
    let path = data_dir.join("config.json");
    let mut config = match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => TrackerConfig::default(),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };

    if let Some(secs) = gap_tolerance {
        config = config.with_gap_tolerance(secs);
    }
    if let Some(pct) = completion_threshold {
        config = config.with_completion_threshold(pct);
    }
    config.validate()?;
    Ok(config)
}

fn print_session(session: &WatchSession) {
    println!("Session: {}", session.id);
    println!("  Viewer: {}", session.viewer_id);
    println!("  Video: {}", session.video_id);
    match session.video_duration {
        Some(d) => println!("  Duration: {:.1}s", d),
        None => println!("  Duration: unknown"),
    }
    let intervals: Vec<String> = session
        .watched_intervals
        .iter()
        .map(|i| format!("[{:.1}, {:.1}]", i.start(), i.end()))
        .collect();
    println!("  Watched: {}", intervals.join(" "));
    println!("  Total: {:.1}s ({:.1}%)", session.total_watch_time, session.watched_percentage);
    println!("  Status: {}", session.completion_status);
    println!("  Last position: {:.1}s", session.last_reported_position);
    println!("  Last watched: {}", session.last_watched_at);
}
