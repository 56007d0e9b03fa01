use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use media_index::{
    Library, LibraryConfig, LibraryError, ListQuery, MediaView, PlayCountFilter, RatingFilter,
    ScanSnapshot,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// -- CLI --

#[derive(Parser)]
#[command(name = "webviewer")]
#[command(about = "Index a media folder and manage ratings, play counts and previews")]
struct Cli {
    /// Folder to index
    #[arg(long, env = "WEBVIEWER_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// ffmpeg binary used for frame extraction
    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg", global = true)]
    ffmpeg: String,

    /// ffprobe binary used for duration inspection
    #[arg(long, env = "FFPROBE_BIN", default_value = "ffprobe", global = true)]
    ffprobe: String,

    /// Reindex worker threads
    #[arg(long, default_value = "1", global = true)]
    workers: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index and generate missing thumbnails and previews
    Scan,

    /// List indexed media as JSON
    List {
        /// Only files directly under the root
        #[arg(long)]
        no_subfolders: bool,

        /// all, positive or non_negative
        #[arg(long, default_value = "all")]
        rating: RatingFilter,

        /// all, zero or non_zero
        #[arg(long, default_value = "all")]
        plays: PlayCountFilter,
    },

    /// Vote on a file by content hash
    Rate {
        hash: String,

        /// +1 or -1
        #[arg(allow_negative_numbers = true)]
        delta: i64,
    },

    /// Count one playback of a file by content hash
    Play { hash: String },

    /// Relative paths of files rated below a threshold
    LowRated {
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        threshold: i64,
    },

    /// Move negatively rated files into the _minus folder
    MoveNegative,
}

impl Cli {
    fn library_config(&self) -> LibraryConfig {
        let mut config = LibraryConfig::new(&self.root).with_workers(self.workers);
        config.probe.ffmpeg_bin = self.ffmpeg.clone();
        config.probe.ffprobe_bin = self.ffprobe.clone();
        config
    }
}

// -- Payloads --

#[derive(Debug, Serialize)]
struct ScanPayload {
    status: &'static str,
    stats: ScanSnapshot,
}

#[derive(Debug, Serialize)]
struct ListPayload {
    media: Vec<MediaView>,
    scan: ScanSnapshot,
}

#[derive(Debug, Serialize)]
struct RatingPayload {
    hash: String,
    rating: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayPayload {
    hash: String,
    play_count: i64,
}

#[derive(Debug, Serialize)]
struct LowRatedPayload {
    count: usize,
    paths: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MovePayload {
    status: &'static str,
    moved: usize,
    failed: usize,
    moved_files: Vec<String>,
    failed_files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

// -- Commands --

fn run(library: &Library, command: Commands) -> Result<serde_json::Value> {
    let value = match command {
        Commands::Scan => {
            let stats = library.trigger_reindex()?;
            serde_json::to_value(ScanPayload { status: "ok", stats })?
        }
        Commands::List {
            no_subfolders,
            rating,
            plays,
        } => {
            let scan = library.trigger_reindex()?;
            let query = ListQuery {
                include_subfolders: !no_subfolders,
                rating,
                plays,
            };
            let media = library.list_entries(&query);
            serde_json::to_value(ListPayload { media, scan })?
        }
        Commands::Rate { hash, delta } => {
            let rating = library.rate(&hash, delta)?;
            serde_json::to_value(RatingPayload { hash, rating })?
        }
        Commands::Play { hash } => {
            let play_count = library.record_play(&hash)?;
            serde_json::to_value(PlayPayload { hash, play_count })?
        }
        Commands::LowRated { threshold } => {
            library.trigger_reindex()?;
            let paths = library.list_below_threshold(threshold);
            serde_json::to_value(LowRatedPayload {
                count: paths.len(),
                paths,
            })?
        }
        Commands::MoveNegative => {
            library.trigger_reindex()?;
            let report = library.move_negative()?;
            serde_json::to_value(MovePayload {
                status: "ok",
                moved: report.moved_files.len(),
                failed: report.failed_files.len(),
                moved_files: report.moved_files,
                failed_files: report.failed_files,
            })?
        }
    };
    Ok(value)
}

// -- Logging --

/// Console output on stderr (stdout carries the JSON payload) plus a daily
/// rolling `webviewer.log` in the metadata directory.
fn init_logging(metadata_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(metadata_dir)
        .with_context(|| format!("Failed to create metadata dir: {}", metadata_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(metadata_dir, "webviewer.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

// -- Main --

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.library_config();
    let _guard = init_logging(&config.metadata_dir)?;

    info!(root = %config.root.display(), "starting webviewer");
    let library = Library::open(config)?;

    match run(&library, cli.command) {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            let rejected = e
                .downcast_ref::<LibraryError>()
                .filter(|err| err.is_client_error())
                .map(|err| err.to_string());
            match rejected {
                Some(error) => {
                    println!("{}", serde_json::to_string_pretty(&ErrorPayload { error })?);
                    Ok(ExitCode::from(2))
                }
                None => Err(e),
            }
        }
    }
}
