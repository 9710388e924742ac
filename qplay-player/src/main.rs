//! qplay - Main entry point
//!
//! Terminal music player daemon: reads playback commands from stdin, prints
//! player events to stdout, and keeps the queue fed in the background.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qplay_common::{config::Config, PlayerEvent, TrackId};
use qplay_player::acquisition::{AcquisitionIndex, AcquisitionScheduler, CommandFetcher};
use qplay_player::backend::RodioBackend;
use qplay_player::{monitor, PlayQueue, PlaybackEngine, SharedState};

/// Command-line arguments for qplay
#[derive(Parser, Debug)]
#[command(name = "qplay")]
#[command(about = "Queue-driven terminal music player")]
#[command(version)]
struct Args {
    /// Path to a config file (overrides the default lookup)
    #[arg(short, long, env = "QPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory for acquired tracks (overrides the config file)
    #[arg(long, env = "QPLAY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Print events as JSON lines instead of human-readable text
    #[arg(long)]
    json: bool,

    /// Track ids to enqueue at startup
    tracks: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qplay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }

    info!("Starting qplay");
    info!("Cache directory: {}", config.cache_dir.display());

    // Shared infrastructure
    let state = Arc::new(SharedState::new(config.event_capacity));
    let queue = PlayQueue::new();
    let wake = Arc::new(Notify::new());
    let index = Arc::new(
        AcquisitionIndex::load(config.index_path()).context("Failed to load track index")?,
    );
    let fetcher = Arc::new(CommandFetcher::new(&config));
    let backend = Arc::new(RodioBackend::new().context("Failed to open audio output")?);

    let engine = Arc::new(PlaybackEngine::new(
        state.clone(),
        queue.clone(),
        index.clone(),
        fetcher.clone(),
        backend,
        wake.clone(),
    ));

    // Background tasks
    let scheduler = Arc::new(AcquisitionScheduler::new(
        queue.clone(),
        index,
        fetcher,
        state.clone(),
        wake,
        &config,
    ));
    tokio::spawn(scheduler.run());
    monitor::start_monitoring(engine.clone(), config.watch_interval());
    tokio::spawn(event_printer(state.clone(), args.json));

    // Anything given on the command line starts playing immediately
    if !args.tracks.is_empty() {
        let tracks: Vec<TrackId> = args.tracks.iter().map(|t| TrackId::from(t.as_str())).collect();
        engine.enqueue_many(tracks).await?;
        if let Err(e) = engine.play_queue().await {
            warn!("Could not start initial playback: {}", e);
        }
    }

    // Command loop until EOF, `quit`, or Ctrl+C
    tokio::select! {
        result = command_loop(engine.clone()) => result?,
        _ = shutdown_signal() => {}
    }

    engine.quit().await;
    info!("Shutdown complete");
    Ok(())
}

/// Read commands from stdin, one per line
async fn command_loop(engine: Arc<PlaybackEngine>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            continue;
        };

        let result = match command {
            "add" => {
                let tracks: Vec<TrackId> = parts.map(TrackId::from).collect();
                if tracks.is_empty() {
                    println!("usage: add <track-id> [track-id ...]");
                    continue;
                }
                engine.enqueue_many(tracks).await
            }
            "play" => match parts.next() {
                Some(id) => engine.force_play(TrackId::from(id), false).await,
                None => engine.play_queue().await,
            },
            "pause" => engine.pause().await,
            "resume" => engine.unpause().await,
            "skip" => engine.skip_forward().await,
            "queue" => {
                for track in engine.queue().snapshot().await {
                    println!("  {}", track);
                }
                continue;
            }
            "now" => {
                match engine.state().current_track().await {
                    Some(track) => println!(
                        "  {} ({:?})",
                        track,
                        engine.state().playback_state().await
                    ),
                    None => println!("  (nothing playing)"),
                }
                continue;
            }
            "quit" => break,
            other => {
                println!("unknown command: {}", other);
                println!("commands: add play pause resume skip queue now quit");
                continue;
            }
        };

        if let Err(e) = result {
            println!("error: {}", e);
        }
    }

    Ok(())
}

/// Print player events to stdout as they arrive
async fn event_printer(state: Arc<SharedState>, json: bool) {
    let mut rx = state.subscribe();

    loop {
        match rx.recv().await {
            Ok(event) => {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!("Failed to serialize event: {}", e),
                    }
                } else {
                    print_event(&event);
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event printer lagged, {} events dropped", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::SongChanged {
            track: Some(track), ..
        } => println!("-> now playing: {}", track),
        PlayerEvent::SongChanged { track: None, .. } => println!("-> playback finished"),
        PlayerEvent::QueueChanged { .. } => {}
        PlayerEvent::PlaybackStateChanged { state, .. } => println!("-> state: {:?}", state),
        PlayerEvent::TrackUnavailable { track, .. } => {
            println!("-> could not fetch {}, skipped", track)
        }
        PlayerEvent::BackendError { message, .. } => println!("-> audio error: {}", message),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
