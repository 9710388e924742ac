//! Audio backend
//!
//! `AudioBackend` is the seam to actual audio output. The stock
//! implementation drives rodio from a dedicated OS thread (the output stream
//! handle is not `Send`), taking commands over a channel and answering
//! queries over per-call reply channels. Every operation is non-fatal: a
//! failure is reported to the caller, never allowed to crash the player.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Audio output abstraction
///
/// `load` hands a local resource to the backend and holds it paused; an
/// explicit `play` starts audible output. `is_busy` reports whether the
/// backend still has audio to produce, which drops to false at natural
/// end-of-track.
pub trait AudioBackend: Send + Sync {
    fn load(&self, path: &Path) -> Result<()>;
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn is_busy(&self) -> Result<bool>;

    /// Release backend resources; the backend is unusable afterwards
    fn release(&self) -> Result<()>;
}

enum AudioCommand {
    Load(PathBuf, Sender<Result<()>>),
    Play,
    Pause,
    Stop,
    IsBusy(Sender<bool>),
    Shutdown,
}

/// rodio-backed audio output on a dedicated thread
pub struct RodioBackend {
    tx: Sender<AudioCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RodioBackend {
    /// Open the default output device
    pub fn new() -> Result<Self> {
        let (tx, rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let handle = std::thread::Builder::new()
            .name("qplay-audio".to_string())
            .spawn(move || audio_thread(rx, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx,
                handle: Mutex::new(Some(handle)),
            }),
            Ok(Err(message)) => Err(Error::Backend(message)),
            Err(_) => Err(Error::Backend("audio thread exited early".to_string())),
        }
    }

    fn send(&self, command: AudioCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::Backend("audio thread unavailable".to_string()))
    }
}

impl AudioBackend for RodioBackend {
    fn load(&self, path: &Path) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(AudioCommand::Load(path.to_path_buf(), reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| Error::Backend("audio thread unavailable".to_string()))?
    }

    fn play(&self) -> Result<()> {
        self.send(AudioCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.send(AudioCommand::Pause)
    }

    fn stop(&self) -> Result<()> {
        self.send(AudioCommand::Stop)
    }

    fn is_busy(&self) -> Result<bool> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(AudioCommand::IsBusy(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| Error::Backend("audio thread unavailable".to_string()))
    }

    fn release(&self) -> Result<()> {
        // Idempotent: a second release finds the thread already gone
        let _ = self.tx.send(AudioCommand::Shutdown);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle
                .join()
                .map_err(|_| Error::Backend("audio thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        let _ = self.tx.send(AudioCommand::Shutdown);
    }
}

/// Audio thread body: owns the output stream and the current sink
fn audio_thread(rx: Receiver<AudioCommand>, ready: Sender<std::result::Result<(), String>>) {
    let (_stream, stream_handle) = match rodio::OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to open output device: {}", e)));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut sink: Option<rodio::Sink> = None;

    while let Ok(command) = rx.recv() {
        match command {
            AudioCommand::Load(path, reply) => {
                let result = open_sink(&stream_handle, &path).map(|new_sink| {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    sink = Some(new_sink);
                });
                let _ = reply.send(result);
            }
            AudioCommand::Play => {
                if let Some(sink) = &sink {
                    sink.play();
                }
            }
            AudioCommand::Pause => {
                if let Some(sink) = &sink {
                    sink.pause();
                }
            }
            AudioCommand::Stop => {
                if let Some(old) = sink.take() {
                    old.stop();
                }
            }
            AudioCommand::IsBusy(reply) => {
                let busy = sink.as_ref().map(|s| !s.empty()).unwrap_or(false);
                let _ = reply.send(busy);
            }
            AudioCommand::Shutdown => {
                debug!("Audio thread shutting down");
                break;
            }
        }
    }

    if let Some(old) = sink.take() {
        old.stop();
    }
}

/// Decode a file into a fresh sink, held paused
fn open_sink(handle: &rodio::OutputStreamHandle, path: &Path) -> Result<rodio::Sink> {
    let file = File::open(path)?;
    let source = rodio::Decoder::new(BufReader::new(file)).map_err(|e| {
        warn!("Failed to decode {}: {}", path.display(), e);
        Error::Backend(format!("cannot decode {}: {}", path.display(), e))
    })?;

    let sink = rodio::Sink::try_new(handle)
        .map_err(|e| Error::Backend(format!("cannot open sink: {}", e)))?;
    sink.pause();
    sink.append(source);
    Ok(sink)
}
