use super::capture::AudioCapture;
use super::engine::{AudioEngine, CaptureHandle, HandleId, PlaybackHandle, PlaybackStatus, StatusSender};
use super::format::AudioFormat;
use super::playback::{Player, Transport};
use super::sink::AudioSink;
use super::wav_sink::WavSink;
use crate::error::AudioError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum Slot {
    Empty,
    Capture(ActiveCapture),
    Playback(ActivePlayback),
}

struct ActiveCapture {
    id: HandleId,
    capture: AudioCapture,
    pump: JoinHandle<Result<Box<dyn AudioSink>>>,
    path: PathBuf,
}

struct ActivePlayback {
    id: HandleId,
    player: Box<dyn Transport>,
    ticker: Option<JoinHandle<()>>,
}

impl Drop for ActivePlayback {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// cpal capture, hound encoding and rodio playback behind [`AudioEngine`]
///
/// Holds a `cpal::Stream` while recording, which is !Send, so the engine and
/// everything driving it must run on a LocalSet.
pub struct NativeEngine {
    format: AudioFormat,
    capture_dir: PathBuf,
    status_interval: Duration,
    next_id: u64,
    // Shared with the status ticker so a finished clip can release itself
    slot: Rc<RefCell<Slot>>,
}

impl NativeEngine {
    pub fn new(format: AudioFormat, capture_dir: PathBuf, status_interval: Duration) -> Self {
        Self {
            format,
            capture_dir,
            status_interval,
            next_id: 0,
            slot: Rc::new(RefCell::new(Slot::Empty)),
        }
    }

    fn next_handle(&mut self) -> HandleId {
        self.next_id += 1;
        HandleId(self.next_id)
    }

    fn ensure_free(&self) -> Result<(), AudioError> {
        match *self.slot.borrow() {
            Slot::Empty => Ok(()),
            _ => Err(AudioError::DeviceBusy),
        }
    }

    fn with_player<T>(
        &self,
        handle: PlaybackHandle,
        f: impl FnOnce(&dyn Transport) -> Result<T, AudioError>,
    ) -> Result<T, AudioError> {
        match &*self.slot.borrow() {
            Slot::Playback(active) if active.id == handle.0 => f(active.player.as_ref()),
            _ => Err(AudioError::InvalidHandle),
        }
    }

    fn open_capture(&mut self) -> Result<ActiveCapture> {
        std::fs::create_dir_all(&self.capture_dir)
            .with_context(|| format!("Failed to create capture directory {:?}", self.capture_dir))?;

        let path = tempfile::Builder::new()
            .prefix("capture-")
            .suffix(".wav")
            .tempfile_in(&self.capture_dir)
            .context("Failed to create temp file")?
            .into_temp_path()
            .keep()
            .context("Failed to persist temp file")?;

        let mut sink: Box<dyn AudioSink> = Box::new(WavSink::new(&path, self.format)?);
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<f32>>(100);

        let capture = match AudioCapture::start(self.format, audio_tx) {
            Ok(capture) => capture,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        };

        // Streams chunks into the sink until the capture bridge hangs up
        let pump = tokio::task::spawn_local(async move {
            while let Some(chunk) = audio_rx.recv().await {
                sink.write_chunk(chunk)?;
            }
            Ok::<_, anyhow::Error>(sink)
        });

        Ok(ActiveCapture {
            id: self.next_handle(),
            capture,
            pump,
            path,
        })
    }

    /// Take the slot for a loaded clip
    fn install_playback(&mut self, player: Box<dyn Transport>) -> PlaybackHandle {
        let id = self.next_handle();
        *self.slot.borrow_mut() = Slot::Playback(ActivePlayback {
            id,
            player,
            ticker: None,
        });
        PlaybackHandle(id)
    }

    async fn close_capture(active: ActiveCapture) -> Result<(PathBuf, u64)> {
        let ActiveCapture {
            capture,
            pump,
            path,
            ..
        } = active;

        capture.stop();
        let mut sink = pump.await.context("Capture pump panicked")??;
        let samples = sink.finalize().await?;
        Ok((path, samples))
    }

    async fn run_ticker(
        slot: Rc<RefCell<Slot>>,
        handle: PlaybackHandle,
        tx: StatusSender,
        period: Duration,
    ) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            let status = {
                let mut slot = slot.borrow_mut();
                let Slot::Playback(active) = &*slot else {
                    return;
                };
                if active.id != handle.0 {
                    return;
                }

                let finished = active.player.is_finished();
                let duration = active.player.duration().as_secs_f64();
                let status = PlaybackStatus {
                    handle,
                    position_seconds: if finished {
                        duration
                    } else {
                        active.player.position().as_secs_f64()
                    },
                    duration_seconds: duration,
                    is_loaded: true,
                    did_finish: finished,
                };

                if finished {
                    // Auto-release; this task is the one being torn down, so
                    // detach it before the slot drops the playback
                    if let Slot::Playback(active) = &mut *slot {
                        active.ticker = None;
                    }
                    *slot = Slot::Empty;
                    tracing::debug!("Playback {} finished and released", handle.0);
                }
                status
            };

            if tx.send(status).is_err() || status.did_finish {
                return;
            }
        }
    }
}

#[async_trait(?Send)]
impl AudioEngine for NativeEngine {
    async fn request_permission(&mut self) -> Result<bool, AudioError> {
        // Desktop hosts have no consent prompt; a reachable input device is the grant
        if AudioCapture::input_available() {
            Ok(true)
        } else {
            tracing::warn!("No input device reachable");
            Err(AudioError::PermissionDenied)
        }
    }

    async fn start_capture(&mut self) -> Result<CaptureHandle, AudioError> {
        self.ensure_free()?;

        let active = self
            .open_capture()
            .map_err(|e| AudioError::Capture(format!("{:#}", e)))?;
        let handle = CaptureHandle(active.id);
        tracing::info!("Capture {} recording to {:?}", active.id, active.path);

        *self.slot.borrow_mut() = Slot::Capture(active);
        Ok(handle)
    }

    async fn stop_capture(&mut self, handle: CaptureHandle) -> Result<PathBuf, AudioError> {
        let active = {
            let mut slot = self.slot.borrow_mut();
            if !matches!(&*slot, Slot::Capture(active) if active.id == handle.0) {
                return Err(AudioError::InvalidHandle);
            }
            match std::mem::replace(&mut *slot, Slot::Empty) {
                Slot::Capture(active) => active,
                _ => return Err(AudioError::InvalidHandle),
            }
        };

        let temp = active.path.clone();
        let (path, samples) = Self::close_capture(active).await.map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            AudioError::Capture(format!("{:#}", e))
        })?;

        if samples == 0 {
            let _ = std::fs::remove_file(&path);
            return Err(AudioError::Capture("no audio was captured".to_string()));
        }

        tracing::info!(
            "Capture {} finished: {:.1}s in {:?}",
            handle.0,
            self.format.duration_of(samples).as_secs_f64(),
            path
        );
        Ok(path)
    }

    async fn load_and_play(&mut self, uri: &Path) -> Result<PlaybackHandle, AudioError> {
        self.ensure_free()?;

        let player = Player::open(uri).map_err(|e| AudioError::Playback(format!("{:#}", e)))?;
        let handle = self.install_playback(Box::new(player));
        tracing::info!("Playback {} started for {:?}", handle.0, uri);
        Ok(handle)
    }

    fn pause(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.with_player(handle, |player| {
            player.pause();
            Ok(())
        })
    }

    fn resume(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.with_player(handle, |player| {
            player.resume();
            Ok(())
        })
    }

    fn seek(&mut self, handle: PlaybackHandle, position_seconds: f64) -> Result<(), AudioError> {
        let position = Duration::try_from_secs_f64(position_seconds)
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        self.with_player(handle, |player| {
            player
                .seek(position)
                .map_err(|e| AudioError::Playback(format!("{:#}", e)))
        })
    }

    fn stop(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.with_player(handle, |player| {
            player.stop();
            Ok(())
        })
    }

    fn release(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        let mut slot = self.slot.borrow_mut();
        if !matches!(&*slot, Slot::Playback(active) if active.id == handle.0) {
            return Err(AudioError::InvalidHandle);
        }

        *slot = Slot::Empty;
        tracing::debug!("Playback {} released", handle.0);
        Ok(())
    }

    fn subscribe(&mut self, handle: PlaybackHandle, tx: StatusSender) -> Result<(), AudioError> {
        let mut slot = self.slot.borrow_mut();
        let Slot::Playback(active) = &mut *slot else {
            return Err(AudioError::InvalidHandle);
        };
        if active.id != handle.0 {
            return Err(AudioError::InvalidHandle);
        }

        let ticker = tokio::task::spawn_local(Self::run_ticker(
            Rc::clone(&self.slot),
            handle,
            tx,
            self.status_interval,
        ));
        if let Some(previous) = active.ticker.replace(ticker) {
            previous.abort();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "native"
    }
}
