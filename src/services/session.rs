use crate::audio::{AudioEngine, AudioHandle, PlaybackHandle, PlaybackStatus};
use crate::error::{AudioError, SessionError, StorageError};
use crate::messages::{Intent, Session, SessionCommand, Snapshot};
use crate::storage::{Recording, StorageGateway};
use chrono::Utc;
use futures::future::OptionFuture;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval};

const TICK: Duration = Duration::from_secs(1);

/// Owns the one active recording/preview/playback session
///
/// All intents, engine status updates and timer ticks are handled one at a
/// time inside [`SessionMachine::run`], so session state is only ever touched
/// from a single logical thread. Intents sent while another is still being
/// handled wait in the command channel.
///
/// Engines may be !Send (the native one holds a `cpal::Stream`), so the
/// machine is spawned with `tokio::task::spawn_local`.
pub struct SessionMachine<E: AudioEngine> {
    engine: E,
    storage: StorageGateway,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    state_tx: watch::Sender<Snapshot>,
    status_tx: mpsc::UnboundedSender<PlaybackStatus>,
    status_rx: mpsc::UnboundedReceiver<PlaybackStatus>,
    session: Session,
    handle: Option<AudioHandle>,
    library: Vec<Recording>,
    last_error: Option<String>,
    permission_granted: bool,
    ticker: Option<Interval>,
}

impl<E: AudioEngine> SessionMachine<E> {
    pub fn new(
        engine: E,
        storage: StorageGateway,
        cmd_rx: mpsc::Receiver<SessionCommand>,
        state_tx: watch::Sender<Snapshot>,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            storage,
            cmd_rx,
            state_tx,
            status_tx,
            status_rx,
            session: Session::Idle,
            handle: None,
            library: Vec::new(),
            last_error: None,
            permission_granted: false,
            ticker: None,
        }
    }

    /// Prepare the audio directory and load the library
    pub fn start(&mut self) {
        tracing::info!(
            "Session service starting on {} engine, library at {:?}",
            self.engine.name(),
            self.storage.dir()
        );

        if let Err(e) = self.storage.ensure_directory().and_then(|_| self.scan()) {
            tracing::error!("Failed to load library: {}", e);
            self.last_error = Some(e.to_string());
        }
        self.publish();
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(SessionCommand { intent, reply }) = cmd else {
                        break;
                    };
                    let result = self.apply(intent).await;
                    let _ = reply.send(result);
                }

                Some(status) = self.status_rx.recv() => {
                    self.on_status(status);
                }

                Some(_) = OptionFuture::from(self.ticker.as_mut().map(|t| t.tick())) => {
                    self.on_tick();
                }
            }
        }

        tracing::info!("Session service stopping");
        self.teardown().await;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn library(&self) -> &[Recording] {
        &self.library
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session: self.session.clone(),
            library: self.library.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Handle one intent to completion
    pub async fn apply(&mut self, intent: Intent) -> Result<(), SessionError> {
        tracing::debug!("Intent {:?} while {}", intent, self.session.label());
        self.last_error = None;

        let label = intent.label();
        let result = match intent {
            Intent::BeginRecording => self.begin_recording().await,
            Intent::FinishRecording => self.finish_recording().await,
            Intent::CancelRecording => self.cancel_recording().await,
            Intent::TogglePlayback => self.toggle_playback().await,
            Intent::Save => self.save(),
            Intent::Discard => self.discard(),
            Intent::OpenLibraryItem(id) => self.open_library_item(&id).await,
            Intent::Seek(position) => self.seek(position).await,
            Intent::Close => self.close(),
            Intent::DeleteRecording(id) => self.delete_recording(&id).await,
            Intent::Refresh => self.refresh().await,
        };

        if let Err(e) = &result {
            tracing::error!("Failed to {}: {}", label, e);
            self.last_error = Some(e.to_string());
        }
        self.publish();
        result
    }

    async fn begin_recording(&mut self) -> Result<(), SessionError> {
        if !self.session.is_idle() {
            return Err(AudioError::DeviceBusy.into());
        }

        if !self.permission_granted {
            match self.engine.request_permission().await {
                Ok(true) => self.permission_granted = true,
                Ok(false) => return Err(self.reset(AudioError::PermissionDenied).await),
                Err(e) => return Err(self.reset(e).await),
            }
        }

        let capture = match self.engine.start_capture().await {
            Ok(capture) => capture,
            Err(e) => return Err(self.reset(e).await),
        };

        self.handle = Some(AudioHandle::Capture(capture));
        self.session = Session::Recording {
            started_at: Utc::now(),
            elapsed_seconds: 0,
        };
        self.ticker = Some(tokio::time::interval_at(Instant::now() + TICK, TICK));
        tracing::info!("Recording started");
        Ok(())
    }

    async fn finish_recording(&mut self) -> Result<(), SessionError> {
        if !matches!(self.session, Session::Recording { .. }) {
            return Err(self.unexpected("finish recording"));
        }
        self.ticker = None;

        let Some(AudioHandle::Capture(capture)) = self.handle.take() else {
            return Err(self.reset(AudioError::InvalidHandle).await);
        };

        match self.engine.stop_capture(capture).await {
            Ok(source) => {
                tracing::info!("Recording finished, previewing {:?}", source);
                self.session = Session::Previewing {
                    source,
                    position_seconds: 0.0,
                    duration_seconds: 0.0,
                    is_playing: false,
                };
                Ok(())
            }
            Err(e) => Err(self.reset(e).await),
        }
    }

    async fn cancel_recording(&mut self) -> Result<(), SessionError> {
        if !matches!(self.session, Session::Recording { .. }) {
            return Err(self.unexpected("cancel recording"));
        }
        self.ticker = None;
        self.session = Session::Idle;

        let Some(AudioHandle::Capture(capture)) = self.handle.take() else {
            return Ok(());
        };

        match self.engine.stop_capture(capture).await {
            Ok(temp) => self.storage.discard_capture(&temp)?,
            // Nothing was written, so there is nothing to throw away
            Err(AudioError::Capture(reason)) => tracing::debug!("Cancelled empty capture: {}", reason),
            Err(e) => return Err(self.reset(e).await),
        }

        tracing::info!("Recording cancelled");
        Ok(())
    }

    async fn toggle_playback(&mut self) -> Result<(), SessionError> {
        let is_playing = match &self.session {
            Session::Previewing { is_playing, .. } | Session::Playing { is_playing, .. } => {
                *is_playing
            }
            _ => return Err(self.unexpected("toggle playback")),
        };

        let playback = match self.handle {
            Some(AudioHandle::Playback(playback)) => playback,
            Some(AudioHandle::Capture(_)) => {
                return Err(self.reset(AudioError::InvalidHandle).await);
            }
            None => {
                // First toggle on a preview, or the preview already ran out
                let Session::Previewing { source, .. } = &self.session else {
                    return Err(self.reset(AudioError::InvalidHandle).await);
                };
                let source = source.clone();
                self.load(source).await?;
                self.set_playing(true, Some(0.0));
                return Ok(());
            }
        };

        let result = if is_playing {
            self.engine.pause(playback)
        } else {
            self.engine.resume(playback)
        };
        match result {
            Ok(()) => {}
            Err(AudioError::InvalidHandle) => {
                self.playback_ended(playback);
                return Ok(());
            }
            Err(e) => return Err(self.reset(e).await),
        }

        self.set_playing(!is_playing, None);
        Ok(())
    }

    fn save(&mut self) -> Result<(), SessionError> {
        let Session::Previewing { source, .. } = &self.session else {
            return Err(self.unexpected("save"));
        };
        let source = source.clone();
        self.release_playback();

        match self.storage.save_recording(&source) {
            Ok(recording) => {
                if !self.library.iter().any(|r| r.id == recording.id) {
                    self.library.push(recording);
                }
                self.session = Session::Idle;
                Ok(())
            }
            Err(e) => {
                // Keep the clip so the user can retry or discard explicitly
                self.session = Session::Previewing {
                    source,
                    position_seconds: 0.0,
                    duration_seconds: 0.0,
                    is_playing: false,
                };
                Err(e.into())
            }
        }
    }

    fn discard(&mut self) -> Result<(), SessionError> {
        let Session::Previewing { source, .. } = &self.session else {
            return Err(self.unexpected("discard"));
        };
        let source = source.clone();
        self.release_playback();
        self.session = Session::Idle;

        self.storage.discard_capture(&source)?;
        tracing::info!("Preview discarded");
        Ok(())
    }

    async fn open_library_item(&mut self, id: &str) -> Result<(), SessionError> {
        if !self.session.is_idle() {
            return Err(AudioError::DeviceBusy.into());
        }

        let recording = self
            .library
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        self.load(recording.uri.clone()).await?;
        self.session = Session::Playing {
            recording,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            is_playing: true,
        };
        Ok(())
    }

    async fn seek(&mut self, position: f64) -> Result<(), SessionError> {
        let (Session::Playing { duration_seconds, .. }, Some(AudioHandle::Playback(playback))) =
            (&self.session, self.handle)
        else {
            return Err(self.unexpected("seek"));
        };

        let duration = *duration_seconds;
        if !(0.0..=duration).contains(&position) {
            return Err(SessionError::SeekOutOfRange { position, duration });
        }

        match self.engine.seek(playback, position) {
            Ok(()) => {}
            Err(AudioError::InvalidHandle) => {
                self.playback_ended(playback);
                return Ok(());
            }
            Err(e) => return Err(self.reset(e).await),
        }
        if let Session::Playing {
            position_seconds, ..
        } = &mut self.session
        {
            *position_seconds = position;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        if !matches!(self.session, Session::Playing { .. }) {
            return Err(self.unexpected("close"));
        }
        self.release_playback();
        self.session = Session::Idle;
        Ok(())
    }

    async fn delete_recording(&mut self, id: &str) -> Result<(), SessionError> {
        let playing_it = matches!(&self.session, Session::Playing { recording, .. } if recording.id == id);
        if playing_it {
            tracing::info!("Stopping playback of {} before deleting it", id);
            self.release_playback();
            self.session = Session::Idle;
        }

        if let Err(e) = self.storage.delete_recording(id) {
            return Err(self.reset(e).await);
        }
        self.library.retain(|r| r.id != id);
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), SessionError> {
        if let Err(e) = self.scan() {
            return Err(self.reset(e).await);
        }
        Ok(())
    }

    fn scan(&mut self) -> Result<(), StorageError> {
        let mut library: Vec<Recording> = self.storage.list_recordings()?.collect();
        library.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!("Library holds {} recordings", library.len());
        self.library = library;
        Ok(())
    }

    /// One-second tick while recording
    pub fn on_tick(&mut self) {
        match &mut self.session {
            Session::Recording {
                elapsed_seconds, ..
            } => {
                *elapsed_seconds += 1;
                self.publish();
            }
            _ => self.ticker = None,
        }
    }

    /// Position update from the engine
    pub fn on_status(&mut self, status: PlaybackStatus) {
        if self.handle != Some(AudioHandle::Playback(status.handle)) {
            tracing::debug!("Dropping status for stale handle {}", status.handle.0);
            return;
        }

        if status.is_loaded {
            if let Session::Previewing {
                position_seconds,
                duration_seconds,
                ..
            }
            | Session::Playing {
                position_seconds,
                duration_seconds,
                ..
            } = &mut self.session
            {
                *position_seconds = status.position_seconds;
                *duration_seconds = status.duration_seconds;
            }
        }

        if status.did_finish {
            self.playback_ended(status.handle);
        }
        self.publish();
    }

    /// The engine finished and released `playback` on its own.
    ///
    /// Reached through the `did_finish` status, or earlier when a transport
    /// call races that status and finds the handle already gone. A preview
    /// keeps its take; library playback returns to Idle.
    fn playback_ended(&mut self, playback: PlaybackHandle) {
        if self.handle != Some(AudioHandle::Playback(playback)) {
            return;
        }
        self.handle = None;

        match &mut self.session {
            Session::Previewing { is_playing, .. } => *is_playing = false,
            Session::Playing { .. } => {
                tracing::info!("Playback finished");
                self.session = Session::Idle;
            }
            _ => {}
        }
    }

    async fn load(&mut self, uri: PathBuf) -> Result<(), SessionError> {
        let playback = match self.engine.load_and_play(&uri).await {
            Ok(playback) => playback,
            Err(e) => return Err(self.reset(e).await),
        };
        self.handle = Some(AudioHandle::Playback(playback));

        if let Err(e) = self.engine.subscribe(playback, self.status_tx.clone()) {
            return Err(self.reset(e).await);
        }
        Ok(())
    }

    fn set_playing(&mut self, playing: bool, position: Option<f64>) {
        if let Session::Previewing {
            is_playing,
            position_seconds,
            ..
        }
        | Session::Playing {
            is_playing,
            position_seconds,
            ..
        } = &mut self.session
        {
            *is_playing = playing;
            if let Some(position) = position {
                *position_seconds = position;
            }
        }
    }

    /// Stop and release the playback handle, if one is open
    fn release_playback(&mut self) {
        let Some(AudioHandle::Playback(playback)) = self.handle else {
            return;
        };
        self.handle = None;
        Self::stop_and_release(&mut self.engine, playback);
    }

    fn stop_and_release(engine: &mut E, playback: PlaybackHandle) {
        if let Err(e) = engine.stop(playback) {
            tracing::warn!("Failed to stop playback {}: {}", playback.0, e);
        }
        if let Err(e) = engine.release(playback) {
            tracing::warn!("Failed to release playback {}: {}", playback.0, e);
        }
    }

    /// Release everything the session holds and fall back to Idle
    async fn teardown(&mut self) {
        self.ticker = None;

        match self.handle.take() {
            Some(AudioHandle::Capture(capture)) => match self.engine.stop_capture(capture).await {
                Ok(temp) => {
                    if let Err(e) = self.storage.discard_capture(&temp) {
                        tracing::warn!("{}", e);
                    }
                }
                Err(e) => tracing::debug!("Capture closed without a take: {}", e),
            },
            Some(AudioHandle::Playback(playback)) => {
                Self::stop_and_release(&mut self.engine, playback);
            }
            None => {}
        }

        if let Session::Previewing { source, .. } = &self.session {
            if let Err(e) = self.storage.discard_capture(source) {
                tracing::warn!("{}", e);
            }
        }
        self.session = Session::Idle;
    }

    /// Recover from an engine or storage failure
    async fn reset(&mut self, error: impl Into<SessionError>) -> SessionError {
        let error = error.into();
        tracing::warn!("Resetting session after failure: {}", error);
        self.teardown().await;
        error
    }

    fn unexpected(&self, intent: &'static str) -> SessionError {
        SessionError::UnexpectedIntent {
            intent,
            session: self.session.label(),
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }
}

/// Handle for communicating with the [`SessionMachine`]
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, intent: Intent) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand { intent, reply })
            .await
            .map_err(|_| SessionError::Closed)?;

        rx.await.map_err(|_| SessionError::Closed)?
    }
}
