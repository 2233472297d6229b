//! Scripted [`AudioEngine`] for state machine tests.
//!
//! Clones share one state so a test can keep a probe after handing the engine
//! to a `SessionMachine`.

use super::engine::{AudioEngine, CaptureHandle, HandleId, PlaybackHandle, PlaybackStatus, StatusSender};
use crate::error::AudioError;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Open {
    Capture(HandleId),
    Playback(HandleId),
}

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<String>,
    pub open: Option<Open>,
    pub next_id: u64,
    pub capture_dir: PathBuf,
    pub permission: bool,
    pub permission_requests: usize,
    pub captures_opened: usize,
    pub playbacks_opened: usize,
    pub releases: usize,
    pub empty_capture: bool,
    pub fail_load: bool,
    pub capture_delay: Option<Duration>,
    pub loaded_uri: Option<PathBuf>,
    /// Whether the loaded file still existed when its handle was released
    pub uri_existed_on_release: Vec<bool>,
    pub subscribers: HashMap<HandleId, StatusSender>,
}

#[derive(Clone)]
pub struct MockEngine {
    state: Rc<RefCell<MockState>>,
}

impl MockEngine {
    pub fn new(capture_dir: &Path) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                capture_dir: capture_dir.to_path_buf(),
                permission: true,
                ..MockState::default()
            })),
        }
    }

    pub fn state(&self) -> std::cell::RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    /// Deliver a status update the way the native ticker would
    pub fn emit(&self, handle: PlaybackHandle, position: f64, duration: f64, did_finish: bool) {
        let mut state = self.state.borrow_mut();
        let tx = state.subscribers.get(&handle.0).cloned();
        if did_finish {
            state.subscribers.remove(&handle.0);
            if state.open == Some(Open::Playback(handle.0)) {
                state.open = None;
            }
        }
        drop(state);

        if let Some(tx) = tx {
            let _ = tx.send(PlaybackStatus {
                handle,
                position_seconds: position,
                duration_seconds: duration,
                is_loaded: true,
                did_finish,
            });
        }
    }

    pub fn current_playback(&self) -> Option<PlaybackHandle> {
        match self.state.borrow().open {
            Some(Open::Playback(id)) => Some(PlaybackHandle(id)),
            _ => None,
        }
    }

    fn acquire(&self, open: impl FnOnce(HandleId) -> Open) -> Result<HandleId, AudioError> {
        let mut state = self.state.borrow_mut();
        if state.open.is_some() {
            return Err(AudioError::DeviceBusy);
        }
        state.next_id += 1;
        let id = HandleId(state.next_id);
        state.open = Some(open(id));
        Ok(id)
    }

    fn check_playback(&self, handle: PlaybackHandle, call: &str) -> Result<(), AudioError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("{} {}", call, handle.0));
        if state.open == Some(Open::Playback(handle.0)) {
            Ok(())
        } else {
            Err(AudioError::InvalidHandle)
        }
    }
}

#[async_trait(?Send)]
impl AudioEngine for MockEngine {
    async fn request_permission(&mut self) -> Result<bool, AudioError> {
        let mut state = self.state.borrow_mut();
        state.permission_requests += 1;
        state.calls.push("request_permission".into());
        Ok(state.permission)
    }

    async fn start_capture(&mut self) -> Result<CaptureHandle, AudioError> {
        let delay = {
            let mut state = self.state.borrow_mut();
            state.calls.push("start_capture".into());
            state.capture_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let id = self.acquire(Open::Capture)?;
        self.state.borrow_mut().captures_opened += 1;
        Ok(CaptureHandle(id))
    }

    async fn stop_capture(&mut self, handle: CaptureHandle) -> Result<PathBuf, AudioError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("stop_capture {}", handle.0));
        if state.open != Some(Open::Capture(handle.0)) {
            return Err(AudioError::InvalidHandle);
        }
        state.open = None;

        if state.empty_capture {
            return Err(AudioError::Capture("no audio was captured".into()));
        }

        let path = state.capture_dir.join(format!("capture-{}.wav", handle.0.0));
        std::fs::write(&path, b"RIFF-fake-take")
            .map_err(|e| AudioError::Capture(e.to_string()))?;
        Ok(path)
    }

    async fn load_and_play(&mut self, uri: &Path) -> Result<PlaybackHandle, AudioError> {
        {
            let mut state = self.state.borrow_mut();
            state.calls.push("load_and_play".into());
            if state.fail_load || !uri.exists() {
                return Err(AudioError::Playback(format!("cannot open {:?}", uri)));
            }
        }
        let id = self.acquire(Open::Playback)?;
        let mut state = self.state.borrow_mut();
        state.playbacks_opened += 1;
        state.loaded_uri = Some(uri.to_path_buf());
        Ok(PlaybackHandle(id))
    }

    fn pause(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.check_playback(handle, "pause")
    }

    fn resume(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.check_playback(handle, "resume")
    }

    fn seek(&mut self, handle: PlaybackHandle, _position_seconds: f64) -> Result<(), AudioError> {
        self.check_playback(handle, "seek")
    }

    fn stop(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.check_playback(handle, "stop")
    }

    fn release(&mut self, handle: PlaybackHandle) -> Result<(), AudioError> {
        self.check_playback(handle, "release")?;
        let mut state = self.state.borrow_mut();
        state.open = None;
        state.releases += 1;
        state.subscribers.remove(&handle.0);
        let existed = state.loaded_uri.as_deref().is_some_and(Path::exists);
        state.uri_existed_on_release.push(existed);
        Ok(())
    }

    fn subscribe(&mut self, handle: PlaybackHandle, tx: StatusSender) -> Result<(), AudioError> {
        self.check_playback(handle, "subscribe")?;
        self.state.borrow_mut().subscribers.insert(handle.0, tx);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
