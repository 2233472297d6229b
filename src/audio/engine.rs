use crate::error::AudioError;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Opaque id of an open native audio resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub HandleId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(pub HandleId);

/// Whichever handle a session currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioHandle {
    Capture(CaptureHandle),
    Playback(PlaybackHandle),
}

/// Periodic position report for a playback handle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStatus {
    pub handle: PlaybackHandle,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub is_loaded: bool,
    /// The engine has already released the handle when this is set
    pub did_finish: bool,
}

pub type StatusSender = mpsc::UnboundedSender<PlaybackStatus>;

/// Capability surface over the platform audio APIs
///
/// At most one handle, capture or playback, is open at any time. Acquiring a
/// second one fails with [`AudioError::DeviceBusy`]; the caller must release
/// first. Implementations are driven from a single logical thread, so the
/// futures are not required to be Send.
#[async_trait(?Send)]
pub trait AudioEngine {
    /// Ask for microphone access. `Ok(false)` means the user declined.
    async fn request_permission(&mut self) -> Result<bool, AudioError>;

    /// Begin recording into a temporary file
    async fn start_capture(&mut self) -> Result<CaptureHandle, AudioError>;

    /// Finish the take and close the handle, returning the temporary file.
    /// An empty take fails with [`AudioError::Capture`] and leaves no file.
    async fn stop_capture(&mut self, handle: CaptureHandle) -> Result<PathBuf, AudioError>;

    /// Load a clip and start playing it right away
    async fn load_and_play(&mut self, uri: &Path) -> Result<PlaybackHandle, AudioError>;

    fn pause(&mut self, handle: PlaybackHandle) -> Result<(), AudioError>;

    fn resume(&mut self, handle: PlaybackHandle) -> Result<(), AudioError>;

    fn seek(&mut self, handle: PlaybackHandle, position_seconds: f64) -> Result<(), AudioError>;

    fn stop(&mut self, handle: PlaybackHandle) -> Result<(), AudioError>;

    /// Close the handle. No status is delivered for it afterwards.
    fn release(&mut self, handle: PlaybackHandle) -> Result<(), AudioError>;

    /// Deliver a [`PlaybackStatus`] for `handle` on every position update until
    /// it is released or finishes.
    fn subscribe(&mut self, handle: PlaybackHandle, tx: StatusSender) -> Result<(), AudioError>;

    /// Engine name for logging
    fn name(&self) -> &str;
}
