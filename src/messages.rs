use crate::error::SessionError;
use crate::storage::Recording;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::oneshot;

/// User intents issued by the shell
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    BeginRecording,
    FinishRecording,
    CancelRecording,
    TogglePlayback,
    Save,
    Discard,
    OpenLibraryItem(String),
    Seek(f64),
    Close,
    DeleteRecording(String),
    Refresh,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::BeginRecording => "begin recording",
            Intent::FinishRecording => "finish recording",
            Intent::CancelRecording => "cancel recording",
            Intent::TogglePlayback => "toggle playback",
            Intent::Save => "save",
            Intent::Discard => "discard",
            Intent::OpenLibraryItem(_) => "open recording",
            Intent::Seek(_) => "seek",
            Intent::Close => "close",
            Intent::DeleteRecording(_) => "delete recording",
            Intent::Refresh => "refresh library",
        }
    }
}

/// Commands for the session service
pub struct SessionCommand {
    pub intent: Intent,
    pub reply: oneshot::Sender<Result<(), SessionError>>,
}

/// The single active audio activity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    Idle,
    Recording {
        started_at: DateTime<Utc>,
        elapsed_seconds: u64,
    },
    /// A fresh capture waiting to be saved or discarded
    Previewing {
        source: PathBuf,
        position_seconds: f64,
        duration_seconds: f64,
        is_playing: bool,
    },
    /// Playback of a saved library item
    Playing {
        recording: Recording,
        position_seconds: f64,
        duration_seconds: f64,
        is_playing: bool,
    },
}

impl Session {
    pub fn label(&self) -> &'static str {
        match self {
            Session::Idle => "idle",
            Session::Recording { .. } => "recording",
            Session::Previewing { .. } => "previewing",
            Session::Playing { .. } => "playing",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Session::Idle)
    }

    pub fn is_playing(&self) -> bool {
        match self {
            Session::Previewing { is_playing, .. } | Session::Playing { is_playing, .. } => {
                *is_playing
            }
            _ => false,
        }
    }

    /// Playback progress in percent, for the progress bar
    pub fn progress_percent(&self) -> Option<f64> {
        match self {
            Session::Previewing {
                position_seconds,
                duration_seconds,
                ..
            }
            | Session::Playing {
                position_seconds,
                duration_seconds,
                ..
            } => {
                if *duration_seconds > 0.0 {
                    Some((position_seconds / duration_seconds * 100.0).clamp(0.0, 100.0))
                } else {
                    Some(0.0)
                }
            }
            _ => None,
        }
    }
}

/// Everything the shell renders, published on every change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub session: Session,
    pub library: Vec<Recording>,
    pub last_error: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            session: Session::Idle,
            library: Vec::new(),
            last_error: None,
        }
    }
}
