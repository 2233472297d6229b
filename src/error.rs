use thiserror::Error;

/// Failures reported by an [`AudioEngine`](crate::audio::AudioEngine)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device is busy")]
    DeviceBusy,

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("audio handle is no longer valid")]
    InvalidHandle,
}

/// Failures reported by the [`StorageGateway`](crate::storage::StorageGateway)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recording not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Everything an intent can fail with, as seen by the shell
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot {intent} while {session}")]
    UnexpectedIntent {
        intent: &'static str,
        session: &'static str,
    },

    #[error("cannot seek to {position:.1}s, clip is {duration:.1}s long")]
    SeekOutOfRange { position: f64, duration: f64 },

    #[error("session service stopped")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_readable() {
        let err = SessionError::from(AudioError::DeviceBusy);
        assert_eq!(err.to_string(), "audio device is busy");

        let err = SessionError::from(StorageError::NotFound("a.wav".into()));
        assert_eq!(err.to_string(), "recording not found: a.wav");

        let err = SessionError::UnexpectedIntent {
            intent: "save",
            session: "idle",
        };
        assert_eq!(err.to_string(), "cannot save while idle");
    }
}
