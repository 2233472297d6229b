pub mod capture;
pub mod engine;
pub mod format;
pub mod native;
pub mod playback;
pub mod sink;
pub mod wav_sink;
pub mod waveform;

#[cfg(test)]
pub(crate) mod mock;

pub use capture::AudioCapture;
pub use engine::{
    AudioEngine, AudioHandle, CaptureHandle, HandleId, PlaybackHandle, PlaybackStatus,
    StatusSender,
};
pub use format::AudioFormat;
pub use native::NativeEngine;
pub use playback::{Player, Transport};
pub use sink::AudioSink;
pub use wav_sink::WavSink;
pub use waveform::WaveformAnimator;
