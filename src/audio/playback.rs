use anyhow::{Context, Result};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// One loaded clip on the default output device
pub struct Player {
    // Dropping the stream silences the sink
    _stream: OutputStream,
    sink: Sink,
    duration: Duration,
}

impl Player {
    /// Open the file, decode it and start playing immediately
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let source = Decoder::new(BufReader::new(file))
            .with_context(|| format!("Failed to decode {:?}", path))?;

        let duration = source
            .total_duration()
            .or_else(|| wav_duration(path))
            .unwrap_or_default();

        let mut stream =
            OutputStreamBuilder::open_default_stream().context("Failed to open output stream")?;
        stream.log_on_drop(false);

        let sink = Sink::connect_new(stream.mixer());
        sink.append(source);

        tracing::debug!("Playing {:?} ({:.1}s)", path, duration.as_secs_f64());
        Ok(Self {
            _stream: stream,
            sink,
            duration,
        })
    }
}

/// Transport controls over one loaded clip
///
/// [`Player`] is the real one; the engine only talks to clips through this.
pub trait Transport {
    fn pause(&self);

    fn resume(&self);

    fn seek(&self, position: Duration) -> Result<()>;

    fn stop(&self);

    fn position(&self) -> Duration;

    fn duration(&self) -> Duration;

    /// Nothing is left to play
    fn is_finished(&self) -> bool;
}

impl Transport for Player {
    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.play();
    }

    fn seek(&self, position: Duration) -> Result<()> {
        self.sink
            .try_seek(position)
            .map_err(|e| anyhow::anyhow!("Failed to seek to {:?}: {}", position, e))
    }

    fn stop(&self) {
        self.sink.stop();
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn duration(&self) -> Duration {
        self.duration
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

fn wav_duration(path: &Path) -> Option<Duration> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(
        reader.duration() as f64 / spec.sample_rate as f64,
    ))
}
