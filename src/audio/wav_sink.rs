use super::format::AudioFormat;
use super::sink::AudioSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

enum WavCommand {
    WriteChunk(Vec<f32>),
    Finalize { reply: oneshot::Sender<Result<u64>> },
}

/// WAV encoder running its file I/O on a dedicated thread
///
/// Chunks are handed to the thread over a channel so the capture path never
/// blocks on disk writes.
pub struct WavSink {
    tx: mpsc::UnboundedSender<WavCommand>,
}

impl WavSink {
    pub fn new(path: &Path, format: AudioFormat) -> Result<Self> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: AudioFormat::BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV writer at {:?}", path))?;

        let (tx, mut rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            let mut written: u64 = 0;
            let mut failed: Option<String> = None;

            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    WavCommand::WriteChunk(samples) => {
                        if failed.is_some() {
                            continue;
                        }
                        for sample in samples {
                            // f32 (-1.0 to 1.0) to i16
                            let amplitude = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            if let Err(e) = writer.write_sample(amplitude) {
                                tracing::error!("Failed to write sample: {}", e);
                                failed = Some(e.to_string());
                                break;
                            }
                            written += 1;
                        }
                    }
                    WavCommand::Finalize { reply } => {
                        let result = match failed.take() {
                            Some(e) => Err(anyhow::anyhow!("WAV write failed: {}", e)),
                            None => writer
                                .finalize()
                                .map(|_| written)
                                .context("Failed to finalize WAV"),
                        };
                        let _ = reply.send(result);
                        break;
                    }
                }
            }
        });

        Ok(Self { tx })
    }
}

#[async_trait]
impl AudioSink for WavSink {
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()> {
        self.tx
            .send(WavCommand::WriteChunk(samples))
            .map_err(|e| anyhow::anyhow!("Failed to send write command: {}", e))
    }

    async fn finalize(&mut self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WavCommand::Finalize { reply })
            .map_err(|e| anyhow::anyhow!("Failed to send finalize command: {}", e))?;

        rx.await
            .map_err(|e| anyhow::anyhow!("Failed to receive finalize response: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finalize_reports_samples_and_writes_readable_wav() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("take.wav");
        let format = AudioFormat {
            sample_rate: 16000,
            channels: 1,
        };

        let mut sink = WavSink::new(&path, format)?;
        sink.write_chunk(vec![0.0; 800])?;
        sink.write_chunk(vec![0.5; 800])?;
        let written = sink.finalize().await?;

        assert_eq!(written, 1600);

        let reader = hound::WavReader::open(&path)?;
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.duration(), 1600);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_take_finalizes_with_zero_samples() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("empty.wav");

        let mut sink = WavSink::new(&path, AudioFormat::default())?;
        assert_eq!(sink.finalize().await?, 0);
        Ok(())
    }
}
