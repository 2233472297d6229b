use super::format::AudioFormat;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use ringbuf::{HeapRb, traits::*};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, oneshot};

const RING_SECONDS: f32 = 60.0;
const CHUNK_SECONDS: f32 = 0.5;

/// A running microphone stream.
///
/// Holds a `cpal::Stream`, which is !Send, so this must live on a LocalSet.
pub struct AudioCapture {
    stream: cpal::Stream,
    stop_tx: oneshot::Sender<()>,
}

impl AudioCapture {
    /// Whether a default input device is reachable at all
    pub fn input_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Start audio capture
    ///
    /// Audio chunks are sent via `chunk_tx`. The sender is dropped once
    /// [`AudioCapture::stop`] has flushed the remaining samples, which closes
    /// the channel.
    pub fn start(format: AudioFormat, chunk_tx: mpsc::Sender<Vec<f32>>) -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .context("No input audio device available")?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let (mut producer, consumer) =
            HeapRb::<f32>::new(format.samples_for_duration(RING_SECONDS)).split();

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let notify = Arc::new(Notify::new());
        let notify_callback = notify.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    producer.push_slice(data);
                    notify_callback.notify_one();
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .context("Failed to build input stream")?;

        stream.play().context("Failed to start audio stream")?;

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::task::spawn_local(Self::bridge_task(
            consumer,
            chunk_tx,
            format.samples_for_duration(CHUNK_SECONDS),
            notify,
            stop_rx,
        ));

        tracing::info!(
            "Audio capture started on {:?} ({} Hz, {} ch)",
            device_name,
            format.sample_rate,
            format.channels
        );
        Ok(Self { stream, stop_tx })
    }

    /// Stop the device stream and let the bridge flush what is left
    pub fn stop(self) {
        drop(self.stream);
        let _ = self.stop_tx.send(());
        tracing::info!("Audio capture stopped");
    }

    async fn bridge_task(
        mut consumer: impl Consumer<Item = f32>,
        tx: mpsc::Sender<Vec<f32>>,
        chunk_size: usize,
        notify: Arc<Notify>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = notify.notified() => {
                    if consumer.occupied_len() < chunk_size {
                        continue;
                    }
                    if tx.send(pop_chunk(&mut consumer, chunk_size)).await.is_err() {
                        return;
                    }
                }
                _ = &mut stop_rx => break,
            }
        }

        // Tail of the take, shorter than a full chunk
        let remaining = consumer.occupied_len();
        if remaining > 0 {
            let _ = tx.send(pop_chunk(&mut consumer, remaining)).await;
        }
    }
}

fn pop_chunk(consumer: &mut impl Consumer<Item = f32>, len: usize) -> Vec<f32> {
    let mut chunk = vec![0.0f32; len];
    let n = consumer.pop_slice(&mut chunk);
    chunk.truncate(n);
    chunk
}
