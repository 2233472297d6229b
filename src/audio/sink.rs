use anyhow::Result;
use async_trait::async_trait;

/// Streaming encoder for captured audio
///
/// Samples are written as they arrive rather than buffered for the whole take.
#[async_trait]
pub trait AudioSink: Send {
    /// Write a chunk of interleaved samples. The Vec is moved to avoid copying.
    fn write_chunk(&mut self, samples: Vec<f32>) -> Result<()>;

    /// Flush and close the output, returning how many samples it holds
    async fn finalize(&mut self) -> Result<u64>;
}
