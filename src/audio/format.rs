// NOTE: capture and encoding assume 16-bit signed integer PCM.
// Every WAV written by the engine uses this layout.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Number of interleaved samples covering `seconds` of audio
    pub fn samples_for_duration(&self, seconds: f32) -> usize {
        (self.sample_rate as f32 * self.channels as f32 * seconds) as usize
    }

    /// Playing time of `samples` interleaved samples
    pub fn duration_of(&self, samples: u64) -> Duration {
        let per_second = self.sample_rate as f64 * self.channels as f64;
        if per_second == 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(samples as f64 / per_second)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
        }
    }
}
