use crate::messages::{Session, Snapshot};
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;

pub const NEUTRAL_LEVEL: f32 = 10.0;
const MIN_LEVEL: f32 = 20.0;
const MAX_LEVEL: f32 = 100.0;

/// Decorative bar animation shown while recording
///
/// The levels are random, not derived from the signal. The animator only
/// reads published snapshots and never feeds back into the session.
pub struct WaveformAnimator {
    bars: usize,
    interval: Duration,
}

impl WaveformAnimator {
    pub fn new(bars: usize, interval: Duration) -> Self {
        Self { bars, interval }
    }

    pub fn neutral(&self) -> Vec<f32> {
        vec![NEUTRAL_LEVEL; self.bars]
    }

    pub fn random_levels(&self) -> Vec<f32> {
        let mut rng = rand::thread_rng();
        (0..self.bars)
            .map(|_| rng.gen_range(MIN_LEVEL..MAX_LEVEL))
            .collect()
    }

    /// Drive `levels_tx` from `state_rx` until the session service goes away
    pub async fn run(self, mut state_rx: watch::Receiver<Snapshot>, levels_tx: watch::Sender<Vec<f32>>) {
        loop {
            let recording = matches!(state_rx.borrow().session, Session::Recording { .. });

            if recording {
                tokio::select! {
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.interval) => {
                        levels_tx.send_replace(self.random_levels());
                    }
                }
            } else {
                let neutral = self.neutral();
                levels_tx.send_if_modified(|levels| {
                    if *levels == neutral {
                        false
                    } else {
                        *levels = neutral;
                        true
                    }
                });

                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        }

        tracing::debug!("Waveform animator stopped");
    }
}
