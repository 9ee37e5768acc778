#[cfg(feature = "rodio-sink")]
mod audio;
mod dummy;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(feature = "rodio-sink")]
pub use audio::RodioAudioSink;
pub use dummy::DummyAudioSink;

/// Raw PCM audio, the interchange format between synthesis and output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioClip {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub pcm_i16: Vec<i16>,
}

impl AudioClip {
    pub fn duration(&self) -> Duration {
        if self.sample_rate_hz == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.pcm_i16.len() as u64 / u64::from(self.channels);
        Duration::from_millis(frames.saturating_mul(1000) / u64::from(self.sample_rate_hz))
    }

    /// Empty or structurally invalid PCM that should be skipped rather than
    /// handed to an output device.
    pub fn is_blank(&self) -> bool {
        self.sample_rate_hz == 0
            || self.channels == 0
            || self.pcm_i16.is_empty()
            || self.pcm_i16.len() % usize::from(self.channels) != 0
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("audio output unavailable: {details}")]
    AudioOutputUnavailable { details: String },
}

/// Audio output seam. `play` resolves when the clip has finished or was
/// stopped early; `stop` halts the clip currently playing.
pub trait AudioSink: Send + Sync {
    fn play(&self, clip: AudioClip) -> BoxFuture<'_, Result<(), PlaybackError>>;

    fn stop(&self);
}

impl<T: AudioSink + ?Sized> AudioSink for std::sync::Arc<T> {
    fn play(&self, clip: AudioClip) -> BoxFuture<'_, Result<(), PlaybackError>> {
        (**self).play(clip)
    }

    fn stop(&self) {
        (**self).stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_duration_accounts_for_channels() {
        let clip = AudioClip {
            sample_rate_hz: 1000,
            channels: 2,
            pcm_i16: vec![0; 4000],
        };
        assert_eq!(clip.duration(), Duration::from_secs(2));
    }

    #[test]
    fn blank_detection() {
        let good = AudioClip {
            sample_rate_hz: 22_050,
            channels: 1,
            pcm_i16: vec![1, 2, 3],
        };
        assert!(!good.is_blank());

        let empty = AudioClip {
            sample_rate_hz: 22_050,
            channels: 1,
            pcm_i16: vec![],
        };
        assert!(empty.is_blank());

        let ragged = AudioClip {
            sample_rate_hz: 22_050,
            channels: 2,
            pcm_i16: vec![1, 2, 3],
        };
        assert!(ragged.is_blank());
    }
}
