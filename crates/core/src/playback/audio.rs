use crate::playback::{AudioClip, AudioSink, PlaybackError};
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::source::Source;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use std::sync::{Arc, Mutex, MutexGuard};

/// Keeps the rodio `OutputStream` alive across play calls. Opening a fresh
/// stream per clip makes rodio drop the previous one, which truncates
/// whatever was still playing through it.
struct SharedStream {
    stream: Mutex<Option<OutputStream>>,
}

impl SharedStream {
    fn new() -> Self {
        Self {
            stream: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<Sink, PlaybackError> {
        let mut guard = lock_or_recover(&self.stream, "output stream cache");
        if guard.is_none() {
            let stream = OutputStreamBuilder::open_default_stream().map_err(|e| {
                PlaybackError::AudioOutputUnavailable {
                    details: format!("open default output stream: {e}"),
                }
            })?;
            *guard = Some(stream);
        }
        match guard.as_ref() {
            Some(stream) => Ok(Sink::connect_new(stream.mixer())),
            None => Err(PlaybackError::AudioOutputUnavailable {
                details: "internal error: output stream cache invariant violated".to_owned(),
            }),
        }
    }
}

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(lock = what, "playback lock was poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

/// Plays PCM clips through the default output device. The output stream is
/// opened lazily on first play; `stop` halts the clip currently queued.
#[derive(Clone)]
pub struct RodioAudioSink {
    stream: Arc<SharedStream>,
    current: Arc<Mutex<Option<Arc<Sink>>>>,
}

impl RodioAudioSink {
    pub fn new() -> Self {
        Self {
            stream: Arc::new(SharedStream::new()),
            current: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for RodioAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for RodioAudioSink {
    fn play(&self, clip: AudioClip) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            if clip.is_blank() {
                tracing::warn!(
                    sample_rate_hz = clip.sample_rate_hz,
                    channels = clip.channels,
                    samples_i16 = clip.pcm_i16.len(),
                    "skipping playback of empty/invalid PCM"
                );
                return Ok(());
            }

            let sink = Arc::new(self.stream.connect()?);
            *lock_or_recover(&self.current, "current sink") = Some(Arc::clone(&sink));

            sink.append(PcmSource::new(
                clip.pcm_i16,
                clip.sample_rate_hz,
                clip.channels,
            ));

            // sleep_until_end blocks; returns early when stop() drains the sink.
            let waiter = Arc::clone(&sink);
            if tokio::task::spawn_blocking(move || waiter.sleep_until_end())
                .await
                .is_err()
            {
                tracing::warn!("playback wait task failed");
            }

            let mut current = lock_or_recover(&self.current, "current sink");
            if current.as_ref().is_some_and(|s| Arc::ptr_eq(s, &sink)) {
                *current = None;
            }
            Ok(())
        }
        .boxed()
    }

    fn stop(&self) {
        if let Some(sink) = lock_or_recover(&self.current, "current sink").take() {
            sink.stop();
        }
    }
}

struct PcmSource {
    samples: std::vec::IntoIter<i16>,
    sample_rate: u32,
    channels: u16,
}

impl PcmSource {
    fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into_iter(),
            sample_rate,
            channels,
        }
    }
}

impl Iterator for PcmSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        self.samples.next().map(|s| s as f32 / i16::MAX as f32)
    }
}

impl Source for PcmSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_source_normalizes_to_f32() {
        let mut source = PcmSource::new(vec![0, i16::MAX, i16::MIN + 1], 22_050, 1);
        assert_eq!(source.next(), Some(0.0));
        assert_eq!(source.next(), Some(1.0));
        assert_eq!(source.next(), Some(-1.0));
        assert_eq!(source.next(), None);
    }

    #[tokio::test]
    async fn blank_clip_is_skipped_without_opening_a_device() {
        let sink = RodioAudioSink::new();
        let clip = AudioClip {
            sample_rate_hz: 0,
            channels: 0,
            pcm_i16: vec![],
        };
        sink.play(clip).await.expect("blank clip is a no-op");
    }

    #[test]
    fn stop_without_active_clip_is_a_no_op() {
        RodioAudioSink::new().stop();
    }
}
