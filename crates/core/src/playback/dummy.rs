use crate::playback::{AudioClip, AudioSink, PlaybackError};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sink that swallows clips and completes immediately. Used for muted runs
/// and tests.
#[derive(Clone, Default)]
pub struct DummyAudioSink {
    plays: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl DummyAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }
}

impl AudioSink for DummyAudioSink {
    fn play(&self, _clip: AudioClip) -> BoxFuture<'_, Result<(), PlaybackError>> {
        self.plays.fetch_add(1, Ordering::Relaxed);
        async move { Ok(()) }.boxed()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
    }
}
