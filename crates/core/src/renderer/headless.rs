use crate::record::CaptureSource;
use crate::renderer::{
    AvatarRenderer, AvatarSpec, CameraView, Gesture, Mood, RendererError, SpeechFrame,
    WordCallback,
};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Renderer implementation without a GPU or a window: records every call,
/// simulates speech by holding `is_speaking` for the duration of the handed
/// timeline (tokio time, so paused-clock tests are deterministic), and
/// serves synthetic capture frames once an avatar is on "screen".
///
/// Drives the CLI rehearsal mode and the test suites.
#[derive(Clone, Default)]
pub struct HeadlessRenderer {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    fail_loads: AtomicBool,
    avatar: Mutex<Option<AvatarSpec>>,
    mood: Mutex<Mood>,
    view: Mutex<(CameraView, f32)>,
    gestures: Mutex<Vec<Gesture>>,
    fixed_values: Mutex<Vec<(String, Option<f32>)>>,
    speaking_until: Mutex<Option<Instant>>,
    frames: Mutex<Vec<SpeechFrame>>,
    stops: AtomicUsize,
    captured: AtomicUsize,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `show_avatar` calls fail, for error-path testing.
    pub fn set_fail_loads(&self, fail: bool) {
        self.inner.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn avatar(&self) -> Option<AvatarSpec> {
        lock(&self.inner.avatar).clone()
    }

    pub fn mood(&self) -> Mood {
        *lock(&self.inner.mood)
    }

    pub fn view(&self) -> (CameraView, f32) {
        *lock(&self.inner.view)
    }

    pub fn gestures(&self) -> Vec<Gesture> {
        lock(&self.inner.gestures).clone()
    }

    pub fn fixed_values(&self) -> Vec<(String, Option<f32>)> {
        lock(&self.inner.fixed_values).clone()
    }

    pub fn spoken_frames(&self) -> Vec<SpeechFrame> {
        lock(&self.inner.frames).clone()
    }

    /// Word sequences of every frame spoken so far, one string per frame.
    pub fn spoken_texts(&self) -> Vec<String> {
        lock(&self.inner.frames)
            .iter()
            .map(|f| f.words.join(" "))
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.inner.stops.load(Ordering::Relaxed)
    }
}

fn frame_duration(frame: &SpeechFrame) -> Duration {
    let words_end = match (frame.wtimes.last(), frame.wdurations.last()) {
        (Some(t), Some(d)) => Duration::from_millis(u64::from(*t) + u64::from(*d)),
        _ => Duration::ZERO,
    };
    let audio = frame.audio.as_ref().map(|a| a.duration()).unwrap_or_default();
    frame.timeline.total_duration().max(words_end).max(audio)
}

impl AvatarRenderer for HeadlessRenderer {
    fn show_avatar(&self, spec: AvatarSpec) -> BoxFuture<'_, Result<(), RendererError>> {
        async move {
            if self.inner.fail_loads.load(Ordering::Relaxed) {
                return Err(RendererError::LoadFailed {
                    details: "simulated model load failure".to_owned(),
                });
            }
            *lock(&self.inner.avatar) = Some(spec);
            Ok(())
        }
        .boxed()
    }

    fn speak_audio(&self, frame: SpeechFrame, on_word: Option<WordCallback>) {
        let deadline = Instant::now() + frame_duration(&frame);
        *lock(&self.inner.speaking_until) = Some(deadline);
        if let Some(on_word) = on_word.as_deref() {
            for word in &frame.words {
                on_word(word);
            }
        }
        lock(&self.inner.frames).push(frame);
    }

    fn set_mood(&self, mood: Mood) {
        *lock(&self.inner.mood) = mood;
    }

    fn set_view(&self, view: CameraView, distance: f32) {
        *lock(&self.inner.view) = (view, distance);
    }

    fn play_gesture(&self, gesture: Gesture, _duration_s: f32) {
        lock(&self.inner.gestures).push(gesture);
    }

    fn stop(&self) {
        *lock(&self.inner.speaking_until) = None;
        self.inner.stops.fetch_add(1, Ordering::Relaxed);
    }

    fn is_speaking(&self) -> bool {
        lock(&self.inner.speaking_until)
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    fn set_fixed_value(&self, blend_shape: &str, value: Option<f32>) {
        lock(&self.inner.fixed_values).push((blend_shape.to_owned(), value));
    }
}

impl CaptureSource for HeadlessRenderer {
    fn capture_frame(&self) -> Option<Bytes> {
        if lock(&self.inner.avatar).is_none() {
            return None;
        }
        let n = self.inner.captured.fetch_add(1, Ordering::Relaxed);
        Some(Bytes::from(format!("frame-{n}")))
    }
}
