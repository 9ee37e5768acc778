use crate::config::RunnerDefaults;
use crate::events::{EventSink, SessionEvent};
use crate::renderer::{AvatarRenderer, WordCallback};
use crate::scene::SceneController;
use crate::script::{Script, ScriptError};
use crate::speech::{SpeechChannel, SpeechRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("a script run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Executes a script strictly in segment order: presentation first, gesture
/// fired non-blocking, speech awaited to completion, then the inter-segment
/// delay. One run per instance may be in flight; a second `run` is rejected,
/// not queued.
pub struct ScriptRunner<R, S> {
    scene: SceneController<R>,
    speech: S,
    defaults: RunnerDefaults,
    events: Arc<dyn EventSink>,
    flags: Arc<RunFlags>,
}

impl<R, S: Clone> Clone for ScriptRunner<R, S> {
    fn clone(&self) -> Self {
        Self {
            scene: self.scene.clone(),
            speech: self.speech.clone(),
            defaults: self.defaults.clone(),
            events: Arc::clone(&self.events),
            flags: Arc::clone(&self.flags),
        }
    }
}

struct RunFlags {
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl<R, S> ScriptRunner<R, S>
where
    R: AvatarRenderer,
    S: SpeechChannel,
{
    pub fn new(
        scene: SceneController<R>,
        speech: S,
        defaults: RunnerDefaults,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            scene,
            speech,
            defaults,
            events,
            flags: Arc::new(RunFlags {
                running: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    /// Cooperative: observed at the next segment boundary. In-flight
    /// synthesis is told to stop so no stray audio survives the run.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
        self.speech.cancel();
    }

    pub async fn run(&self, script: &Script) -> Result<RunOutcome, RunnerError> {
        if self.flags.running.swap(true, Ordering::SeqCst) {
            return Err(RunnerError::AlreadyRunning);
        }
        self.flags.cancelled.store(false, Ordering::SeqCst);

        let segments = match script.resolve(&self.defaults) {
            Ok(segments) => segments,
            Err(error) => {
                self.flags.running.store(false, Ordering::SeqCst);
                return Err(error.into());
            }
        };

        let total = segments.len();
        if total == 0 {
            self.flags.running.store(false, Ordering::SeqCst);
            return Ok(RunOutcome::Completed);
        }

        let mut outcome = RunOutcome::Completed;
        for (index, segment) in segments.iter().enumerate() {
            if self.flags.cancelled.load(Ordering::SeqCst) {
                outcome = RunOutcome::Cancelled;
                break;
            }

            self.events.emit(SessionEvent::Progress {
                current: index + 1,
                total,
            });
            self.events
                .emit(SessionEvent::Status(format!("Segment {}/{total}", index + 1)));
            tracing::debug!(segment = index + 1, total, "segment start");

            self.scene.set_mood(segment.mood);
            self.scene.set_view(segment.view);
            if let Some(gesture) = segment.gesture {
                self.scene.play_gesture(gesture);
            }

            if !segment.text.is_empty() {
                self.events.emit(SessionEvent::Subtitle {
                    text: segment.text.clone(),
                });
                let request = SpeechRequest {
                    text: segment.text.clone(),
                    voice: segment.voice.clone(),
                    speed: segment.speed,
                };
                let highlight = Arc::clone(&self.events);
                let on_word: WordCallback = Arc::new(move |word: &str| {
                    highlight.emit(SessionEvent::SubtitleHighlight {
                        word: word.to_owned(),
                    });
                });
                // A single bad segment must not abort the broadcast.
                if let Err(error) = self.speech.speak(request, Some(on_word)).await {
                    tracing::warn!(%error, segment = index + 1, "segment speech failed; advancing");
                    self.events.emit(SessionEvent::Status(format!(
                        "Segment {} speech failed: {error}",
                        index + 1
                    )));
                }
                self.events.emit(SessionEvent::SubtitlesCleared);
            }

            if index + 1 < total && !self.flags.cancelled.load(Ordering::SeqCst) {
                tokio::time::sleep(segment.delay).await;
            }
        }

        self.flags.running.store(false, Ordering::SeqCst);
        self.events.emit(SessionEvent::Status(
            match outcome {
                RunOutcome::Completed => "Script complete",
                RunOutcome::Cancelled => "Script cancelled",
            }
            .to_owned(),
        ));
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::events::{ChannelEventSink, NullEventSink};
    use crate::renderer::{CameraView, Gesture, HeadlessRenderer, Mood};
    use crate::script::Segment;
    use crate::speech::SpeechError;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    struct StubSpeech {
        spoken: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
        cancels: Arc<AtomicUsize>,
        fail_on_call: Option<usize>,
        gate: Option<Arc<Notify>>,
    }

    impl StubSpeech {
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::default()
            }
        }

        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl SpeechChannel for StubSpeech {
        fn speak(
            &self,
            request: SpeechRequest,
            _on_word: Option<WordCallback>,
        ) -> BoxFuture<'_, Result<(), SpeechError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let spoken = Arc::clone(&self.spoken);
            let gate = self.gate.clone();
            let fail_on_call = self.fail_on_call;
            async move {
                spoken.lock().unwrap().push(request.text);
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if fail_on_call == Some(call) {
                    return Err(SpeechError::Synthesis("engine hiccup".to_owned()));
                }
                Ok(())
            }
            .boxed()
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notify_waiters();
            }
        }
    }

    fn runner_with(
        speech: StubSpeech,
        events: Arc<dyn EventSink>,
    ) -> (ScriptRunner<HeadlessRenderer, StubSpeech>, Arc<HeadlessRenderer>) {
        let renderer = Arc::new(HeadlessRenderer::new());
        let scene = SceneController::new(
            Arc::clone(&renderer),
            Arc::new(Catalog::builtin()),
            Arc::clone(&events),
        );
        (
            ScriptRunner::new(scene, speech, RunnerDefaults::default(), events),
            renderer,
        )
    }

    fn script_of(texts: &[&str]) -> Script {
        Script::new(
            texts
                .iter()
                .map(|t| Segment {
                    text: (*t).to_owned(),
                    ..Segment::default()
                })
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn visits_segments_strictly_in_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        let speech = StubSpeech::default();
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(sink));

        let outcome = runner
            .run(&script_of(&["one", "two", "three"]))
            .await
            .expect("run completes");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(speech.spoken(), vec!["one", "two", "three"]);

        let mut progress = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Progress { current, total } = event {
                progress.push((current, total));
            }
        }
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_rejected_not_queued() {
        let gate = Arc::new(Notify::new());
        let speech = StubSpeech::gated(Arc::clone(&gate));
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(NullEventSink));

        let script = script_of(&["held"]);
        let handle = tokio::spawn({
            let runner = runner.clone();
            let script = script.clone();
            async move { runner.run(&script).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(runner.is_running());

        let err = runner.run(&script).await.expect_err("second run rejected");
        assert!(matches!(err, RunnerError::AlreadyRunning));

        gate.notify_waiters();
        let outcome = handle.await.expect("task").expect("run");
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(!runner.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_halts_before_the_next_segment_and_stops_synthesis() {
        let gate = Arc::new(Notify::new());
        let speech = StubSpeech::gated(Arc::clone(&gate));
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(NullEventSink));

        let handle = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(&script_of(&["first", "second", "third"])).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;

        runner.cancel();
        let outcome = handle.await.expect("task").expect("run");

        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(speech.spoken(), vec!["first"]);
        assert_eq!(speech.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inter_segment_delay_runs_between_but_not_after() {
        let speech = StubSpeech::default();
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(NullEventSink));

        let script = Script::new(vec![
            Segment {
                text: "A".to_owned(),
                delay_ms: Some(100),
                ..Segment::default()
            },
            Segment {
                text: "B".to_owned(),
                delay_ms: Some(0),
                ..Segment::default()
            },
        ]);

        let started = tokio::time::Instant::now();
        let outcome = runner.run(&script).await.expect("run completes");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(speech.spoken(), vec!["A", "B"]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_millis(150), "no trailing delay: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_segment_does_not_abort_the_broadcast() {
        let speech = StubSpeech::failing_on(2);
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(NullEventSink));

        let outcome = runner
            .run(&script_of(&["one", "two", "three"]))
            .await
            .expect("run completes");

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(speech.spoken(), vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_script_completes_immediately_with_no_events() {
        let (sink, mut rx) = ChannelEventSink::new();
        let speech = StubSpeech::default();
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(sink));

        let outcome = runner.run(&Script::default()).await.expect("run completes");
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(speech.spoken().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_segment_applies_presentation_without_speech() {
        let speech = StubSpeech::default();
        let (runner, renderer) = runner_with(speech.clone(), Arc::new(NullEventSink));

        let script = Script::new(vec![Segment {
            mood: Some(Mood::Sad),
            view: Some(CameraView::Head),
            gesture: Some(Gesture::Nod),
            ..Segment::default()
        }]);

        let outcome = runner.run(&script).await.expect("run completes");
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(speech.spoken().is_empty());
        assert_eq!(renderer.mood(), Mood::Sad);
        assert_eq!(renderer.view().0, CameraView::Head);
        assert_eq!(renderer.gestures(), vec![Gesture::Nod]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_speed_rejects_the_run_before_it_starts() {
        let speech = StubSpeech::default();
        let (runner, _renderer) = runner_with(speech.clone(), Arc::new(NullEventSink));

        let script = Script::new(vec![
            Segment {
                text: "ok".to_owned(),
                ..Segment::default()
            },
            Segment {
                text: "bad".to_owned(),
                speed: Some(-1.0),
                ..Segment::default()
            },
        ]);

        let err = runner.run(&script).await.expect_err("rejected");
        assert!(matches!(err, RunnerError::Script(_)));
        assert!(speech.spoken().is_empty());
        assert!(!runner.is_running());
    }
}
