use crate::catalog::VoiceId;
use crate::config::{SpeakingPoll, SpeechSpeed};
use crate::lipsync;
use crate::renderer::{AvatarRenderer, SpeechFrame, WordCallback};
use crate::speech::{SpeechChannel, SpeechError, SpeechRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "speech::neural";

/// Reports model-download progress during connect as (loaded, total) bytes.
pub type ConnectProgress = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One message from the engine's synthesis stream.
#[derive(Clone, Debug)]
pub enum EngineMessage {
    /// A playable payload: audio plus word and viseme timings.
    Audio(SpeechFrame),
    Error(String),
}

/// Capability interface of the neural TTS engine. Connection and voice
/// setup are the caller's responsibility; `synthesize` yields the payload
/// stream for one input.
pub trait NeuralEngine: Send + Sync {
    fn connect(
        &self,
        on_progress: Option<ConnectProgress>,
    ) -> BoxFuture<'_, Result<(), SpeechError>>;

    fn setup(&self, voice: &VoiceId, speed: SpeechSpeed);

    fn synthesize(&self, input: &str) -> BoxFuture<'_, Result<Vec<EngineMessage>, SpeechError>>;

    /// Stop producing audio for the in-flight synthesis.
    fn cancel(&self);

    fn is_ready(&self) -> bool;
}

/// Speech channel backed by a neural engine: forwards each audio payload to
/// the renderer, then derives the completion signal by polling the
/// renderer's speaking flag.
pub struct NeuralSpeechChannel<E, R> {
    engine: E,
    renderer: Arc<R>,
    poll: SpeakingPoll,
}

impl<E: Clone, R> Clone for NeuralSpeechChannel<E, R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            renderer: Arc::clone(&self.renderer),
            poll: self.poll,
        }
    }
}

impl<E, R> NeuralSpeechChannel<E, R>
where
    E: NeuralEngine,
    R: AvatarRenderer,
{
    pub fn new(engine: E, renderer: Arc<R>, poll: SpeakingPoll) -> Self {
        Self {
            engine,
            renderer,
            poll,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E, R> SpeechChannel for NeuralSpeechChannel<E, R>
where
    E: NeuralEngine,
    R: AvatarRenderer,
{
    fn speak(
        &self,
        request: SpeechRequest,
        on_word: Option<WordCallback>,
    ) -> BoxFuture<'_, Result<(), SpeechError>> {
        async move {
            if !self.engine.is_ready() {
                return Err(SpeechError::EngineUnavailable);
            }

            self.engine.setup(&request.voice, request.speed);
            let messages = self.engine.synthesize(&request.text).await?;

            let mut spoke = false;
            let mut failure: Option<String> = None;
            for message in messages {
                match message {
                    EngineMessage::Audio(frame) => {
                        spoke = true;
                        self.renderer.speak_audio(frame, on_word.clone());
                    }
                    EngineMessage::Error(details) => {
                        tracing::warn!(target: LOG_TARGET, %details, "engine reported an error");
                        failure.get_or_insert(details);
                    }
                }
            }

            if spoke {
                // The engine has no end-of-playback callback, so completion
                // is the renderer's speaking flag clearing. The poll is
                // bounded: a flag stuck true must not hang the run.
                let wait = async {
                    while self.renderer.is_speaking() {
                        tokio::time::sleep(self.poll.interval).await;
                    }
                };
                match self.poll.timeout {
                    Some(limit) => {
                        if tokio::time::timeout(limit, wait).await.is_err() {
                            self.renderer.stop();
                            return Err(SpeechError::CompletionTimeout);
                        }
                    }
                    None => wait.await,
                }
            }

            match failure {
                Some(details) => Err(SpeechError::Synthesis(details)),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn cancel(&self) {
        self.engine.cancel();
        self.renderer.stop();
    }
}

/// In-process stand-in for a neural engine. `connected` synthesizes
/// approximate frames from the input text; `disconnected` refuses to
/// connect, which exercises the degraded fallback path end to end.
#[derive(Clone)]
pub struct DummyNeuralEngine {
    inner: Arc<DummyEngineInner>,
}

struct DummyEngineInner {
    reachable: bool,
    ready: AtomicBool,
    canned: Mutex<Option<Vec<EngineMessage>>>,
    voice: Mutex<Option<(VoiceId, SpeechSpeed)>>,
    synth_calls: AtomicUsize,
    cancels: AtomicUsize,
}

impl DummyNeuralEngine {
    pub fn connected() -> Self {
        Self {
            inner: Arc::new(DummyEngineInner {
                reachable: true,
                ready: AtomicBool::new(true),
                canned: Mutex::new(None),
                voice: Mutex::new(None),
                synth_calls: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
            }),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            inner: Arc::new(DummyEngineInner {
                reachable: false,
                ready: AtomicBool::new(false),
                canned: Mutex::new(None),
                voice: Mutex::new(None),
                synth_calls: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
            }),
        }
    }

    /// Replaces the synthesized payload with a canned message list.
    pub fn set_messages(&self, messages: Vec<EngineMessage>) {
        if let Ok(mut canned) = self.inner.canned.lock() {
            *canned = Some(messages);
        }
    }

    pub fn synth_calls(&self) -> usize {
        self.inner.synth_calls.load(Ordering::Relaxed)
    }

    pub fn cancel_count(&self) -> usize {
        self.inner.cancels.load(Ordering::Relaxed)
    }

    pub fn last_voice(&self) -> Option<(VoiceId, SpeechSpeed)> {
        self.inner.voice.lock().ok().and_then(|v| v.clone())
    }
}

impl NeuralEngine for DummyNeuralEngine {
    fn connect(
        &self,
        on_progress: Option<ConnectProgress>,
    ) -> BoxFuture<'_, Result<(), SpeechError>> {
        async move {
            if !self.inner.reachable {
                return Err(SpeechError::EngineUnavailable);
            }
            if let Some(on_progress) = on_progress.as_deref() {
                on_progress(1, 1);
            }
            self.inner.ready.store(true, Ordering::Relaxed);
            Ok(())
        }
        .boxed()
    }

    fn setup(&self, voice: &VoiceId, speed: SpeechSpeed) {
        if let Ok(mut slot) = self.inner.voice.lock() {
            *slot = Some((voice.clone(), speed));
        }
    }

    fn synthesize(&self, input: &str) -> BoxFuture<'_, Result<Vec<EngineMessage>, SpeechError>> {
        let input = input.to_owned();
        async move {
            self.inner.synth_calls.fetch_add(1, Ordering::Relaxed);
            if let Ok(canned) = self.inner.canned.lock() {
                if let Some(messages) = canned.as_ref() {
                    return Ok(messages.clone());
                }
            }

            let speed = self
                .last_voice()
                .map(|(_, s)| s)
                .unwrap_or_default()
                .value();
            let word_ms = ((crate::speech::APPROX_WORD_DURATION_MS as f32 / speed) as u32).max(1);
            let words: Vec<String> = input.split_whitespace().map(str::to_owned).collect();
            let frame = SpeechFrame {
                audio: None,
                wtimes: (0..words.len() as u32).map(|i| i * word_ms).collect(),
                wdurations: vec![word_ms; words.len()],
                words,
                timeline: lipsync::approximate_timeline(&input, word_ms),
            };
            Ok(vec![EngineMessage::Audio(frame)])
        }
        .boxed()
    }

    fn cancel(&self) {
        self.inner.cancels.fetch_add(1, Ordering::Relaxed);
    }

    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Relaxed)
    }
}
