use crate::lipsync;
use crate::playback::{AudioClip, AudioSink};
use crate::renderer::{AvatarRenderer, SpeechFrame, WordCallback};
use crate::speech::{SpeechChannel, SpeechError, SpeechRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::f32::consts::PI;
use std::sync::Arc;

/// Nominal per-word pacing for the approximate lip-sync path.
pub const APPROX_WORD_DURATION_MS: u32 = 300;

const DEFAULT_VOLUME: f32 = 0.8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformVoice {
    pub name: String,
    pub lang: String,
    pub default: bool,
}

/// One utterance for the platform synthesizer. The engine owns audio output;
/// `on_word` fires on word boundaries while it speaks.
#[derive(Clone)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub on_word: Option<WordCallback>,
}

/// Capability interface of the environment's general-purpose speech
/// synthesizer. `speak` resolves at utterance end (the promise-style port of
/// the utterance end event).
pub trait PlatformSpeech: Send + Sync {
    fn voices(&self) -> Vec<PlatformVoice>;

    fn speak(&self, utterance: Utterance) -> BoxFuture<'_, Result<(), SpeechError>>;

    fn cancel(&self);
}

/// Degraded speech channel: no phoneme alignment is available from the
/// platform engine, so the channel derives a coarse viseme stream locally
/// and animates the renderer while the engine produces the sound.
pub struct PlatformSpeechChannel<P, R> {
    engine: P,
    renderer: Arc<R>,
}

impl<P: Clone, R> Clone for PlatformSpeechChannel<P, R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            renderer: Arc::clone(&self.renderer),
        }
    }
}

impl<P, R> PlatformSpeechChannel<P, R>
where
    P: PlatformSpeech,
    R: AvatarRenderer,
{
    pub fn new(engine: P, renderer: Arc<R>) -> Self {
        Self { engine, renderer }
    }
}

impl<P, R> SpeechChannel for PlatformSpeechChannel<P, R>
where
    P: PlatformSpeech,
    R: AvatarRenderer,
{
    fn speak(
        &self,
        request: SpeechRequest,
        on_word: Option<WordCallback>,
    ) -> BoxFuture<'_, Result<(), SpeechError>> {
        async move {
            let rate = request.speed.value();
            let word_ms = ((APPROX_WORD_DURATION_MS as f32 / rate) as u32).max(1);
            let frame = SpeechFrame {
                timeline: lipsync::approximate_timeline(&request.text, word_ms),
                ..SpeechFrame::default()
            };
            self.renderer.speak_audio(frame, None);

            let utterance = Utterance {
                text: request.text,
                voice: None,
                rate,
                pitch: 1.0,
                volume: DEFAULT_VOLUME,
                on_word,
            };
            let result = self.engine.speak(utterance).await;
            if result.is_err() {
                self.renderer.stop();
            }
            result
        }
        .boxed()
    }

    fn cancel(&self) {
        self.engine.cancel();
        self.renderer.stop();
    }
}

/// Placeholder platform synthesizer: renders the utterance as a sine tone
/// sized to the text and plays it through an [`AudioSink`]. Keeps headless
/// runs audible without any real voice stack installed.
#[derive(Clone)]
pub struct BasicPlatformSpeech<S> {
    sink: S,
}

impl<S> BasicPlatformSpeech<S>
where
    S: AudioSink,
{
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S> PlatformSpeech for BasicPlatformSpeech<S>
where
    S: AudioSink,
{
    fn voices(&self) -> Vec<PlatformVoice> {
        vec![PlatformVoice {
            name: "Tone (placeholder)".to_owned(),
            lang: "en-US".to_owned(),
            default: true,
        }]
    }

    fn speak(&self, utterance: Utterance) -> BoxFuture<'_, Result<(), SpeechError>> {
        async move {
            // The tone carries no alignment information; word boundaries are
            // approximated up front.
            if let Some(on_word) = utterance.on_word.as_deref() {
                for word in utterance.text.split_whitespace() {
                    on_word(word);
                }
            }
            let clip = tone_for(&utterance.text, utterance.rate, utterance.volume);
            self.sink.play(clip).await?;
            Ok(())
        }
        .boxed()
    }

    fn cancel(&self) {
        self.sink.stop();
    }
}

fn tone_for(text: &str, rate: f32, volume: f32) -> AudioClip {
    let sample_rate_hz = 22_050u32;
    let base_duration_ms = (text.len() * 100).max(500);
    let duration_ms = (base_duration_ms as f32 / rate.max(f32::EPSILON)) as usize;
    let samples = duration_ms * sample_rate_hz as usize / 1000;
    let freq = 440.0f32;
    let gain = volume.clamp(0.0, 1.0);

    let mut pcm_i16 = Vec::with_capacity(samples);
    for i in 0..samples {
        let t = i as f32 / sample_rate_hz as f32;
        let amplitude = (2.0 * PI * freq * t).sin() * gain;
        pcm_i16.push((amplitude * i16::MAX as f32) as i16);
    }

    AudioClip {
        sample_rate_hz,
        channels: 1,
        pcm_i16,
    }
}
