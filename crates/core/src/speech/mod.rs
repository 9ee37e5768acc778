mod fallback;
mod neural;
mod platform;
mod prerecorded;

use crate::catalog::VoiceId;
use crate::config::SpeechSpeed;
use crate::playback::PlaybackError;
use crate::renderer::WordCallback;
use futures::future::BoxFuture;

pub use fallback::FallbackSpeechChannel;
pub use neural::{
    ConnectProgress, DummyNeuralEngine, EngineMessage, NeuralEngine, NeuralSpeechChannel,
};
pub use platform::{
    BasicPlatformSpeech, PlatformSpeech, PlatformSpeechChannel, PlatformVoice, Utterance,
    APPROX_WORD_DURATION_MS,
};
pub use prerecorded::{PrerecordedClip, PrerecordedPlayer};

/// One utterance to synthesize and play.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: VoiceId,
    pub speed: SpeechSpeed,
}

#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("speech engine unavailable")]
    EngineUnavailable,

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("speech did not report completion within the safety timeout")]
    CompletionTimeout,

    #[error("speech cancelled")]
    Cancelled,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// The audio/lip-sync adapter seam. `speak` resolves exactly once, when the
/// utterance has finished playing (or failed); `cancel` tells the underlying
/// engine to stop producing audio so nothing keeps playing after a
/// cancelled run.
pub trait SpeechChannel: Send + Sync {
    fn speak(
        &self,
        request: SpeechRequest,
        on_word: Option<WordCallback>,
    ) -> BoxFuture<'_, Result<(), SpeechError>>;

    fn cancel(&self);
}

impl<T: SpeechChannel + ?Sized> SpeechChannel for std::sync::Arc<T> {
    fn speak(
        &self,
        request: SpeechRequest,
        on_word: Option<WordCallback>,
    ) -> BoxFuture<'_, Result<(), SpeechError>> {
        (**self).speak(request, on_word)
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}
