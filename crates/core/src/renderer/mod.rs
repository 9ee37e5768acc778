mod headless;

use crate::catalog::BodyType;
use crate::lipsync::VisemeTimeline;
use crate::playback::AudioClip;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

pub use headless::HeadlessRenderer;

/// Emotional presets understood by the talking-head renderer.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Fear,
    Love,
    Disgust,
    Sleep,
}

/// Camera framing presets with their distance and vertical pan offsets.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraView {
    Full,
    #[default]
    Upper,
    Mid,
    Head,
}

impl CameraView {
    pub fn distance(&self) -> f32 {
        match self {
            Self::Full => 2.5,
            Self::Upper => 0.8,
            Self::Mid => 0.5,
            Self::Head => 0.3,
        }
    }

    pub fn y_offset(&self) -> f32 {
        match self {
            Self::Full => 0.0,
            Self::Upper => 0.1,
            Self::Mid => 0.15,
            Self::Head => 0.2,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gesture {
    #[serde(rename = "wave")]
    Wave,
    #[serde(rename = "thumbsUp")]
    ThumbsUp,
    #[serde(rename = "think")]
    Think,
    #[serde(rename = "nod")]
    Nod,
    #[serde(rename = "headShake")]
    HeadShake,
    #[serde(rename = "point")]
    Point,
    #[serde(rename = "smile")]
    Smile,
}

/// What the renderer needs to bring an avatar on screen.
#[derive(Clone, Debug, PartialEq)]
pub struct AvatarSpec {
    pub url: Url,
    pub body: BodyType,
    pub mood: Mood,
}

/// One playable unit handed to the renderer: optional PCM audio plus word
/// timings for subtitles and the viseme timeline for lip-sync. When `audio`
/// is `None` the sound is produced elsewhere (platform speech, an external
/// clip) and the renderer only animates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeechFrame {
    pub audio: Option<AudioClip>,
    pub words: Vec<String>,
    pub wtimes: Vec<u32>,
    pub wdurations: Vec<u32>,
    pub timeline: VisemeTimeline,
}

/// Invoked on each word boundary during playback; advisory, used for
/// subtitle highlighting.
pub type WordCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum RendererError {
    #[error("avatar load failed: {details}")]
    LoadFailed { details: String },

    #[error("renderer not ready")]
    NotReady,
}

/// Capability interface of the 3D talking-head engine. The core never
/// assumes anything about the implementation beyond this contract.
pub trait AvatarRenderer: Send + Sync {
    /// Loads and displays an avatar; resolves once the model is on screen.
    fn show_avatar(&self, spec: AvatarSpec) -> BoxFuture<'_, Result<(), RendererError>>;

    /// Starts playback of a speech frame. Returns immediately; progress is
    /// observable through [`AvatarRenderer::is_speaking`].
    fn speak_audio(&self, frame: SpeechFrame, on_word: Option<WordCallback>);

    fn set_mood(&self, mood: Mood);

    fn set_view(&self, view: CameraView, distance: f32);

    /// Fire-and-forget; must not block or affect speech playback.
    fn play_gesture(&self, gesture: Gesture, duration_s: f32);

    /// Halts current audio and animation immediately.
    fn stop(&self);

    fn is_speaking(&self) -> bool;

    /// Pins a blend shape to a value, or releases it with `None`.
    fn set_fixed_value(&self, blend_shape: &str, value: Option<f32>);
}
