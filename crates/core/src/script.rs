use crate::catalog::VoiceId;
use crate::config::{RunnerDefaults, SpeechSpeed};
use crate::renderer::{CameraView, Gesture, Mood};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One scripted unit of speech plus presentation directives. Empty text
/// skips speech but still applies the presentation fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<CameraView>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gesture: Option<Gesture>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,

    /// Pause after this segment completes, before the next one starts.
    /// Accepts the legacy `delay` spelling.
    #[serde(
        default,
        rename = "delayMs",
        alias = "delay",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay_ms: Option<u64>,
}

/// Ordered sequence of segments; order is playback order and is never
/// reordered or deduplicated.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Script {
    segments: Vec<Segment>,
}

#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error(
        "invalid script: expected an array of segments or an object with a \"segments\" array"
    )]
    InvalidFormat(#[source] serde_json::Error),

    #[error("segment {index}: speed must be > 0 (got {speed})")]
    InvalidSpeed { index: usize, speed: f32 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Bare(Vec<Segment>),
    Wrapped { segments: Vec<Segment> },
}

impl Script {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parses a script file: either a top-level array of segments or an
    /// object wrapping one under `segments`. Rejection is atomic; nothing
    /// is produced from partially valid input.
    pub fn from_json(input: &str) -> Result<Self, ScriptError> {
        let file: ScriptFile =
            serde_json::from_str(input).map_err(ScriptError::InvalidFormat)?;
        let segments = match file {
            ScriptFile::Bare(segments) => segments,
            ScriptFile::Wrapped { segments } => segments,
        };
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The single defaults-resolution step: every optional field collapses
    /// against `defaults` before the first segment runs, so a bad value is
    /// rejected up front rather than mid-broadcast.
    pub fn resolve(&self, defaults: &RunnerDefaults) -> Result<Vec<ResolvedSegment>, ScriptError> {
        self.segments
            .iter()
            .enumerate()
            .map(|(index, segment)| resolve_segment(segment, defaults, index))
            .collect()
    }
}

/// A segment with every field made concrete.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedSegment {
    pub text: String,
    pub mood: Mood,
    pub view: CameraView,
    pub gesture: Option<Gesture>,
    pub voice: VoiceId,
    pub speed: SpeechSpeed,
    pub delay: Duration,
}

fn resolve_segment(
    segment: &Segment,
    defaults: &RunnerDefaults,
    index: usize,
) -> Result<ResolvedSegment, ScriptError> {
    let speed = match segment.speed {
        Some(value) => {
            SpeechSpeed::new(value).map_err(|_| ScriptError::InvalidSpeed { index, speed: value })?
        }
        None => defaults.speed,
    };
    Ok(ResolvedSegment {
        text: segment.text.trim().to_owned(),
        mood: segment.mood.unwrap_or(defaults.mood),
        view: segment.view.unwrap_or(defaults.view),
        gesture: segment.gesture.or(defaults.gesture),
        voice: segment.voice.clone().unwrap_or_else(|| defaults.voice.clone()),
        speed,
        delay: segment
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.segment_delay),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAPPED: &str = r#"{"segments":[
        {"text":"Good evening.","mood":"happy","gesture":"wave"},
        {"text":"And now the weather.","view":"mid","delay":250}
    ]}"#;

    const BARE: &str = r#"[
        {"text":"Good evening.","mood":"happy","gesture":"wave"},
        {"text":"And now the weather.","view":"mid","delay":250}
    ]"#;

    #[test]
    fn wrapped_and_bare_forms_are_equivalent() {
        let wrapped = Script::from_json(WRAPPED).expect("wrapped parses");
        let bare = Script::from_json(BARE).expect("bare parses");
        assert_eq!(wrapped, bare);
        assert_eq!(wrapped.len(), 2);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(Script::from_json("{\"scenes\":[]}").is_err());
        assert!(Script::from_json("42").is_err());
        assert!(Script::from_json("not json").is_err());
    }

    #[test]
    fn delay_accepts_both_spellings() {
        let script =
            Script::from_json(r#"[{"text":"a","delayMs":100},{"text":"b","delay":200}]"#)
                .expect("parses");
        assert_eq!(script.segments()[0].delay_ms, Some(100));
        assert_eq!(script.segments()[1].delay_ms, Some(200));
    }

    #[test]
    fn resolution_fills_defaults() {
        let defaults = RunnerDefaults::default();
        let script = Script::from_json(r#"[{"text":"  hello  "}]"#).expect("parses");
        let resolved = script.resolve(&defaults).expect("resolves");

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].text, "hello");
        assert_eq!(resolved[0].mood, Mood::Neutral);
        assert_eq!(resolved[0].view, CameraView::Upper);
        assert_eq!(resolved[0].gesture, None);
        assert_eq!(resolved[0].voice, defaults.voice);
        assert_eq!(resolved[0].delay, defaults.segment_delay);
    }

    #[test]
    fn segment_fields_override_defaults() {
        let defaults = RunnerDefaults::default();
        let script = Script::from_json(
            r#"[{"text":"x","mood":"angry","view":"head","voice":"am_adam","speed":1.5,"delayMs":50}]"#,
        )
        .expect("parses");
        let resolved = script.resolve(&defaults).expect("resolves");

        assert_eq!(resolved[0].mood, Mood::Angry);
        assert_eq!(resolved[0].view, CameraView::Head);
        assert_eq!(resolved[0].voice, VoiceId::new("am_adam"));
        assert_eq!(resolved[0].speed.value(), 1.5);
        assert_eq!(resolved[0].delay, Duration::from_millis(50));
    }

    #[test]
    fn non_positive_speed_is_rejected_at_resolution() {
        let defaults = RunnerDefaults::default();
        let script =
            Script::from_json(r#"[{"text":"a"},{"text":"b","speed":0.0}]"#).expect("parses");
        let err = script.resolve(&defaults).expect_err("bad speed");
        assert!(matches!(err, ScriptError::InvalidSpeed { index: 1, .. }));
    }

    #[test]
    fn segment_without_text_is_allowed() {
        let script = Script::from_json(r#"[{"mood":"sad"}]"#).expect("parses");
        assert_eq!(script.segments()[0].text, "");
        assert_eq!(script.segments()[0].mood, Some(Mood::Sad));
    }
}
