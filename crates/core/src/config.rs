use crate::catalog::VoiceId;
use crate::renderer::{CameraView, Gesture, Mood};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SEGMENT_DELAY_MS: u64 = 500;
pub const DEFAULT_SPEECH_SPEED: f32 = 1.0;
pub const DEFAULT_SPEAKING_POLL_MS: u64 = 100;
pub const DEFAULT_SPEAKING_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_RECORD_FPS: u32 = 30;
pub const DEFAULT_VOICE: &str = "af_bella";
pub const ENV_ENGINE: &str = "ANCHORCAST_ENGINE";
pub const ENV_OUTPUT_DIR: &str = "ANCHORCAST_OUTPUT_DIR";

/// Playback-rate multiplier for synthesized speech; must be positive.
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct SpeechSpeed(f32);

impl SpeechSpeed {
    pub fn new(value: f32) -> Result<Self, ConfigError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::NonPositiveSpeed(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for SpeechSpeed {
    fn default() -> Self {
        Self(DEFAULT_SPEECH_SPEED)
    }
}

/// Which synthesis strategy drives speech.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    /// Neural engine with true phoneme-aligned visemes, falling back to the
    /// platform synthesizer when unavailable.
    #[default]
    Neural,
    /// Platform synthesizer only; lip-sync is approximate.
    Platform,
}

pub fn parse_engine(value: &str) -> Result<EngineChoice, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "neural" => Ok(EngineChoice::Neural),
        "platform" => Ok(EngineChoice::Platform),
        _ => Err(ConfigError::UnknownEngine(value.to_owned())),
    }
}

/// Which broadcast overlays are shown while playing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlayPrefs {
    pub lower_third: bool,
    pub ticker: bool,
    pub subtitles: bool,
}

impl Default for OverlayPrefs {
    fn default() -> Self {
        Self {
            lower_third: true,
            ticker: true,
            subtitles: false,
        }
    }
}

/// Lower-third caption content (anchor name and title line).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LowerThird {
    pub name: String,
    pub title: String,
}

/// Values applied to a segment when it does not specify its own; the single
/// defaults-resolution step for scripts.
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerDefaults {
    pub mood: Mood,
    pub view: CameraView,
    pub gesture: Option<Gesture>,
    pub voice: VoiceId,
    pub speed: SpeechSpeed,
    pub segment_delay: Duration,
}

impl Default for RunnerDefaults {
    fn default() -> Self {
        Self {
            mood: Mood::Neutral,
            view: CameraView::Upper,
            gesture: None,
            voice: VoiceId::new(DEFAULT_VOICE),
            speed: SpeechSpeed::default(),
            segment_delay: Duration::from_millis(DEFAULT_SEGMENT_DELAY_MS),
        }
    }
}

/// How segment completion is detected when the renderer exposes only a
/// "still speaking" flag: poll cadence plus a safety bound so a stuck flag
/// cannot hang a run forever. `timeout: None` restores the unbounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeakingPoll {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl SpeakingPoll {
    pub fn new(interval_ms: u64) -> Result<Self, ConfigError> {
        if interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Some(Duration::from_millis(DEFAULT_SPEAKING_TIMEOUT_MS)),
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SpeakingPoll {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_SPEAKING_POLL_MS),
            timeout: Some(Duration::from_millis(DEFAULT_SPEAKING_TIMEOUT_MS)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    pub engine: EngineChoice,
    pub overlays: OverlayPrefs,
    pub lower_third: LowerThird,
    pub ticker_text: String,
    pub runner: RunnerDefaults,
    pub speaking_poll: SpeakingPoll,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("speech speed must be > 0 (got {0})")]
    NonPositiveSpeed(f32),

    #[error("speaking poll interval must be > 0 ms")]
    ZeroPollInterval,

    #[error("unknown engine: {0} (expected \"neural\" or \"platform\")")]
    UnknownEngine(String),
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    match cli_value {
        Some(v) => Some(v),
        None => env.var(env_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_must_be_positive_and_finite() {
        assert!(SpeechSpeed::new(1.25).is_ok());
        assert_eq!(
            SpeechSpeed::new(0.0).expect_err("zero"),
            ConfigError::NonPositiveSpeed(0.0)
        );
        assert!(SpeechSpeed::new(-1.0).is_err());
        assert!(SpeechSpeed::new(f32::NAN).is_err());
    }

    #[test]
    fn engine_parsing_is_case_insensitive() {
        assert_eq!(parse_engine("Neural").expect("ok"), EngineChoice::Neural);
        assert_eq!(parse_engine("platform").expect("ok"), EngineChoice::Platform);
        assert!(parse_engine("browser").is_err());
    }

    #[test]
    fn speaking_poll_rejects_zero_interval() {
        assert_eq!(
            SpeakingPoll::new(0).expect_err("zero"),
            ConfigError::ZeroPollInterval
        );
        let poll = SpeakingPoll::new(50).expect("valid");
        assert_eq!(poll.interval, Duration::from_millis(50));
        assert!(poll.timeout.is_some());
        assert!(poll.with_timeout(None).timeout.is_none());
    }

    #[test]
    fn cli_value_takes_precedence_over_env() {
        let env = MapEnv::default().with_var(ENV_ENGINE, "platform");
        let v = resolve_string_with_default(Some("neural".to_owned()), ENV_ENGINE, &env, "x");
        assert_eq!(v, "neural");
    }

    #[test]
    fn env_used_when_cli_missing() {
        let env = MapEnv::default().with_var(ENV_ENGINE, "platform");
        assert_eq!(
            resolve_string_with_default(None, ENV_ENGINE, &env, "x"),
            "platform"
        );
        assert_eq!(resolve_optional_string(None, ENV_ENGINE, &env).as_deref(), Some("platform"));
    }

    #[test]
    fn default_used_when_both_missing() {
        let env = MapEnv::default();
        assert_eq!(
            resolve_string_with_default(None, ENV_ENGINE, &env, "neural"),
            "neural"
        );
        assert_eq!(resolve_optional_string(None, ENV_ENGINE, &env), None);
    }
}
