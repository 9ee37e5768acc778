use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Oculus viseme vocabulary driving the avatar's lip blend shapes.
///
/// Serialized names match the blend-shape suffixes the renderer expects
/// (`viseme_aa`, `viseme_PP`, ...), which is also the on-disk form of
/// pre-mapped lip-sync files.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Viseme {
    #[serde(rename = "sil")]
    Sil,
    #[serde(rename = "PP")]
    Pp,
    #[serde(rename = "FF")]
    Ff,
    #[serde(rename = "TH")]
    Th,
    #[serde(rename = "DD")]
    Dd,
    #[serde(rename = "kk")]
    Kk,
    #[serde(rename = "CH")]
    Ch,
    #[serde(rename = "SS")]
    Ss,
    #[serde(rename = "nn")]
    Nn,
    #[serde(rename = "RR")]
    Rr,
    #[serde(rename = "aa")]
    Aa,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "I")]
    I,
    #[serde(rename = "O")]
    O,
    #[serde(rename = "U")]
    U,
}

/// Translates a mouth-cue phoneme class (the 9-symbol set produced by
/// third-party lip-sync analysis) into the renderer's viseme vocabulary.
///
/// Total over all inputs: unknown codes fail closed to [`Viseme::Sil`] so a
/// malformed cue file degrades to a closed mouth instead of aborting
/// playback.
pub fn map_cue(code: &str) -> Viseme {
    match code {
        "A" => Viseme::Aa,
        "B" => Viseme::Pp,
        "C" => Viseme::E,
        "D" => Viseme::Aa,
        "E" => Viseme::O,
        "F" => Viseme::U,
        "G" => Viseme::Ff,
        "H" => Viseme::Nn,
        _ => Viseme::Sil,
    }
}

/// One timestamped phoneme-class marker from an external lip-sync analysis
/// file. Times are in seconds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MouthCue {
    pub start: f64,
    pub end: f64,
    pub value: String,
}

/// Parallel viseme/start/duration arrays in the renderer's millisecond
/// timebase. Consumed exactly once per segment playback.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisemeTimeline {
    pub visemes: Vec<Viseme>,
    pub vtimes: Vec<u32>,
    pub vdurations: Vec<u32>,
}

impl VisemeTimeline {
    pub fn push(&mut self, viseme: Viseme, time_ms: u32, duration_ms: u32) {
        self.visemes.push(viseme);
        self.vtimes.push(time_ms);
        self.vdurations.push(duration_ms);
    }

    pub fn len(&self) -> usize {
        self.visemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visemes.is_empty()
    }

    /// End of the last cue, i.e. how long the renderer will animate.
    pub fn total_duration(&self) -> Duration {
        match (self.vtimes.last(), self.vdurations.last()) {
            (Some(t), Some(d)) => Duration::from_millis(u64::from(*t) + u64::from(*d)),
            _ => Duration::ZERO,
        }
    }

    /// Converts seconds-based mouth cues into the millisecond timebase.
    ///
    /// Each cue's duration is the gap to the next cue's start; the last cue
    /// runs to its own end-of-clip timestamp.
    pub fn from_mouth_cues(cues: &[MouthCue]) -> Self {
        let mut timeline = Self::default();
        for (index, cue) in cues.iter().enumerate() {
            let end = match cues.get(index + 1) {
                Some(next) => next.start,
                None => cue.end,
            };
            timeline.push(
                map_cue(&cue.value),
                to_millis(cue.start),
                to_millis(end - cue.start),
            );
        }
        timeline
    }
}

fn to_millis(seconds: f64) -> u32 {
    let ms = (seconds * 1000.0).round();
    if ms <= 0.0 {
        0
    } else {
        ms as u32
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LipSyncError {
    #[error("invalid lip-sync JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// An external lip-sync file: either seconds-based mouth cues or an already
/// mapped viseme triple.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LipSyncFile {
    MouthCues {
        #[serde(rename = "mouthCues")]
        mouth_cues: Vec<MouthCue>,
    },
    Timeline(VisemeTimeline),
}

impl LipSyncFile {
    /// Parses a lip-sync file; rejection is atomic, nothing is produced from
    /// partially valid input.
    pub fn from_json(input: &str) -> Result<Self, LipSyncError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn into_timeline(self) -> VisemeTimeline {
        match self {
            Self::MouthCues { mouth_cues } => VisemeTimeline::from_mouth_cues(&mouth_cues),
            Self::Timeline(timeline) => timeline,
        }
    }
}

/// Coarse viseme stream for the degraded local-synthesis path: no phoneme
/// alignment is available, so vowels map to open-jaw visemes and cue
/// boundaries are spaced evenly across each word.
pub fn approximate_timeline(text: &str, word_duration_ms: u32) -> VisemeTimeline {
    let mut timeline = VisemeTimeline::default();
    let mut cursor = 0u32;
    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        let slot = word_duration_ms / chars.len().max(1) as u32;
        let mut silence_start: Option<u32> = None;
        for (index, ch) in chars.iter().enumerate() {
            let at = cursor + index as u32 * slot;
            match vowel_viseme(*ch) {
                Some(viseme) => {
                    if let Some(start) = silence_start.take() {
                        timeline.push(Viseme::Sil, start, at - start);
                    }
                    timeline.push(viseme, at, slot);
                }
                None => {
                    silence_start.get_or_insert(at);
                }
            }
        }
        if let Some(start) = silence_start {
            timeline.push(Viseme::Sil, start, cursor + word_duration_ms - start);
        }
        cursor += word_duration_ms;
    }
    timeline
}

fn vowel_viseme(ch: char) -> Option<Viseme> {
    match ch.to_ascii_lowercase() {
        'a' => Some(Viseme::Aa),
        'e' => Some(Viseme::E),
        'i' => Some(Viseme::I),
        'o' => Some(Viseme::O),
        'u' => Some(Viseme::U),
        _ => None,
    }
}
