use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Identifier of a synthetic voice, in the neural engine's naming scheme
/// (e.g. `af_bella`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VoiceId(pub String);

impl VoiceId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Rig the avatar model was built against; determines the animation set.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum BodyType {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VoiceGender {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AvatarEntry {
    pub id: String,
    pub name: String,
    pub body: BodyType,
    pub url: Url,
    #[serde(default)]
    pub thumbnail: Option<Url>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackgroundEntry {
    pub id: String,
    pub name: String,
    pub url: Url,
    #[serde(default)]
    pub thumbnail: Option<Url>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceEntry {
    pub id: VoiceId,
    pub name: String,
    pub gender: VoiceGender,
    #[serde(default)]
    pub default: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate {section} id: {id}")]
    DuplicateId { section: &'static str, id: String },

    #[error("no {0} entry is flagged default")]
    NoDefault(&'static str),

    #[error("more than one {0} entry is flagged default")]
    MultipleDefaults(&'static str),
}

/// Selectable avatars, backgrounds and voices.
///
/// Invariants, enforced at construction: ids are unique per section and
/// exactly one entry per section carries the default flag. Lookups by id go
/// through index maps and are O(1).
#[derive(Clone, Debug)]
pub struct Catalog {
    avatars: Vec<AvatarEntry>,
    backgrounds: Vec<BackgroundEntry>,
    voices: Vec<VoiceEntry>,
    avatar_index: HashMap<String, usize>,
    background_index: HashMap<String, usize>,
    voice_index: HashMap<VoiceId, usize>,
    default_avatar: usize,
    default_background: usize,
    default_voice: usize,
}

impl Catalog {
    pub fn new(
        avatars: Vec<AvatarEntry>,
        backgrounds: Vec<BackgroundEntry>,
        voices: Vec<VoiceEntry>,
    ) -> Result<Self, CatalogError> {
        let avatar_index = index_by("avatar", avatars.iter().map(|a| a.id.clone()))?;
        let background_index = index_by("background", backgrounds.iter().map(|b| b.id.clone()))?;
        let voice_index = index_by("voice", voices.iter().map(|v| v.id.clone()))?;

        let default_avatar = single_default("avatar", avatars.iter().map(|a| a.default))?;
        let default_background =
            single_default("background", backgrounds.iter().map(|b| b.default))?;
        let default_voice = single_default("voice", voices.iter().map(|v| v.default))?;

        Ok(Self {
            avatars,
            backgrounds,
            voices,
            avatar_index,
            background_index,
            voice_index,
            default_avatar,
            default_background,
            default_voice,
        })
    }

    pub fn avatar(&self, id: &str) -> Option<&AvatarEntry> {
        self.avatar_index.get(id).map(|i| &self.avatars[*i])
    }

    pub fn background(&self, id: &str) -> Option<&BackgroundEntry> {
        self.background_index.get(id).map(|i| &self.backgrounds[*i])
    }

    pub fn voice(&self, id: &VoiceId) -> Option<&VoiceEntry> {
        self.voice_index.get(id).map(|i| &self.voices[*i])
    }

    pub fn default_avatar(&self) -> &AvatarEntry {
        &self.avatars[self.default_avatar]
    }

    pub fn default_background(&self) -> &BackgroundEntry {
        &self.backgrounds[self.default_background]
    }

    pub fn default_voice(&self) -> &VoiceEntry {
        &self.voices[self.default_voice]
    }

    pub fn avatars(&self) -> &[AvatarEntry] {
        &self.avatars
    }

    pub fn backgrounds(&self) -> &[BackgroundEntry] {
        &self.backgrounds
    }

    pub fn voices(&self) -> &[VoiceEntry] {
        &self.voices
    }

    /// The preset roster shipped with the studio: six Ready Player Me
    /// anchors, six backdrop images and the neural voice roster.
    pub fn builtin() -> Self {
        let avatars = vec![
            preset_avatar("female-1", "Sarah", BodyType::Female, "64bfa15f0e72c63d7c3934a6", true),
            preset_avatar("female-2", "Emma", BodyType::Female, "6460717a4c6e8a55c44fee44", false),
            preset_avatar("male-1", "Michael", BodyType::Male, "64606ea54c6e8a55c44fec7e", false),
            preset_avatar("male-2", "James", BodyType::Male, "6460730c4c6e8a55c44fef95", false),
            preset_avatar("female-3", "Lisa", BodyType::Female, "64607247d101a70e388e2927", false),
            preset_avatar("male-3", "David", BodyType::Male, "64606f8bd101a70e388e26cc", false),
        ];
        let backgrounds = vec![
            preset_background("newsroom", "Newsroom", "photo-1495020689067-958852a7765e", true),
            preset_background("city", "City Skyline", "photo-1477959858617-67f85cf4f1df", false),
            preset_background("world-map", "World Map", "photo-1526778548025-fa2f459cd5c1", false),
            preset_background("tech", "Technology", "photo-1518770660439-4636190af475", false),
            preset_background("finance", "Finance", "photo-1611974789855-9c2a0a7236a3", false),
            preset_background("abstract", "Abstract", "photo-1557683316-973673baf926", false),
        ];
        let voices = vec![
            preset_voice("af_bella", "Bella (Female US)", VoiceGender::Female, true),
            preset_voice("af_nicole", "Nicole (Female US)", VoiceGender::Female, false),
            preset_voice("af_sarah", "Sarah (Female US)", VoiceGender::Female, false),
            preset_voice("af_sky", "Sky (Female US)", VoiceGender::Female, false),
            preset_voice("am_adam", "Adam (Male US)", VoiceGender::Male, false),
            preset_voice("am_michael", "Michael (Male US)", VoiceGender::Male, false),
            preset_voice("am_fenrir", "Fenrir (Male US)", VoiceGender::Male, false),
            preset_voice("bf_emma", "Emma (Female UK)", VoiceGender::Female, false),
            preset_voice("bf_isabella", "Isabella (Female UK)", VoiceGender::Female, false),
            preset_voice("bm_george", "George (Male UK)", VoiceGender::Male, false),
            preset_voice("bm_lewis", "Lewis (Male UK)", VoiceGender::Male, false),
        ];
        Self::new(avatars, backgrounds, voices).expect("builtin catalog entries are valid")
    }
}

fn index_by<K: std::hash::Hash + Eq + Clone + std::fmt::Display>(
    section: &'static str,
    ids: impl Iterator<Item = K>,
) -> Result<HashMap<K, usize>, CatalogError> {
    let mut index = HashMap::new();
    for (position, id) in ids.enumerate() {
        if index.insert(id.clone(), position).is_some() {
            return Err(CatalogError::DuplicateId {
                section,
                id: id.to_string(),
            });
        }
    }
    Ok(index)
}

fn single_default(
    section: &'static str,
    flags: impl Iterator<Item = bool>,
) -> Result<usize, CatalogError> {
    let mut found = None;
    for (position, flag) in flags.enumerate() {
        if flag {
            if found.is_some() {
                return Err(CatalogError::MultipleDefaults(section));
            }
            found = Some(position);
        }
    }
    found.ok_or(CatalogError::NoDefault(section))
}

const MODEL_QUERY: &str = "morphTargets=ARKit,Oculus+Visemes,mouthOpen,mouthSmile,eyesClosed,eyesLookUp,eyesLookDown&textureSizeLimit=1024&textureFormat=png";

fn preset_avatar(id: &str, name: &str, body: BodyType, model: &str, default: bool) -> AvatarEntry {
    let url = format!("https://models.readyplayer.me/{model}.glb?{MODEL_QUERY}");
    let thumbnail =
        format!("https://api.readyplayer.me/v1/avatars/{model}/portrait.png?w=150&h=150");
    AvatarEntry {
        id: id.to_owned(),
        name: name.to_owned(),
        body,
        url: Url::parse(&url).expect("preset avatar url is valid"),
        thumbnail: Some(Url::parse(&thumbnail).expect("preset thumbnail url is valid")),
        default,
    }
}

fn preset_background(id: &str, name: &str, photo: &str, default: bool) -> BackgroundEntry {
    let url = format!("https://images.unsplash.com/{photo}?w=1920&q=80");
    let thumbnail = format!("https://images.unsplash.com/{photo}?w=400&q=60");
    BackgroundEntry {
        id: id.to_owned(),
        name: name.to_owned(),
        url: Url::parse(&url).expect("preset background url is valid"),
        thumbnail: Some(Url::parse(&thumbnail).expect("preset thumbnail url is valid")),
        default,
    }
}

fn preset_voice(id: &str, name: &str, gender: VoiceGender, default: bool) -> VoiceEntry {
    VoiceEntry {
        id: VoiceId::new(id),
        name: name.to_owned(),
        gender,
        default,
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, default: bool) -> VoiceEntry {
        preset_voice(id, id, VoiceGender::Female, default)
    }

    fn one_avatar() -> Vec<AvatarEntry> {
        vec![preset_avatar("a1", "A", BodyType::Female, "64bfa15f0e72c63d7c3934a6", true)]
    }

    fn one_background() -> Vec<BackgroundEntry> {
        vec![preset_background("b1", "B", "photo-1495020689067-958852a7765e", true)]
    }

    #[test]
    fn builtin_catalog_resolves_defaults() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.default_avatar().id, "female-1");
        assert_eq!(catalog.default_background().id, "newsroom");
        assert_eq!(catalog.default_voice().id.as_str(), "af_bella");
    }

    #[test]
    fn lookup_by_id_finds_presets() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.avatar("male-2").map(|a| a.name.as_str()), Some("James"));
        assert_eq!(catalog.background("tech").map(|b| b.name.as_str()), Some("Technology"));
        assert!(catalog.voice(&VoiceId::new("bm_lewis")).is_some());
        assert!(catalog.avatar("nope").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Catalog::new(
            one_avatar(),
            one_background(),
            vec![voice("a", true), voice("a", false)],
        )
        .expect_err("duplicate id");
        assert_eq!(
            err,
            CatalogError::DuplicateId {
                section: "voice",
                id: "a".to_owned()
            }
        );
    }

    #[test]
    fn exactly_one_default_is_required() {
        assert_eq!(
            Catalog::new(one_avatar(), one_background(), vec![voice("a", false)])
                .expect_err("none"),
            CatalogError::NoDefault("voice")
        );
        assert_eq!(
            Catalog::new(
                one_avatar(),
                one_background(),
                vec![voice("a", true), voice("b", true)]
            )
            .expect_err("two"),
            CatalogError::MultipleDefaults("voice")
        );
    }
}
