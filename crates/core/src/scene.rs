use crate::catalog::{AvatarEntry, BackgroundEntry, BodyType, Catalog};
use crate::events::{EventSink, Indicator, IndicatorState, SessionEvent};
use crate::renderer::{AvatarRenderer, AvatarSpec, CameraView, Gesture, Mood, RendererError};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

const DEFAULT_ACCENT: &str = "#dc2626";

/// The avatar currently on screen. Ad-hoc sources are tracked as `Custom`
/// so they never show up as a selected catalog entry.
#[derive(Clone, Debug, PartialEq)]
pub enum ActiveAvatar {
    Preset(AvatarEntry),
    Custom { url: Url, body: BodyType },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActiveBackground {
    Preset(BackgroundEntry),
    Custom { url: Url },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneState {
    pub avatar: Option<ActiveAvatar>,
    pub background: Option<ActiveBackground>,
    pub mood: Mood,
    pub view: CameraView,
    pub accent_color: String,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            avatar: None,
            background: None,
            mood: Mood::Neutral,
            view: CameraView::Upper,
            accent_color: DEFAULT_ACCENT.to_owned(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    #[error("avatar not found: {0}")]
    UnknownAvatar(String),

    #[error("background not found: {0}")]
    UnknownBackground(String),

    #[error(transparent)]
    Renderer(#[from] RendererError),
}

/// Owns the renderer handle for everything scene-related: avatar and
/// background swaps, mood, camera view, accent color and gestures.
///
/// Load failures leave the previous avatar state intact so the broadcast
/// stays playable with the last good model.
pub struct SceneController<R> {
    renderer: Arc<R>,
    catalog: Arc<Catalog>,
    state: Arc<Mutex<SceneState>>,
    events: Arc<dyn EventSink>,
}

impl<R> Clone for SceneController<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            catalog: Arc::clone(&self.catalog),
            state: Arc::clone(&self.state),
            events: Arc::clone(&self.events),
        }
    }
}

fn lock<'a>(state: &'a Mutex<SceneState>) -> MutexGuard<'a, SceneState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<R> SceneController<R>
where
    R: AvatarRenderer,
{
    pub fn new(renderer: Arc<R>, catalog: Arc<Catalog>, events: Arc<dyn EventSink>) -> Self {
        Self {
            renderer,
            catalog,
            state: Arc::new(Mutex::new(SceneState::default())),
            events,
        }
    }

    pub fn snapshot(&self) -> SceneState {
        lock(&self.state).clone()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Loads the catalog's default avatar.
    pub async fn load_default_avatar(&self) -> Result<(), SceneError> {
        let id = self.catalog.default_avatar().id.clone();
        self.load_avatar(&id).await
    }

    pub async fn load_avatar(&self, id: &str) -> Result<(), SceneError> {
        let Some(entry) = self.catalog.avatar(id).cloned() else {
            self.indicator(Indicator::Avatar, IndicatorState::Error);
            self.status(format!("Avatar not found: {id}"));
            return Err(SceneError::UnknownAvatar(id.to_owned()));
        };

        self.status(format!("Loading avatar: {}...", entry.name));
        let name = entry.name.clone();
        let spec = AvatarSpec {
            url: entry.url.clone(),
            body: entry.body,
            mood: lock(&self.state).mood,
        };
        self.show(spec, ActiveAvatar::Preset(entry)).await?;
        self.status(format!("Avatar loaded: {name}"));
        Ok(())
    }

    /// Loads an ad-hoc (non-catalog) avatar source.
    pub async fn load_avatar_from_source(
        &self,
        url: Url,
        body: BodyType,
    ) -> Result<(), SceneError> {
        self.status("Loading custom avatar...".to_owned());
        let spec = AvatarSpec {
            url: url.clone(),
            body,
            mood: lock(&self.state).mood,
        };
        self.show(spec, ActiveAvatar::Custom { url, body }).await?;
        self.status("Custom avatar loaded".to_owned());
        Ok(())
    }

    async fn show(&self, spec: AvatarSpec, active: ActiveAvatar) -> Result<(), SceneError> {
        self.indicator(Indicator::Avatar, IndicatorState::Warning);
        match self.renderer.show_avatar(spec).await {
            Ok(()) => {
                lock(&self.state).avatar = Some(active);
                self.indicator(Indicator::Avatar, IndicatorState::Ready);
                Ok(())
            }
            Err(error) => {
                // Previous avatar stays active and usable.
                self.indicator(Indicator::Avatar, IndicatorState::Error);
                self.status(format!("Failed to load avatar: {error}"));
                Err(error.into())
            }
        }
    }

    pub fn load_background(&self, id: &str) -> Result<(), SceneError> {
        let Some(entry) = self.catalog.background(id).cloned() else {
            self.status(format!("Background not found: {id}"));
            return Err(SceneError::UnknownBackground(id.to_owned()));
        };
        let name = entry.name.clone();
        lock(&self.state).background = Some(ActiveBackground::Preset(entry));
        self.status(format!("Background: {name}"));
        Ok(())
    }

    pub fn load_background_from_source(&self, url: Url) {
        lock(&self.state).background = Some(ActiveBackground::Custom { url });
        self.status("Custom background loaded".to_owned());
    }

    /// Safe to call while speech is in progress.
    pub fn set_mood(&self, mood: Mood) {
        lock(&self.state).mood = mood;
        self.renderer.set_mood(mood);
    }

    pub fn set_view(&self, view: CameraView) {
        lock(&self.state).view = view;
        self.renderer.set_view(view, view.distance());
    }

    pub fn set_accent_color<S: Into<String>>(&self, color: S) {
        lock(&self.state).accent_color = color.into();
    }

    /// Fire-and-forget; never blocks segment advancement. Smile has no
    /// skeletal animation and lands as a mood flip on the renderer.
    pub fn play_gesture(&self, gesture: Gesture) {
        match gesture {
            Gesture::Smile => self.renderer.set_mood(Mood::Happy),
            other => self.renderer.play_gesture(other, 2.0),
        }
    }

    fn status(&self, message: String) {
        self.events.emit(SessionEvent::Status(message));
    }

    fn indicator(&self, indicator: Indicator, state: IndicatorState) {
        self.events.emit(SessionEvent::Indicator { indicator, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::renderer::HeadlessRenderer;

    fn controller() -> (SceneController<HeadlessRenderer>, Arc<HeadlessRenderer>) {
        let renderer = Arc::new(HeadlessRenderer::new());
        let controller = SceneController::new(
            Arc::clone(&renderer),
            Arc::new(Catalog::builtin()),
            Arc::new(NullEventSink),
        );
        (controller, renderer)
    }

    #[tokio::test]
    async fn loads_a_preset_avatar() {
        let (scene, renderer) = controller();
        scene.load_avatar("male-1").await.expect("preset loads");

        assert!(matches!(
            scene.snapshot().avatar,
            Some(ActiveAvatar::Preset(entry)) if entry.id == "male-1"
        ));
        assert_eq!(renderer.avatar().map(|a| a.body), Some(BodyType::Male));
    }

    #[tokio::test]
    async fn unknown_avatar_id_leaves_state_untouched() {
        let (scene, _renderer) = controller();
        scene.load_avatar("female-1").await.expect("first load");
        let before = scene.snapshot();

        let err = scene.load_avatar("ghost").await.expect_err("unknown id");
        assert!(matches!(err, SceneError::UnknownAvatar(_)));
        assert_eq!(scene.snapshot(), before);
    }

    #[tokio::test]
    async fn failed_renderer_load_keeps_previous_avatar() {
        let (scene, renderer) = controller();
        scene.load_avatar("female-1").await.expect("first load");

        renderer.set_fail_loads(true);
        let err = scene.load_avatar("male-1").await.expect_err("load fails");
        assert!(matches!(err, SceneError::Renderer(_)));
        assert!(matches!(
            scene.snapshot().avatar,
            Some(ActiveAvatar::Preset(entry)) if entry.id == "female-1"
        ));
    }

    #[tokio::test]
    async fn custom_sources_are_not_catalog_entries() {
        let (scene, _renderer) = controller();
        let url = Url::parse("https://example.com/me.glb").unwrap();
        scene
            .load_avatar_from_source(url.clone(), BodyType::Male)
            .await
            .expect("custom loads");

        assert!(matches!(
            scene.snapshot().avatar,
            Some(ActiveAvatar::Custom { url: u, body: BodyType::Male }) if u == url
        ));
    }

    #[tokio::test]
    async fn presentation_setters_reach_renderer_and_state() {
        let (scene, renderer) = controller();
        scene.set_mood(Mood::Happy);
        scene.set_view(CameraView::Head);
        scene.set_accent_color("#00ff00");

        let state = scene.snapshot();
        assert_eq!(state.mood, Mood::Happy);
        assert_eq!(state.view, CameraView::Head);
        assert_eq!(state.accent_color, "#00ff00");
        assert_eq!(renderer.mood(), Mood::Happy);
        assert_eq!(renderer.view(), (CameraView::Head, CameraView::Head.distance()));
    }

    #[tokio::test]
    async fn smile_gesture_becomes_a_mood_change() {
        let (scene, renderer) = controller();
        scene.play_gesture(Gesture::Wave);
        scene.play_gesture(Gesture::Smile);

        assert_eq!(renderer.gestures(), vec![Gesture::Wave]);
        assert_eq!(renderer.mood(), Mood::Happy);
    }

    #[test]
    fn background_swaps() {
        let (scene, _renderer) = controller();
        scene.load_background("tech").expect("preset background");
        assert!(matches!(
            scene.snapshot().background,
            Some(ActiveBackground::Preset(entry)) if entry.id == "tech"
        ));

        assert!(scene.load_background("void").is_err());
    }
}
