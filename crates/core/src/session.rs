use crate::catalog::Catalog;
use crate::config::{AppConfig, OverlayPrefs, RunnerDefaults};
use crate::events::{ControlState, EventSink, FanoutEventSink, Overlay, SessionEvent};
use crate::playback::AudioSink;
use crate::renderer::{AvatarRenderer, WordCallback};
use crate::runner::{RunOutcome, RunnerError, ScriptRunner};
use crate::scene::{SceneController, SceneState};
use crate::script::{Script, ScriptError};
use crate::speech::{PrerecordedClip, PrerecordedPlayer, SpeechChannel, SpeechError, SpeechRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Broadcast lifecycle: `Idle -> Playing <-> Paused -> Stopped -> Idle`.
/// `Stopped` is the transient teardown phase; the machine settles in `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("broadcast already in progress")]
    NotIdle,

    #[error("nothing is playing")]
    NotPlaying,

    #[error("nothing to play: no script loaded and no text provided")]
    NothingToPlay,

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Speech(#[from] SpeechError),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    /// 1-based index of the segment most recently started; 0 before any.
    pub current_segment: usize,
    pub scene: SceneState,
}

/// Captures segment progress off the event stream so snapshots can report
/// the cursor without coupling the runner to the session.
struct ProgressTracker {
    current: Arc<AtomicUsize>,
}

impl EventSink for ProgressTracker {
    fn emit(&self, event: SessionEvent) {
        if let SessionEvent::Progress { current, .. } = event {
            self.current.store(current, Ordering::Relaxed);
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Top-level broadcast controller: owns the phase machine, gates transport
/// controls, toggles overlays, and hands the actual speaking to the script
/// runner, the ad-hoc speech channel or the prerecorded player.
pub struct BroadcastSession<R, S, A> {
    renderer: Arc<R>,
    scene: SceneController<R>,
    runner: ScriptRunner<R, S>,
    speech: S,
    prerecorded: PrerecordedPlayer<R, A>,
    events: Arc<dyn EventSink>,
    overlays: OverlayPrefs,
    defaults: RunnerDefaults,
    phase: Arc<Mutex<Phase>>,
    script: Arc<Mutex<Option<Script>>>,
    staged: Arc<Mutex<Option<PrerecordedClip>>>,
    current_segment: Arc<AtomicUsize>,
}

impl<R, S, A> BroadcastSession<R, S, A>
where
    R: AvatarRenderer,
    S: SpeechChannel + Clone,
    A: AudioSink,
{
    pub fn new(
        renderer: Arc<R>,
        catalog: Arc<Catalog>,
        speech: S,
        audio: A,
        config: &AppConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let current_segment = Arc::new(AtomicUsize::new(0));
        let tracker: Arc<dyn EventSink> = Arc::new(ProgressTracker {
            current: Arc::clone(&current_segment),
        });
        let events: Arc<dyn EventSink> =
            Arc::new(FanoutEventSink::new(vec![events, tracker]));

        let scene = SceneController::new(Arc::clone(&renderer), catalog, Arc::clone(&events));
        let runner = ScriptRunner::new(
            scene.clone(),
            speech.clone(),
            config.runner.clone(),
            Arc::clone(&events),
        );
        let prerecorded = PrerecordedPlayer::new(Arc::clone(&renderer), audio);

        Self {
            renderer,
            scene,
            runner,
            speech,
            prerecorded,
            events,
            overlays: config.overlays,
            defaults: config.runner.clone(),
            phase: Arc::new(Mutex::new(Phase::Idle)),
            script: Arc::new(Mutex::new(None)),
            staged: Arc::new(Mutex::new(None)),
            current_segment,
        }
    }

    pub fn scene(&self) -> &SceneController<R> {
        &self.scene
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            current_segment: self.current_segment.load(Ordering::Relaxed),
            scene: self.scene.snapshot(),
        }
    }

    /// Atomic replace-or-reject: a malformed file leaves the currently
    /// loaded script untouched. Replacing cancels a run in progress.
    pub fn load_script_json(&self, input: &str) -> Result<usize, SessionError> {
        let script = Script::from_json(input)?;
        Ok(self.load_script(script))
    }

    pub fn load_script(&self, script: Script) -> usize {
        self.stop();
        let count = script.len();
        *lock(&self.script) = Some(script);
        self.status(format!("Script loaded: {count} segments"));
        count
    }

    pub fn clear_script(&self) {
        *lock(&self.script) = None;
    }

    /// Stages external audio + lip-sync for the next `start`.
    pub fn stage_prerecorded(&self, clip: PrerecordedClip) {
        *lock(&self.staged) = Some(clip);
        self.status("Prerecorded audio staged".to_owned());
    }

    pub fn clear_prerecorded(&self) {
        *lock(&self.staged) = None;
    }

    /// Starts a broadcast from `Idle`: the loaded script if any, else a
    /// staged prerecorded clip, else the given ad-hoc text.
    pub async fn start(&self, text: Option<&str>) -> Result<RunOutcome, SessionError> {
        let script = lock(&self.script).clone();
        let staged = lock(&self.staged).clone();
        let text = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);

        if script.is_none() && staged.is_none() && text.is_none() {
            self.status("Provide a script or text to broadcast".to_owned());
            return Err(SessionError::NothingToPlay);
        }

        {
            let mut phase = lock(&self.phase);
            if *phase != Phase::Idle {
                return Err(SessionError::NotIdle);
            }
            *phase = Phase::Playing;
        }

        self.current_segment.store(0, Ordering::Relaxed);
        self.events.emit(SessionEvent::Phase(Phase::Playing));
        self.events.emit(SessionEvent::Controls(ControlState {
            play: false,
            pause: true,
            stop: true,
        }));
        self.show_overlays();
        self.status("Broadcasting...".to_owned());

        let result: Result<RunOutcome, SessionError> = if let Some(script) = script {
            self.runner.run(&script).await.map_err(Into::into)
        } else if let Some(clip) = staged {
            self.prerecorded
                .play(clip)
                .await
                .map(|()| RunOutcome::Completed)
                .map_err(Into::into)
        } else if let Some(text) = text {
            self.speak_adhoc(text).await
        } else {
            Err(SessionError::NothingToPlay)
        };

        if let Err(error) = &result {
            self.status(format!("Broadcast error: {error}"));
        }

        // pause() leaves the session resting in Paused; teardown then
        // belongs to the stop() that ends it.
        if self.phase() != Phase::Paused {
            self.stop();
        }
        result
    }

    async fn speak_adhoc(&self, text: String) -> Result<RunOutcome, SessionError> {
        self.events
            .emit(SessionEvent::Subtitle { text: text.clone() });
        let request = SpeechRequest {
            text,
            voice: self.defaults.voice.clone(),
            speed: self.defaults.speed,
        };
        let highlight = Arc::clone(&self.events);
        let on_word: WordCallback = Arc::new(move |word: &str| {
            highlight.emit(SessionEvent::SubtitleHighlight {
                word: word.to_owned(),
            });
        });
        let spoken = self.speech.speak(request, Some(on_word)).await;
        self.events.emit(SessionEvent::SubtitlesCleared);
        spoken.map(|()| RunOutcome::Completed).map_err(Into::into)
    }

    /// Deliberate halt: silences the renderer immediately. There is no
    /// resume-from-offset; the session rests in `Paused` until `stop()`.
    pub fn pause(&self) -> Result<(), SessionError> {
        {
            let mut phase = lock(&self.phase);
            if *phase != Phase::Playing {
                return Err(SessionError::NotPlaying);
            }
            *phase = Phase::Paused;
        }
        self.runner.cancel();
        self.speech.cancel();
        self.renderer.stop();
        self.events.emit(SessionEvent::Phase(Phase::Paused));
        self.events.emit(SessionEvent::Controls(ControlState {
            play: false,
            pause: false,
            stop: true,
        }));
        self.status("Broadcast paused".to_owned());
        Ok(())
    }

    /// Tears the broadcast down from any non-idle phase and settles in
    /// `Idle`. Safe to call repeatedly and from `Idle`.
    pub fn stop(&self) {
        {
            let mut phase = lock(&self.phase);
            if matches!(*phase, Phase::Idle | Phase::Stopped) {
                return;
            }
            *phase = Phase::Stopped;
        }
        self.events.emit(SessionEvent::Phase(Phase::Stopped));

        self.runner.cancel();
        self.speech.cancel();
        self.prerecorded.stop();
        self.renderer.stop();

        for overlay in [
            Overlay::LowerThird,
            Overlay::Ticker,
            Overlay::Subtitles,
            Overlay::LiveIndicator,
        ] {
            self.events.emit(SessionEvent::Overlay {
                overlay,
                visible: false,
            });
        }
        self.events.emit(SessionEvent::SubtitlesCleared);
        self.events.emit(SessionEvent::Controls(ControlState {
            play: true,
            pause: false,
            stop: false,
        }));
        self.status("Broadcast stopped".to_owned());

        *lock(&self.phase) = Phase::Idle;
        self.events.emit(SessionEvent::Phase(Phase::Idle));
    }

    fn show_overlays(&self) {
        self.events.emit(SessionEvent::Overlay {
            overlay: Overlay::LiveIndicator,
            visible: true,
        });
        let prefs = [
            (Overlay::LowerThird, self.overlays.lower_third),
            (Overlay::Ticker, self.overlays.ticker),
            (Overlay::Subtitles, self.overlays.subtitles),
        ];
        for (overlay, visible) in prefs {
            if visible {
                self.events.emit(SessionEvent::Overlay {
                    overlay,
                    visible: true,
                });
            }
        }
    }

    fn status(&self, message: String) {
        self.events.emit(SessionEvent::Status(message));
    }
}
