#![deny(warnings)]

use anchorcast_core::bridge::{HostBridge, HostPort};
use anchorcast_core::catalog::{Catalog, VoiceId};
use anchorcast_core::config::{
    parse_engine, resolve_string_with_default, AppConfig, EngineChoice, LowerThird, OverlayPrefs,
    RunnerDefaults, SpeakingPoll, SpeechSpeed, StdEnv, DEFAULT_RECORD_FPS,
    DEFAULT_SEGMENT_DELAY_MS, DEFAULT_SPEECH_SPEED, ENV_ENGINE, ENV_OUTPUT_DIR,
};
use anchorcast_core::events::{
    ChannelEventSink, EventSink, FanoutEventSink, Indicator, IndicatorState, Overlay, SessionEvent,
};
use anchorcast_core::playback::{AudioSink, DummyAudioSink};
use anchorcast_core::record::{FsRecordingSink, Recorder};
use anchorcast_core::renderer::HeadlessRenderer;
use anchorcast_core::session::BroadcastSession;
use anchorcast_core::speech::{
    BasicPlatformSpeech, DummyNeuralEngine, FallbackSpeechChannel, NeuralEngine,
    NeuralSpeechChannel, PlatformSpeechChannel, SpeechChannel,
};
use anyhow::Context;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anchorcast")]
#[command(about = "Headless rehearsal of AI news-anchor broadcast scripts")]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .multiple(false)
        .args(["script", "text"])
))]
struct Args {
    /// Broadcast script JSON: an array of segments or {"segments": [...]}
    #[arg(long)]
    script: Option<PathBuf>,

    /// Ad-hoc utterance to speak instead of a script
    #[arg(long)]
    text: Option<String>,

    /// Catalog avatar id (defaults to the catalog default)
    #[arg(long)]
    avatar: Option<String>,

    /// Catalog background id (defaults to the catalog default)
    #[arg(long)]
    background: Option<String>,

    /// Voice id for ad-hoc text and segments without one
    #[arg(long)]
    voice: Option<String>,

    #[arg(long, default_value_t = DEFAULT_SPEECH_SPEED)]
    speed: f32,

    #[arg(long, default_value_t = DEFAULT_SEGMENT_DELAY_MS)]
    segment_delay_ms: u64,

    /// Synthesis strategy: "neural" or "platform"
    #[arg(long)]
    engine: Option<String>,

    #[arg(long)]
    anchor_name: Option<String>,

    #[arg(long)]
    anchor_title: Option<String>,

    #[arg(long)]
    ticker: Option<String>,

    #[arg(long, default_value_t = false)]
    no_lower_third: bool,

    #[arg(long, default_value_t = false)]
    no_ticker: bool,

    #[arg(long, default_value_t = false)]
    subtitles: bool,

    /// Record the rehearsal into --output-dir
    #[arg(long, default_value_t = false)]
    record: bool,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Emit host-embedding JSON messages on stdout
    #[arg(long, default_value_t = false)]
    host_messages: bool,

    /// Skip audio output
    #[arg(long, default_value_t = false)]
    mute: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;
    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    let env = StdEnv;
    let catalog = Arc::new(Catalog::builtin());
    let cfg = build_config(&args, &catalog, &env)?;
    let output_dir = resolve_output_dir(&args, &env);

    tracing::info!(
        engine = ?cfg.engine,
        voice = %cfg.runner.voice,
        segment_delay_ms = cfg.runner.segment_delay.as_millis(),
        "config loaded"
    );

    let renderer = Arc::new(HeadlessRenderer::new());

    // Event fan-out: a printer task, plus the host bridge when requested.
    let (channel_sink, rx) = ChannelEventSink::new();
    let printer = tokio::spawn(print_events(rx, cfg.lower_third.clone(), cfg.ticker_text.clone()));
    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(channel_sink)];
    let bridge = args.host_messages.then(|| {
        let bridge = HostBridge::new(Arc::new(StdoutHostPort));
        sinks.push(Arc::new(bridge.clone()));
        bridge
    });
    let events: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(sinks));

    let audio = audio_sink(args.mute);
    let speech = speech_channel(&cfg, Arc::clone(&renderer), Arc::clone(&audio), &events).await;

    let session = Arc::new(BroadcastSession::new(
        Arc::clone(&renderer),
        Arc::clone(&catalog),
        speech,
        Arc::clone(&audio),
        &cfg,
        Arc::clone(&events),
    ));

    let avatar_id = args
        .avatar
        .clone()
        .unwrap_or_else(|| catalog.default_avatar().id.clone());
    session
        .scene()
        .load_avatar(&avatar_id)
        .await
        .with_context(|| format!("failed to load avatar {avatar_id}"))?;

    let background_id = args
        .background
        .clone()
        .unwrap_or_else(|| catalog.default_background().id.clone());
    session
        .scene()
        .load_background(&background_id)
        .with_context(|| format!("failed to load background {background_id}"))?;

    let recorder = args.record.then(|| {
        Recorder::new(
            Arc::clone(&renderer),
            FsRecordingSink::new(output_dir),
            DEFAULT_RECORD_FPS,
            Arc::clone(&events),
        )
    });
    if let Some(recorder) = &recorder {
        if let Err(error) = recorder.start() {
            tracing::warn!(%error, "recording unavailable, continuing without it");
        }
    }

    if let Some(bridge) = &bridge {
        bridge.announce_ready();
    }

    let outcome = match (&args.script, &args.text) {
        (Some(path), _) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read script {}", path.display()))?;
            let count = session
                .load_script_json(&contents)
                .context("invalid script file")?;
            tracing::info!(segments = count, "script loaded");
            session.start(None).await?
        }
        (None, Some(text)) => session.start(Some(text)).await?,
        (None, None) => anyhow::bail!("either --script or --text is required"),
    };
    tracing::info!(?outcome, "broadcast finished");

    if let Some(recorder) = &recorder {
        if let Some(saved) = recorder.stop().await? {
            tracing::info!(
                path = %saved.path.display(),
                bytes = saved.bytes,
                "recording saved"
            );
        }
    }

    // Drop every sender so the printer drains and exits.
    drop(session);
    drop(recorder);
    drop(events);
    let _ = printer.await;

    Ok(())
}

fn audio_sink(mute: bool) -> Arc<dyn AudioSink> {
    if mute {
        return Arc::new(DummyAudioSink::new());
    }
    #[cfg(feature = "rodio-sink")]
    {
        return Arc::new(anchorcast_core::playback::RodioAudioSink::new());
    }
    #[cfg(not(feature = "rodio-sink"))]
    {
        tracing::warn!("built without the rodio-sink feature; audio is muted");
        Arc::new(DummyAudioSink::new())
    }
}

/// Builds the speech stack. The rehearsal binary carries no real neural
/// endpoint, so the neural path runs on the in-process stand-in engine with
/// the tone synthesizer as its fallback; the platform path uses the tone
/// synthesizer directly and reports approximate lip-sync.
async fn speech_channel(
    cfg: &AppConfig,
    renderer: Arc<HeadlessRenderer>,
    audio: Arc<dyn AudioSink>,
    events: &Arc<dyn EventSink>,
) -> Arc<dyn SpeechChannel> {
    let platform = PlatformSpeechChannel::new(BasicPlatformSpeech::new(audio), renderer.clone());
    match cfg.engine {
        EngineChoice::Neural => {
            let engine = DummyNeuralEngine::connected();
            match engine.connect(None).await {
                Ok(()) => {
                    events.emit(SessionEvent::Indicator {
                        indicator: Indicator::Tts,
                        state: IndicatorState::Ready,
                    });
                    events.emit(SessionEvent::Indicator {
                        indicator: Indicator::LipSync,
                        state: IndicatorState::Ready,
                    });
                }
                Err(error) => {
                    tracing::warn!(%error, "neural engine unavailable, platform speech will cover");
                    events.emit(SessionEvent::Indicator {
                        indicator: Indicator::Tts,
                        state: IndicatorState::Warning,
                    });
                }
            }
            let neural = NeuralSpeechChannel::new(engine, renderer, cfg.speaking_poll);
            Arc::new(FallbackSpeechChannel::new(neural, platform))
        }
        EngineChoice::Platform => {
            events.emit(SessionEvent::Indicator {
                indicator: Indicator::Tts,
                state: IndicatorState::Warning,
            });
            events.emit(SessionEvent::Indicator {
                indicator: Indicator::LipSync,
                state: IndicatorState::Warning,
            });
            Arc::new(platform)
        }
    }
}

struct StdoutHostPort;

impl HostPort for StdoutHostPort {
    fn post(&self, message: &str) {
        println!("{message}");
    }
}

async fn print_events(
    mut rx: UnboundedReceiver<SessionEvent>,
    lower_third: LowerThird,
    ticker_text: String,
) {
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Status(message) => {
                tracing::info!(target: "anchorcast::status", "{message}");
            }
            SessionEvent::Phase(phase) => {
                tracing::info!(target: "anchorcast::status", ?phase, "phase");
            }
            SessionEvent::Progress { current, total } => {
                tracing::info!(target: "anchorcast::status", "segment {current}/{total}");
            }
            SessionEvent::Indicator { indicator, state } => {
                tracing::debug!(target: "anchorcast::status", ?indicator, ?state, "indicator");
            }
            SessionEvent::Overlay { overlay, visible } => match (overlay, visible) {
                (Overlay::LowerThird, true) => {
                    tracing::info!(
                        target: "anchorcast::overlay",
                        "lower third: {} | {}",
                        lower_third.name,
                        lower_third.title
                    );
                }
                (Overlay::Ticker, true) => {
                    tracing::info!(target: "anchorcast::overlay", "ticker: {ticker_text}");
                }
                (overlay, visible) => {
                    tracing::debug!(target: "anchorcast::overlay", ?overlay, visible, "overlay");
                }
            },
            SessionEvent::Subtitle { text } => {
                tracing::info!(target: "anchorcast::subtitles", "{text}");
            }
            SessionEvent::SubtitleHighlight { word } => {
                tracing::trace!(target: "anchorcast::subtitles", "{word}");
            }
            SessionEvent::SubtitlesCleared => {
                tracing::trace!(target: "anchorcast::subtitles", "cleared");
            }
            SessionEvent::Controls(controls) => {
                tracing::debug!(target: "anchorcast::status", ?controls, "controls");
            }
            SessionEvent::RecordingSaved { path } => {
                tracing::info!(target: "anchorcast::status", path = %path.display(), "recording saved");
            }
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(
    args: &Args,
    catalog: &Catalog,
    env: &impl anchorcast_core::config::Env,
) -> anyhow::Result<AppConfig> {
    let engine_value = resolve_string_with_default(args.engine.clone(), ENV_ENGINE, env, "neural");
    let engine = parse_engine(&engine_value)?;

    let voice = match &args.voice {
        Some(value) => {
            let id = VoiceId::new(value.clone());
            anyhow::ensure!(catalog.voice(&id).is_some(), "unknown voice: {value}");
            id
        }
        None => catalog.default_voice().id.clone(),
    };
    let speed = SpeechSpeed::new(args.speed)?;

    Ok(AppConfig {
        engine,
        overlays: OverlayPrefs {
            lower_third: !args.no_lower_third,
            ticker: !args.no_ticker,
            subtitles: args.subtitles,
        },
        lower_third: LowerThird {
            name: args.anchor_name.clone().unwrap_or_default(),
            title: args.anchor_title.clone().unwrap_or_default(),
        },
        ticker_text: args.ticker.clone().unwrap_or_default(),
        runner: RunnerDefaults {
            voice,
            speed,
            segment_delay: Duration::from_millis(args.segment_delay_ms),
            ..RunnerDefaults::default()
        },
        speaking_poll: SpeakingPoll::default(),
    })
}

fn resolve_output_dir(args: &Args, env: &impl anchorcast_core::config::Env) -> PathBuf {
    PathBuf::from(resolve_string_with_default(
        args.output_dir
            .as_ref()
            .map(|p| p.display().to_string()),
        ENV_OUTPUT_DIR,
        env,
        "recordings",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorcast_core::config::MapEnv;

    fn base_args() -> Args {
        Args::parse_from(["anchorcast", "--text", "hello"])
    }

    #[test]
    fn engine_resolution_prefers_cli_then_env() {
        let catalog = Catalog::builtin();
        let env = MapEnv::default().with_var(ENV_ENGINE, "platform");

        let mut args = base_args();
        args.engine = Some("neural".to_owned());
        let cfg = build_config(&args, &catalog, &env).expect("config builds");
        assert_eq!(cfg.engine, EngineChoice::Neural);

        args.engine = None;
        let cfg = build_config(&args, &catalog, &env).expect("config builds");
        assert_eq!(cfg.engine, EngineChoice::Platform);
    }

    #[test]
    fn unknown_voice_is_rejected() {
        let catalog = Catalog::builtin();
        let mut args = base_args();
        args.voice = Some("not_a_voice".to_owned());
        assert!(build_config(&args, &catalog, &MapEnv::default()).is_err());
    }

    #[test]
    fn overlay_flags_invert_into_prefs() {
        let catalog = Catalog::builtin();
        let mut args = base_args();
        args.no_ticker = true;
        args.subtitles = true;
        let cfg = build_config(&args, &catalog, &MapEnv::default()).expect("config builds");
        assert!(cfg.overlays.lower_third);
        assert!(!cfg.overlays.ticker);
        assert!(cfg.overlays.subtitles);
    }

    #[test]
    fn output_dir_falls_back_to_env_then_default() {
        let mut args = base_args();
        args.output_dir = Some(PathBuf::from("/tmp/rehearsals"));
        let env = MapEnv::default().with_var(ENV_OUTPUT_DIR, "/var/rec");
        assert_eq!(resolve_output_dir(&args, &env), PathBuf::from("/tmp/rehearsals"));

        args.output_dir = None;
        assert_eq!(resolve_output_dir(&args, &env), PathBuf::from("/var/rec"));
        assert_eq!(
            resolve_output_dir(&args, &MapEnv::default()),
            PathBuf::from("recordings")
        );
    }
}
