use crate::lipsync::LipSyncFile;
use crate::playback::{AudioClip, AudioSink};
use crate::renderer::{AvatarRenderer, SpeechFrame};
use crate::speech::SpeechError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// Externally produced audio plus its lip-sync analysis file.
#[derive(Clone, Debug)]
pub struct PrerecordedClip {
    pub audio: AudioClip,
    pub lipsync: LipSyncFile,
}

/// Plays uploaded audio in lockstep with its external lip-sync data: mouth
/// cues are converted through the viseme mapper, the renderer animates, and
/// completion is the sink's end-of-clip.
pub struct PrerecordedPlayer<R, S> {
    renderer: Arc<R>,
    sink: S,
}

impl<R, S: Clone> Clone for PrerecordedPlayer<R, S> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            sink: self.sink.clone(),
        }
    }
}

impl<R, S> PrerecordedPlayer<R, S>
where
    R: AvatarRenderer,
    S: AudioSink,
{
    pub fn new(renderer: Arc<R>, sink: S) -> Self {
        Self { renderer, sink }
    }

    pub fn play(&self, clip: PrerecordedClip) -> BoxFuture<'_, Result<(), SpeechError>> {
        async move {
            let frame = SpeechFrame {
                timeline: clip.lipsync.into_timeline(),
                ..SpeechFrame::default()
            };
            self.renderer.speak_audio(frame, None);

            let result = self.sink.play(clip.audio).await;
            if result.is_err() {
                self.renderer.stop();
            }
            Ok(result?)
        }
        .boxed()
    }

    pub fn stop(&self) {
        self.sink.stop();
        self.renderer.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lipsync::{MouthCue, Viseme};
    use crate::playback::DummyAudioSink;
    use crate::renderer::HeadlessRenderer;

    fn clip() -> PrerecordedClip {
        PrerecordedClip {
            audio: AudioClip {
                sample_rate_hz: 22_050,
                channels: 1,
                pcm_i16: vec![0; 2_205],
            },
            lipsync: LipSyncFile::MouthCues {
                mouth_cues: vec![
                    MouthCue {
                        start: 0.0,
                        end: 0.2,
                        value: "B".to_owned(),
                    },
                    MouthCue {
                        start: 0.2,
                        end: 0.5,
                        value: "A".to_owned(),
                    },
                ],
            },
        }
    }

    #[tokio::test]
    async fn maps_cues_and_completes_with_the_audio() {
        let renderer = Arc::new(HeadlessRenderer::new());
        let sink = DummyAudioSink::new();
        let player = PrerecordedPlayer::new(Arc::clone(&renderer), sink.clone());

        player.play(clip()).await.expect("clip plays");

        assert_eq!(sink.play_count(), 1);
        let frames = renderer.spoken_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timeline.visemes, vec![Viseme::Pp, Viseme::Aa]);
        assert_eq!(frames[0].timeline.vtimes, vec![0, 200]);
        assert_eq!(frames[0].timeline.vdurations, vec![200, 300]);
    }

    #[tokio::test]
    async fn stop_halts_sink_and_renderer() {
        let renderer = Arc::new(HeadlessRenderer::new());
        let sink = DummyAudioSink::new();
        let player = PrerecordedPlayer::new(Arc::clone(&renderer), sink.clone());

        player.stop();
        assert_eq!(sink.stop_count(), 1);
        assert_eq!(renderer.stop_count(), 1);
    }
}
