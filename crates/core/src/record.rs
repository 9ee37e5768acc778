use crate::events::{EventSink, SessionEvent};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Where recorded frames come from. `None` means there is nothing to
/// capture yet (no avatar on screen).
pub trait CaptureSource: Send + Sync {
    fn capture_frame(&self) -> Option<Bytes>;
}

/// Where a finalized recording goes.
pub trait RecordingSink: Send + Sync {
    fn save(&self, file_name: &str, data: Bytes) -> BoxFuture<'_, Result<PathBuf, RecordError>>;
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("no render surface available to record")]
    NoSurface,

    #[error("failed to save recording: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes recordings into a directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct FsRecordingSink {
    dir: PathBuf,
}

impl FsRecordingSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordingSink for FsRecordingSink {
    fn save(&self, file_name: &str, data: Bytes) -> BoxFuture<'_, Result<PathBuf, RecordError>> {
        let path = self.dir.join(file_name);
        async move {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&path, &data).await?;
            Ok(path)
        }
        .boxed()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedRecording {
    pub path: PathBuf,
    pub bytes: usize,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Captures the render surface at a fixed frame rate and materializes the
/// buffered chunks into one timestamped file on stop. Fully orthogonal to
/// the session phase: recording may span any number of broadcasts.
pub struct Recorder<C, K> {
    source: Arc<C>,
    sink: K,
    fps: u32,
    events: Arc<dyn EventSink>,
    state: Arc<RecorderState>,
}

struct RecorderState {
    recording: AtomicBool,
    chunks: Mutex<Vec<Bytes>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<C, K> Recorder<C, K>
where
    C: CaptureSource + 'static,
    K: RecordingSink,
{
    pub fn new(source: Arc<C>, sink: K, fps: u32, events: Arc<dyn EventSink>) -> Self {
        Self {
            source,
            sink,
            fps: fps.max(1),
            events,
            state: Arc::new(RecorderState {
                recording: AtomicBool::new(false),
                chunks: Mutex::new(Vec::new()),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.recording.load(Ordering::SeqCst)
    }

    /// Begins capturing. Fails gracefully when there is no surface yet:
    /// a status line, an error result, and nothing else changes.
    pub fn start(&self) -> Result<(), RecordError> {
        if self.state.recording.load(Ordering::SeqCst) {
            tracing::debug!("recording already in progress");
            return Ok(());
        }

        let Some(first) = self.source.capture_frame() else {
            self.events.emit(SessionEvent::Status(
                "No render surface to record".to_owned(),
            ));
            return Err(RecordError::NoSurface);
        };

        self.state.recording.store(true, Ordering::SeqCst);
        {
            let mut chunks = lock(&self.state.chunks);
            chunks.clear();
            chunks.push(first);
        }

        let interval = Duration::from_millis(1000 / u64::from(self.fps));
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !state.recording.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(frame) = source.capture_frame() {
                    lock(&state.chunks).push(frame);
                }
            }
        });
        *lock(&self.state.task) = Some(handle);

        self.events
            .emit(SessionEvent::Status("Recording started".to_owned()));
        Ok(())
    }

    /// Finalizes the buffer into a single downloadable file. A no-op when
    /// not recording.
    pub async fn stop(&self) -> Result<Option<SavedRecording>, RecordError> {
        if !self.state.recording.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        if let Some(handle) = lock(&self.state.task).take() {
            handle.abort();
        }

        let chunks = std::mem::take(&mut *lock(&self.state.chunks));
        let mut data = BytesMut::new();
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }
        let bytes = data.len();

        let file_name = format!("anchorcast_{}.webm", epoch_millis());
        let path = self.sink.save(&file_name, data.freeze()).await?;

        self.events.emit(SessionEvent::RecordingSaved {
            path: path.clone(),
        });
        self.events
            .emit(SessionEvent::Status("Recording saved".to_owned()));
        Ok(Some(SavedRecording { path, bytes }))
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BodyType;
    use crate::events::{ChannelEventSink, NullEventSink};
    use crate::renderer::{AvatarRenderer, AvatarSpec, HeadlessRenderer, Mood};
    use url::Url;

    #[derive(Clone, Default)]
    struct MemorySink {
        saved: Arc<Mutex<Vec<(String, Bytes)>>>,
    }

    impl RecordingSink for MemorySink {
        fn save(
            &self,
            file_name: &str,
            data: Bytes,
        ) -> BoxFuture<'_, Result<PathBuf, RecordError>> {
            let file_name = file_name.to_owned();
            let saved = Arc::clone(&self.saved);
            async move {
                lock(&saved).push((file_name.clone(), data));
                Ok(PathBuf::from(file_name))
            }
            .boxed()
        }
    }

    async fn renderer_with_avatar() -> Arc<HeadlessRenderer> {
        let renderer = Arc::new(HeadlessRenderer::new());
        renderer
            .show_avatar(AvatarSpec {
                url: Url::parse("https://example.com/anchor.glb").unwrap(),
                body: BodyType::Female,
                mood: Mood::Neutral,
            })
            .await
            .expect("avatar loads");
        renderer
    }

    #[tokio::test]
    async fn start_without_a_surface_fails_gracefully() {
        let (sink, mut rx) = ChannelEventSink::new();
        let recorder = Recorder::new(
            Arc::new(HeadlessRenderer::new()),
            MemorySink::default(),
            30,
            Arc::new(sink),
        );

        let err = recorder.start().expect_err("no surface yet");
        assert!(matches!(err, RecordError::NoSurface));
        assert!(!recorder.is_recording());
        assert!(matches!(
            rx.try_recv().expect("status line"),
            SessionEvent::Status(_)
        ));
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_no_op() {
        let recorder = Recorder::new(
            Arc::new(HeadlessRenderer::new()),
            MemorySink::default(),
            30,
            Arc::new(NullEventSink),
        );
        assert!(recorder.stop().await.expect("no-op").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn captures_frames_and_finalizes_one_file() {
        let renderer = renderer_with_avatar().await;
        let sink = MemorySink::default();
        let recorder = Recorder::new(Arc::clone(&renderer), sink.clone(), 30, Arc::new(NullEventSink));

        recorder.start().expect("surface available");
        assert!(recorder.is_recording());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let saved = recorder
            .stop()
            .await
            .expect("finalizes")
            .expect("was recording");

        assert!(saved.bytes > 0);
        let saved_files = lock(&sink.saved);
        assert_eq!(saved_files.len(), 1);
        let (name, data) = &saved_files[0];
        assert!(name.starts_with("anchorcast_"));
        assert!(name.ends_with(".webm"));
        assert_eq!(data.len(), saved.bytes);
        assert!(!recorder.is_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_while_recording_is_a_no_op() {
        let renderer = renderer_with_avatar().await;
        let recorder = Recorder::new(
            Arc::clone(&renderer),
            MemorySink::default(),
            30,
            Arc::new(NullEventSink),
        );

        recorder.start().expect("first start");
        recorder.start().expect("second start is a no-op");
        assert!(recorder.is_recording());
        recorder.stop().await.expect("stop");
    }
}
