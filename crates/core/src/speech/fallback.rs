use crate::renderer::WordCallback;
use crate::speech::{SpeechChannel, SpeechError, SpeechRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const RETRY_PRIMARY_INTERVAL: Duration = Duration::from_secs(300);
const LOG_TARGET: &str = "speech::fallback";

/// Prefers the primary (neural) channel and degrades to the local one.
///
/// An `EngineUnavailable` from the primary latches a down flag so later
/// utterances skip straight to the local channel; the primary is probed
/// again after a cooldown. Any other primary error falls back for that
/// utterance only.
#[derive(Clone)]
pub struct FallbackSpeechChannel<P, L>
where
    P: SpeechChannel + Clone,
    L: SpeechChannel + Clone,
{
    primary: P,
    local: L,
    state: Arc<FallbackState>,
}

struct FallbackState {
    primary_down: AtomicBool,
    down_at: Mutex<Option<Instant>>,
}

impl<P, L> FallbackSpeechChannel<P, L>
where
    P: SpeechChannel + Clone,
    L: SpeechChannel + Clone,
{
    pub fn new(primary: P, local: L) -> Self {
        Self {
            primary,
            local,
            state: Arc::new(FallbackState {
                primary_down: AtomicBool::new(false),
                down_at: Mutex::new(None),
            }),
        }
    }

    pub fn is_using_fallback(&self) -> bool {
        self.state.primary_down.load(Ordering::Relaxed)
    }

    pub fn reset_down_flag(&self) {
        self.state.primary_down.store(false, Ordering::Relaxed);
        if let Ok(mut down_at) = self.state.down_at.try_lock() {
            *down_at = None;
        }
    }

    #[cfg(test)]
    async fn force_fallback(&self) {
        self.state.primary_down.store(true, Ordering::Relaxed);
        *self.state.down_at.lock().await = Some(Instant::now());
    }
}

impl<P, L> SpeechChannel for FallbackSpeechChannel<P, L>
where
    P: SpeechChannel + Clone + Send + Sync + 'static,
    L: SpeechChannel + Clone + Send + Sync + 'static,
{
    fn speak(
        &self,
        request: SpeechRequest,
        on_word: Option<WordCallback>,
    ) -> BoxFuture<'_, Result<(), SpeechError>> {
        async move {
            if self.state.primary_down.load(Ordering::Relaxed) {
                let should_retry = {
                    let down_at = self.state.down_at.lock().await;
                    down_at
                        .map(|t| t.elapsed() >= RETRY_PRIMARY_INTERVAL)
                        .unwrap_or(false)
                };

                if should_retry {
                    tracing::info!(target: LOG_TARGET, "probing neural engine after cooldown");
                    match self.primary.speak(request.clone(), on_word.clone()).await {
                        Ok(()) => {
                            self.state.primary_down.store(false, Ordering::Relaxed);
                            *self.state.down_at.lock().await = None;
                            tracing::info!(target: LOG_TARGET, "neural engine recovered");
                            return Ok(());
                        }
                        Err(SpeechError::EngineUnavailable) => {
                            *self.state.down_at.lock().await = Some(Instant::now());
                            return self.local.speak(request, on_word).await;
                        }
                        Err(error) => {
                            tracing::warn!(target: LOG_TARGET, %error, "neural engine error, using local speech for this utterance");
                            return self.local.speak(request, on_word).await;
                        }
                    }
                }

                return self.local.speak(request, on_word).await;
            }

            match self.primary.speak(request.clone(), on_word.clone()).await {
                Ok(()) => Ok(()),
                Err(SpeechError::EngineUnavailable) => {
                    tracing::warn!(target: LOG_TARGET, "neural engine unavailable, switching to local speech");
                    self.state.primary_down.store(true, Ordering::Relaxed);
                    *self.state.down_at.lock().await = Some(Instant::now());
                    self.local.speak(request, on_word).await
                }
                Err(error) => {
                    tracing::warn!(target: LOG_TARGET, %error, "neural engine error, using local speech for this utterance");
                    self.local.speak(request, on_word).await
                }
            }
        }
        .boxed()
    }

    fn cancel(&self) {
        self.primary.cancel();
        self.local.cancel();
    }
}
