use crate::session::Phase;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The three top-bar readiness lights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indicator {
    Avatar,
    Tts,
    LipSync,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorState {
    Ready,
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlay {
    LowerThird,
    Ticker,
    Subtitles,
    LiveIndicator,
}

/// Which transport controls are currently actionable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlState {
    pub play: bool,
    pub pause: bool,
    pub stop: bool,
}

/// Structured status emitted by the core; presentation (DOM, terminal,
/// host page) is someone else's adapter.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Human-readable status line.
    Status(String),
    Indicator {
        indicator: Indicator,
        state: IndicatorState,
    },
    Phase(Phase),
    /// 1-based segment progress, emitted as each segment begins.
    Progress {
        current: usize,
        total: usize,
    },
    Overlay {
        overlay: Overlay,
        visible: bool,
    },
    Controls(ControlState),
    /// Full text of the segment currently being spoken.
    Subtitle {
        text: String,
    },
    /// Best-effort word highlight from a word-boundary callback.
    SubtitleHighlight {
        word: String,
    },
    SubtitlesCleared,
    RecordingSaved {
        path: PathBuf,
    },
}

/// Observer seam for everything user-visible. Implementations must not
/// block: emission happens inside the playback loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: SessionEvent) {}
}

/// Forwards events into an unbounded channel; sending never blocks and a
/// dropped receiver is silently tolerated.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Broadcasts each event to every registered sink, in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: SessionEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.emit(SessionEvent::Status("a".to_owned()));
        sink.emit(SessionEvent::Progress {
            current: 1,
            total: 3,
        });
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Status("a".to_owned()));
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Progress {
                current: 1,
                total: 3
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.emit(SessionEvent::SubtitlesCleared);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let (a, mut rx_a) = ChannelEventSink::new();
        let (b, mut rx_b) = ChannelEventSink::new();
        let fanout = FanoutEventSink::new(vec![Arc::new(a), Arc::new(b)]);
        fanout.emit(SessionEvent::SubtitlesCleared);
        assert_eq!(rx_a.try_recv().unwrap(), SessionEvent::SubtitlesCleared);
        assert_eq!(rx_b.try_recv().unwrap(), SessionEvent::SubtitlesCleared);
    }
}
