use crate::events::{EventSink, SessionEvent};
use crate::session::Phase;
use serde::Serialize;
use std::sync::Arc;

/// Wire messages posted to an embedding host so it can track the broadcast.
/// Advisory only; the host ignoring them changes nothing.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum HostMessage {
    #[serde(rename = "segment-progress")]
    SegmentProgress { current: usize, total: usize },

    #[serde(rename = "broadcast-status")]
    BroadcastStatus { status: BroadcastStatus },
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Ready,
    Playing,
    Paused,
    Stopped,
}

/// Transport to the embedding host. Implementations must not block.
pub trait HostPort: Send + Sync {
    fn post(&self, message: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullHostPort;

impl HostPort for NullHostPort {
    fn post(&self, _message: &str) {}
}

/// Translates session events into host messages. Register it as one of the
/// session's event sinks.
#[derive(Clone)]
pub struct HostBridge {
    port: Arc<dyn HostPort>,
}

impl HostBridge {
    pub fn new(port: Arc<dyn HostPort>) -> Self {
        Self { port }
    }

    /// Announce that the studio finished initializing.
    pub fn announce_ready(&self) {
        self.post(&HostMessage::BroadcastStatus {
            status: BroadcastStatus::Ready,
        });
    }

    fn post(&self, message: &HostMessage) {
        if let Ok(json) = serde_json::to_string(message) {
            self.port.post(&json);
        }
    }
}

impl EventSink for HostBridge {
    fn emit(&self, event: SessionEvent) {
        let message = match event {
            SessionEvent::Progress { current, total } => {
                Some(HostMessage::SegmentProgress { current, total })
            }
            SessionEvent::Phase(Phase::Playing) => Some(HostMessage::BroadcastStatus {
                status: BroadcastStatus::Playing,
            }),
            SessionEvent::Phase(Phase::Paused) => Some(HostMessage::BroadcastStatus {
                status: BroadcastStatus::Paused,
            }),
            SessionEvent::Phase(Phase::Stopped) => Some(HostMessage::BroadcastStatus {
                status: BroadcastStatus::Stopped,
            }),
            _ => None,
        };
        if let Some(message) = message {
            self.post(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MemoryPort {
        posted: Arc<Mutex<Vec<String>>>,
    }

    impl HostPort for MemoryPort {
        fn post(&self, message: &str) {
            self.posted.lock().unwrap().push(message.to_owned());
        }
    }

    #[test]
    fn progress_uses_the_host_wire_shape() {
        let port = MemoryPort::default();
        let bridge = HostBridge::new(Arc::new(port.clone()));

        bridge.emit(SessionEvent::Progress {
            current: 2,
            total: 5,
        });

        assert_eq!(
            port.posted.lock().unwrap().as_slice(),
            &[r#"{"type":"segment-progress","current":2,"total":5}"#]
        );
    }

    #[test]
    fn phase_changes_map_to_broadcast_status() {
        let port = MemoryPort::default();
        let bridge = HostBridge::new(Arc::new(port.clone()));

        bridge.announce_ready();
        bridge.emit(SessionEvent::Phase(Phase::Playing));
        bridge.emit(SessionEvent::Phase(Phase::Stopped));
        bridge.emit(SessionEvent::Phase(Phase::Idle));

        assert_eq!(
            port.posted.lock().unwrap().as_slice(),
            &[
                r#"{"type":"broadcast-status","status":"ready"}"#,
                r#"{"type":"broadcast-status","status":"playing"}"#,
                r#"{"type":"broadcast-status","status":"stopped"}"#,
            ]
        );
    }

    #[test]
    fn cosmetic_events_are_not_forwarded() {
        let port = MemoryPort::default();
        let bridge = HostBridge::new(Arc::new(port.clone()));

        bridge.emit(SessionEvent::Status("hello".to_owned()));
        bridge.emit(SessionEvent::SubtitlesCleared);

        assert!(port.posted.lock().unwrap().is_empty());
    }
}
