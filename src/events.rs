//! Side-channel events emitted by the sign-in flow.
//!
//! Sinks are fire-and-forget: `track` returns nothing, must not block, and has
//! no way to influence the state machine.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::model::SharedError;

/// Parameters of a data-restore attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DataRestoreParams {
    pub phone: String,
    /// Error of the SMS request, `None` when it succeeded
    #[serde(serialize_with = "error_message")]
    pub error: Option<SharedError>,
    pub occurred_at: DateTime<Utc>,
}

impl DataRestoreParams {
    pub fn new(phone: impl Into<String>, error: Option<SharedError>) -> Self {
        Self {
            phone: phone.into(),
            error,
            occurred_at: Utc::now(),
        }
    }
}

fn error_message<S: Serializer>(error: &Option<SharedError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SignInEvent {
    /// An SMS was requested on a session that restores account data
    DataRestore(DataRestoreParams),
}

impl SignInEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SignInEvent::DataRestore(_) => "data_restore",
        }
    }
}

/// Receiver of tracking events.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn track(&self, event: SignInEvent);
}

/// Writes each event as a JSON line through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn track(&self, event: SignInEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), %payload, "tracked"),
            Err(e) => warn!(event = event.name(), "Failed to serialize tracking event: {}", e),
        }
    }
}

/// Forwards events to an unbounded channel.
///
/// Once the receiver is dropped, events are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<SignInEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignInEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn track(&self, event: SignInEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!(event = e.0.name(), "Event receiver gone, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    fn data_restore_serializes_error_message() {
        let event = SignInEvent::DataRestore(DataRestoreParams::new(
            "+15551234567",
            Some(Arc::new(anyhow::anyhow!("carrier rejected"))),
        ));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "data_restore");
        assert_eq!(json["phone"], "+15551234567");
        assert_eq!(json["error"], "carrier rejected");
    }

    #[test]
    fn successful_restore_has_null_error() {
        let event = SignInEvent::DataRestore(DataRestoreParams::new("+15551234567", None));
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["error"].is_null());
    }

    #[tokio::test]
    async fn channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelEventSink::new();
        sink.track(SignInEvent::DataRestore(DataRestoreParams::new("1", None)));
        assert!(matches!(rx.recv().await, Some(SignInEvent::DataRestore(p)) if p.phone == "1"));

        drop(rx);
        sink.track(SignInEvent::DataRestore(DataRestoreParams::new("2", None)));
    }

    #[traced_test]
    #[test]
    fn tracing_sink_logs_payload() {
        TracingEventSink.track(SignInEvent::DataRestore(DataRestoreParams::new("+4915100000", None)));
        assert!(logs_contain("data_restore"));
        assert!(logs_contain("+4915100000"));
    }
}
