use crate::dialogue::intent::{IntentKind, IntentSource};
use crate::dialogue::pending::PendingKind;
use std::time::Duration;

/// Events the dialogue core reports while handling a message
#[derive(Debug, Clone)]
pub enum DialogueEvent {
    MessageReceived {
        user_id: String,
        channel: String,
        chars: usize,
    },
    IntentClassified {
        user_id: String,
        kind: IntentKind,
        source: IntentSource,
        confidence: f32,
    },
    PendingResolved {
        user_id: String,
        pending: PendingKind,
        kind: IntentKind,
    },
    PendingBypassed {
        user_id: String,
        pending: PendingKind,
    },
    PendingReprompted {
        user_id: String,
        pending: PendingKind,
    },
    PendingExpired {
        user_id: String,
        pending: PendingKind,
    },
    FallbackFailed {
        reason: &'static str,
    },
    GuardrailBlocked {
        user_id: String,
        kind: IntentKind,
        active_tasks: usize,
    },
    HandlerCompleted {
        user_id: String,
        kind: IntentKind,
        duration: Duration,
        replies: usize,
    },
}

/// Sink for dialogue events.
pub trait Observer: Send + Sync {
    fn record_event(&self, event: &DialogueEvent);

    fn flush(&self) {}

    /// Backend label, matching `observability.backend`.
    fn name(&self) -> &str;
}
