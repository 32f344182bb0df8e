use super::traits::{DialogueEvent, Observer};
use tracing::{info, warn};

/// Writes dialogue events through `tracing`.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for LogObserver {
    fn record_event(&self, event: &DialogueEvent) {
        match event {
            DialogueEvent::MessageReceived {
                user_id,
                channel,
                chars,
            } => {
                info!(user = %user_id, channel = %channel, chars = chars, "message.received");
            }
            DialogueEvent::IntentClassified {
                user_id,
                kind,
                source,
                confidence,
            } => {
                info!(
                    user = %user_id,
                    intent = %kind,
                    source = %source,
                    confidence = f64::from(*confidence),
                    "intent.classified"
                );
            }
            DialogueEvent::PendingResolved {
                user_id,
                pending,
                kind,
            } => {
                info!(user = %user_id, pending = %pending, intent = %kind, "pending.resolved");
            }
            DialogueEvent::PendingBypassed { user_id, pending } => {
                info!(user = %user_id, pending = %pending, "pending.bypassed");
            }
            DialogueEvent::PendingReprompted { user_id, pending } => {
                info!(user = %user_id, pending = %pending, "pending.reprompted");
            }
            DialogueEvent::PendingExpired { user_id, pending } => {
                info!(user = %user_id, pending = %pending, "pending.expired");
            }
            DialogueEvent::FallbackFailed { reason } => {
                warn!(reason = reason, "fallback.failed");
            }
            DialogueEvent::GuardrailBlocked {
                user_id,
                kind,
                active_tasks,
            } => {
                info!(user = %user_id, intent = %kind, active = active_tasks, "guardrail.blocked");
            }
            DialogueEvent::HandlerCompleted {
                user_id,
                kind,
                duration,
                replies,
            } => {
                let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                info!(
                    user = %user_id,
                    intent = %kind,
                    duration_ms = ms,
                    replies = replies,
                    "handler.completed"
                );
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
