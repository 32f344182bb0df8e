//! Per-message entry point.
//!
//! Resolve or classify, check the guardrail, dispatch, phrase, then commit
//! the turns and the pending transition together. Callers must not run two
//! messages for the same user at once.

use crate::config::Config;
use crate::dialogue::classifier::{ClassifyOptions, Classifier};
use crate::dialogue::guardrail::Guardrail;
use crate::dialogue::handlers::{ActionOutcome, Handled, HandlerContext, Handlers};
use crate::dialogue::intent::Intent;
use crate::dialogue::pending::{BypassPolicy, PendingAction, Resolution};
use crate::dialogue::reminders::ReminderPreferences;
use crate::dialogue::reply::{ReplyComposer, reprompt};
use crate::dialogue::time::{TimeContext, parse_timezone};
use crate::dialogue::turns::{ConversationStore, PendingSlot, PendingTransition, Turn};
use crate::error::Result;
use crate::ledger::TaskLedger;
use crate::observability::{DialogueEvent, Observer};
use crate::providers::Provider;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The sender of a message.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    /// IANA name; the configured default applies when unset.
    pub timezone: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            timezone: None,
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Where a message came from.
#[derive(Debug, Clone)]
pub struct InboundContext {
    pub channel: String,
}

impl InboundContext {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub replies: Vec<String>,
    pub intent: Intent,
}

pub struct Router {
    classifier: Classifier,
    bypass: BypassPolicy,
    allow_plan_fallback: bool,
    default_timezone: Tz,
    store: ConversationStore,
    guardrail: Arc<Guardrail>,
    handlers: Handlers,
    reminders: Arc<ReminderPreferences>,
    composer: ReplyComposer,
    observer: Arc<dyn Observer>,
}

impl Router {
    /// Wire the dialogue core from config. The model fallback joins the
    /// classifier chain only when enabled and a provider exists.
    pub fn new(
        config: &Config,
        ledger: Arc<dyn TaskLedger>,
        provider: Option<Arc<dyn Provider>>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let classifier = Classifier::from_config(config, provider.as_ref(), observer.clone());

        let guardrail = Arc::new(Guardrail::new(ledger.clone(), &config.guardrail));
        let reminders = Arc::new(ReminderPreferences::new());
        let handlers = Handlers::new(
            ledger,
            guardrail.clone(),
            reminders.clone(),
            config.matcher.clone(),
            &config.guardrail,
        );

        Self {
            classifier,
            bypass: BypassPolicy {
                enabled: config.dialogue.bypass_enabled,
            },
            allow_plan_fallback: config.dialogue.allow_plan_fallback,
            default_timezone: config.timezone(),
            store: ConversationStore::new(&config.dialogue),
            guardrail,
            handlers,
            reminders,
            composer: ReplyComposer::new(provider, &config.provider),
            observer,
        }
    }

    /// Replace the classifier chain.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.store
    }

    pub fn reminders(&self) -> &ReminderPreferences {
        &self.reminders
    }

    pub async fn handle_message(
        &self,
        user: &UserProfile,
        inbound: &InboundContext,
        text: &str,
    ) -> Result<MessageOutcome> {
        self.handle_message_at(user, inbound, text, Utc::now()).await
    }

    pub async fn handle_message_at(
        &self,
        user: &UserProfile,
        inbound: &InboundContext,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageOutcome> {
        let started = Instant::now();
        let user_id = user.id.as_str();
        self.observer.record_event(&DialogueEvent::MessageReceived {
            user_id: user_id.to_string(),
            channel: inbound.channel.clone(),
            chars: text.chars().count(),
        });

        let timezone = user
            .timezone
            .as_deref()
            .map_or(self.default_timezone, parse_timezone);
        let time = TimeContext::new(timezone, now);
        let opts = ClassifyOptions {
            time,
            allow_plan_fallback: self.allow_plan_fallback,
        };
        let history = self.store.recent_turns(user_id);

        let pending = match self.store.pending(user_id, now) {
            PendingSlot::Active(pending) => Some(pending),
            PendingSlot::Expired(kind) => {
                self.observer.record_event(&DialogueEvent::PendingExpired {
                    user_id: user_id.to_string(),
                    pending: kind,
                });
                None
            }
            PendingSlot::Empty => None,
        };

        let (intent, mut transition) = match pending {
            Some(pending) => match self.bypass.decide(text, &pending, &opts) {
                Resolution::Resolved(intent) => {
                    self.observer.record_event(&DialogueEvent::PendingResolved {
                        user_id: user_id.to_string(),
                        pending: pending.kind,
                        kind: intent.kind,
                    });
                    (intent, PendingTransition::Consume)
                }
                Resolution::Bypassed(fresh) => {
                    self.observer.record_event(&DialogueEvent::PendingBypassed {
                        user_id: user_id.to_string(),
                        pending: pending.kind,
                    });
                    let intent = match fresh {
                        Some(intent) => intent,
                        None => self.classifier.classify(text, &opts).await,
                    };
                    (intent, PendingTransition::Discard)
                }
                Resolution::Reprompt => {
                    return Ok(self.reprompt(user_id, text, pending, now, started));
                }
            },
            None => (
                self.classifier.classify(text, &opts).await,
                PendingTransition::Keep,
            ),
        };
        self.observer.record_event(&DialogueEvent::IntentClassified {
            user_id: user_id.to_string(),
            kind: intent.kind,
            source: intent.metadata.source,
            confidence: intent.confidence,
        });

        let ctx = HandlerContext {
            user_id,
            channel: &inbound.channel,
            display_name: user.display_name.as_deref(),
            time,
        };
        let handled = self.guard_and_dispatch(&intent, &ctx).await?;
        if let Some(next) = handled.pending {
            transition = PendingTransition::Replace(next);
        }

        let replies = self
            .composer
            .compose(&handled.outcome, &history, text, &time)
            .await;
        self.store.commit(
            user_id,
            vec![
                Turn::user(text, now),
                Turn::agent(
                    &replies.join("\n\n"),
                    json!({ "intent": intent.kind, "rule": intent.metadata.rule }),
                    now,
                ),
            ],
            transition,
            now,
        );

        self.observer.record_event(&DialogueEvent::HandlerCompleted {
            user_id: user_id.to_string(),
            kind: intent.kind,
            duration: started.elapsed(),
            replies: replies.len(),
        });
        Ok(MessageOutcome { replies, intent })
    }

    /// Intercept intents the active guardrail does not allow; otherwise run
    /// the handler.
    async fn guard_and_dispatch(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled> {
        if !intent.kind.allowed_under_guardrail() {
            let status = self.guardrail.refresh(ctx.user_id, ctx.time.now).await?;
            if !status.permits(intent.kind) && !self.handlers.acknowledges_priority(intent, &status)
            {
                self.guardrail
                    .record_block(&status, intent.kind, ctx.channel, ctx.time.now)
                    .await?;
                self.observer.record_event(&DialogueEvent::GuardrailBlocked {
                    user_id: ctx.user_id.to_string(),
                    kind: intent.kind,
                    active_tasks: status.state.active_p1_task_ids.len(),
                });
                let tasks = status.outstanding().into_iter().cloned().collect();
                return Ok(ActionOutcome::GuardrailBlocked {
                    attempted: intent.kind,
                    tasks,
                }
                .into());
            }
        }
        Ok(self.handlers.dispatch(intent, ctx).await?)
    }

    /// Ask the pending question again and keep waiting.
    fn reprompt(
        &self,
        user_id: &str,
        text: &str,
        pending: PendingAction,
        now: DateTime<Utc>,
        started: Instant,
    ) -> MessageOutcome {
        debug!(user_id, kind = %pending.kind, "pending action not resolved");
        self.observer.record_event(&DialogueEvent::PendingReprompted {
            user_id: user_id.to_string(),
            pending: pending.kind,
        });
        let reply = reprompt(&pending);
        self.store.commit(
            user_id,
            vec![
                Turn::user(text, now),
                Turn::agent(&reply, json!({ "reprompt": pending.kind }), now),
            ],
            PendingTransition::Keep,
            now,
        );
        self.observer.record_event(&DialogueEvent::HandlerCompleted {
            user_id: user_id.to_string(),
            kind: pending.intent.kind,
            duration: started.elapsed(),
            replies: 1,
        });
        MessageOutcome {
            replies: vec![reply],
            intent: pending.intent,
        }
    }
}
