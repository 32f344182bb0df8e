//! P1 guardrail: while high-priority work is unacknowledged, only an
//! allow-list of intents may run.
//!
//! Per task the acknowledgement state moves
//! `unacknowledged -> ack_requested -> ack_received -> cleared`. The aggregate
//! [`RuleState`] is always rebuilt from the ledger; its hash only decides
//! whether a write is needed.

use crate::config::GuardrailConfig;
use crate::dialogue::intent::IntentKind;
use crate::error::LedgerError;
use crate::ledger::{
    AckState, RuleAction, RuleEvent, RuleState, SurfaceKind, Task, TaskLedger, TaskUpdate,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Snapshot of one user's guardrail after a refresh.
#[derive(Debug, Clone)]
pub struct GuardrailStatus {
    pub state: RuleState,
    /// Open P1 tasks, in ledger order.
    pub tasks: Vec<Task>,
    enabled: bool,
}

impl GuardrailStatus {
    pub fn is_active(&self) -> bool {
        self.enabled && self.state.pending_ack_count > 0
    }

    /// P1 tasks still holding the guardrail open.
    pub fn outstanding(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| !task.ack_state.is_settled())
            .collect()
    }

    /// Whether `kind` may run right now.
    pub fn permits(&self, kind: IntentKind) -> bool {
        !self.is_active() || kind.allowed_under_guardrail()
    }
}

/// Reproducible digest of the active id set and the pending count.
pub fn state_hash(active_ids: &[String], pending_ack_count: usize) -> String {
    let mut sorted: Vec<&str> = active_ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(sorted.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(pending_ack_count.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Banner shown instead of a blocked action.
pub fn banner(tasks: &[&Task]) -> String {
    let list = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("{}. {}", i + 1, task.title))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "⚠️ P1 guardrail is active.\nWrap these before starting anything new:\n{list}\n\n\
         Reply \"done [task]\" once you clear one so I can unlock other requests."
    )
}

pub struct Guardrail {
    ledger: Arc<dyn TaskLedger>,
    enabled: bool,
}

impl Guardrail {
    pub fn new(ledger: Arc<dyn TaskLedger>, config: &GuardrailConfig) -> Self {
        Self {
            ledger,
            enabled: config.enabled,
        }
    }

    /// Recompute the rule state from the ledger, persisting it only when it
    /// changed.
    pub async fn refresh(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GuardrailStatus, LedgerError> {
        let tasks = self.ledger.list_active_p1_tasks(user_id).await?;
        let mut active_ids: Vec<String> = tasks.iter().map(|task| task.id.clone()).collect();
        active_ids.sort();
        let pending_ack_count = tasks
            .iter()
            .filter(|task| !task.ack_state.is_settled())
            .count();
        let hash = state_hash(&active_ids, pending_ack_count);

        let previous = self.ledger.load_rule_state(user_id).await?;
        let state = match previous {
            Some(state) if state.state_hash == hash => state,
            previous => {
                let state = RuleState {
                    user_id: user_id.to_string(),
                    active_p1_task_ids: active_ids,
                    pending_ack_count,
                    blocked_action_count: previous
                        .as_ref()
                        .map_or(0, |state| state.blocked_action_count),
                    last_surface_at: previous.and_then(|state| state.last_surface_at),
                    state_hash: hash,
                    updated_at: now,
                };
                debug!(user_id, pending_ack_count, "guardrail state changed");
                self.ledger.store_rule_state(state.clone()).await?;
                state
            }
        };

        Ok(GuardrailStatus {
            state,
            tasks,
            enabled: self.enabled,
        })
    }

    /// Mark outstanding P1 tasks as shown to the user. Unacknowledged tasks
    /// move to `ack_requested`.
    pub async fn surface(
        &self,
        status: &GuardrailStatus,
        surface: SurfaceKind,
        channel: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let user_id = status.state.user_id.as_str();
        let mut events = Vec::new();
        for task in status.outstanding() {
            let ack_state = (task.ack_state == AckState::Unacknowledged)
                .then_some(AckState::AckRequested);
            self.ledger
                .update_task_fields(
                    &task.id,
                    TaskUpdate {
                        ack_state,
                        last_surface_at: Some(now),
                        ..TaskUpdate::default()
                    },
                )
                .await?;
            events.push(RuleEvent {
                user_id: user_id.to_string(),
                task_id: Some(task.id.clone()),
                action: RuleAction::Surfaced,
                surface,
                channel: channel.to_string(),
                outcome: "ack_requested".into(),
                metadata: json!({ "previous": task.ack_state }),
                at: now,
            });
        }
        if events.is_empty() {
            return Ok(());
        }
        self.ledger.record_rule_events(events).await?;

        let mut state = status.state.clone();
        state.last_surface_at = Some(now);
        state.updated_at = now;
        self.ledger.store_rule_state(state).await
    }

    /// Record that `kind` was intercepted and surface the outstanding tasks.
    pub async fn record_block(
        &self,
        status: &GuardrailStatus,
        kind: IntentKind,
        channel: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let user_id = status.state.user_id.as_str();
        info!(user_id, kind = kind.as_str(), "guardrail blocked action");
        self.ledger
            .record_rule_events(vec![RuleEvent {
                user_id: user_id.to_string(),
                task_id: None,
                action: RuleAction::BlockedAction,
                surface: SurfaceKind::InboundGuard,
                channel: channel.to_string(),
                outcome: kind.as_str().to_string(),
                metadata: json!({ "active": status.state.active_p1_task_ids }),
                at: now,
            }])
            .await?;

        let mut counted = status.clone();
        counted.state.blocked_action_count += 1;
        counted.state.updated_at = now;
        self.ledger.store_rule_state(counted.state.clone()).await?;
        self.surface(&counted, SurfaceKind::InboundGuard, channel, now)
            .await
    }

    /// Record an explicit acknowledgement. Completion clears the task; any
    /// other acknowledgement (reschedule, delay) only receives it.
    pub async fn acknowledge(
        &self,
        task: &Task,
        completed: bool,
        channel: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if !task.is_high_priority() {
            return Ok(());
        }
        let next = if completed {
            AckState::Cleared
        } else {
            AckState::AckReceived
        };
        if task.ack_state == next {
            return Ok(());
        }
        self.ledger
            .update_task_fields(
                &task.id,
                TaskUpdate {
                    ack_state: Some(next),
                    ..TaskUpdate::default()
                },
            )
            .await?;
        self.ledger
            .record_rule_events(vec![RuleEvent {
                user_id: task.user_id.clone(),
                task_id: Some(task.id.clone()),
                action: RuleAction::ReceivedAck,
                surface: SurfaceKind::InboundGuard,
                channel: channel.to_string(),
                outcome: next.to_string(),
                metadata: json!({ "previous": task.ack_state }),
                at: now,
            }])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, NewTask, Severity, TaskStatus};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
    }

    async fn add(ledger: &InMemoryLedger, title: &str, severity: Severity) -> Task {
        ledger
            .create_task(NewTask {
                user_id: "u1".into(),
                title: title.into(),
                severity,
                start_time: None,
                duration_minutes: None,
                recurrence: None,
                created_via: "test".into(),
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap()
    }

    fn guardrail(ledger: &Arc<InMemoryLedger>) -> Guardrail {
        Guardrail::new(ledger.clone(), &GuardrailConfig::default())
    }

    #[test]
    fn hash_ignores_id_order() {
        let a = state_hash(&["b".into(), "a".into()], 2);
        let b = state_hash(&["a".into(), "b".into()], 2);
        assert_eq!(a, b);
        assert_ne!(a, state_hash(&["a".into(), "b".into()], 1));
    }

    #[tokio::test]
    async fn inactive_without_p1_work() {
        let ledger = Arc::new(InMemoryLedger::new());
        add(&ledger, "Laundry", Severity::P2).await;
        let status = guardrail(&ledger).refresh("u1", now()).await.unwrap();
        assert!(!status.is_active());
        assert!(status.permits(IntentKind::AddTask));
    }

    #[tokio::test]
    async fn unchanged_state_is_not_rewritten() {
        let ledger = Arc::new(InMemoryLedger::new());
        add(&ledger, "Deep work", Severity::P1).await;
        let guard = guardrail(&ledger);

        let status = guard.refresh("u1", now()).await.unwrap();
        assert!(status.is_active());
        assert!(!status.permits(IntentKind::AddTask));
        assert!(status.permits(IntentKind::MarkComplete));
        guard.refresh("u1", now()).await.unwrap();
        assert_eq!(ledger.rule_state_writes(), 1);
    }

    #[tokio::test]
    async fn surfacing_requests_acknowledgement() {
        let ledger = Arc::new(InMemoryLedger::new());
        let task = add(&ledger, "Deep work", Severity::P1).await;
        let guard = guardrail(&ledger);
        let status = guard.refresh("u1", now()).await.unwrap();

        guard
            .surface(&status, SurfaceKind::StatusReply, "cli", now())
            .await
            .unwrap();
        let stored = ledger.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.ack_state, AckState::AckRequested);
        assert_eq!(stored.last_surface_at, Some(now()));
        // still outstanding until acknowledged
        assert!(guard.refresh("u1", now()).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn completion_reduces_pending_count_by_one() {
        let ledger = Arc::new(InMemoryLedger::new());
        let first = add(&ledger, "Deep work", Severity::P1).await;
        add(&ledger, "P1 thesis", Severity::P1).await;
        let guard = guardrail(&ledger);
        assert_eq!(
            guard.refresh("u1", now()).await.unwrap().state.pending_ack_count,
            2
        );

        ledger
            .update_task_status(&first.id, TaskStatus::Done)
            .await
            .unwrap();
        guard.acknowledge(&first, true, "cli", now()).await.unwrap();
        let status = guard.refresh("u1", now()).await.unwrap();
        assert_eq!(status.state.pending_ack_count, 1);
        assert_eq!(status.state.active_p1_task_ids.len(), 1);
    }

    #[tokio::test]
    async fn reschedule_acknowledgement_settles_without_clearing() {
        let ledger = Arc::new(InMemoryLedger::new());
        let task = add(&ledger, "Deep work", Severity::P1).await;
        let guard = guardrail(&ledger);

        guard.acknowledge(&task, false, "cli", now()).await.unwrap();
        let status = guard.refresh("u1", now()).await.unwrap();
        assert!(!status.is_active());
        assert_eq!(status.tasks[0].ack_state, AckState::AckReceived);
        assert_eq!(ledger.rule_events("u1")[0].action, RuleAction::ReceivedAck);
    }

    #[tokio::test]
    async fn block_counts_and_audits() {
        let ledger = Arc::new(InMemoryLedger::new());
        add(&ledger, "Deep work", Severity::P1).await;
        let guard = guardrail(&ledger);
        let status = guard.refresh("u1", now()).await.unwrap();

        guard
            .record_block(&status, IntentKind::AddTask, "cli", now())
            .await
            .unwrap();
        let events = ledger.rule_events("u1");
        assert_eq!(events[0].action, RuleAction::BlockedAction);
        assert_eq!(events[0].outcome, "add_task");
        assert_eq!(events[1].action, RuleAction::Surfaced);
        let state = ledger.load_rule_state("u1").await.unwrap().unwrap();
        assert_eq!(state.blocked_action_count, 1);
    }

    #[tokio::test]
    async fn disabled_guardrail_never_blocks() {
        let ledger = Arc::new(InMemoryLedger::new());
        add(&ledger, "Deep work", Severity::P1).await;
        let config = GuardrailConfig {
            enabled: false,
            ..GuardrailConfig::default()
        };
        let status = Guardrail::new(ledger.clone(), &config)
            .refresh("u1", now())
            .await
            .unwrap();
        assert!(!status.is_active());
        assert_eq!(status.state.pending_ack_count, 1);
    }

    #[test]
    fn banner_lists_tasks() {
        let task = Task {
            id: "t".into(),
            user_id: "u1".into(),
            title: "Deep work".into(),
            status: TaskStatus::Todo,
            severity: Severity::P1,
            ack_state: AckState::Unacknowledged,
            start_time: None,
            duration_minutes: None,
            recurrence: None,
            created_via: "test".into(),
            last_surface_at: None,
            metadata: serde_json::Value::Null,
            created_at: now(),
        };
        let text = banner(&[&task]);
        assert!(text.starts_with("⚠️ P1 guardrail is active."));
        assert!(text.contains("1. Deep work"));
    }
}
