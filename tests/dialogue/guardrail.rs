use super::dialogue_harness::{Harness, USER, now};
use std::sync::Arc;
use tenax::config::{Config, GuardrailConfig};
use tenax::dialogue::{Guardrail, IntentKind};
use tenax::ledger::{AckState, RuleAction, Severity, TaskLedger};
use tenax::observability::DialogueEvent;

async fn guarded() -> Harness {
    let harness = Harness::new();
    harness.seed("Deep work: thesis", Severity::P1).await;
    harness.seed("File taxes", Severity::P1).await;
    harness.seed("Gym", Severity::P2).await;
    harness
}

async fn pending_ack_count(harness: &Harness) -> usize {
    let ledger: Arc<dyn TaskLedger> = harness.ledger.clone();
    Guardrail::new(ledger, &GuardrailConfig::default())
        .refresh(USER, now())
        .await
        .unwrap()
        .state
        .pending_ack_count
}

#[tokio::test]
async fn new_work_is_intercepted_without_writing() {
    let harness = guarded().await;

    let outcome = harness.say("add groceries at 6pm").await;
    assert_eq!(outcome.intent.kind, IntentKind::AddTask);
    assert_eq!(harness.ledger.all_tasks(USER).len(), 3);

    let reply = &outcome.replies[0];
    assert!(reply.contains("P1 guardrail is active"));
    assert!(reply.contains("Deep work: thesis"));
    assert!(reply.contains("File taxes"));
    assert!(!reply.contains("Gym"));

    let events = harness.ledger.rule_events(USER);
    assert!(events.iter().any(|e| e.action == RuleAction::BlockedAction));
    assert!(harness.observer.events().iter().any(|e| matches!(
        e,
        DialogueEvent::GuardrailBlocked { active_tasks: 2, .. }
    )));
}

#[tokio::test]
async fn surfaced_tasks_await_acknowledgement() {
    let harness = guarded().await;
    harness.say("add groceries at 6pm").await;

    for task in harness.open_tasks().await {
        let expected = if task.severity == Severity::P1 {
            AckState::AckRequested
        } else {
            AckState::Unacknowledged
        };
        assert_eq!(task.ack_state, expected, "{}", task.title);
        assert_eq!(task.last_surface_at.is_some(), task.severity == Severity::P1);
    }
    let state = harness.ledger.load_rule_state(USER).await.unwrap().unwrap();
    assert_eq!(state.blocked_action_count, 1);
}

#[tokio::test]
async fn completing_one_priority_lowers_the_count_by_one() {
    let harness = guarded().await;
    assert_eq!(pending_ack_count(&harness).await, 2);

    let outcome = harness.say("done thesis").await;
    assert_eq!(outcome.intent.kind, IntentKind::MarkComplete);
    assert!(outcome.replies[0].contains("Deep work: thesis"));
    assert_eq!(pending_ack_count(&harness).await, 1);

    // still guarded
    let blocked = harness.say("add groceries at 6pm").await;
    assert!(blocked.replies[0].contains("File taxes"));
    assert!(!blocked.replies[0].contains("Deep work: thesis"));
}

#[tokio::test]
async fn clearing_every_priority_unlocks_new_work() {
    let harness = guarded().await;
    harness.say("done thesis").await;
    let outcome = harness.say("done taxes").await;
    assert_eq!(outcome.replies.len(), 2);
    assert!(outcome.replies[1].contains("guardrail cleared"));
    assert_eq!(pending_ack_count(&harness).await, 0);

    let added = harness.say("add groceries at 6pm").await;
    assert!(added.replies[0].starts_with("Added \"groceries\""));
    assert_eq!(harness.ledger.all_tasks(USER).len(), 4);
}

#[tokio::test]
async fn rescheduling_a_priority_is_an_acknowledgement() {
    let harness = guarded().await;

    let outcome = harness.say("move taxes to 9pm").await;
    assert_eq!(outcome.intent.kind, IntentKind::RescheduleTask);
    assert!(outcome.replies[0].starts_with("Moved \"File taxes\""));

    let taxes = harness
        .open_tasks()
        .await
        .into_iter()
        .find(|task| task.title == "File taxes")
        .unwrap();
    assert_eq!(taxes.ack_state, AckState::AckReceived);
    assert_eq!(pending_ack_count(&harness).await, 1);
}

#[tokio::test]
async fn read_only_intents_pass_while_guarded() {
    let harness = guarded().await;
    for text in ["status", "help", "what time is it", "how am I doing"] {
        let outcome = harness.say(text).await;
        assert!(
            !outcome.replies[0].contains("P1 guardrail is active"),
            "{text} was blocked"
        );
    }
}

#[tokio::test]
async fn disabled_guardrail_never_blocks() {
    let mut config = Config::default();
    config.guardrail.enabled = false;
    let harness = Harness::with_config(&config);
    harness.seed("File taxes", Severity::P1).await;

    let outcome = harness.say("add groceries at 6pm").await;
    assert!(outcome.replies[0].starts_with("Added"));
}

#[tokio::test]
async fn state_is_stored_only_when_it_changes() {
    let harness = guarded().await;
    pending_ack_count(&harness).await;
    let writes = harness.ledger.rule_state_writes();
    pending_ack_count(&harness).await;
    assert_eq!(harness.ledger.rule_state_writes(), writes);
}
