use super::dialogue_harness::{self, now};
use tenax::dialogue::classifier::classify;
use tenax::dialogue::pending::{PendingOption, resolve};
use tenax::dialogue::{BypassPolicy, Intent, IntentKind, PendingAction, Resolution};

fn single_option() -> PendingAction {
    let intent = classify("I have completed my task", &dialogue_harness::opts("UTC"));
    PendingAction::disambiguation(
        intent,
        vec![PendingOption {
            id: "task-1".into(),
            title: "Read AI paper".into(),
        }],
        now(),
    )
}

#[test]
fn single_option_resolves_by_number() {
    let intent = resolve("1", &single_option(), &dialogue_harness::opts("UTC")).unwrap();
    assert_eq!(intent.kind, IntentKind::MarkComplete);
    assert_eq!(intent.slots.task_id.as_deref(), Some("task-1"));
    assert!(intent.metadata.clarified);
}

#[test]
fn single_option_resolves_by_exact_title() {
    let intent = resolve(
        "Read AI paper",
        &single_option(),
        &dialogue_harness::opts("UTC"),
    )
    .unwrap();
    assert_eq!(intent.slots.task_id.as_deref(), Some("task-1"));
}

#[test]
fn out_of_range_number_is_not_an_answer() {
    assert!(resolve("4", &single_option(), &dialogue_harness::opts("UTC")).is_none());
}

#[test]
fn no_fixed_time_answers_time_question() {
    let pending = PendingAction::time_confirmation(
        classify("add laundry", &dialogue_harness::opts("UTC")),
        now(),
    );
    let intent = resolve("no fixed time", &pending, &dialogue_harness::opts("UTC")).unwrap();
    assert_eq!(intent.kind, IntentKind::AddTask);
    assert!(intent.slots.target_time.is_none());
    assert!(intent.slots.no_fixed_time);
}

#[test]
fn fresh_commands_bypass_the_question() {
    let policy = BypassPolicy::default();
    let opts = dialogue_harness::opts("UTC");
    for text in ["status", "what time is it", "add gym at 6pm", "help"] {
        assert!(
            matches!(
                policy.decide(text, &single_option(), &opts),
                Resolution::Bypassed(Some(_))
            ),
            "{text} should bypass"
        );
    }
}

#[test]
fn answers_and_noise_never_bypass() {
    let policy = BypassPolicy::default();
    let opts = dialogue_harness::opts("UTC");
    assert!(matches!(
        policy.decide("1", &single_option(), &opts),
        Resolution::Resolved(_)
    ));
    assert_eq!(
        policy.decide("hmm", &single_option(), &opts),
        Resolution::Reprompt
    );
}

#[test]
fn disabled_bypass_keeps_asking() {
    let policy = BypassPolicy { enabled: false };
    let outcome = policy.decide(
        "status",
        &single_option(),
        &dialogue_harness::opts("UTC"),
    );
    assert_eq!(outcome, Resolution::Reprompt);
}

#[test]
fn time_answer_keeps_the_original_intent() {
    let original = Intent::new(IntentKind::AddTask, 0.9);
    let pending = PendingAction::time_confirmation(original, now());
    match BypassPolicy::default().decide("6pm", &pending, &dialogue_harness::opts("UTC")) {
        Resolution::Resolved(intent) => {
            assert_eq!(intent.kind, IntentKind::AddTask);
            assert!(intent.slots.target_time.is_some());
        }
        other => panic!("expected an answer, got {other:?}"),
    }
}
