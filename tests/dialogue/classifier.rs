use super::dialogue_harness::{self, Harness};
use chrono::{TimeZone, Utc};
use tenax::config::Config;
use tenax::dialogue::classifier::{Classifier, classify};
use tenax::dialogue::{IntentKind, IntentSource};
use tenax::ledger::Recurrence;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn completion_with_title_is_confident() {
    let intent = classify("I completed Read AI paper", &dialogue_harness::opts("UTC"));
    assert_eq!(intent.kind, IntentKind::MarkComplete);
    assert_eq!(intent.slots.task_name(), "Read AI paper");
    assert!(intent.confidence >= 0.9);
}

#[test]
fn completion_without_title_has_empty_task_name() {
    let intent = classify("I have completed my task", &dialogue_harness::opts("UTC"));
    assert_eq!(intent.kind, IntentKind::MarkComplete);
    assert_eq!(intent.slots.task_name(), "");
}

#[test]
fn daily_add_rolls_past_times_to_tomorrow() {
    // 10:00 UTC is 19:00 in Tokyo, so 6am is the next local morning
    let intent = classify("add workout 6am daily", &dialogue_harness::opts("Asia/Tokyo"));
    assert_eq!(intent.kind, IntentKind::AddTask);
    assert_eq!(intent.slots.task_name(), "workout");
    assert_eq!(intent.slots.recurrence, Some(Recurrence::Daily));
    assert_eq!(
        intent.slots.target_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 5, 21, 0, 0).unwrap())
    );
}

#[test]
fn reschedule_carries_reference_and_time() {
    let intent = classify("move AI paper to 9pm", &dialogue_harness::opts("UTC"));
    assert_eq!(intent.kind, IntentKind::RescheduleTask);
    assert_eq!(intent.slots.task_name(), "AI paper");
    assert_eq!(
        intent.slots.target_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 5, 21, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn heuristics_only_chain_never_calls_out() {
    let classifier = Classifier::new();
    assert_eq!(classifier.strategy_names(), vec!["rules", "plan_fallback"]);
    let intent = classifier
        .classify("blorp zzz", &dialogue_harness::opts("UTC"))
        .await;
    assert!(intent.is_unknown());
}

async fn model_backed(content: &str) -> (MockServer, Harness) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.fallback.enabled = true;
    config.provider.base_url = Some(server.uri());
    config.provider.api_key = Some("test-key".into());
    let harness = Harness::with_provider(&config);
    (server, harness)
}

#[tokio::test]
async fn model_fallback_labels_unrecognized_text() {
    let (_server, harness) =
        model_backed(r#"{"intent": "help", "confidence": 0.7, "slots": {}}"#).await;

    let outcome = harness.say("blorp zzz").await;
    assert_eq!(outcome.intent.kind, IntentKind::Help);
    assert_eq!(outcome.intent.metadata.source, IntentSource::Model);
    assert!(outcome.replies[0].starts_with("Here's what I can do"));
}

#[tokio::test]
async fn model_fallback_is_skipped_for_recognized_text() {
    let (server, harness) =
        model_backed(r#"{"intent": "help", "confidence": 0.7, "slots": {}}"#).await;

    let outcome = harness.say("status").await;
    assert_eq!(outcome.intent.kind, IntentKind::Status);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn unusable_model_output_degrades_to_unknown() {
    let (_server, harness) = model_backed("I think they want help?").await;

    let outcome = harness.say("blorp zzz").await;
    assert!(outcome.intent.is_unknown());
    assert_eq!(outcome.intent.metadata.source, IntentSource::Default);
}
