use super::dialogue_harness::Harness;
use tenax::config::MatcherConfig;
use tenax::dialogue::{Slots, match_task};
use tenax::ledger::Severity;

fn reference(name: &str) -> Slots {
    Slots::default().with_task_name(Some(name.to_string()))
}

#[tokio::test]
async fn misspelled_reference_between_near_twins_offers_both() {
    let harness = Harness::new();
    harness.seed("Draft memo", Severity::P2).await;
    harness.seed("Draft demo", Severity::P2).await;
    harness.seed("Laundry", Severity::P2).await;

    let result = match_task(
        &harness.open_tasks().await,
        &reference("draft nemo"),
        &MatcherConfig::default(),
    );
    assert!(result.matched.is_none());
    let mut titles: Vec<&str> = result.options.iter().map(|t| t.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, vec!["Draft demo", "Draft memo"]);
}

#[tokio::test]
async fn partial_title_matches_uniquely() {
    let harness = Harness::new();
    let paper = harness.seed("Read AI paper", Severity::P2).await;
    harness.seed("Gym", Severity::P2).await;

    let result = match_task(
        &harness.open_tasks().await,
        &reference("AI paper"),
        &MatcherConfig::default(),
    );
    assert_eq!(result.matched.map(|task| task.id), Some(paper.id));
}

#[tokio::test]
async fn unrelated_reference_is_not_found() {
    let harness = Harness::new();
    harness.seed("Read AI paper", Severity::P2).await;

    let result = match_task(
        &harness.open_tasks().await,
        &reference("taxes"),
        &MatcherConfig::default(),
    );
    assert!(result.is_not_found());
}

#[tokio::test]
async fn options_are_capped() {
    let harness = Harness::new();
    for i in 0..8 {
        harness.seed(&format!("Essay draft {i}"), Severity::P2).await;
    }
    let config = MatcherConfig {
        max_options: 3,
        ..MatcherConfig::default()
    };

    let result = match_task(&harness.open_tasks().await, &reference("essay"), &config);
    assert!(result.matched.is_none());
    assert_eq!(result.options.len(), 3);
}
