use super::dialogue_harness::{Harness, USER, now};
use chrono::{Duration, TimeZone, Utc};
use tenax::dialogue::IntentKind;
use tenax::ledger::{Recurrence, Severity, TaskLedger, TaskStatus};
use tenax::observability::DialogueEvent;
use tenax::{InboundContext, UserProfile};

#[tokio::test]
async fn completion_by_title_marks_the_task_done() {
    let harness = Harness::new();
    let paper = harness.seed("Read AI paper", Severity::P2).await;
    harness.seed("Gym", Severity::P2).await;

    let outcome = harness.say("done AI paper").await;
    assert_eq!(outcome.intent.kind, IntentKind::MarkComplete);
    assert!(outcome.intent.confidence >= 0.9);
    assert_eq!(
        outcome.replies,
        vec!["Nice, \"Read AI paper\" is marked complete ✅".to_string()]
    );
    let stored = harness.ledger.get_task(&paper.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Done);
}

#[tokio::test]
async fn placeholder_completion_with_one_open_task_needs_no_question() {
    let harness = Harness::new();
    harness.seed("Gym", Severity::P2).await;

    let outcome = harness.say("I have completed my task").await;
    assert_eq!(outcome.intent.slots.task_name(), "");
    assert!(outcome.replies[0].contains("\"Gym\""));
    assert!(harness.open_tasks().await.is_empty());
}

#[tokio::test]
async fn placeholder_completion_with_many_tasks_asks_then_resolves_by_number() {
    let harness = Harness::new();
    let first = harness.seed("Gym", Severity::P2).await;
    harness.seed("Laundry", Severity::P2).await;

    let question = harness.say("I have completed my task").await;
    assert!(question.replies[0].starts_with("Which one did you finish?"));
    assert!(question.replies[0].contains("1. Gym"));
    assert!(question.replies[0].contains("2. Laundry"));
    assert_eq!(harness.ledger.all_tasks(USER).len(), 2);

    let answer = harness.say("1").await;
    assert_eq!(answer.intent.kind, IntentKind::MarkComplete);
    assert!(answer.intent.metadata.clarified);
    assert_eq!(answer.intent.slots.task_id.as_deref(), Some(first.id.as_str()));
    let open: Vec<String> = harness.open_tasks().await.into_iter().map(|t| t.title).collect();
    assert_eq!(open, vec!["Laundry".to_string()]);
}

#[tokio::test]
async fn tied_reference_offers_both_and_accepts_a_title() {
    let harness = Harness::new();
    harness.seed("Draft memo", Severity::P2).await;
    harness.seed("Draft demo", Severity::P2).await;

    let question = harness.say("done draft nemo").await;
    assert!(question.replies[0].contains("Draft memo"));
    assert!(question.replies[0].contains("Draft demo"));
    assert!(question.replies[0].ends_with("Reply with the number or the task name."));

    let answer = harness.say("Draft demo").await;
    assert!(answer.replies[0].contains("\"Draft demo\" is marked complete"));
    let open: Vec<String> = harness.open_tasks().await.into_iter().map(|t| t.title).collect();
    assert_eq!(open, vec!["Draft memo".to_string()]);
}

#[tokio::test]
async fn no_fixed_time_answer_clears_the_question() {
    let harness = Harness::new();

    let question = harness.say("add gym").await;
    assert!(question.replies[0].starts_with("When should I set it?"));

    let answer = harness.say("no fixed time").await;
    assert_eq!(answer.intent.kind, IntentKind::AddTask);
    assert!(answer.intent.slots.no_fixed_time);
    assert!(answer.intent.slots.target_time.is_none());
    assert_eq!(
        answer.replies[0],
        "Added \"gym\" with no fixed time. Tell me when it's done."
    );
    let tasks = harness.ledger.all_tasks(USER);
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].start_time.is_none());

    // the question is gone, so a bare time is classified on its own
    let third = harness.say("6pm").await;
    assert!(third.intent.is_unknown());
    assert!(!third.intent.metadata.clarified);
}

#[tokio::test]
async fn daily_task_lands_at_local_six() {
    let harness = Harness::new().in_timezone("Asia/Tokyo");

    let outcome = harness.say("add workout 6am daily").await;
    assert_eq!(outcome.intent.kind, IntentKind::AddTask);
    assert_eq!(outcome.intent.slots.task_name(), "workout");
    assert!(outcome.replies[0].contains("(daily)"));

    let task = harness.ledger.all_tasks(USER).remove(0);
    assert_eq!(task.title, "workout");
    assert_eq!(task.recurrence, Some(Recurrence::Daily));
    // 06:00 on 2026-01-06 in Tokyo
    assert_eq!(
        task.start_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 5, 21, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn reschedule_moves_the_unique_match() {
    let harness = Harness::new();
    let paper = harness
        .seed_at("Read AI paper", Severity::P2, Some(now() + Duration::hours(5)))
        .await;

    let outcome = harness.say("move AI paper to 9pm").await;
    assert_eq!(outcome.intent.kind, IntentKind::RescheduleTask);
    assert!(outcome.replies[0].starts_with("Moved \"Read AI paper\""));

    let stored = harness.ledger.get_task(&paper.id).await.unwrap().unwrap();
    assert_eq!(
        stored.start_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 5, 21, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn reschedule_without_time_asks_for_one() {
    let harness = Harness::new();
    let paper = harness.seed("Read AI paper", Severity::P2).await;

    let question = harness.say("reschedule AI paper").await;
    assert!(question.replies[0].starts_with("When should I set it?"));

    harness.say("8pm").await;
    let stored = harness.ledger.get_task(&paper.id).await.unwrap().unwrap();
    assert_eq!(
        stored.start_time,
        Some(Utc.with_ymd_and_hms(2026, 1, 5, 20, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn reschedule_answered_with_no_fixed_time_unsets_the_start() {
    let harness = Harness::new();
    let gym = harness
        .seed_at("Gym", Severity::P2, Some(now() + Duration::hours(8)))
        .await;

    let question = harness.say("move gym").await;
    assert!(question.replies[0].starts_with("When should I set it?"));

    let answer = harness.say("no fixed time").await;
    assert_eq!(answer.intent.kind, IntentKind::RescheduleTask);
    assert_eq!(answer.replies, vec!["Moved \"Gym\" to no fixed time.".to_string()]);
    let stored = harness.ledger.get_task(&gym.id).await.unwrap().unwrap();
    assert!(stored.start_time.is_none());

    let again = harness.say("no fixed time").await;
    assert_ne!(again.intent.kind, IntentKind::RescheduleTask);
    assert!(!again.replies[0].starts_with("When should I set it?"));
}

#[tokio::test]
async fn oversized_delay_is_capped_at_a_year() {
    let harness = Harness::new();
    let gym = harness.seed("Gym", Severity::P2).await;

    let outcome = harness.say("postpone gym by 100000000 days").await;
    assert_eq!(outcome.intent.kind, IntentKind::TaskDelay);
    assert!(outcome.replies[0].contains("Pushed \"Gym\""));
    let stored = harness.ledger.get_task(&gym.id).await.unwrap().unwrap();
    assert_eq!(stored.start_time, Some(now() + Duration::days(365)));
}

#[tokio::test]
async fn fresh_command_abandons_the_question() {
    let harness = Harness::new();
    harness.say("add gym").await;

    let status = harness.say("status").await;
    assert_eq!(status.intent.kind, IntentKind::Status);

    let after = harness.say("6pm").await;
    assert!(after.intent.is_unknown());
    assert!(harness.ledger.all_tasks(USER).is_empty());
    assert!(
        harness
            .observer
            .events()
            .iter()
            .any(|e| matches!(e, DialogueEvent::PendingBypassed { .. }))
    );
}

#[tokio::test]
async fn noise_repeats_the_question() {
    let harness = Harness::new();
    harness.say("add gym").await;

    let again = harness.say("hmm").await;
    assert_eq!(again.intent.kind, IntentKind::AddTask);
    assert!(again.replies[0].starts_with("I didn't catch a time."));

    let answer = harness.say("7pm").await;
    assert!(answer.replies[0].starts_with("Added \"gym\""));
    assert_eq!(harness.ledger.all_tasks(USER).len(), 1);
}

#[tokio::test]
async fn schedule_question_without_a_day_is_clarified() {
    let harness = Harness::new();
    harness
        .seed_at(
            "Physics lab",
            Severity::P2,
            Some(Utc.with_ymd_and_hms(2026, 1, 6, 14, 0, 0).unwrap()),
        )
        .await;

    let question = harness.say("what's my schedule looking like?").await;
    assert!(question.replies[0].starts_with("Which day should I check?"));

    let answer = harness.say("tomorrow").await;
    assert_eq!(answer.intent.kind, IntentKind::ScheduleQuery);
    assert!(answer.replies[0].contains("Physics lab"));
}

#[tokio::test]
async fn schedule_query_lists_the_day() {
    let harness = Harness::new();
    harness
        .seed_at(
            "Physics lab",
            Severity::P2,
            Some(Utc.with_ymd_and_hms(2026, 1, 6, 14, 0, 0).unwrap()),
        )
        .await;
    harness
        .seed_at("Gym", Severity::P2, Some(now() + Duration::hours(2)))
        .await;

    let outcome = harness.say("what do I have tomorrow?").await;
    assert!(outcome.replies[0].contains("Physics lab"));
    assert!(!outcome.replies[0].contains("Gym"));
}

#[tokio::test]
async fn timetable_import_adds_only_the_chosen_classes() {
    let harness = Harness::new();

    let preview = harness
        .say("here is my timetable: Physics Mon 9am - 11am; Chem Tue 2-4")
        .await;
    assert!(preview.replies[0].starts_with("I found these classes:"));
    assert!(harness.ledger.all_tasks(USER).is_empty());

    let imported = harness.say("add only physics").await;
    assert_eq!(imported.intent.kind, IntentKind::ImportTimetableConfirm);
    let tasks = harness.ledger.all_tasks(USER);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Physics");
    assert_eq!(tasks[0].severity, Severity::P1);
    assert_eq!(tasks[0].recurrence, Some(Recurrence::Weekly));
    assert_eq!(tasks[0].created_via, "timetable_import");
}

#[tokio::test]
async fn timetable_import_can_be_declined() {
    let harness = Harness::new();
    harness
        .say("here is my timetable: Physics Mon 9am - 11am; Chem Tue 2-4")
        .await;

    let declined = harness.say("no thanks").await;
    assert_eq!(declined.intent.kind, IntentKind::TimetableCancel);
    assert!(harness.ledger.all_tasks(USER).is_empty());
}

#[tokio::test]
async fn snooze_holds_reminders() {
    let harness = Harness::new();
    let outcome = harness.say("snooze 15 minutes").await;
    assert_eq!(outcome.intent.kind, IntentKind::ReminderSnooze);

    let reminders = harness.router.reminders();
    assert!(reminders.is_paused(USER, now() + Duration::minutes(10)));
    assert!(!reminders.is_paused(USER, now() + Duration::minutes(20)));
}

#[tokio::test]
async fn greeting_uses_the_display_name() {
    let mut harness = Harness::new();
    harness.user = UserProfile::new(USER).with_display_name("Ada");
    let outcome = harness.say("hey there").await;
    assert_eq!(
        outcome.replies,
        vec!["Hey Ada! What are we getting done today?".to_string()]
    );
}

#[tokio::test]
async fn pending_questions_are_per_user() {
    let harness = Harness::new();
    harness.say("add gym").await;

    let other = UserProfile::new("user-2");
    let outcome = harness
        .router
        .handle_message_at(&other, &InboundContext::new("test"), "6pm", now())
        .await
        .unwrap();
    assert!(outcome.intent.is_unknown());

    let mine = harness.say("6pm").await;
    assert!(mine.replies[0].starts_with("Added \"gym\""));
}

#[tokio::test]
async fn every_message_reports_completion() {
    let harness = Harness::new();
    harness.say("help").await;
    harness.say("status").await;

    let events = harness.observer.events();
    let received = events
        .iter()
        .filter(|e| matches!(e, DialogueEvent::MessageReceived { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, DialogueEvent::HandlerCompleted { .. }))
        .count();
    assert_eq!((received, completed), (2, 2));
}
