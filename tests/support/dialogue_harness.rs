#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use tenax::config::Config;
use tenax::dialogue::ClassifyOptions;
use tenax::dialogue::time::{TimeContext, parse_timezone};
use tenax::ledger::{InMemoryLedger, NewTask, Severity, Task, TaskLedger};
use tenax::observability::{DialogueEvent, Observer};
use tenax::providers::{Provider, create_provider};
use tenax::{InboundContext, MessageOutcome, Router, UserProfile};

pub const USER: &str = "user-1";

/// Monday 2026-01-05 10:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
}

pub fn opts(tz: &str) -> ClassifyOptions {
    ClassifyOptions::new(TimeContext::new(parse_timezone(tz), now()))
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<DialogueEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<DialogueEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Observer for RecordingObserver {
    fn record_event(&self, event: &DialogueEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A router over an in-memory ledger, with handles kept for assertions.
pub struct Harness {
    pub router: Router,
    pub ledger: Arc<InMemoryLedger>,
    pub observer: Arc<RecordingObserver>,
    pub user: UserProfile,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        Self::build(config, None)
    }

    /// Wire the provider the config describes.
    pub fn with_provider(config: &Config) -> Self {
        Self::build(config, create_provider(&config.provider))
    }

    fn build(config: &Config, provider: Option<Arc<dyn Provider>>) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let observer = Arc::new(RecordingObserver::default());
        let router = Router::new(config, ledger.clone(), provider, observer.clone());
        Self {
            router,
            ledger,
            observer,
            user: UserProfile::new(USER),
        }
    }

    pub fn in_timezone(mut self, tz: &str) -> Self {
        self.user = self.user.with_timezone(tz);
        self
    }

    pub async fn say(&self, text: &str) -> MessageOutcome {
        self.say_at(text, now()).await
    }

    pub async fn say_at(&self, text: &str, at: DateTime<Utc>) -> MessageOutcome {
        self.router
            .handle_message_at(&self.user, &InboundContext::new("test"), text, at)
            .await
            .unwrap()
    }

    pub async fn seed(&self, title: &str, severity: Severity) -> Task {
        self.seed_at(title, severity, None).await
    }

    pub async fn seed_at(
        &self,
        title: &str,
        severity: Severity,
        start_time: Option<DateTime<Utc>>,
    ) -> Task {
        self.ledger
            .create_task(NewTask {
                user_id: USER.into(),
                title: title.into(),
                severity,
                start_time,
                duration_minutes: None,
                recurrence: None,
                created_via: "test".into(),
                metadata: serde_json::Value::Null,
            })
            .await
            .unwrap()
    }

    pub async fn open_tasks(&self) -> Vec<Task> {
        self.ledger.list_open_tasks(USER).await.unwrap()
    }
}
