use crate::dialogue::timetable::TimetableEntry;
use crate::ledger::Recurrence;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Every action a message can be routed to.
///
/// Adding a variant forces a decision in [`IntentKind::allowed_under_guardrail`],
/// [`IntentKind::model_inferable`] and the router's dispatch match.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentKind {
    AddTask,
    MarkComplete,
    RemoveTask,
    RescheduleTask,
    TaskDelay,
    Status,
    PlanOverview,
    ProgressReview,
    DailyStart,
    DailyEnd,
    ReminderSnooze,
    ReminderPause,
    Help,
    Greeting,
    TimeNow,
    ScheduleQuery,
    ScheduleNote,
    UploadTimetable,
    ImportTimetableConfirm,
    TimetableCancel,
    StartResolutionBuilder,
    Unknown,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Intents that may run while the P1 guardrail is active.
    pub fn allowed_under_guardrail(self) -> bool {
        match self {
            Self::MarkComplete
            | Self::Status
            | Self::Help
            | Self::ProgressReview
            | Self::PlanOverview
            | Self::DailyStart
            | Self::DailyEnd
            | Self::ReminderSnooze
            | Self::ReminderPause
            | Self::Greeting
            | Self::TimeNow
            | Self::ScheduleQuery => true,
            Self::AddTask
            | Self::RemoveTask
            | Self::RescheduleTask
            | Self::TaskDelay
            | Self::ScheduleNote
            | Self::UploadTimetable
            | Self::ImportTimetableConfirm
            | Self::TimetableCancel
            | Self::StartResolutionBuilder
            | Self::Unknown => false,
        }
    }

    /// Intents the model fallback may return. Confirmation kinds need a
    /// pending action's state and are only reachable through the resolver.
    pub fn model_inferable(self) -> bool {
        match self {
            Self::ImportTimetableConfirm | Self::TimetableCancel | Self::UploadTimetable => false,
            Self::AddTask
            | Self::MarkComplete
            | Self::RemoveTask
            | Self::RescheduleTask
            | Self::TaskDelay
            | Self::Status
            | Self::PlanOverview
            | Self::ProgressReview
            | Self::DailyStart
            | Self::DailyEnd
            | Self::ReminderSnooze
            | Self::ReminderPause
            | Self::Help
            | Self::Greeting
            | Self::TimeNow
            | Self::ScheduleQuery
            | Self::ScheduleNote
            | Self::StartResolutionBuilder
            | Self::Unknown => true,
        }
    }

    /// Intents that act on an existing task and go through the matcher.
    pub fn targets_existing_task(self) -> bool {
        matches!(
            self,
            Self::MarkComplete | Self::RemoveTask | Self::RescheduleTask | Self::TaskDelay
        )
    }
}

/// Longest postponement a single message can ask for.
pub const MAX_DEFER_DAYS: u32 = 365;
/// Longest reminder snooze, one day.
pub const MAX_SNOOZE_MINUTES: u32 = 24 * 60;

/// Parameters extracted for an intent. Which fields are meaningful depends on
/// the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Slots {
    pub task_name: Option<String>,
    /// `true` when the user named a concrete task rather than "it"/"my task".
    pub explicit_task: bool,
    pub task_id: Option<String>,
    pub task_ids: Vec<String>,
    /// 1-based positions in the open-task list ("remove 2 and 3").
    pub task_indexes: Vec<usize>,
    pub target_time: Option<DateTime<Utc>>,
    pub no_fixed_time: bool,
    pub recurrence: Option<Recurrence>,
    pub defer_days: u32,
    pub minutes: Option<u32>,
    /// First local date a schedule query covers.
    pub target_date: Option<NaiveDate>,
    pub day_offset: i64,
    pub range_days: u32,
    pub needs_date: bool,
    pub entries: Vec<TimetableEntry>,
    pub reason: Option<String>,
    pub original_text: Option<String>,
}

impl Slots {
    /// The task reference, or `""` when none was given.
    pub fn task_name(&self) -> &str {
        self.task_name.as_deref().unwrap_or("")
    }

    pub fn with_task_name(mut self, name: Option<String>) -> Self {
        self.explicit_task = name.is_some();
        self.task_name = name;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentSource {
    #[default]
    Rules,
    Model,
    PendingAction,
    Default,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub source: IntentSource,
    /// Set when the intent came from answering a clarification question.
    pub clarified: bool,
    /// Name of the rule or strategy that produced the intent.
    pub rule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub slots: Slots,
    pub confidence: f32,
    pub metadata: IntentMetadata,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f32) -> Self {
        Self {
            kind,
            slots: Slots::default(),
            confidence: confidence.clamp(0.0, 1.0),
            metadata: IntentMetadata::default(),
        }
    }

    pub fn with_slots(mut self, slots: Slots) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_source(mut self, source: IntentSource) -> Self {
        self.metadata.source = source;
        self
    }

    pub fn with_rule(mut self, rule: &'static str) -> Self {
        self.metadata.rule = Some(rule.to_string());
        self
    }

    pub fn clarified(mut self) -> Self {
        self.metadata.clarified = true;
        self.metadata.source = IntentSource::PendingAction;
        self
    }

    /// The catch-all result for text nothing recognized.
    pub fn unknown(text: &str) -> Self {
        Self::new(IntentKind::Unknown, 0.2)
            .with_slots(Slots {
                original_text: Some(text.to_string()),
                ..Slots::default()
            })
            .with_source(IntentSource::Default)
    }

    pub fn is_unknown(&self) -> bool {
        self.kind == IntentKind::Unknown
    }
}
