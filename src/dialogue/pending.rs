//! Multi-turn clarification: the outstanding question a user owes an answer
//! to, and how the next message either answers it or abandons it.

use crate::dialogue::classifier::{ClassifyOptions, classify_rules, clean_title};
use crate::dialogue::intent::{Intent, IntentKind, Slots};
use crate::dialogue::text::{index_list, is_question_like, normalize_title};
use crate::dialogue::time::{extract_time, parse_date_reference};
use crate::dialogue::timetable::{TimetableEntry, select_entries};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use strum::Display;

static NO_FIXED_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:no\s+fixed\s+time|no\s+specific\s+time|no\s+set\s+time|any\s*time|flexible|whenever|doesn'?t\s+matter)\b",
    )
    .expect("no fixed time regex")
});
static CONFIRM_ALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:yes|yep|yeah|yup|sure|ok|okay|go\s+ahead|add\s+(?:them\s+)?all|add\s+them|do\s+it|confirm|please\s+do)\b",
    )
    .expect("confirm regex")
});
static DECLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:no|nope|cancel|not\s+now|don'?t|skip|never\s*mind)\b")
        .expect("decline regex")
});
static ADD_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:add|import)\s+)?(?:only|just)\s+(.+)$").expect("add only regex")
});
static LIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|&|\band\b)\s*").expect("separator regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PendingKind {
    TaskDisambiguation,
    TimeConfirmation,
    ScheduleQueryClarification,
    ImportConfirmation,
}

/// One numbered choice offered to the user. Its number is its position + 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOption {
    pub id: String,
    pub title: String,
}

/// The question the agent is waiting on. The intent is the one that needed
/// more information; answering completes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: PendingKind,
    pub intent: Intent,
    pub options: Vec<PendingOption>,
    pub entries: Vec<TimetableEntry>,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    fn new(kind: PendingKind, intent: Intent, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            intent,
            options: Vec::new(),
            entries: Vec::new(),
            created_at: now,
        }
    }

    pub fn disambiguation(intent: Intent, options: Vec<PendingOption>, now: DateTime<Utc>) -> Self {
        Self {
            options,
            ..Self::new(PendingKind::TaskDisambiguation, intent, now)
        }
    }

    pub fn time_confirmation(intent: Intent, now: DateTime<Utc>) -> Self {
        Self::new(PendingKind::TimeConfirmation, intent, now)
    }

    pub fn schedule_clarification(intent: Intent, now: DateTime<Utc>) -> Self {
        Self::new(PendingKind::ScheduleQueryClarification, intent, now)
    }

    pub fn import_confirmation(
        intent: Intent,
        entries: Vec<TimetableEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entries,
            ..Self::new(PendingKind::ImportConfirmation, intent, now)
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// What the next message did to a pending action.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The message answered the question; the completed intent.
    Resolved(Intent),
    /// A fresh command abandons the question. Carries the heuristic intent
    /// when one matched.
    Bypassed(Option<Intent>),
    /// Neither an answer nor a new command; ask again.
    Reprompt,
}

/// Whether a fully specified new command may abandon a pending action.
#[derive(Debug, Clone, Copy)]
pub struct BypassPolicy {
    pub enabled: bool,
}

impl Default for BypassPolicy {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl BypassPolicy {
    /// Decide between answering, bypassing and re-asking.
    ///
    /// A recognizable answer to the current question is never a bypass, and
    /// neither is a bare number.
    pub fn decide(&self, text: &str, pending: &PendingAction, opts: &ClassifyOptions) -> Resolution {
        let fresh = classify_rules(text, opts);
        let answer = resolve_with(text, pending, opts, fresh.as_ref());

        let direct = answer.is_some() && answers_question(pending.kind, fresh.as_ref());
        let bare_number = index_list(text).is_some();

        if self.enabled && !direct && !bare_number {
            let bypass = match &fresh {
                Some(intent) => is_fresh_command(intent, pending),
                None => is_question_like(text),
            };
            if bypass {
                return Resolution::Bypassed(fresh);
            }
        }

        match answer {
            Some(intent) => Resolution::Resolved(intent),
            None => Resolution::Reprompt,
        }
    }
}

/// Time and date answers compete with commands that carry their own times;
/// they only count when the text is not also a different command.
fn answers_question(kind: PendingKind, fresh: Option<&Intent>) -> bool {
    match kind {
        PendingKind::TaskDisambiguation | PendingKind::ImportConfirmation => true,
        PendingKind::TimeConfirmation => {
            fresh.is_none_or(|intent| intent.kind == IntentKind::ScheduleNote)
        }
        PendingKind::ScheduleQueryClarification => {
            fresh.is_none_or(|intent| intent.kind == IntentKind::ScheduleQuery)
        }
    }
}

/// An unambiguous, fully specified command unrelated to the question.
fn is_fresh_command(intent: &Intent, pending: &PendingAction) -> bool {
    let slots = &intent.slots;
    match intent.kind {
        IntentKind::Status
        | IntentKind::TimeNow
        | IntentKind::Help
        | IntentKind::ProgressReview
        | IntentKind::DailyStart
        | IntentKind::DailyEnd
        | IntentKind::ReminderSnooze
        | IntentKind::ReminderPause
        | IntentKind::StartResolutionBuilder
        | IntentKind::UploadTimetable => true,
        IntentKind::ScheduleQuery => !slots.needs_date,
        IntentKind::AddTask => slots.explicit_task,
        IntentKind::MarkComplete
        | IntentKind::RemoveTask
        | IntentKind::RescheduleTask
        | IntentKind::TaskDelay => {
            slots.explicit_task
                || (!slots.task_indexes.is_empty()
                    && (pending.kind != PendingKind::TaskDisambiguation
                        || intent.kind != pending.intent.kind
                        || slots.task_indexes.iter().any(|&i| i > pending.options.len())))
        }
        IntentKind::PlanOverview
        | IntentKind::Greeting
        | IntentKind::ScheduleNote
        | IntentKind::ImportTimetableConfirm
        | IntentKind::TimetableCancel
        | IntentKind::Unknown => false,
    }
}

/// Try to read `text` as an answer to `pending`. `None` means re-ask.
pub fn resolve(text: &str, pending: &PendingAction, opts: &ClassifyOptions) -> Option<Intent> {
    resolve_with(text, pending, opts, classify_rules(text, opts).as_ref())
}

fn resolve_with(
    text: &str,
    pending: &PendingAction,
    opts: &ClassifyOptions,
    fresh: Option<&Intent>,
) -> Option<Intent> {
    match pending.kind {
        PendingKind::TaskDisambiguation => resolve_selection(text, pending, fresh),
        PendingKind::TimeConfirmation => resolve_time(text, pending, opts),
        PendingKind::ScheduleQueryClarification => {
            let range = parse_date_reference(text, &opts.time)?;
            let mut intent = pending.intent.clone();
            intent.slots.target_date = Some(range.start);
            intent.slots.day_offset = range.day_offset;
            intent.slots.range_days = range.range_days;
            intent.slots.needs_date = false;
            Some(intent.clarified())
        }
        PendingKind::ImportConfirmation => resolve_import(text, pending),
    }
}

fn ordinal(text: &str, count: usize) -> Option<usize> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > 3 {
        return None;
    }
    words.iter().find_map(|word| match *word {
        "first" | "1st" => Some(1),
        "second" | "2nd" => Some(2),
        "third" | "3rd" => Some(3),
        "fourth" | "4th" => Some(4),
        "fifth" | "5th" => Some(5),
        "last" => Some(count),
        _ => None,
    })
}

fn resolve_selection(text: &str, pending: &PendingAction, fresh: Option<&Intent>) -> Option<Intent> {
    let options = &pending.options;
    let normalized = normalize_title(text);

    let indexes = index_list(text)
        .or_else(|| {
            fresh
                .filter(|intent| intent.kind == pending.intent.kind)
                .map(|intent| intent.slots.task_indexes.clone())
                .filter(|indexes| !indexes.is_empty())
        })
        .or_else(|| ordinal(&normalized, options.len()).map(|index| vec![index]));

    let chosen: Vec<&PendingOption> = if let Some(indexes) = indexes {
        if indexes.iter().any(|&i| i == 0 || i > options.len()) {
            return None;
        }
        indexes.iter().map(|&i| &options[i - 1]).collect()
    } else {
        let reference = normalize_title(&clean_title(text)?);
        if reference.is_empty() {
            return None;
        }
        if let Some(exact) = options
            .iter()
            .find(|option| normalize_title(&option.title) == reference)
        {
            vec![exact]
        } else {
            let hits: Vec<&PendingOption> = options
                .iter()
                .filter(|option| normalize_title(&option.title).contains(&reference))
                .collect();
            if hits.len() != 1 {
                return None;
            }
            hits
        }
    };

    let mut intent = pending.intent.clone();
    intent.slots.task_id = chosen.first().map(|option| option.id.clone());
    intent.slots.task_ids = chosen.iter().map(|option| option.id.clone()).collect();
    intent.slots.task_indexes.clear();
    if let [only] = chosen.as_slice() {
        intent.slots.task_name = Some(only.title.clone());
        intent.slots.explicit_task = true;
    }
    Some(intent.clarified())
}

fn resolve_time(text: &str, pending: &PendingAction, opts: &ClassifyOptions) -> Option<Intent> {
    let mut intent = pending.intent.clone();
    if NO_FIXED_TIME.is_match(text) {
        intent.slots.target_time = None;
        intent.slots.no_fixed_time = true;
        return Some(intent.clarified());
    }
    let found = extract_time(text, &opts.time)?;
    intent.slots.target_time = Some(found.at);
    intent.slots.no_fixed_time = false;
    Some(intent.clarified())
}

fn resolve_import(text: &str, pending: &PendingAction) -> Option<Intent> {
    let text = text.trim();
    let entries = if let Some(caps) = ADD_ONLY.captures(text) {
        let wanted: Vec<String> = LIST_SEPARATOR
            .split(&caps[1])
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        let picked = select_entries(&pending.entries, &wanted);
        if picked.is_empty() {
            return None;
        }
        picked
    } else if CONFIRM_ALL.is_match(text) {
        pending.entries.clone()
    } else if DECLINE.is_match(text) {
        return Some(Intent::new(IntentKind::TimetableCancel, 0.95).clarified());
    } else {
        return None;
    };

    let slots = Slots {
        entries,
        ..Slots::default()
    };
    Some(
        Intent::new(IntentKind::ImportTimetableConfirm, 0.95)
            .with_slots(slots)
            .clarified(),
    )
}
