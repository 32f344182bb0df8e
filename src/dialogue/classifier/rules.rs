//! Ordered heuristic rules. The first rule that matches decides the intent.

use crate::dialogue::intent::{Intent, IntentKind, MAX_DEFER_DAYS, MAX_SNOOZE_MINUTES, Slots};
use crate::dialogue::text::{
    collapse_whitespace, contains_any_word, contains_word, index_list, is_question_like,
    remove_spans, starts_with_any, starts_with_word, word_number,
};
use crate::dialogue::time::{TimeContext, detect_recurrence, extract_time, parse_date_reference};
use crate::dialogue::timetable::parse_courses;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    pub time: TimeContext,
    /// Route otherwise-unknown text mentioning "plan" to the plan overview.
    pub allow_plan_fallback: bool,
}

impl ClassifyOptions {
    pub fn new(time: TimeContext) -> Self {
        Self {
            time,
            allow_plan_fallback: true,
        }
    }
}

// ── Phrase tables ────────────────────────────────────────────────

const PLACEHOLDERS: &[&str] = &[
    "task", "tasks", "it", "that", "this", "one", "that one", "this one", "my task", "the task",
    "that task", "this task", "something", "stuff", "all", "everything",
];

const POLITE: &[&str] = &[
    "please", "pls", "can you", "could you", "would you", "will you", "kindly", "hey", "ok",
    "okay", "help me", "i want to", "i need to", "i'd like to", "let's",
];

const CREATE_TRIGGERS: &[&str] = &[
    "add", "create", "schedule", "book", "set a reminder", "set reminder", "set up a reminder",
    "remind me", "new task", "make a task",
];

const REMOVE_VERBS: &[&str] = &["remove", "delete", "cancel", "drop", "get rid of"];
const RESCHEDULE_VERBS: &[&str] = &["reschedule", "move", "shift", "change"];
const DELAY_VERBS: &[&str] = &["delay", "postpone", "push", "defer", "skip", "put off"];

const SCHEDULE_PHRASES: &[&str] = &[
    "my schedule",
    "what do i have",
    "what have i got",
    "what's on",
    "whats on",
    "what is on",
    "anything on",
    "what's happening",
    "classes today",
    "classes tomorrow",
    "am i free",
    "what's planned",
    "what is planned",
];

const WEEKDAYS: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

const STATUS_PHRASES: &[&str] = &[
    "what do i have left",
    "what is left",
    "what's left",
    "whats left",
    "show my tasks",
    "show me my tasks",
    "list my tasks",
    "show tasks",
    "list tasks",
    "what's my plan",
    "whats my plan",
    "show my plan",
    "what is my plan",
    "what's pending",
    "what is pending",
    "what's on my list",
    "what is on my list",
];
const STATUS_EXACT: &[&str] = &["tasks", "my tasks", "list", "my list", "todo", "to-do", "todos"];

const PROGRESS_PHRASES: &[&str] = &[
    "how did i do",
    "what's my progress",
    "whats my progress",
    "what is my progress",
    "how am i doing",
    "progress report",
];
const DAY_START_PHRASES: &[&str] = &[
    "start my day",
    "start the day",
    "good morning",
    "i'm ready",
    "i am ready",
    "let's start",
    "lets start",
    "let's begin",
];
const DAY_END_PHRASES: &[&str] = &[
    "end my day",
    "end the day",
    "wrap up",
    "wrap-up",
    "good night",
    "goodnight",
    "done for the day",
    "done for today",
    "call it a day",
];

const TIMETABLE_PHRASES: &[&str] = &[
    "timetable",
    "time table",
    "course list",
    "class schedule",
    "course schedule",
    "courses i am taking",
    "courses i'm taking",
    "my courses",
];

const PAUSE_PHRASES: &[&str] = &[
    "stop reminders",
    "stop reminding me",
    "stop the reminders",
    "pause reminders",
    "pause notifications",
    "don't remind me",
    "dont remind me",
    "do not remind me",
    "no reminders",
    "no more reminders",
    "mute reminders",
];

const HELP_PHRASES: &[&str] = &[
    "what can you do",
    "how does this work",
    "how do i use",
    "commands",
];
const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "howdy", "yo", "sup", "good afternoon", "good evening",
];
const TIME_PHRASES: &[&str] = &[
    "what time is it",
    "what's the time",
    "whats the time",
    "what is the time",
    "current time",
    "time now",
];
const NOTE_WORDS: &[&str] = &[
    "lecture", "lectures", "class", "meeting", "meetings", "seminar", "tutorial",
];
const PLAN_WORDS: &[&str] = &["plan", "plans", "planning", "overview"];

// ── Patterns ─────────────────────────────────────────────────────

static COMPLETION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:i\s*(?:have|'ve|just|had)?\s*(?:just\s+)?(?:completed|finished|done)(?:\s+with)?|i'm\s+(?:all\s+)?done(?:\s+with)?|i\s+am\s+(?:all\s+)?done(?:\s+with)?|done(?:\s+with)?|finished(?:\s+with)?|completed|complete|marked?\s+(?:as\s+)?(?:done|complete))\b(.*)$",
    )
    .expect("completion regex")
});
static MARK_DONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^mark\s+(.+?)\s+(?:as\s+)?(?:done|complete|completed|finished)\W*$")
        .expect("mark done regex")
});
static DONE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)\s+(?:is\s+|are\s+)?(?:all\s+)?(?:done|finished|completed|complete)\W*$")
        .expect("done suffix regex")
});
static UNFINISHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^i\s+(?:couldn't|couldnt|could\s+not|didn't|didnt|did\s+not|wasn't\s+able\s+to|was\s+not\s+able\s+to|haven't|have\s+not)\s+(?:finish(?:ed)?|complete(?:d)?|done|do|get\s+to)\b(.*)$",
    )
    .expect("unfinished regex")
});
static RESOLUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)resolution builder|new year'?s? resolution|plan my goals?|create (?:a )?resolution plan",
    )
    .expect("resolution regex")
});
static SNOOZE_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?remind\s+me\s+(?:again\s+)?(?:later|in\s+\S+(?:\s+\S+)?\s*(?:minutes?|mins?|hours?|hrs?))\W*$",
    )
    .expect("snooze-only regex")
});
static SNOOZE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d+|(?:twenty|thirty|forty|fifty)[\s-](?:one|two|three|four|five|six|seven|eight|nine)|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|fifteen|twenty|thirty|forty|fifty|sixty|ninety)\s*(minutes?|mins?|m|hours?|hrs?|h)\b",
    )
    .expect("snooze amount regex")
});
static NO_FIXED_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:no\s+fixed\s+time|no\s+specific\s+time|any\s*time|whenever|flexible)\b")
        .expect("no fixed time regex")
});
static DEFER_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bby\s+(\d+|[a-z]+)\s+days?\b").expect("defer days regex")
});
static FILLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:for\s+me|to\s+my\s+(?:schedule|list|tasks?|to-?do\s+list|calendar|day)|on\s+my\s+(?:schedule|list|calendar)|on\s+time|please|pls|as\s+(?:done|complete|completed))\b",
    )
    .expect("filler regex")
});
static LEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:to|a\s+new\s+task|new\s+task|a\s+task|the\s+task|task|a\s+reminder|reminder|called|named|about|with|of)\b[\s:,\-]*",
    )
    .expect("leading filler regex")
});
static TRAILING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s,;:\-]*\b(?:at|by|on|for|to|in|from|till|until|til|and|every|with)$")
        .expect("trailing preposition regex")
});
static ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:my|the|our|a|an)\s+").expect("article regex"));

// ── Input preparation ────────────────────────────────────────────

/// Trimmed text with curly apostrophes folded, plus an ASCII-lowercased copy
/// that shares its byte offsets.
struct Utterance {
    raw: String,
    lower: String,
}

impl Utterance {
    fn new(text: &str) -> Self {
        let raw = text.trim().replace(['\u{2019}', '\u{2018}'], "'");
        let lower = raw.to_ascii_lowercase();
        Self { raw, lower }
    }

    /// Lowercase text without trailing punctuation, for whole-message checks.
    fn bare(&self) -> &str {
        self.lower
            .trim_end_matches(|ch: char| matches!(ch, '.' | '!' | '?'))
            .trim()
    }

    fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|phrase| self.lower.contains(phrase))
    }
}

/// Clean a fragment into a task title. Returns `None` for empty or generic
/// references like "it" or "my task".
pub fn clean_title(fragment: &str) -> Option<String> {
    let unquoted = fragment.replace(['"', '\u{201c}', '\u{201d}'], " ");
    let mut title = collapse_whitespace(&FILLER.replace_all(&unquoted, " "));
    loop {
        let before = title.clone();
        title = title
            .trim_matches(|ch: char| {
                ch.is_whitespace() || matches!(ch, '\'' | '.' | ',' | '!' | '?' | ':' | ';' | '-')
            })
            .to_string();
        title = LEADING.replace(&title, "").into_owned();
        title = TRAILING.replace(&title, "").into_owned();
        if title == before {
            break;
        }
    }
    let title = ARTICLE.replace(&title, "").trim().to_string();
    let lowered = title.to_lowercase();
    if title.is_empty() || PLACEHOLDERS.contains(&lowered.as_str()) {
        None
    } else {
        Some(title)
    }
}

/// Byte offset after any leading politeness ("please", "can you", ...).
fn skip_politeness(lower: &str) -> usize {
    let mut offset = 0;
    'outer: loop {
        let rest = &lower[offset..];
        let trimmed = rest.trim_start_matches(|ch: char| ch.is_whitespace() || ch == ',');
        offset += rest.len() - trimmed.len();
        for lead in POLITE {
            if starts_with_word(trimmed, lead) {
                offset += lead.len();
                continue 'outer;
            }
        }
        return offset;
    }
}

/// Span of a leading verb from `verbs`, after politeness.
fn leading_verb(lower: &str, verbs: &[&str]) -> Option<Range<usize>> {
    let start = skip_politeness(lower);
    let rest = &lower[start..];
    verbs
        .iter()
        .find(|verb| starts_with_word(rest, verb))
        .map(|verb| 0..start + verb.len())
}

fn imperative_creation(lower: &str) -> Option<Range<usize>> {
    leading_verb(lower, CREATE_TRIGGERS)
}

fn is_snooze(u: &Utterance) -> bool {
    SNOOZE_ONLY.is_match(&u.raw)
        || u.contains_any(&["remind me later", "remind me again later"])
        || starts_with_word(&u.lower, "snooze")
}

fn is_pause(u: &Utterance) -> bool {
    u.contains_any(PAUSE_PHRASES)
}

fn is_status(u: &Utterance) -> bool {
    let bare = u.bare();
    starts_with_word(bare, "status")
        || bare.ends_with("status")
        || STATUS_EXACT.contains(&bare)
        || u.contains_any(STATUS_PHRASES)
}

fn is_timetable(u: &Utterance) -> bool {
    u.contains_any(TIMETABLE_PHRASES)
}

// ── Rules ────────────────────────────────────────────────────────

fn task_reference(remainder: &str) -> Slots {
    match index_list(remainder) {
        Some(indexes) => Slots {
            task_indexes: indexes,
            ..Slots::default()
        },
        None => Slots::default().with_task_name(clean_title(remainder)),
    }
}

fn unfinished(u: &Utterance, opts: &ClassifyOptions) -> Option<Intent> {
    let caps = UNFINISHED.captures(&u.raw)?;
    let rest_start = caps.get(1)?.start();
    let time = extract_time(&u.raw, &opts.time);
    let mut spans = vec![0..rest_start];
    if let Some(found) = &time {
        spans.extend(found.spans.iter().cloned());
    }
    let mut slots = task_reference(&remove_spans(&u.raw, &spans));
    slots.target_time = time.map(|found| found.at);
    slots.defer_days = if slots.target_time.is_some() { 0 } else { 1 };
    slots.reason = Some("user_unfinished".into());
    Some(
        Intent::new(IntentKind::TaskDelay, 0.85)
            .with_slots(slots)
            .with_rule("unfinished"),
    )
}

fn completion(u: &Utterance) -> Option<Intent> {
    if u.contains_any(DAY_END_PHRASES) {
        return None;
    }
    let remainder = if let Some(caps) = COMPLETION.captures(&u.raw) {
        caps.get(1).map_or("", |m| m.as_str()).to_string()
    } else if let Some(caps) = MARK_DONE.captures(&u.raw) {
        caps[1].to_string()
    } else if !is_question_like(&u.raw) {
        let caps = DONE_SUFFIX.captures(&u.raw)?;
        let name = caps[1].trim();
        let lowered = name.to_ascii_lowercase();
        if lowered.ends_with(" not") || lowered.ends_with("n't") || lowered == "not" {
            return None;
        }
        name.to_string()
    } else {
        return None;
    };

    let slots = task_reference(&remainder);
    let confidence = if slots.explicit_task || !slots.task_indexes.is_empty() {
        0.95
    } else {
        0.9
    };
    Some(
        Intent::new(IntentKind::MarkComplete, confidence)
            .with_slots(slots)
            .with_rule("completion"),
    )
}

fn resolution_builder(u: &Utterance) -> Option<Intent> {
    RESOLUTION.is_match(&u.lower).then(|| {
        Intent::new(IntentKind::StartResolutionBuilder, 0.9).with_rule("resolution_builder")
    })
}

fn schedule_query(u: &Utterance, opts: &ClassifyOptions) -> Option<Intent> {
    if is_status(u) || is_timetable(u) || imperative_creation(&u.lower).is_some() {
        return None;
    }
    let phrased = u.contains_any(SCHEDULE_PHRASES);
    let asked = is_question_like(&u.raw)
        && (contains_any_word(&u.lower, WEEKDAYS)
            || contains_word(&u.lower, "schedule")
            || contains_word(&u.lower, "classes"));
    if !phrased && !asked {
        return None;
    }

    let mut slots = Slots {
        original_text: Some(u.raw.clone()),
        ..Slots::default()
    };
    match parse_date_reference(&u.raw, &opts.time) {
        Some(range) => {
            slots.target_date = Some(range.start);
            slots.day_offset = range.day_offset;
            slots.range_days = range.range_days;
        }
        None => slots.needs_date = true,
    }
    Some(
        Intent::new(IntentKind::ScheduleQuery, 0.85)
            .with_slots(slots)
            .with_rule("schedule_query"),
    )
}

fn status(u: &Utterance) -> Option<Intent> {
    is_status(u).then(|| Intent::new(IntentKind::Status, 0.9).with_rule("status"))
}

fn fixed_triggers(u: &Utterance) -> Option<Intent> {
    let bare = u.bare();
    if u.contains_any(PROGRESS_PHRASES) || contains_word(bare, "progress") {
        return Some(Intent::new(IntentKind::ProgressReview, 0.9).with_rule("progress"));
    }
    if u.contains_any(DAY_START_PHRASES) {
        return Some(Intent::new(IntentKind::DailyStart, 0.9).with_rule("daily_start"));
    }
    if u.contains_any(DAY_END_PHRASES) {
        return Some(Intent::new(IntentKind::DailyEnd, 0.9).with_rule("daily_end"));
    }
    None
}

fn creation(u: &Utterance, opts: &ClassifyOptions) -> Option<Intent> {
    if is_snooze(u) || is_pause(u) {
        return None;
    }
    let trigger = match imperative_creation(&u.lower) {
        Some(span) => span,
        // a question needs an imperative trigger to count as a request
        None if is_question_like(&u.raw) => return None,
        None => ["remind me", "set a reminder"].iter().find_map(|phrase| {
            let start = u.lower.find(phrase)?;
            contains_word(&u.lower[start..], phrase).then(|| start..start + phrase.len())
        })?,
    };

    let mut slots = Slots::default();
    let mut spans = vec![trigger];
    if let Some(found) = extract_time(&u.raw, &opts.time) {
        slots.target_time = Some(found.at);
        spans.extend(found.spans);
    }
    if let Some((recurrence, span)) = detect_recurrence(&u.raw) {
        slots.recurrence = Some(recurrence);
        spans.push(span);
    }
    if let Some(found) = NO_FIXED_TIME.find(&u.raw) {
        slots.no_fixed_time = true;
        spans.push(found.range());
    }

    let slots = slots.with_task_name(clean_title(&remove_spans(&u.raw, &spans)));
    let confidence = if slots.explicit_task { 0.9 } else { 0.75 };
    Some(
        Intent::new(IntentKind::AddTask, confidence)
            .with_slots(slots)
            .with_rule("creation"),
    )
}

fn timetable(u: &Utterance) -> Option<Intent> {
    let entries = parse_courses(&u.raw);
    if !is_timetable(u) && entries.len() < 2 {
        return None;
    }
    let slots = Slots {
        entries,
        original_text: Some(u.raw.clone()),
        ..Slots::default()
    };
    Some(
        Intent::new(IntentKind::UploadTimetable, 0.85)
            .with_slots(slots)
            .with_rule("timetable"),
    )
}

fn edit_command(u: &Utterance, opts: &ClassifyOptions) -> Option<Intent> {
    let (kind, verb, rule) = if let Some(span) = leading_verb(&u.lower, REMOVE_VERBS) {
        (IntentKind::RemoveTask, span, "remove")
    } else if let Some(span) = leading_verb(&u.lower, RESCHEDULE_VERBS) {
        (IntentKind::RescheduleTask, span, "reschedule")
    } else if let Some(span) = leading_verb(&u.lower, DELAY_VERBS) {
        (IntentKind::TaskDelay, span, "delay")
    } else {
        return None;
    };

    let mut spans = vec![verb];
    let time = if kind == IntentKind::RemoveTask {
        None
    } else {
        extract_time(&u.raw, &opts.time)
    };
    if let Some(found) = &time {
        spans.extend(found.spans.iter().cloned());
    }
    let mut defer_days = None;
    if kind == IntentKind::TaskDelay {
        if let Some(caps) = DEFER_DAYS.captures(&u.raw) {
            let amount = caps[1].to_ascii_lowercase();
            defer_days = amount
                .parse()
                .ok()
                .or_else(|| word_number(&amount))
                .map(|days: u32| days.min(MAX_DEFER_DAYS));
            if defer_days.is_some() {
                spans.extend(caps.get(0).map(|m| m.range()));
            }
        }
    }

    let mut slots = task_reference(&remove_spans(&u.raw, &spans));
    slots.target_time = time.map(|found| found.at);
    if kind == IntentKind::TaskDelay && slots.target_time.is_none() {
        slots.defer_days = defer_days.unwrap_or(1);
    }
    Some(Intent::new(kind, 0.85).with_slots(slots).with_rule(rule))
}

fn snooze_minutes(lower: &str) -> u32 {
    if let Some(caps) = SNOOZE_AMOUNT.captures(lower) {
        let amount = caps[1].to_ascii_lowercase();
        if let Some(value) = amount.parse::<u32>().ok().or_else(|| word_number(&amount)) {
            let minutes = if caps[2].starts_with('h') {
                value.saturating_mul(60)
            } else {
                value
            };
            return minutes.min(MAX_SNOOZE_MINUTES);
        }
    }
    if contains_word(lower, "half") {
        30
    } else if contains_word(lower, "hour") {
        60
    } else {
        30
    }
}

fn reminders(u: &Utterance) -> Option<Intent> {
    if is_pause(u) {
        return Some(Intent::new(IntentKind::ReminderPause, 0.9).with_rule("pause"));
    }
    if is_snooze(u) {
        let slots = Slots {
            minutes: Some(snooze_minutes(&u.lower)),
            ..Slots::default()
        };
        return Some(
            Intent::new(IntentKind::ReminderSnooze, 0.9)
                .with_slots(slots)
                .with_rule("snooze"),
        );
    }
    None
}

fn small_talk(u: &Utterance) -> Option<Intent> {
    let bare = u.bare();
    if starts_with_word(bare, "help") || u.contains_any(HELP_PHRASES) {
        return Some(Intent::new(IntentKind::Help, 0.9).with_rule("help"));
    }
    if u.contains_any(TIME_PHRASES) {
        return Some(Intent::new(IntentKind::TimeNow, 0.9).with_rule("time_now"));
    }
    if starts_with_any(bare, GREETINGS) && bare.split_whitespace().count() <= 4 {
        return Some(Intent::new(IntentKind::Greeting, 0.8).with_rule("greeting"));
    }
    None
}

fn schedule_note(u: &Utterance, opts: &ClassifyOptions) -> Option<Intent> {
    if !contains_any_word(&u.lower, NOTE_WORDS) {
        return None;
    }
    let mut slots = Slots {
        original_text: Some(u.raw.clone()),
        ..Slots::default()
    };
    let mut spans = Vec::new();
    if let Some(found) = extract_time(&u.raw, &opts.time) {
        slots.target_time = Some(found.at);
        spans = found.spans;
    }
    let slots = slots.with_task_name(clean_title(&remove_spans(&u.raw, &spans)));
    Some(
        Intent::new(IntentKind::ScheduleNote, 0.6)
            .with_slots(slots)
            .with_rule("schedule_note"),
    )
}

/// Run every heuristic in priority order. `None` when nothing matched.
pub fn classify_rules(text: &str, opts: &ClassifyOptions) -> Option<Intent> {
    let u = Utterance::new(text);
    if u.raw.is_empty() {
        return None;
    }
    unfinished(&u, opts)
        .or_else(|| completion(&u))
        .or_else(|| resolution_builder(&u))
        .or_else(|| schedule_query(&u, opts))
        .or_else(|| status(&u))
        .or_else(|| fixed_triggers(&u))
        .or_else(|| creation(&u, opts))
        .or_else(|| timetable(&u))
        .or_else(|| edit_command(&u, opts))
        .or_else(|| reminders(&u))
        .or_else(|| small_talk(&u))
        .or_else(|| schedule_note(&u, opts))
}

/// Last heuristic resort: any mention of a plan shows the plan overview.
pub fn plan_fallback(text: &str, opts: &ClassifyOptions) -> Option<Intent> {
    let lower = text.to_lowercase();
    (opts.allow_plan_fallback && contains_any_word(&lower, PLAN_WORDS))
        .then(|| Intent::new(IntentKind::PlanOverview, 0.6).with_rule("plan_fallback"))
}

/// Synchronous classification without the model fallback. Never fails.
pub fn classify(text: &str, opts: &ClassifyOptions) -> Intent {
    classify_rules(text, opts)
        .or_else(|| plan_fallback(text, opts))
        .unwrap_or_else(|| Intent::unknown(text))
}
