//! Turn handler outcomes into reply text.
//!
//! Templates are the baseline. When a provider is configured for replies it
//! may rephrase outcomes whose wording carries no structure; any failure,
//! timeout or empty answer falls back to the template.

use crate::config::ProviderConfig;
use crate::dialogue::guardrail::banner;
use crate::dialogue::handlers::ActionOutcome;
use crate::dialogue::intent::IntentKind;
use crate::dialogue::pending::{PendingAction, PendingKind};
use crate::dialogue::time::{TimeContext, day_label, format_local_time};
use crate::dialogue::timetable::summarize;
use crate::dialogue::turns::Turn;
use crate::ledger::{Recurrence, Task};
use crate::providers::{Provider, sanitize_api_error};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const PHRASING_PROMPT: &str = "You are Tenax, a friendly accountability assistant. \
Rewrite the draft reply in a warm, concise tone. Keep every task title, time and \
number exactly as given. Reply with plain text only.";

const SELECTION_FOOTER: &str = "Reply with the number or the task name.";

pub struct ReplyComposer {
    provider: Option<Arc<dyn Provider>>,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl ReplyComposer {
    pub fn templates_only() -> Self {
        Self {
            provider: None,
            model: String::new(),
            temperature: 0.0,
            timeout: Duration::ZERO,
        }
    }

    /// Uses `provider` only when `config.compose_replies` is set.
    pub fn new(provider: Option<Arc<dyn Provider>>, config: &ProviderConfig) -> Self {
        Self {
            provider: provider.filter(|_| config.compose_replies),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_millis(config.reply_timeout_ms),
        }
    }

    pub async fn compose(
        &self,
        outcome: &ActionOutcome,
        history: &[Turn],
        message: &str,
        time: &TimeContext,
    ) -> Vec<String> {
        let drafts = render(outcome, time);
        let Some(provider) = &self.provider else {
            return drafts;
        };
        if !phraseable(outcome) {
            return drafts;
        }

        let mut prompt = String::new();
        for turn in history {
            let _ = writeln!(prompt, "{}: {}", turn.role, turn.text);
        }
        let _ = writeln!(prompt, "user: {message}");
        let _ = writeln!(
            prompt,
            "\nOutcome: {}",
            serde_json::to_string(outcome).unwrap_or_default()
        );
        let _ = write!(prompt, "Draft: {}", drafts.join("\n\n"));

        let call =
            provider.chat_with_system(Some(PHRASING_PROMPT), &prompt, &self.model, self.temperature);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
            Ok(Ok(_)) => {
                warn!(provider = provider.name(), "empty phrasing, using template");
                drafts
            }
            Ok(Err(err)) => {
                warn!(
                    provider = provider.name(),
                    error = %sanitize_api_error(&err.to_string()),
                    "phrasing failed, using template"
                );
                drafts
            }
            Err(_) => {
                warn!(provider = provider.name(), "phrasing timed out, using template");
                drafts
            }
        }
    }
}

/// Outcomes with numbered lists or exact instructions keep their template.
fn phraseable(outcome: &ActionOutcome) -> bool {
    !matches!(
        outcome,
        ActionOutcome::NeedSelection { .. }
            | ActionOutcome::NeedTime { .. }
            | ActionOutcome::NeedDate
            | ActionOutcome::StatusList { .. }
            | ActionOutcome::TimetablePreview { .. }
            | ActionOutcome::GuardrailBlocked { .. }
    )
}

fn quoted_titles(tasks: &[Task]) -> String {
    tasks
        .iter()
        .map(|task| format!("\"{}\"", task.title))
        .collect::<Vec<_>>()
        .join(", ")
}

/// "06:00 PM" today, otherwise "Tue, Jan 6 at 06:00 PM".
fn when(at: DateTime<Utc>, time: &TimeContext) -> String {
    let local = at.with_timezone(&time.timezone);
    let clock = format_local_time(at, time.timezone);
    if local.date_naive() == time.today() {
        clock
    } else {
        format!("{} at {clock}", local.format("%a, %b %-d"))
    }
}

fn numbered(tasks: &[Task], time: &TimeContext) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| match task.start_time {
            Some(at) => format!("{}. {} ({})", i + 1, task.title, when(at, time)),
            None => format!("{}. {}", i + 1, task.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn recurrence_suffix(recurrence: Option<Recurrence>) -> String {
    recurrence.map_or_else(String::new, |r| format!(" ({r})"))
}

fn selection_prompt(action: IntentKind) -> &'static str {
    match action {
        IntentKind::MarkComplete => "Which one did you finish?",
        IntentKind::RemoveTask => "Which one should I remove?",
        IntentKind::RescheduleTask => "Which one should I move?",
        IntentKind::TaskDelay => "Which one should I push back?",
        _ => "Which task do you mean?",
    }
}

/// Ask a pending question again after a reply that did not answer it.
pub fn reprompt(pending: &PendingAction) -> String {
    match pending.kind {
        PendingKind::TaskDisambiguation => {
            let list = pending
                .options
                .iter()
                .enumerate()
                .map(|(i, option)| format!("{}. {}", i + 1, option.title))
                .collect::<Vec<_>>()
                .join("\n");
            format!("I didn't catch which one.\n\n{list}\n\n{SELECTION_FOOTER}")
        }
        PendingKind::TimeConfirmation => "I didn't catch a time. Reply with something like \
             \"6pm\" or \"tomorrow 9am\", or say \"no fixed time\"."
            .into(),
        PendingKind::ScheduleQueryClarification => {
            "Which day should I check? For example \"today\", \"tomorrow\" or \"Friday\".".into()
        }
        PendingKind::ImportConfirmation => {
            "Should I add those classes? Reply \"yes\", \"no\", or \"add only <class>\".".into()
        }
    }
}

/// Deterministic replies for an outcome.
#[allow(clippy::too_many_lines)]
pub fn render(outcome: &ActionOutcome, time: &TimeContext) -> Vec<String> {
    let tz = time.timezone;
    let text = match outcome {
        ActionOutcome::TaskAdded { task } => match task.start_time {
            Some(at) => format!(
                "Added \"{}\" for {}{}. Tell me when it's done.",
                task.title,
                when(at, time),
                recurrence_suffix(task.recurrence)
            ),
            None => format!(
                "Added \"{}\" with no fixed time{}. Tell me when it's done.",
                task.title,
                recurrence_suffix(task.recurrence)
            ),
        },
        ActionOutcome::NeedTitle => {
            "What should I add? Example: \"add workout 6am\" or \"remind me to read 9pm\".".into()
        }
        ActionOutcome::NeedTime { .. } => {
            "When should I set it? You can reply with a time or say \"no fixed time\".".into()
        }
        ActionOutcome::Completed {
            tasks,
            guardrail_cleared,
        } => {
            let done = match tasks.as_slice() {
                [task] => format!("Nice, \"{}\" is marked complete ✅", task.title),
                many => format!(
                    "Nice, marked {} tasks complete ✅ {}",
                    many.len(),
                    quoted_titles(many)
                ),
            };
            if *guardrail_cleared {
                return vec![
                    done,
                    "P1 guardrail cleared. You're free to plan new work.".into(),
                ];
            }
            done
        }
        ActionOutcome::Removed { tasks } => match tasks.as_slice() {
            [task] => format!("Removed \"{}\".", task.title),
            many => format!("Removed {} tasks: {}.", many.len(), quoted_titles(many)),
        },
        ActionOutcome::Rescheduled { task, at: Some(at) } => {
            format!("Moved \"{}\" to {}.", task.title, when(*at, time))
        }
        ActionOutcome::Rescheduled { task, at: None } => {
            format!("Moved \"{}\" to no fixed time.", task.title)
        }
        ActionOutcome::Delayed { task, at, reason } => {
            let lead = if reason.as_deref() == Some("user_unfinished") {
                "No worries."
            } else {
                "Done."
            };
            format!("{lead} Pushed \"{}\" to {}.", task.title, when(*at, time))
        }
        ActionOutcome::NeedSelection { action, options } => format!(
            "{}\n\n{}\n\n{SELECTION_FOOTER}",
            selection_prompt(*action),
            numbered(options, time)
        ),
        ActionOutcome::NotFound { .. } => "I couldn't find that one. Can you give me a bit more \
             detail? You can also say \"status\" to see the active list."
            .into(),
        ActionOutcome::NoOpenTasks => {
            "You don't have any open tasks right now. Try \"add workout 6am\".".into()
        }
        ActionOutcome::StatusList { tasks, priorities } => {
            if tasks.is_empty() {
                "You're all clear. No open tasks.".into()
            } else if priorities.is_empty() {
                format!("Here's what's open:\n{}", numbered(tasks, time))
            } else {
                format!(
                    "Here's what's open:\n{}\n\nP1 first: {}",
                    numbered(tasks, time),
                    quoted_titles(priorities)
                )
            }
        }
        ActionOutcome::PlanOverview { tasks } => {
            let (timed, open): (Vec<Task>, Vec<Task>) =
                tasks.iter().cloned().partition(|task| task.start_time.is_some());
            let mut plan = String::from("Here's your plan:");
            if !timed.is_empty() {
                let _ = write!(plan, "\n\nScheduled:\n{}", numbered(&timed, time));
            }
            if !open.is_empty() {
                let _ = write!(plan, "\n\nAnytime:\n{}", numbered(&open, time));
            }
            if tasks.is_empty() {
                plan.push_str(" nothing yet. Want to add something?");
            }
            plan
        }
        ActionOutcome::Progress { done, open } => match (done, open) {
            (0, 0) => "Nothing is scheduled for today yet.".into(),
            (done, 0) => format!("Today so far: all {done} done. Great work."),
            (done, open) => format!("Today so far: {done} done, {open} still open."),
        },
        ActionOutcome::DayStart { today, priorities } => {
            let mut text = if today.is_empty() {
                "Good morning! Nothing is scheduled today.".to_string()
            } else {
                format!("Good morning! Today's plan:\n{}", numbered(today, time))
            };
            if !priorities.is_empty() {
                let _ = write!(
                    text,
                    "\n\nStart with your P1 work: {}",
                    quoted_titles(priorities)
                );
            }
            text
        }
        ActionOutcome::DayEnd { done, remaining } => {
            let mut text = format!(
                "Wrapping up: {} done, {} left.",
                done.len(),
                remaining.len()
            );
            if !remaining.is_empty() {
                let _ = write!(text, "\nStill open:\n{}", numbered(remaining, time));
            }
            text
        }
        ActionOutcome::Snoozed { minutes, until } => format!(
            "Okay, I'll hold reminders for {minutes} minutes (until {}).",
            format_local_time(*until, tz)
        ),
        ActionOutcome::Paused { .. } => "Reminders are paused for the rest of today.".into(),
        ActionOutcome::Help => "Here's what I can do:\n\
             • \"add workout 6am daily\" to add a task\n\
             • \"done workout\" when you finish\n\
             • \"move essay to 9pm\" or \"push gym to tomorrow\"\n\
             • \"status\" or \"what do I have tomorrow?\"\n\
             • \"snooze 15 minutes\" or \"pause reminders\""
            .into(),
        ActionOutcome::Greeting { name } => match name {
            Some(name) => format!("Hey {name}! What are we getting done today?"),
            None => "Hey! What are we getting done today?".into(),
        },
        ActionOutcome::TimeNow { at } => format!(
            "It's {} on {}.",
            format_local_time(*at, tz),
            day_label(at.with_timezone(&tz).date_naive())
        ),
        ActionOutcome::Schedule {
            start,
            range_days,
            days,
        } => {
            if days.is_empty() {
                if *range_days <= 1 {
                    format!("Nothing scheduled for {}.", day_label(*start))
                } else {
                    format!(
                        "Nothing scheduled in the {range_days} days from {}.",
                        day_label(*start)
                    )
                }
            } else {
                days.iter()
                    .map(|day| {
                        let lines = day
                            .tasks
                            .iter()
                            .map(|task| match task.start_time {
                                Some(at) => {
                                    format!("- {} {}", format_local_time(at, tz), task.title)
                                }
                                None => format!("- {}", task.title),
                            })
                            .collect::<Vec<_>>()
                            .join("\n");
                        format!("{}:\n{lines}", day_label(day.date))
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        }
        ActionOutcome::NeedDate => {
            "Which day should I check? For example \"today\", \"tomorrow\" or \"Friday\".".into()
        }
        ActionOutcome::ScheduleNote { title, .. } => match title {
            Some(title) => format!(
                "Noted. Want me to add \"{title}\" as a task? Say \"add {title}\" with a time."
            ),
            None => "Noted.".into(),
        },
        ActionOutcome::TimetablePreview { entries } => format!(
            "I found these classes:\n{}\n\nShould I add them all? Reply \"yes\", \"no\", or \
             \"add only <class>\".",
            summarize(entries)
        ),
        ActionOutcome::TimetableEmpty => "I couldn't find classes in that. Send one per line, \
             like \"Physics Mon 9am - 11am\"."
            .into(),
        ActionOutcome::TimetableImported { tasks } => {
            format!("Added {} classes to your weekly schedule.", tasks.len())
        }
        ActionOutcome::TimetableCancelled => "Okay, I won't import that timetable.".into(),
        ActionOutcome::ResolutionBuilder => {
            "Let's set up your resolution. I'll walk you through it step by step.".into()
        }
        ActionOutcome::GuardrailBlocked { tasks, .. } => {
            banner(&tasks.iter().collect::<Vec<_>>())
        }
        ActionOutcome::Unknown => "I'm not sure what you mean. Try \"add workout 6am\", \
             \"done workout\", or \"status\"."
            .into(),
    };
    vec![text]
}
