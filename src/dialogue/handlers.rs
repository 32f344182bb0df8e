//! One handler per intent kind. Handlers perform ledger side effects and
//! return a structured [`ActionOutcome`] plus, when they need more from the
//! user, the pending action to store. They never write dialogue state.

use crate::config::{GuardrailConfig, MatcherConfig};
use crate::dialogue::guardrail::{Guardrail, GuardrailStatus};
use crate::dialogue::intent::{Intent, IntentKind, MAX_DEFER_DAYS};
use crate::dialogue::matcher::match_task;
use crate::dialogue::pending::{PendingAction, PendingOption};
use crate::dialogue::reminders::ReminderPreferences;
use crate::dialogue::text::contains_word;
use crate::dialogue::time::{TimeContext, local_day_bounds};
use crate::dialogue::timetable::TimetableEntry;
use crate::error::LedgerError;
use crate::ledger::{
    NewTask, Recurrence, Severity, SurfaceKind, Task, TaskLedger, TaskStatus, TaskUpdate,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Tasks scheduled on one local day.
#[derive(Debug, Clone, Serialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
}

/// What a handler did, in a form the reply composer can phrase.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    TaskAdded {
        task: Task,
    },
    NeedTitle,
    NeedTime {
        title: String,
    },
    Completed {
        tasks: Vec<Task>,
        guardrail_cleared: bool,
    },
    Removed {
        tasks: Vec<Task>,
    },
    Rescheduled {
        task: Task,
        at: Option<DateTime<Utc>>,
    },
    Delayed {
        task: Task,
        at: DateTime<Utc>,
        reason: Option<String>,
    },
    NeedSelection {
        action: IntentKind,
        options: Vec<Task>,
    },
    NotFound {
        reference: String,
    },
    NoOpenTasks,
    StatusList {
        tasks: Vec<Task>,
        priorities: Vec<Task>,
    },
    PlanOverview {
        tasks: Vec<Task>,
    },
    Progress {
        done: usize,
        open: usize,
    },
    DayStart {
        today: Vec<Task>,
        priorities: Vec<Task>,
    },
    DayEnd {
        done: Vec<Task>,
        remaining: Vec<Task>,
    },
    Snoozed {
        minutes: u32,
        until: DateTime<Utc>,
    },
    Paused {
        until: DateTime<Utc>,
    },
    Help,
    Greeting {
        name: Option<String>,
    },
    TimeNow {
        at: DateTime<Utc>,
    },
    Schedule {
        start: NaiveDate,
        range_days: u32,
        days: Vec<DaySchedule>,
    },
    NeedDate,
    ScheduleNote {
        title: Option<String>,
        at: Option<DateTime<Utc>>,
    },
    TimetablePreview {
        entries: Vec<TimetableEntry>,
    },
    TimetableEmpty,
    TimetableImported {
        tasks: Vec<Task>,
    },
    TimetableCancelled,
    ResolutionBuilder,
    GuardrailBlocked {
        attempted: IntentKind,
        tasks: Vec<Task>,
    },
    Unknown,
}

pub struct Handled {
    pub outcome: ActionOutcome,
    /// A question to wait on; replaces any current pending action.
    pub pending: Option<PendingAction>,
}

impl From<ActionOutcome> for Handled {
    fn from(outcome: ActionOutcome) -> Self {
        Self {
            outcome,
            pending: None,
        }
    }
}

impl Handled {
    fn asking(outcome: ActionOutcome, pending: PendingAction) -> Self {
        Self {
            outcome,
            pending: Some(pending),
        }
    }
}

/// Who the message is from and when it is handled.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub user_id: &'a str,
    pub channel: &'a str,
    pub display_name: Option<&'a str>,
    pub time: TimeContext,
}

impl HandlerContext<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.time.now
    }
}

/// New tasks whose title mentions a high-priority keyword are P1.
pub fn infer_severity(title: &str, keywords: &[String]) -> Severity {
    let lowered = title.to_lowercase();
    if keywords
        .iter()
        .any(|keyword| contains_word(&lowered, &keyword.to_lowercase()))
    {
        Severity::P1
    } else {
        Severity::P2
    }
}

enum Targets {
    Found(Vec<Task>),
    Reply(Handled),
}

pub struct Handlers {
    ledger: Arc<dyn TaskLedger>,
    guardrail: Arc<Guardrail>,
    reminders: Arc<ReminderPreferences>,
    matcher: MatcherConfig,
    high_priority_keywords: Vec<String>,
}

impl Handlers {
    pub fn new(
        ledger: Arc<dyn TaskLedger>,
        guardrail: Arc<Guardrail>,
        reminders: Arc<ReminderPreferences>,
        matcher: MatcherConfig,
        guardrail_config: &GuardrailConfig,
    ) -> Self {
        Self {
            ledger,
            guardrail,
            reminders,
            matcher,
            high_priority_keywords: guardrail_config.high_priority_keywords.clone(),
        }
    }

    pub async fn dispatch(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        match intent.kind {
            IntentKind::AddTask => self.add_task(intent, ctx).await,
            IntentKind::MarkComplete => self.complete(intent, ctx).await,
            IntentKind::RemoveTask => self.remove(intent, ctx).await,
            IntentKind::RescheduleTask => self.reschedule(intent, ctx).await,
            IntentKind::TaskDelay => self.delay(intent, ctx).await,
            IntentKind::Status => self.status(ctx).await,
            IntentKind::PlanOverview => self.plan_overview(ctx).await,
            IntentKind::ProgressReview => self.progress(ctx).await,
            IntentKind::DailyStart => self.day_start(ctx).await,
            IntentKind::DailyEnd => self.day_end(ctx).await,
            IntentKind::ReminderSnooze => {
                let minutes = intent.slots.minutes.unwrap_or(30);
                let until = self.reminders.snooze(ctx.user_id, minutes, ctx.now());
                Ok(ActionOutcome::Snoozed { minutes, until }.into())
            }
            IntentKind::ReminderPause => {
                let until =
                    self.reminders
                        .pause_for_today(ctx.user_id, ctx.now(), ctx.time.timezone);
                Ok(ActionOutcome::Paused { until }.into())
            }
            IntentKind::Help => Ok(ActionOutcome::Help.into()),
            IntentKind::Greeting => Ok(ActionOutcome::Greeting {
                name: ctx.display_name.map(str::to_string),
            }
            .into()),
            IntentKind::TimeNow => Ok(ActionOutcome::TimeNow { at: ctx.now() }.into()),
            IntentKind::ScheduleQuery => self.schedule(intent, ctx).await,
            IntentKind::ScheduleNote => Ok(ActionOutcome::ScheduleNote {
                title: intent.slots.task_name.clone(),
                at: intent.slots.target_time,
            }
            .into()),
            IntentKind::UploadTimetable => {
                if intent.slots.entries.is_empty() {
                    return Ok(ActionOutcome::TimetableEmpty.into());
                }
                let entries = intent.slots.entries.clone();
                Ok(Handled::asking(
                    ActionOutcome::TimetablePreview {
                        entries: entries.clone(),
                    },
                    PendingAction::import_confirmation(intent.clone(), entries, ctx.now()),
                ))
            }
            IntentKind::ImportTimetableConfirm => self.import_timetable(intent, ctx).await,
            IntentKind::TimetableCancel => Ok(ActionOutcome::TimetableCancelled.into()),
            IntentKind::StartResolutionBuilder => Ok(ActionOutcome::ResolutionBuilder.into()),
            IntentKind::Unknown => Ok(ActionOutcome::Unknown.into()),
        }
    }

    /// A reschedule or delay of an outstanding P1 task acknowledges it, so it
    /// may pass an active guardrail.
    pub fn acknowledges_priority(&self, intent: &Intent, status: &GuardrailStatus) -> bool {
        if !matches!(intent.kind, IntentKind::RescheduleTask | IntentKind::TaskDelay) {
            return false;
        }
        let outstanding: Vec<Task> = status.outstanding().into_iter().cloned().collect();
        if intent.slots.task_id.is_none() && !intent.slots.explicit_task {
            return false;
        }
        match_task(&outstanding, &intent.slots, &self.matcher)
            .matched
            .is_some()
    }

    async fn refresh_guardrail(&self, ctx: &HandlerContext<'_>) -> Result<GuardrailStatus, LedgerError> {
        self.guardrail.refresh(ctx.user_id, ctx.now()).await
    }

    async fn add_task(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        let slots = &intent.slots;
        let Some(title) = slots.task_name.clone().filter(|_| slots.explicit_task) else {
            return Ok(ActionOutcome::NeedTitle.into());
        };
        if slots.target_time.is_none() && !slots.no_fixed_time {
            return Ok(Handled::asking(
                ActionOutcome::NeedTime {
                    title: title.clone(),
                },
                PendingAction::time_confirmation(intent.clone(), ctx.now()),
            ));
        }

        let severity = infer_severity(&title, &self.high_priority_keywords);
        let task = self
            .ledger
            .create_task(NewTask {
                user_id: ctx.user_id.to_string(),
                title,
                severity,
                start_time: slots.target_time,
                duration_minutes: None,
                recurrence: slots.recurrence,
                created_via: ctx.channel.to_string(),
                metadata: json!({
                    "source": intent.metadata.source,
                    "rule": intent.metadata.rule,
                }),
            })
            .await?;
        info!(user_id = ctx.user_id, task_id = %task.id, %severity, "task created");
        if severity == Severity::P1 {
            self.refresh_guardrail(ctx).await?;
        }
        Ok(ActionOutcome::TaskAdded { task }.into())
    }

    /// Find the tasks an edit applies to: explicit ids, list positions, or a
    /// matched reference.
    async fn targets(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Targets, LedgerError> {
        let slots = &intent.slots;
        if !slots.task_ids.is_empty() {
            let mut found = Vec::new();
            for id in &slots.task_ids {
                if let Some(task) = self.ledger.get_task(id).await? {
                    if task.status == TaskStatus::Todo {
                        found.push(task);
                    }
                }
            }
            if found.is_empty() {
                return Ok(Targets::Reply(
                    ActionOutcome::NotFound {
                        reference: slots.task_name().to_string(),
                    }
                    .into(),
                ));
            }
            return Ok(Targets::Found(found));
        }

        let open = self.ledger.list_open_tasks(ctx.user_id).await?;
        if open.is_empty() {
            return Ok(Targets::Reply(ActionOutcome::NoOpenTasks.into()));
        }

        if !slots.task_indexes.is_empty() {
            let mut found = Vec::new();
            for &index in &slots.task_indexes {
                let Some(task) = index.checked_sub(1).and_then(|i| open.get(i)) else {
                    return Ok(Targets::Reply(
                        ActionOutcome::NotFound {
                            reference: format!("#{index}"),
                        }
                        .into(),
                    ));
                };
                found.push(task.clone());
            }
            return Ok(Targets::Found(found));
        }

        let result = match_task(&open, slots, &self.matcher);
        if let Some(task) = result.matched {
            return Ok(Targets::Found(vec![task]));
        }
        if result.options.is_empty() {
            return Ok(Targets::Reply(
                ActionOutcome::NotFound {
                    reference: slots.task_name().to_string(),
                }
                .into(),
            ));
        }

        debug!(
            user_id = ctx.user_id,
            options = result.options.len(),
            "task reference is ambiguous"
        );
        let options = result
            .options
            .iter()
            .map(|task| PendingOption {
                id: task.id.clone(),
                title: task.title.clone(),
            })
            .collect();
        Ok(Targets::Reply(Handled::asking(
            ActionOutcome::NeedSelection {
                action: intent.kind,
                options: result.options,
            },
            PendingAction::disambiguation(intent.clone(), options, ctx.now()),
        )))
    }

    async fn complete(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        let tasks = match self.targets(intent, ctx).await? {
            Targets::Found(tasks) => tasks,
            Targets::Reply(handled) => return Ok(handled),
        };
        let was_active = self.refresh_guardrail(ctx).await?.is_active();
        let mut done = Vec::with_capacity(tasks.len());
        for task in tasks {
            let updated = self
                .ledger
                .update_task_status(&task.id, TaskStatus::Done)
                .await?;
            self.guardrail
                .acknowledge(&task, true, ctx.channel, ctx.now())
                .await?;
            done.push(updated);
        }
        let guardrail_cleared = was_active && !self.refresh_guardrail(ctx).await?.is_active();
        Ok(ActionOutcome::Completed {
            tasks: done,
            guardrail_cleared,
        }
        .into())
    }

    async fn remove(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        let tasks = match self.targets(intent, ctx).await? {
            Targets::Found(tasks) => tasks,
            Targets::Reply(handled) => return Ok(handled),
        };
        let mut removed = Vec::with_capacity(tasks.len());
        let mut touched_priority = false;
        for task in tasks {
            touched_priority |= task.is_high_priority();
            removed.push(
                self.ledger
                    .update_task_status(&task.id, TaskStatus::Archived)
                    .await?,
            );
        }
        if touched_priority {
            self.refresh_guardrail(ctx).await?;
        }
        Ok(ActionOutcome::Removed { tasks: removed }.into())
    }

    async fn reschedule(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        let task = match self.targets(intent, ctx).await? {
            Targets::Found(tasks) => tasks.into_iter().next(),
            Targets::Reply(handled) => return Ok(handled),
        };
        let Some(task) = task else {
            return Ok(ActionOutcome::NoOpenTasks.into());
        };
        if intent.slots.target_time.is_none() && intent.slots.no_fixed_time {
            let updated = self.move_task(&task, None, ctx).await?;
            return Ok(ActionOutcome::Rescheduled {
                task: updated,
                at: None,
            }
            .into());
        }
        let Some(at) = intent.slots.target_time else {
            let mut waiting = intent.clone();
            waiting.slots.task_id = Some(task.id.clone());
            waiting.slots.task_ids.clear();
            waiting.slots.task_indexes.clear();
            waiting.slots = waiting.slots.with_task_name(Some(task.title.clone()));
            return Ok(Handled::asking(
                ActionOutcome::NeedTime {
                    title: task.title.clone(),
                },
                PendingAction::time_confirmation(waiting, ctx.now()),
            ));
        };
        let updated = self.move_task(&task, Some(at), ctx).await?;
        Ok(ActionOutcome::Rescheduled {
            task: updated,
            at: Some(at),
        }
        .into())
    }

    async fn delay(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        let task = match self.targets(intent, ctx).await? {
            Targets::Found(tasks) => tasks.into_iter().next(),
            Targets::Reply(handled) => return Ok(handled),
        };
        let Some(task) = task else {
            return Ok(ActionOutcome::NoOpenTasks.into());
        };
        let at = intent.slots.target_time.unwrap_or_else(|| {
            let days = Duration::days(i64::from(
                intent.slots.defer_days.clamp(1, MAX_DEFER_DAYS),
            ));
            // a start time near the end of the calendar stays where it is
            let base = task.start_time.unwrap_or_else(|| ctx.now());
            base.checked_add_signed(days).unwrap_or(base)
        });
        let updated = self.move_task(&task, Some(at), ctx).await?;
        Ok(ActionOutcome::Delayed {
            task: updated,
            at,
            reason: intent.slots.reason.clone(),
        }
        .into())
    }

    async fn move_task(
        &self,
        task: &Task,
        at: Option<DateTime<Utc>>,
        ctx: &HandlerContext<'_>,
    ) -> Result<Task, LedgerError> {
        let updated = self
            .ledger
            .update_task_fields(
                &task.id,
                TaskUpdate {
                    start_time: at,
                    clear_start_time: at.is_none(),
                    ..TaskUpdate::default()
                },
            )
            .await?;
        self.guardrail
            .acknowledge(task, false, ctx.channel, ctx.now())
            .await?;
        if task.is_high_priority() {
            self.refresh_guardrail(ctx).await?;
        }
        Ok(updated)
    }

    async fn priorities(
        &self,
        surface: SurfaceKind,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<Task>, LedgerError> {
        let status = self.refresh_guardrail(ctx).await?;
        let outstanding: Vec<Task> = status.outstanding().into_iter().cloned().collect();
        if status.is_active() {
            self.guardrail
                .surface(&status, surface, ctx.channel, ctx.now())
                .await?;
        }
        Ok(outstanding)
    }

    async fn status(&self, ctx: &HandlerContext<'_>) -> Result<Handled, LedgerError> {
        let tasks = self.ledger.list_open_tasks(ctx.user_id).await?;
        let priorities = self.priorities(SurfaceKind::StatusReply, ctx).await?;
        Ok(ActionOutcome::StatusList { tasks, priorities }.into())
    }

    async fn plan_overview(&self, ctx: &HandlerContext<'_>) -> Result<Handled, LedgerError> {
        let tasks = self.ledger.list_open_tasks(ctx.user_id).await?;
        self.priorities(SurfaceKind::PlanOverview, ctx).await?;
        Ok(ActionOutcome::PlanOverview { tasks }.into())
    }

    async fn today(&self, ctx: &HandlerContext<'_>) -> Result<Vec<Task>, LedgerError> {
        let Some((start, end)) = local_day_bounds(ctx.time.today(), 1, ctx.time.timezone) else {
            return Ok(Vec::new());
        };
        self.ledger
            .list_tasks_between(ctx.user_id, start, end)
            .await
    }

    async fn progress(&self, ctx: &HandlerContext<'_>) -> Result<Handled, LedgerError> {
        let today = self.today(ctx).await?;
        let done = today
            .iter()
            .filter(|task| task.status == TaskStatus::Done)
            .count();
        Ok(ActionOutcome::Progress {
            done,
            open: today.len() - done,
        }
        .into())
    }

    async fn day_start(&self, ctx: &HandlerContext<'_>) -> Result<Handled, LedgerError> {
        let today: Vec<Task> = self
            .today(ctx)
            .await?
            .into_iter()
            .filter(|task| task.status == TaskStatus::Todo)
            .collect();
        let priorities = self.priorities(SurfaceKind::MorningSummary, ctx).await?;
        Ok(ActionOutcome::DayStart { today, priorities }.into())
    }

    async fn day_end(&self, ctx: &HandlerContext<'_>) -> Result<Handled, LedgerError> {
        let (done, remaining): (Vec<Task>, Vec<Task>) = self
            .today(ctx)
            .await?
            .into_iter()
            .partition(|task| task.status == TaskStatus::Done);
        Ok(ActionOutcome::DayEnd { done, remaining }.into())
    }

    async fn schedule(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        let slots = &intent.slots;
        let Some(start) = slots.target_date.filter(|_| !slots.needs_date) else {
            return Ok(Handled::asking(
                ActionOutcome::NeedDate,
                PendingAction::schedule_clarification(intent.clone(), ctx.now()),
            ));
        };
        let range_days = slots.range_days.max(1);
        let tz = ctx.time.timezone;
        let Some((from, to)) = local_day_bounds(start, range_days, tz) else {
            return Ok(ActionOutcome::Schedule {
                start,
                range_days,
                days: Vec::new(),
            }
            .into());
        };

        let mut by_day: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
        for task in self.ledger.list_tasks_between(ctx.user_id, from, to).await? {
            if let Some(at) = task.start_time {
                by_day
                    .entry(at.with_timezone(&tz).date_naive())
                    .or_default()
                    .push(task);
            }
        }
        let days = by_day
            .into_iter()
            .map(|(date, tasks)| DaySchedule { date, tasks })
            .collect();
        Ok(ActionOutcome::Schedule {
            start,
            range_days,
            days,
        }
        .into())
    }

    async fn import_timetable(
        &self,
        intent: &Intent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Handled, LedgerError> {
        if intent.slots.entries.is_empty() {
            return Ok(ActionOutcome::TimetableEmpty.into());
        }
        let mut tasks = Vec::with_capacity(intent.slots.entries.len());
        for entry in &intent.slots.entries {
            let task = self
                .ledger
                .create_task(NewTask {
                    user_id: ctx.user_id.to_string(),
                    title: entry.title.clone(),
                    severity: Severity::P1,
                    start_time: entry.next_occurrence(&ctx.time),
                    duration_minutes: Some(entry.duration_minutes()),
                    recurrence: Some(Recurrence::Weekly),
                    created_via: "timetable_import".into(),
                    metadata: json!({
                        "weekday": entry.weekday.to_string(),
                        "start": entry.start.format("%H:%M").to_string(),
                        "end": entry.end.format("%H:%M").to_string(),
                    }),
                })
                .await?;
            tasks.push(task);
        }
        info!(user_id = ctx.user_id, count = tasks.len(), "timetable imported");
        self.refresh_guardrail(ctx).await?;
        Ok(ActionOutcome::TimetableImported { tasks }.into())
    }
}
