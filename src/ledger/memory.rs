use super::{AckState, NewTask, RuleEvent, RuleState, Task, TaskLedger, TaskStatus, TaskUpdate};
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct LedgerInner {
    tasks: Vec<Task>,
    rule_states: HashMap<String, RuleState>,
    rule_events: Vec<RuleEvent>,
    rule_state_writes: u64,
}

/// Process-local ledger used by the console channel and tests.
/// Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every task ever written for a user, in insertion order.
    pub fn all_tasks(&self, user_id: &str) -> Vec<Task> {
        self.lock()
            .tasks
            .iter()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn rule_events(&self, user_id: &str) -> Vec<RuleEvent> {
        self.lock()
            .rule_events
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Number of rule-state upserts that reached the store.
    pub fn rule_state_writes(&self) -> u64 {
        self.lock().rule_state_writes
    }

    fn apply<F>(&self, id: &str, mutate: F) -> Result<Task, LedgerError>
    where
        F: FnOnce(&mut Task),
    {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        mutate(task);
        Ok(task.clone())
    }
}

fn start_order(task: &Task) -> (bool, Option<DateTime<Utc>>, DateTime<Utc>) {
    (task.start_time.is_none(), task.start_time, task.created_at)
}

#[async_trait]
impl TaskLedger for InMemoryLedger {
    async fn list_open_tasks(&self, user_id: &str) -> Result<Vec<Task>, LedgerError> {
        let mut open: Vec<Task> = self
            .lock()
            .tasks
            .iter()
            .filter(|task| task.user_id == user_id && task.status == TaskStatus::Todo)
            .cloned()
            .collect();
        open.sort_by_key(start_order);
        Ok(open)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, LedgerError> {
        Ok(self.lock().tasks.iter().find(|task| task.id == id).cloned())
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, LedgerError> {
        if task.title.trim().is_empty() {
            return Err(LedgerError::InvalidUpdate {
                id: String::new(),
                reason: "task title cannot be empty".into(),
            });
        }
        let created = Task {
            id: Uuid::new_v4().to_string(),
            user_id: task.user_id,
            title: task.title,
            status: TaskStatus::Todo,
            severity: task.severity,
            ack_state: AckState::Unacknowledged,
            start_time: task.start_time,
            duration_minutes: task.duration_minutes,
            recurrence: task.recurrence,
            created_via: task.created_via,
            last_surface_at: None,
            metadata: task.metadata,
            created_at: Utc::now(),
        };
        self.lock().tasks.push(created.clone());
        Ok(created)
    }

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, LedgerError> {
        self.apply(id, |task| task.status = status)
    }

    async fn update_task_fields(&self, id: &str, update: TaskUpdate) -> Result<Task, LedgerError> {
        self.apply(id, |task| {
            if update.clear_start_time {
                task.start_time = None;
            } else if let Some(start) = update.start_time {
                task.start_time = Some(start);
            }
            if let Some(status) = update.status {
                task.status = status;
            }
            if let Some(ack) = update.ack_state {
                task.ack_state = ack;
            }
            if let Some(at) = update.last_surface_at {
                task.last_surface_at = Some(at);
            }
        })
    }

    async fn list_tasks_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, LedgerError> {
        let mut tasks: Vec<Task> = self
            .lock()
            .tasks
            .iter()
            .filter(|task| {
                task.user_id == user_id
                    && task.status != TaskStatus::Archived
                    && task
                        .start_time
                        .is_some_and(|at| at >= start && at < end)
            })
            .cloned()
            .collect();
        tasks.sort_by_key(start_order);
        Ok(tasks)
    }

    async fn load_rule_state(&self, user_id: &str) -> Result<Option<RuleState>, LedgerError> {
        Ok(self.lock().rule_states.get(user_id).cloned())
    }

    async fn store_rule_state(&self, state: RuleState) -> Result<(), LedgerError> {
        let mut inner = self.lock();
        inner.rule_state_writes += 1;
        inner.rule_states.insert(state.user_id.clone(), state);
        Ok(())
    }

    async fn record_rule_events(&self, events: Vec<RuleEvent>) -> Result<(), LedgerError> {
        self.lock().rule_events.extend(events);
        Ok(())
    }
}
