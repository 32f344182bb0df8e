//! Task ledger contract.
//!
//! The ledger owns users' tasks and the persisted guardrail aggregate. The
//! dialogue core only reads candidates from it and issues commands; it never
//! caches tasks across turns.

pub mod memory;

pub use memory::InMemoryLedger;

use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    Done,
    Archived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    P1,
    #[default]
    P2,
}

/// Acknowledgement state of a high-priority task, in lifecycle order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AckState {
    #[default]
    Unacknowledged,
    AckRequested,
    AckReceived,
    Cleared,
}

impl AckState {
    /// States that no longer hold the guardrail open.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::AckReceived | Self::Cleared)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Weekdays,
    Weekend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub severity: Severity,
    pub ack_state: AckState,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub recurrence: Option<Recurrence>,
    pub created_via: String,
    pub last_surface_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_high_priority(&self) -> bool {
        self.severity == Severity::P1
    }
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    pub severity: Severity,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub recurrence: Option<Recurrence>,
    pub created_via: String,
    pub metadata: serde_json::Value,
}

/// Partial field update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub start_time: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    pub ack_state: Option<AckState>,
    pub last_surface_at: Option<DateTime<Utc>>,
    /// Unset `start_time`. Takes precedence over `start_time`.
    pub clear_start_time: bool,
}

/// Persisted guardrail aggregate. Rebuilt from tasks on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleState {
    pub user_id: String,
    pub active_p1_task_ids: Vec<String>,
    pub pending_ack_count: usize,
    pub blocked_action_count: u64,
    pub last_surface_at: Option<DateTime<Utc>>,
    pub state_hash: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleAction {
    Surfaced,
    BlockedAction,
    ReceivedAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SurfaceKind {
    MorningSummary,
    StatusReply,
    PlanOverview,
    InboundGuard,
}

/// Audit record for the guardrail. Append-only on the ledger side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvent {
    pub user_id: String,
    pub task_id: Option<String>,
    pub action: RuleAction,
    pub surface: SurfaceKind,
    pub channel: String,
    pub outcome: String,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Async ledger contract consumed by the dialogue core.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Open (`todo`) tasks for a user, earliest start first, unscheduled last.
    async fn list_open_tasks(&self, user_id: &str) -> Result<Vec<Task>, LedgerError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, LedgerError>;

    async fn create_task(&self, task: NewTask) -> Result<Task, LedgerError>;

    async fn update_task_status(&self, id: &str, status: TaskStatus) -> Result<Task, LedgerError>;

    async fn update_task_fields(&self, id: &str, update: TaskUpdate) -> Result<Task, LedgerError>;

    /// Tasks of any status whose start falls in `[start, end)`.
    async fn list_tasks_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, LedgerError>;

    async fn load_rule_state(&self, user_id: &str) -> Result<Option<RuleState>, LedgerError>;

    async fn store_rule_state(&self, state: RuleState) -> Result<(), LedgerError>;

    async fn record_rule_events(&self, events: Vec<RuleEvent>) -> Result<(), LedgerError>;

    /// Open high-priority tasks; these drive the guardrail.
    async fn list_active_p1_tasks(&self, user_id: &str) -> Result<Vec<Task>, LedgerError> {
        let tasks = self.list_open_tasks(user_id).await?;
        Ok(tasks
            .into_iter()
            .filter(Task::is_high_priority)
            .collect())
    }
}
