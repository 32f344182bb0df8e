//! Per-user dialogue context: a short rolling window of turns and at most one
//! pending action.
//!
//! Callers must serialize messages per user. Distinct users never contend
//! beyond the map lock.

use crate::config::DialogueConfig;
use crate::dialogue::pending::{PendingAction, PendingKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use strum::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: &str, at: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.to_string(),
            metadata: serde_json::Value::Null,
            at,
        }
    }

    pub fn agent(text: &str, metadata: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            role: TurnRole::Agent,
            text: text.to_string(),
            metadata,
            at,
        }
    }
}

/// What a handled message does to the user's pending action.
#[derive(Debug, Clone)]
pub enum PendingTransition {
    Keep,
    /// The message answered it.
    Consume,
    /// A fresh command abandoned it.
    Discard,
    Replace(PendingAction),
}

/// Result of looking up a pending action.
#[derive(Debug, Clone)]
pub enum PendingSlot {
    Empty,
    Active(PendingAction),
    /// It outlived its TTL and was dropped by this lookup.
    Expired(PendingKind),
}

struct UserContext {
    turns: VecDeque<Turn>,
    pending: Option<PendingAction>,
    last_seen: DateTime<Utc>,
}

pub struct ConversationStore {
    users: Mutex<HashMap<String, UserContext>>,
    max_turns: usize,
    pending_ttl: Duration,
    idle_ttl: Duration,
    sweep_threshold: usize,
}

impl ConversationStore {
    pub fn new(config: &DialogueConfig) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            max_turns: config.max_turns.max(1),
            pending_ttl: seconds(config.pending_ttl_secs),
            idle_ttl: seconds(config.idle_ttl_secs),
            sweep_threshold: config.sweep_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserContext>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recent turns, oldest first.
    pub fn recent_turns(&self, user_id: &str) -> Vec<Turn> {
        self.lock()
            .get(user_id)
            .map(|ctx| ctx.turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The user's pending action, dropping it when it has expired.
    pub fn pending(&self, user_id: &str, now: DateTime<Utc>) -> PendingSlot {
        let mut users = self.lock();
        let Some(ctx) = users.get_mut(user_id) else {
            return PendingSlot::Empty;
        };
        match ctx.pending.take() {
            None => PendingSlot::Empty,
            Some(pending) if pending.is_expired(now, self.pending_ttl) => {
                debug!(user_id, kind = %pending.kind, "pending action expired");
                PendingSlot::Expired(pending.kind)
            }
            Some(pending) => {
                ctx.pending = Some(pending.clone());
                PendingSlot::Active(pending)
            }
        }
    }

    /// Record a handled message: append its turns and apply the pending
    /// transition in one step.
    pub fn commit(
        &self,
        user_id: &str,
        turns: Vec<Turn>,
        transition: PendingTransition,
        now: DateTime<Utc>,
    ) {
        let mut users = self.lock();
        if users.len() >= self.sweep_threshold && !users.contains_key(user_id) {
            let before = users.len();
            users.retain(|_, ctx| now - ctx.last_seen <= self.idle_ttl);
            debug!(evicted = before - users.len(), "swept idle conversations");
        }

        let ctx = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserContext {
                turns: VecDeque::with_capacity(self.max_turns),
                pending: None,
                last_seen: now,
            });
        ctx.last_seen = now;
        for turn in turns {
            if ctx.turns.len() == self.max_turns {
                ctx.turns.pop_front();
            }
            ctx.turns.push_back(turn);
        }
        match transition {
            PendingTransition::Keep => {}
            PendingTransition::Consume | PendingTransition::Discard => ctx.pending = None,
            PendingTransition::Replace(pending) => ctx.pending = Some(pending),
        }
    }

    /// Drop every user idle longer than the idle TTL. Returns how many went.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut users = self.lock();
        let before = users.len();
        users.retain(|_, ctx| now - ctx.last_seen <= self.idle_ttl);
        before - users.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
}
