//! The dialogue core: classify, clarify, guard, dispatch and phrase.

pub mod classifier;
pub mod guardrail;
pub mod handlers;
pub mod intent;
pub mod matcher;
pub mod pending;
pub mod reminders;
pub mod reply;
pub mod router;
pub mod text;
pub mod time;
pub mod timetable;
pub mod turns;

pub use classifier::{Classifier, ClassifyOptions, IntentStrategy, ModelFallback};
pub use guardrail::{Guardrail, GuardrailStatus};
pub use handlers::{ActionOutcome, Handled, HandlerContext, Handlers};
pub use intent::{Intent, IntentKind, IntentMetadata, IntentSource, Slots};
pub use matcher::{MatchResult, match_task};
pub use pending::{BypassPolicy, PendingAction, PendingKind, Resolution};
pub use reminders::ReminderPreferences;
pub use reply::ReplyComposer;
pub use router::{InboundContext, MessageOutcome, Router, UserProfile};
pub use time::{TimeContext, extract_time, parse_date_reference};
pub use turns::{ConversationStore, PendingSlot, PendingTransition, Turn, TurnRole};
