#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod config;
pub mod dialogue;
pub mod error;
pub mod ledger;
#[doc(hidden)]
pub mod observability;
pub mod providers;

pub use config::Config;
pub use dialogue::{InboundContext, Intent, IntentKind, MessageOutcome, Router, UserProfile};
pub use error::{Result, TenaxError};
pub use ledger::{InMemoryLedger, TaskLedger};
