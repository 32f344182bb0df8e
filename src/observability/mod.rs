pub mod log;
pub mod noop;
pub mod traits;

pub use self::log::LogObserver;
pub use noop::NoopObserver;
pub use traits::{DialogueEvent, Observer};

use crate::config::ObservabilityConfig;

/// Build the observer named by `observability.backend`. Unknown names get
/// the no-op observer.
pub fn create_observer(config: &ObservabilityConfig) -> Box<dyn Observer> {
    match config.backend.trim() {
        "log" => Box::new(LogObserver::new()),
        "" | "none" | "noop" => Box::new(NoopObserver),
        other => {
            tracing::warn!(backend = other, "unknown observability backend, events are dropped");
            Box::new(NoopObserver)
        }
    }
}
