pub mod schema;

pub use schema::{
    Config, DialogueConfig, FallbackConfig, GuardrailConfig, MatcherConfig, ObservabilityConfig,
    ProviderConfig,
};
