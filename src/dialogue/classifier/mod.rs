//! Intent classification as an ordered chain of strategies. The first
//! strategy with an opinion wins; text nobody recognizes is `unknown`.

pub mod fallback;
pub mod rules;

pub use fallback::{ModelFallback, parse_model_output};
pub use rules::{ClassifyOptions, classify, classify_rules, clean_title, plan_fallback};

use crate::config::Config;
use crate::dialogue::intent::Intent;
use crate::observability::Observer;
use crate::providers::Provider;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait IntentStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `None` passes the text to the next strategy.
    async fn classify(&self, text: &str, opts: &ClassifyOptions) -> Option<Intent>;
}

/// The ordered phrase and pattern rules.
pub struct HeuristicRules;

#[async_trait]
impl IntentStrategy for HeuristicRules {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(&self, text: &str, opts: &ClassifyOptions) -> Option<Intent> {
        classify_rules(text, opts)
    }
}

/// Plan overview for otherwise unrecognized text that mentions a plan.
pub struct PlanMention;

#[async_trait]
impl IntentStrategy for PlanMention {
    fn name(&self) -> &str {
        "plan_fallback"
    }

    async fn classify(&self, text: &str, opts: &ClassifyOptions) -> Option<Intent> {
        plan_fallback(text, opts)
    }
}

pub struct Classifier {
    strategies: Vec<Arc<dyn IntentStrategy>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Heuristics only.
    pub fn new() -> Self {
        Self {
            strategies: vec![Arc::new(HeuristicRules), Arc::new(PlanMention)],
        }
    }

    /// Heuristics, plus the model fallback when it is enabled and a
    /// provider exists.
    pub fn from_config(
        config: &Config,
        provider: Option<&Arc<dyn Provider>>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let classifier = Self::new();
        match provider {
            Some(provider) if config.fallback.enabled => {
                classifier.with_strategy(Arc::new(ModelFallback::new(
                    provider.clone(),
                    &config.fallback,
                    &config.provider.model,
                    observer,
                )))
            }
            _ => classifier,
        }
    }

    /// Append a strategy that runs after every existing one.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn IntentStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn classify(&self, text: &str, opts: &ClassifyOptions) -> Intent {
        for strategy in &self.strategies {
            if let Some(intent) = strategy.classify(text, opts).await {
                return intent;
            }
        }
        Intent::unknown(text)
    }
}
