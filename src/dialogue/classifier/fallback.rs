use super::rules::ClassifyOptions;
use super::IntentStrategy;
use crate::config::FallbackConfig;
use crate::dialogue::intent::{Intent, IntentKind, IntentSource, Slots};
use crate::error::FallbackError;
use crate::observability::{DialogueEvent, Observer};
use crate::providers::{Provider, sanitize_api_error};
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::{debug, warn};

/// Asks a model to label text the heuristics could not. Any failure
/// degrades to "no opinion" so the chain falls through to `unknown`.
pub struct ModelFallback {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    timeout: Duration,
    observer: Arc<dyn Observer>,
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    slots: ModelSlots,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelSlots {
    #[serde(alias = "taskName", alias = "task_name")]
    task_name: Option<String>,
    minutes: Option<u32>,
}

impl ModelFallback {
    pub fn new(
        provider: Arc<dyn Provider>,
        config: &FallbackConfig,
        default_model: &str,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            provider,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            temperature: config.temperature,
            timeout: Duration::from_millis(config.timeout_ms),
            observer,
        }
    }

    fn system_prompt() -> String {
        let kinds: Vec<&str> = IntentKind::iter()
            .filter(|kind| kind.model_inferable())
            .map(IntentKind::as_str)
            .collect();
        format!(
            "You label messages sent to a task accountability assistant.\n\
             Reply with JSON only: {{\"intent\": \"<kind>\", \"confidence\": <0..1>, \
             \"slots\": {{\"taskName\": \"<task or null>\", \"minutes\": <number or null>}}}}.\n\
             Allowed kinds: {}.\nUse \"unknown\" when unsure.",
            kinds.join(", ")
        )
    }

    async fn infer(&self, text: &str) -> Result<Intent, FallbackError> {
        let system = Self::system_prompt();
        let call = self
            .provider
            .chat_with_system(Some(&system), text, &self.model, self.temperature);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                return Err(FallbackError::Timeout(
                    u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                ));
            }
            Ok(Err(err)) => {
                return Err(FallbackError::Provider(sanitize_api_error(&err.to_string())));
            }
            Ok(Ok(raw)) => raw,
        };
        parse_model_output(&raw)
    }
}

/// Parse `{"intent", "confidence", "slots"}`, tolerating prose or code fences
/// around the object.
pub fn parse_model_output(raw: &str) -> Result<Intent, FallbackError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(FallbackError::Malformed("no JSON object".into()));
    };
    if end < start {
        return Err(FallbackError::Malformed("no JSON object".into()));
    }
    let output: ModelOutput = serde_json::from_str(&raw[start..=end])
        .map_err(|err| FallbackError::Malformed(err.to_string()))?;

    let label = output.intent.trim().to_lowercase();
    let kind = IntentKind::from_str(&label)
        .ok()
        .filter(|kind| kind.model_inferable())
        .ok_or(FallbackError::OutOfEnumeration(label))?;

    let slots = Slots {
        minutes: output.slots.minutes,
        ..Slots::default()
    }
    .with_task_name(
        output
            .slots
            .task_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty() && name != "null"),
    );

    Ok(Intent::new(kind, output.confidence.unwrap_or(0.5))
        .with_slots(slots)
        .with_source(IntentSource::Model)
        .with_rule("model_fallback"))
}

#[async_trait]
impl IntentStrategy for ModelFallback {
    fn name(&self) -> &str {
        "model_fallback"
    }

    async fn classify(&self, text: &str, _opts: &ClassifyOptions) -> Option<Intent> {
        if text.trim().is_empty() {
            return None;
        }
        match self.infer(text).await {
            Ok(intent) if intent.is_unknown() => {
                debug!("model fallback had no opinion");
                None
            }
            Ok(intent) => Some(intent),
            Err(err) => {
                warn!(error = %err, "model fallback failed");
                self.observer.record_event(&DialogueEvent::FallbackFailed {
                    reason: err.reason(),
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::time::{TimeContext, parse_timezone};
    use crate::observability::NoopObserver;
    use chrono::Utc;

    struct CannedProvider {
        reply: Result<String, String>,
        delay: Duration,
    }

    #[async_trait]
    impl Provider for CannedProvider {
        async fn chat_with_system(
            &self,
            _system_prompt: Option<&str>,
            _message: &str,
            _model: &str,
            _temperature: f64,
        ) -> anyhow::Result<String> {
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn fallback(reply: Result<&str, &str>, delay_ms: u64) -> ModelFallback {
        let provider = Arc::new(CannedProvider {
            reply: reply.map(str::to_string).map_err(str::to_string),
            delay: Duration::from_millis(delay_ms),
        });
        let config = FallbackConfig {
            enabled: true,
            timeout_ms: 100,
            ..FallbackConfig::default()
        };
        ModelFallback::new(provider, &config, "test-model", Arc::new(NoopObserver))
    }

    fn opts() -> ClassifyOptions {
        ClassifyOptions::new(TimeContext::new(parse_timezone("UTC"), Utc::now()))
    }

    #[test]
    fn parses_fenced_output() {
        let raw = "```json\n{\"intent\": \"mark_complete\", \"confidence\": 0.8, \"slots\": {\"taskName\": \"gym\"}}\n```";
        let intent = parse_model_output(raw).unwrap();
        assert_eq!(intent.kind, IntentKind::MarkComplete);
        assert_eq!(intent.slots.task_name(), "gym");
        assert_eq!(intent.metadata.source, IntentSource::Model);
    }

    #[test]
    fn rejects_out_of_enumeration_and_confirmation_kinds() {
        let err = parse_model_output("{\"intent\": \"launch_rocket\"}").unwrap_err();
        assert_eq!(err.reason(), "out_of_enumeration");
        let err = parse_model_output("{\"intent\": \"import_timetable_confirm\"}").unwrap_err();
        assert_eq!(err.reason(), "out_of_enumeration");
    }

    #[test]
    fn rejects_prose() {
        let err = parse_model_output("I think they want to add a task").unwrap_err();
        assert_eq!(err.reason(), "malformed");
    }

    #[test]
    fn clamps_confidence() {
        let intent = parse_model_output("{\"intent\": \"help\", \"confidence\": 7}").unwrap();
        assert!(intent.confidence <= 1.0);
    }

    #[tokio::test]
    async fn strategy_returns_model_intent() {
        let strategy = fallback(
            Ok("{\"intent\": \"reminder_snooze\", \"slots\": {\"minutes\": 15}}"),
            0,
        );
        let intent = strategy.classify("give me a sec", &opts()).await.unwrap();
        assert_eq!(intent.kind, IntentKind::ReminderSnooze);
        assert_eq!(intent.slots.minutes, Some(15));
    }

    #[tokio::test]
    async fn unknown_and_errors_yield_none() {
        assert!(
            fallback(Ok("{\"intent\": \"unknown\"}"), 0)
                .classify("hmm", &opts())
                .await
                .is_none()
        );
        assert!(
            fallback(Err("502 bad gateway"), 0)
                .classify("hmm", &opts())
                .await
                .is_none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let strategy = fallback(Ok("{\"intent\": \"help\"}"), 5_000);
        let err = strategy.infer("hmm").await.unwrap_err();
        assert!(matches!(err, FallbackError::Timeout(100)));
    }
}
