use crate::error::ConfigError;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where this config was loaded from. Never written back.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// IANA timezone used when a user has none on file
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default)]
    pub dialogue: DialogueConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub guardrail: GuardrailConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_timezone() -> String {
    "UTC".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            default_timezone: default_timezone(),
            dialogue: DialogueConfig::default(),
            matcher: MatcherConfig::default(),
            guardrail: GuardrailConfig::default(),
            fallback: FallbackConfig::default(),
            provider: ProviderConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

// ── Dialogue ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Turns kept per user; oldest evicted first
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// A pending action older than this is treated as absent
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// Users idle longer than this lose their turns and pending action
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// Store size that triggers an idle sweep on write
    #[serde(default = "default_sweep_threshold")]
    pub sweep_threshold: usize,
    /// Let a fresh, fully specified command abandon a pending action
    #[serde(default = "default_true")]
    pub bypass_enabled: bool,
    /// Route otherwise-unknown text mentioning "plan" to the plan overview
    #[serde(default = "default_true")]
    pub allow_plan_fallback: bool,
}

fn default_max_turns() -> usize {
    5
}

fn default_pending_ttl_secs() -> u64 {
    30 * 60
}

fn default_idle_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_sweep_threshold() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            pending_ttl_secs: default_pending_ttl_secs(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_threshold: default_sweep_threshold(),
            bypass_enabled: true,
            allow_plan_fallback: true,
        }
    }
}

// ── Matcher ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    /// Scores this close to the best are reported as ties
    #[serde(default = "default_tie_tolerance")]
    pub tie_tolerance: f64,
    #[serde(default = "default_max_options")]
    pub max_options: usize,
}

fn default_min_similarity() -> f64 {
    0.35
}

fn default_tie_tolerance() -> f64 {
    0.05
}

fn default_max_options() -> usize {
    5
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            tie_tolerance: default_tie_tolerance(),
            max_options: default_max_options(),
        }
    }
}

// ── Guardrail ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Title keywords that make a new task high priority
    #[serde(default = "default_high_priority_keywords")]
    pub high_priority_keywords: Vec<String>,
}

fn default_high_priority_keywords() -> Vec<String> {
    ["p1", "deep work", "priority 1", "critical focus"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_priority_keywords: default_high_priority_keywords(),
        }
    }
}

// ── Model fallback ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_fallback_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides `provider.model` for classification calls
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f64,
}

fn default_fallback_timeout_ms() -> u64 {
    2_500
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: default_fallback_timeout_ms(),
            model: None,
            temperature: 0.0,
        }
    }
}

// ── Provider ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL; no provider when unset
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_reply_temperature")]
    pub temperature: f64,
    /// Let the provider phrase replies instead of the built-in templates
    #[serde(default)]
    pub compose_replies: bool,
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_reply_temperature() -> f64 {
    0.4
}

fn default_reply_timeout_ms() -> u64 {
    4_000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: default_model(),
            temperature: default_reply_temperature(),
            compose_replies: false,
            reply_timeout_ms: default_reply_timeout_ms(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "none" | "log"
    pub backend: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: "none".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(".tenax"))
    }

    /// Load `config.toml` from `dir`, writing defaults when it is missing.
    pub fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.toml");

        if !dir.exists() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("TENAX_API_KEY") {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }

        if let Ok(url) = std::env::var("TENAX_PROVIDER_URL") {
            if !url.is_empty() {
                self.provider.base_url = Some(url);
            }
        }

        if let Ok(model) = std::env::var("TENAX_MODEL") {
            if !model.is_empty() {
                self.provider.model = model;
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.default_timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::Validation(format!(
                "default_timezone '{}' is not an IANA timezone",
                self.default_timezone
            )));
        }
        if !(0.0..=1.0).contains(&self.matcher.min_similarity) {
            return Err(ConfigError::Validation(
                "matcher.min_similarity must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=0.5).contains(&self.matcher.tie_tolerance) {
            return Err(ConfigError::Validation(
                "matcher.tie_tolerance must be within [0, 0.5]".into(),
            ));
        }
        if self.matcher.max_options == 0 {
            return Err(ConfigError::Validation(
                "matcher.max_options must be at least 1".into(),
            ));
        }
        if self.dialogue.max_turns == 0 {
            return Err(ConfigError::Validation(
                "dialogue.max_turns must be at least 1".into(),
            ));
        }
        if self.fallback.enabled && self.fallback.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "fallback.timeout_ms must be positive when the fallback is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Tz {
        crate::dialogue::time::parse_timezone(&self.default_timezone)
    }
}
