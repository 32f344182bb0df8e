use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tenax::Config;
use tenax::dialogue::classifier::{Classifier, ClassifyOptions};
use tenax::dialogue::time::{TimeContext, parse_timezone};
use tenax::ledger::InMemoryLedger;
use tenax::observability::{Observer, create_observer};
use tenax::providers::create_provider;
use tenax::{Router, UserProfile};
use tracing::info;

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let observer: Arc<dyn Observer> = Arc::from(create_observer(&config.observability));
    let provider = create_provider(&config.provider);

    match cli.command {
        Commands::Chat { user, timezone } => {
            info!(
                user = %user,
                model_fallback = config.fallback.enabled && provider.is_some(),
                "starting console chat"
            );
            let router = Router::new(&config, Arc::new(InMemoryLedger::new()), provider, observer);
            let mut profile = UserProfile::new(user);
            if let Some(timezone) = timezone {
                profile = profile.with_timezone(timezone);
            }
            crate::app::console::run(&router, &profile).await
        }
        Commands::Classify { text, timezone } => {
            let timezone = timezone
                .as_deref()
                .map_or_else(|| config.timezone(), parse_timezone);
            let classifier = Classifier::from_config(&config, provider.as_ref(), observer);
            let opts = ClassifyOptions {
                time: TimeContext::new(timezone, Utc::now()),
                allow_plan_fallback: config.dialogue.allow_plan_fallback,
            };
            let intent = classifier.classify(&text, &opts).await;
            let json = serde_json::to_string_pretty(&intent).context("Failed to encode intent")?;
            println!("{json}");
            Ok(())
        }
    }
}
