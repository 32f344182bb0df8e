pub mod compatible;
pub mod scrub;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use scrub::{sanitize_api_error, scrub_secret_patterns};
pub use traits::Provider;

use crate::config::ProviderConfig;
use std::sync::Arc;

/// Build the configured provider, or `None` when no base URL is set.
pub fn create_provider(config: &ProviderConfig) -> Option<Arc<dyn Provider>> {
    let base_url = config.base_url.as_deref()?.trim();
    if base_url.is_empty() {
        return None;
    }
    Some(Arc::new(OpenAiCompatibleProvider::new(
        "compatible",
        base_url,
        config.api_key.as_deref(),
    )))
}
