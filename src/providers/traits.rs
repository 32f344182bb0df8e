use async_trait::async_trait;

/// A text-generation backend. Used to phrase replies and, when enabled, to
/// classify text the heuristics could not.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String>;

    /// Provider label for logs and errors.
    fn name(&self) -> &str;
}
