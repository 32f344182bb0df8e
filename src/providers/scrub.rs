use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const MAX_ERROR_CHARS: usize = 200;

/// Common key prefixes, or a marker (bearer header, query parameter, JSON
/// field) followed by the secret itself.
static SECRET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?x)
        (?: \b(?:sk-|ghp_|hf_|glpat-|AIza)
          | (?i:authorization:\s*)?(?i:bearer)\s+
          | \b(?:api_key|access_token)=
          | "(?:api_key|access_token)"\s*:\s*"
        )
        [A-Za-z0-9_.:+/=-]+
        "#,
    )
    .unwrap()
});

/// Redact API keys and bearer tokens. Clean text is returned borrowed.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    SECRET.replace_all(input, "[REDACTED]")
}

/// Scrub and cap provider error text before it reaches logs or users.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    match scrubbed.char_indices().nth(MAX_ERROR_CHARS) {
        Some((cut, _)) => format!("{}...", &scrubbed[..cut]),
        None => scrubbed.into_owned(),
    }
}
