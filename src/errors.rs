// User-friendly error messages
//
// Turns configuration and setup failures into messages that tell the
// operator what to check next.

use anyhow::{Context, Result};

/// Wrap an error with user-friendly context
pub trait UserFriendlyError {
    /// Add user-friendly context to this error
    fn user_context(self, message: &str) -> Self;

    /// Add user-friendly context with a suggestion
    fn user_context_with_suggestion(self, problem: &str, suggestion: &str) -> Self;
}

impl<T> UserFriendlyError for Result<T> {
    fn user_context(self, message: &str) -> Self {
        self.with_context(|| message.to_string())
    }

    fn user_context_with_suggestion(self, problem: &str, suggestion: &str) -> Self {
        self.with_context(|| format!("{}\n\n\x1b[1;33mSuggestion:\x1b[0m {}", problem, suggestion))
    }
}

/// Keyword file could not be loaded
pub fn keywords_file_error(path: &str) -> String {
    format!(
        "Could not load crisis keywords from {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • File does not exist or is not readable\n\
        • File is not JSON of the form {{\"general\": [...], \"domain\": [...]}}\n\
        • A phrase is empty or listed in both lists\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Remove detection.keywords_path from ~/.crisis-guard/config.toml\n\
           to use the built-in lists",
        path
    )
}

/// Alert endpoint could not be set up
pub fn alert_endpoint_error(url: &str) -> String {
    format!(
        "Could not configure the crisis alert endpoint {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check alert.endpoint in ~/.crisis-guard/config.toml\n\
        2. Or override it:\n\
           \x1b[36mexport CRISIS_GUARD_ALERT_URL=\"https://.../crisis-alert\"\x1b[0m",
        url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_suggestion_is_attached() {
        let result: Result<()> = Err(anyhow!("io failure"));
        let err = result
            .user_context_with_suggestion("State dir unusable", "Set CRISIS_GUARD_STATE_DIR")
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("State dir unusable"));
        assert!(message.contains("CRISIS_GUARD_STATE_DIR"));
        assert!(message.contains("io failure"));
    }

    #[test]
    fn test_keywords_message_names_path() {
        assert!(keywords_file_error("/etc/kw.json").contains("/etc/kw.json"));
    }
}
