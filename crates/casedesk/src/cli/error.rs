//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

use casedesk_api::ApiError;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// No base URL from flag, environment or config file
    pub fn missing_base_url(config_path: &Path) -> Self {
        Self::new("No case service configured")
            .with_context("casedesk needs the base URL of the case service API")
            .with_suggestions([
                "TRY: Pass it directly: casedesk --base-url https://cases.example.com/api".to_string(),
                "TRY: Set CASEDESK_BASE_URL in your environment".to_string(),
                format!(
                    "TRY: Add base_url under [api] in {}",
                    config_path.display()
                ),
            ])
    }

    /// The service rejected our request and we sent no token
    pub fn missing_token(config_path: &Path) -> Self {
        Self::new("The case service requires authentication")
            .with_context("No API token was provided")
            .with_suggestions([
                "TRY: Set CASEDESK_TOKEN in your environment".to_string(),
                "TRY: Pass --token <TOKEN>".to_string(),
                format!("TRY: Add token under [api] in {}", config_path.display()),
            ])
    }

    /// The service rejected the token we sent
    pub fn unauthorized(base_url: &str, detail: &str) -> Self {
        Self::new("Not authorized by the case service")
            .with_context(format!("{} rejected the token: {}", base_url, detail))
            .with_suggestions([
                "TRY: Refresh your token and set CASEDESK_TOKEN again".to_string(),
                "TRY: Check that the token has access to these cases".to_string(),
            ])
    }

    /// Network failure or timeout talking to the service
    pub fn unreachable(base_url: &str, reason: &str) -> Self {
        Self::new(format!("Cannot reach the case service at {}", base_url))
            .with_context(reason.to_string())
            .with_suggestions([
                format!("TRY: Check the service is up: curl -sI {}", base_url),
                "TRY: Check your network connection or VPN".to_string(),
                "TRY: Raise [api] timeout_secs if the service is slow".to_string(),
            ])
    }

    /// Preset slot not present in the config file
    pub fn unknown_preset(slot: &str, config_path: &Path) -> Self {
        Self::new(format!("No filter preset in slot '{}'", slot))
            .with_context(format!("Presets are read from {}", config_path.display()))
            .with_suggestions([
                "TRY: List configured presets: casedesk config".to_string(),
                format!("TRY: Add a [presets.{}] section to the config file", slot),
            ])
    }

    /// Map a service error to something actionable.
    pub fn from_api(err: &ApiError, base_url: &str, has_token: bool, config_path: &Path) -> Self {
        match err {
            ApiError::Unauthorized(_) if !has_token => Self::missing_token(config_path),
            ApiError::Unauthorized(detail) => Self::unauthorized(base_url, detail),
            ApiError::Transport(_) | ApiError::Timeout { .. } => {
                Self::unreachable(base_url, &err.to_string())
            }
            other => Self::new(other.to_string())
                .with_context(format!("Request to {} failed", base_url)),
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While listing cases")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While listing cases"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_unauthorized_without_token_asks_for_one() {
        let path = PathBuf::from("/home/me/.casedesk/config.toml");
        let err = HelpfulError::from_api(
            &ApiError::Unauthorized("401".into()),
            "https://cases.example.com",
            false,
            &path,
        );
        let display = err.to_string();
        assert!(display.contains("requires authentication"));
        assert!(display.contains("CASEDESK_TOKEN"));
    }

    #[test]
    fn test_unauthorized_with_token_mentions_refresh() {
        let err = HelpfulError::from_api(
            &ApiError::Unauthorized("token expired".into()),
            "https://cases.example.com",
            true,
            Path::new("config.toml"),
        );
        assert!(err.to_string().contains("token expired"));
        assert!(err.to_string().contains("Refresh your token"));
    }

    #[test]
    fn test_transport_maps_to_unreachable() {
        let err = HelpfulError::from_api(
            &ApiError::Transport("connection refused".into()),
            "https://cases.example.com",
            true,
            Path::new("config.toml"),
        );
        let display = err.to_string();
        assert!(display.contains("Cannot reach"));
        assert!(display.contains("TRY:"));
    }
}
