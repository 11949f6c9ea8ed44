//! casedesk configuration.
//!
//! A single TOML file, `<home>/config.toml`. Every key is optional; a missing
//! file means built-in defaults. Command-line flags and environment
//! variables are layered on top by the binary.
//!
//! ```toml
//! [api]
//! base_url = "https://cases.example.com/api"
//! timeout_secs = 30
//!
//! [ui]
//! page_size = 100
//! debounce_ms = 500
//!
//! [export]
//! output_dir = "./exports"
//! concurrency = 4
//!
//! [presets.1]
//! statuses = ["open"]
//! severities = ["1 (Urgent)"]
//!
//! [statuses]
//! open = ["New", "Waiting on Red Hat", "Waiting on Customer"]
//! ```

use casedesk_api::{CaseFilter, StatusAliases, INTERACTIVE_TIMEOUT};
use casedesk_export::{ExportFormat, DEFAULT_ATTACHMENTS_DIR, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use casedesk_logging::casedesk_home;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// `<home>/config.toml`
pub fn default_config_path() -> PathBuf {
    casedesk_home().join(CONFIG_FILE)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub ui: UiConfig,
    pub export: ExportConfig,
    pub defaults: DefaultsConfig,
    /// Saved filters keyed by slot (`"1"`..`"9"`, `"0"`).
    pub presets: BTreeMap<String, CaseFilter>,
    pub statuses: StatusAliases,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    /// Deadline for interactive fetches.
    pub timeout_secs: u64,
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: INTERACTIVE_TIMEOUT.as_secs(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub page_size: usize,
    pub debounce_ms: u64,
    pub tick_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            debounce_ms: 500,
            tick_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub attachments_dir: String,
    pub format: ExportFormat,
    /// Custom markdown template file.
    pub template: Option<PathBuf>,
    pub progress_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./exports"),
            concurrency: DEFAULT_CONCURRENCY,
            attachments_dir: DEFAULT_ATTACHMENTS_DIR.to_string(),
            format: ExportFormat::default(),
            template: None,
            progress_capacity: 64,
        }
    }
}

/// Constraints applied to every filter unless the filter sets its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub account: Option<String>,
    pub group: Option<String>,
}

impl Config {
    /// Load `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&raw, path)
    }

    /// Parse TOML text; `path` is only used in error messages.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        for slot in self.presets.keys() {
            if !is_preset_slot(slot) {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: format!("preset '{}' must be named 0-9", slot),
                });
            }
        }
        if self.export.attachments_dir.trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                message: "export.attachments_dir must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn interactive_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.ui.debounce_ms)
    }

    pub fn tick_rate(&self) -> Duration {
        Duration::from_millis(self.ui.tick_ms.max(10))
    }

    pub fn page_size(&self) -> usize {
        self.ui.page_size.max(1)
    }

    /// The filter used when nothing else is selected: configured defaults only.
    pub fn base_filter(&self) -> CaseFilter {
        self.resolve(CaseFilter::default())
    }

    /// The preset in `slot`, resolved. `None` when the slot is unset.
    pub fn preset(&self, slot: &str) -> Option<CaseFilter> {
        self.presets
            .get(slot.trim())
            .cloned()
            .map(|filter| self.resolve(filter))
    }

    /// Fill defaults and expand status aliases.
    pub fn resolve(&self, mut filter: CaseFilter) -> CaseFilter {
        if filter.accounts.is_empty() {
            if let Some(account) = non_empty(&self.defaults.account) {
                filter.accounts.push(account);
            }
        }
        if filter.group.is_none() {
            filter.group = non_empty(&self.defaults.group);
        }
        filter.statuses = self.statuses.expand(&filter.statuses);
        filter
    }
}

fn is_preset_slot(slot: &str) -> bool {
    slot.len() == 1 && slot.chars().all(|ch| ch.is_ascii_digit())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Config, ConfigError> {
        Config::parse(raw, Path::new("config.toml"))
    }

    #[test]
    fn test_missing_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.interactive_timeout(), Duration::from_secs(30));
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.export.concurrency, 4);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[ui\npage_size = ").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = parse(
            r#"
            [api]
            base_url = "https://cases.example.com"

            [export]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("https://cases.example.com"));
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.export.format, ExportFormat::Json);
        assert_eq!(config.export.attachments_dir, "attachments");
        assert_eq!(config.ui.page_size, 100);
    }

    #[test]
    fn test_preset_resolves_aliases_and_defaults() {
        let config = parse(
            r#"
            [defaults]
            account = "540155"

            [presets.1]
            statuses = ["Open", "Closed"]
            keyword = "kernel"

            [statuses]
            OPEN = ["New", "Waiting on Customer"]
            "#,
        )
        .unwrap();

        let filter = config.preset("1").unwrap();
        assert_eq!(filter.statuses, vec!["New", "Waiting on Customer", "Closed"]);
        assert_eq!(filter.accounts, vec!["540155"]);
        assert_eq!(filter.keyword.as_deref(), Some("kernel"));
        assert!(config.preset("2").is_none());
    }

    #[test]
    fn test_explicit_account_wins_over_default() {
        let config = parse("[defaults]\naccount = \"1\"\ngroup = \" \"\n").unwrap();
        let filter = config.resolve(CaseFilter {
            accounts: vec!["2".into()],
            ..Default::default()
        });
        assert_eq!(filter.accounts, vec!["2"]);
        assert!(filter.group.is_none());
    }

    #[test]
    fn test_bad_preset_slot_rejected() {
        let err = parse("[presets.work]\nkeyword = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_zero_values_are_floored() {
        let config = parse("[ui]\npage_size = 0\ntick_ms = 0\n[api]\ntimeout_secs = 0\n").unwrap();
        assert_eq!(config.page_size(), 1);
        assert_eq!(config.tick_rate(), Duration::from_millis(10));
        assert_eq!(config.interactive_timeout(), Duration::from_secs(1));
    }
}
