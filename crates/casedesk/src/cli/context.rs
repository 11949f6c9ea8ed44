//! Shared command context: resolved configuration and the case service.
//!
//! Precedence for connection settings is flag, then environment variable
//! (both handled by clap), then `config.toml`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use casedesk::config::{default_config_path, Config};
use casedesk_api::{ApiError, CaseFilter, HttpCaseService};
use clap::Args;
use tracing::debug;

use crate::cli::error::HelpfulError;
use crate::cli::filter::FilterArgs;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection flags accepted by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Config file [default: ~/.casedesk/config.toml]
    #[arg(long, global = true, env = "CASEDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Case service base URL
    #[arg(long, global = true, env = "CASEDESK_BASE_URL")]
    pub base_url: Option<String>,

    /// API token sent as a bearer token
    #[arg(long, global = true, env = "CASEDESK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Where a connection setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    CommandLine,
    ConfigFile,
    Unset,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::CommandLine => "flag/env",
            Source::ConfigFile => "config file",
            Source::Unset => "not set",
        }
    }
}

pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub base_url: Option<String>,
    pub base_url_source: Source,
    token: Option<String>,
    pub token_source: Source,
}

impl AppContext {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let config_path = global.config.clone().unwrap_or_else(default_config_path);
        let config = Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        debug!(path = %config_path.display(), "Configuration loaded");

        let (base_url, base_url_source) = layered(&global.base_url, &config.api.base_url);
        let (token, token_source) = layered(&global.token, &config.api.token);

        Ok(Self {
            config,
            config_path,
            base_url,
            base_url_source,
            token,
            token_source,
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// The HTTP case service for the resolved base URL and token.
    pub fn service(&self) -> Result<Arc<HttpCaseService>> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| HelpfulError::missing_base_url(&self.config_path))?;
        let service = HttpCaseService::new(base_url, self.token.clone(), CONNECT_TIMEOUT)
            .map_err(|err| {
                HelpfulError::new(format!("Invalid case service URL: {}", base_url))
                    .with_context(err.to_string())
                    .with_suggestion("TRY: Use a full URL such as https://cases.example.com/api")
            })?;
        Ok(Arc::new(service))
    }

    /// Turn a service error into an actionable CLI error.
    pub fn explain(&self, err: ApiError) -> anyhow::Error {
        let base_url = self.base_url.as_deref().unwrap_or("(unset)");
        HelpfulError::from_api(&err, base_url, self.has_token(), &self.config_path).into()
    }

    /// Build a filter from an optional preset slot overlaid with flags,
    /// then apply configured defaults and status aliases.
    pub fn filter(&self, preset: Option<&str>, flags: &FilterArgs) -> Result<CaseFilter> {
        let base = match preset {
            Some(slot) => {
                let slot = slot.trim();
                self.config
                    .presets
                    .get(slot)
                    .cloned()
                    .ok_or_else(|| HelpfulError::unknown_preset(slot, &self.config_path))?
            }
            None => CaseFilter::default(),
        };
        Ok(self.config.resolve(flags.apply_to(base)))
    }
}

fn layered(flag: &Option<String>, file: &Option<String>) -> (Option<String>, Source) {
    let clean = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    if let Some(value) = clean(flag) {
        (Some(value), Source::CommandLine)
    } else if let Some(value) = clean(file) {
        (Some(value), Source::ConfigFile)
    } else {
        (None, Source::Unset)
    }
}
