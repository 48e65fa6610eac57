use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{DEFAULT_API_URL_TEMPLATE, DEFAULT_TIMEOUT_MS};
use crate::history::HistorySettings;

pub const DEFAULT_USER_AGENT: &str = "wikirewind/0.1 (+https://www.mediawiki.org/wiki/API:Etiquette)";
pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_LIMIT: usize = 1;
pub const DEFAULT_CONFIG_PATH: &str = ".wikirewind/config.toml";
pub const ACCESS_TOKEN_ENV: &str = "WIKIPEDIA_ACCESS_TOKEN";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct RewindConfig {
    #[serde(default)]
    pub wikipedia: WikipediaSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikipediaSection {
    pub lang: Option<String>,
    pub limit: Option<usize>,
    pub strip_markup: Option<bool>,
    pub api_url_template: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl RewindConfig {
    /// A config with every key spelled out at its default value.
    pub fn with_defaults() -> Self {
        Self {
            wikipedia: WikipediaSection {
                lang: Some(DEFAULT_LANG.to_string()),
                limit: Some(DEFAULT_LIMIT),
                strip_markup: Some(true),
                api_url_template: Some(DEFAULT_API_URL_TEMPLATE.to_string()),
                user_agent: Some(DEFAULT_USER_AGENT.to_string()),
                timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            },
        }
    }

    /// Resolve language: env WIKIREWIND_LANG > config > DEFAULT_LANG.
    pub fn lang(&self) -> String {
        env_string("WIKIREWIND_LANG")
            .or_else(|| self.wikipedia.lang.clone())
            .unwrap_or_else(|| DEFAULT_LANG.to_string())
    }

    /// Resolve result limit: env WIKIREWIND_LIMIT > config > DEFAULT_LIMIT. Zero is ignored.
    pub fn limit(&self) -> usize {
        resolve_limit(env_string("WIKIREWIND_LIMIT"), self.wikipedia.limit)
    }

    pub fn strip_markup(&self) -> bool {
        self.wikipedia.strip_markup.unwrap_or(true)
    }

    /// Resolve API URL template: env WIKIREWIND_API_URL_TEMPLATE > config > default.
    pub fn api_url_template(&self) -> String {
        env_string("WIKIREWIND_API_URL_TEMPLATE")
            .or_else(|| self.wikipedia.api_url_template.clone())
            .unwrap_or_else(|| DEFAULT_API_URL_TEMPLATE.to_string())
    }

    /// Resolve user agent: env WIKIREWIND_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_string("WIKIREWIND_USER_AGENT")
            .or_else(|| self.wikipedia.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_string("WIKIREWIND_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.wikipedia.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// The bearer token is never stored in the config file.
    pub fn access_token(&self) -> Option<String> {
        env_string(ACCESS_TOKEN_ENV)
    }

    pub fn settings(&self) -> HistorySettings {
        HistorySettings {
            lang: self.lang(),
            limit: self.limit(),
            strip_markup: self.strip_markup(),
            api_url_template: self.api_url_template(),
            user_agent: self.user_agent(),
            timeout_ms: self.timeout_ms(),
            access_token: self.access_token(),
        }
    }
}

/// Load and parse a RewindConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<RewindConfig> {
    if !config_path.exists() {
        return Ok(RewindConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: RewindConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Write a config file with every default spelled out.
/// Returns `true` when a write occurred.
pub fn write_default_config(config_path: &Path, force: bool) -> Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rendered = toml::to_string_pretty(&RewindConfig::with_defaults())
        .context("failed to serialize config TOML")?;
    fs::write(config_path, rendered)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    Ok(true)
}

/// Zero and unparsable values at one layer fall through to the next.
fn resolve_limit(env_value: Option<String>, configured: Option<usize>) -> usize {
    env_value
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .or(configured.filter(|limit| *limit > 0))
        .unwrap_or(DEFAULT_LIMIT)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
