mod file_config;

pub use file_config::{DemoConfig, DurableConfig, FileConfig, LlmConfig};

use crate::durable::RetryPolicy;
use crate::refund::DEFAULT_STAGE_DELAY_MS;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML
/// config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub max_turns: u32,
    pub provider: ProviderKind,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub user: String,
    pub item_id: String,
    pub stage_delay_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_turns: 10,
            provider: ProviderKind::Scripted,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_api_key: None,
            user: "Max".to_string(),
            item_id: "item_99".to_string(),
            stage_delay_ms: DEFAULT_STAGE_DELAY_MS,
        }
    }
}

/// Which LLM provider backs the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Offline scripted provider (the default demo mode).
    Scripted,
    /// OpenAI-compatible chat completions endpoint.
    Openai,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub max_turns: u32,

    pub llm: LlmSettings,
    pub durable: DurableSettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DurableSettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl DurableSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl Default for DurableSettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_backoff_ms: policy.initial_backoff_ms,
            max_backoff_ms: policy.max_backoff_ms,
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DemoSettings {
    pub user: String,
    pub item_id: String,
    pub stage_delay: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        // The database file itself may not exist yet, but its parent
        // directory must.
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let max_turns = file.max_turns.unwrap_or(cli.max_turns);
        if max_turns == 0 {
            bail!("max_turns must be at least 1");
        }

        let llm_file = file.llm.unwrap_or_default();
        let provider = match llm_file.provider.as_deref() {
            Some(s) => parse_provider(s)
                .ok_or_else(|| anyhow::anyhow!("Unknown LLM provider in config file: {}", s))?,
            None => cli.provider,
        };
        let llm = LlmSettings {
            provider,
            base_url: llm_file.base_url.unwrap_or_else(|| cli.llm_base_url.clone()),
            model: llm_file.model.unwrap_or_else(|| cli.llm_model.clone()),
            api_key: llm_file.api_key.or_else(|| cli.llm_api_key.clone()),
        };
        if llm.provider == ProviderKind::Openai && llm.api_key.is_none() {
            bail!("The openai provider requires an API key (--llm-api-key or [llm] api_key)");
        }

        let defaults = DurableSettings::default();
        let durable_file = file.durable.unwrap_or_default();
        let durable = DurableSettings {
            max_retries: durable_file.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_ms: durable_file
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: durable_file
                .max_backoff_ms
                .unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: durable_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };

        let demo_file = file.demo.unwrap_or_default();
        let demo = DemoSettings {
            user: demo_file.user.unwrap_or_else(|| cli.user.clone()),
            item_id: demo_file.item_id.unwrap_or_else(|| cli.item_id.clone()),
            stage_delay: Duration::from_millis(
                demo_file.stage_delay_ms.unwrap_or(cli.stage_delay_ms),
            ),
        };

        Ok(Self {
            db_path,
            max_turns,
            llm,
            durable,
            demo,
        })
    }
}

/// Parses a provider string using clap's ValueEnum trait.
fn parse_provider(s: &str) -> Option<ProviderKind> {
    ProviderKind::from_str(s, true).ok()
}
