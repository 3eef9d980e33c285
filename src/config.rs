//! Configuration loading and settings resolution.
//!
//! Settings come from CLI flags, then environment variables, then the JSON
//! config file, then built-in defaults. The first source that provides a
//! value wins.
use crate::cli::EditArgs;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_TARGET_FILE: &str = "originalCode.js";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const MODEL_ENV: &str = "CODEMEND_MODEL";
pub const BASE_URL_ENV: &str = "CODEMEND_BASE_URL";
pub const LM_COMMAND_ENV: &str = "CODEMEND_LM_COMMAND";

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Fixed instruction used instead of the interactive prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_log: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// How the chat request reaches the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSettings {
    Http {
        base_url: String,
        api_key: String,
        timeout: Option<Duration>,
    },
    Command {
        command: String,
    },
}

impl BackendSettings {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Command { .. } => "command",
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub file: PathBuf,
    pub instructions: Option<String>,
    pub model: String,
    pub backend: BackendSettings,
    pub transcript: Option<PathBuf>,
    pub run_log: Option<PathBuf>,
    pub dry_run: bool,
}

/// Default config location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("codemend").join("config.json"))
}

/// Load a config file from `path`.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: FileConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the explicit config, or the default one when it exists.
///
/// An explicit path must exist; a missing default file means "no config".
pub fn load_config_for(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "using default config");
            load_config(&path)
        }
        _ => Ok(FileConfig::default()),
    }
}

/// Validate fields that can be checked without other sources.
pub fn validate_config(config: &FileConfig) -> Result<()> {
    if let Some(version) = config.schema_version {
        if version != CONFIG_SCHEMA_VERSION {
            return Err(anyhow!("unsupported config schema_version {version}"));
        }
    }
    if config.timeout_secs == Some(0) {
        return Err(anyhow!("timeout_secs must be greater than zero"));
    }
    if let Some(name) = config.api_key_env.as_deref() {
        if name.trim().is_empty() {
            return Err(anyhow!("api_key_env must be non-empty"));
        }
    }
    Ok(())
}

/// Merge CLI flags, environment, and file config into run settings.
///
/// `env` looks up environment variables; empty values count as unset.
pub fn resolve_settings<F>(args: &EditArgs, config: FileConfig, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    let model = args
        .model
        .clone()
        .or_else(|| lookup(MODEL_ENV))
        .or(config.model)
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    if model.trim().is_empty() {
        return Err(anyhow!("model must be non-empty"));
    }

    let command = match args.lm_command.clone() {
        Some(command) => Some(command),
        // An explicit --base-url selects HTTP even when a command is configured elsewhere.
        None if args.base_url.is_some() => None,
        None => lookup(LM_COMMAND_ENV).or(config.lm_command),
    };

    let backend = match command {
        Some(command) => {
            if command.trim().is_empty() {
                return Err(anyhow!("LM command is empty"));
            }
            BackendSettings::Command { command }
        }
        None => {
            let base_url = args
                .base_url
                .clone()
                .or_else(|| lookup(BASE_URL_ENV))
                .or(config.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
            validate_base_url(&base_url)?;
            let key_env = config
                .api_key_env
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
            let api_key = lookup(&key_env)
                .ok_or_else(|| anyhow!("missing API key: set {key_env} or configure lm_command"))?;
            BackendSettings::Http {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
                timeout: config.timeout_secs.map(Duration::from_secs),
            }
        }
    };

    Ok(Settings {
        file: args
            .file
            .clone()
            .or(config.file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGET_FILE)),
        instructions: args.instructions.clone().or(config.instructions),
        model,
        backend,
        transcript: args.transcript.clone().or(config.transcript),
        run_log: args.run_log.clone().or(config.run_log),
        dry_run: args.dry_run,
    })
}

fn validate_base_url(base_url: &str) -> Result<()> {
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!(
            "base URL must start with http:// or https:// (got {base_url:?})"
        ))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
