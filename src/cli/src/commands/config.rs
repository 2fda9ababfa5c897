//! Saved connection settings for the CLI.
//!
//! Settings live in `~/.coursepulse/config.toml` (or `$COURSEPULSE_CONFIG_DIR/config.toml`)
//! and fill in `--api-url` / `--api-key` when neither flag nor environment
//! variable is given.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Save a setting
    Set {
        key: ConfigKey,
        value: String,
    },

    /// Print one setting
    Get { key: ConfigKey },

    /// Remove one setting
    Unset { key: ConfigKey },

    /// Show every saved setting (the API key is masked)
    Show,

    /// Print the config file location
    Path,

    /// Delete the config file
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// A setting the CLI knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Base URL of the CoursePulse server
    ApiUrl,
    /// Key sent as `X-Api-Key` on /api/v1 requests
    ApiKey,
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ApiUrl => "api-url",
            Self::ApiKey => "api-key",
        })
    }
}

/// On-disk settings.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl CliConfig {
    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        match key {
            ConfigKey::ApiUrl => self.api_url.as_deref(),
            ConfigKey::ApiKey => self.api_key.as_deref(),
        }
    }

    /// Validate and store a value. URLs are normalized without a trailing slash.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        let value = value.trim();
        if value.is_empty() {
            bail!("{} cannot be empty", key);
        }
        match key {
            ConfigKey::ApiUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    bail!("api-url must start with http:// or https://, got '{}'", value);
                }
                self.api_url = Some(value.trim_end_matches('/').to_string());
            }
            ConfigKey::ApiKey => self.api_key = Some(value.to_string()),
        }
        Ok(())
    }

    /// Returns whether a value was present.
    pub fn unset(&mut self, key: ConfigKey) -> bool {
        match key {
            ConfigKey::ApiUrl => self.api_url.take().is_some(),
            ConfigKey::ApiKey => self.api_key.take().is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_url.is_none() && self.api_key.is_none()
    }

    /// Settings as printed: the key keeps its first four characters.
    fn masked(&self) -> Self {
        Self {
            api_url: self.api_url.clone(),
            api_key: self.api_key.as_deref().map(mask),
        }
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

/// Reads and writes [`CliConfig`] at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$COURSEPULSE_CONFIG_DIR/config.toml`, else `~/.coursepulse/config.toml`.
    pub fn default_location() -> Result<Self> {
        let dir = match std::env::var_os("COURSEPULSE_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".coursepulse"),
        };
        Ok(Self::at(dir.join("config.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as empty settings.
    pub fn load(&self) -> Result<CliConfig> {
        if !self.path.exists() {
            return Ok(CliConfig::default());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    pub fn save(&self, cfg: &CliConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }
}

/// Saved settings, or empty ones when the file is missing or unreadable.
pub fn load_saved() -> CliConfig {
    ConfigStore::default_location()
        .and_then(|store| store.load())
        .unwrap_or_default()
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    let store = ConfigStore::default_location()?;

    match cmd {
        ConfigCommands::Set { key, value } => {
            let mut cfg = store.load()?;
            cfg.set(key, &value)?;
            store.save(&cfg)?;
            let shown = cfg.masked().get(key).unwrap_or_default().to_string();
            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, shown)),
                _ => output::print_item(&serde_json::json!({ "key": key.to_string(), "value": shown }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = store.load()?;
            let Some(value) = cfg.get(key) else {
                bail!("{} is not set", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key.to_string(), "value": value }), format)?,
            }
        }

        ConfigCommands::Unset { key } => {
            let mut cfg = store.load()?;
            if cfg.unset(key) {
                store.save(&cfg)?;
                output::print_success(&format!("Removed {}", key));
            } else {
                output::print_info(&format!("{} was not set", key));
            }
        }

        ConfigCommands::Show => {
            let cfg = store.load()?.masked();
            match format {
                OutputFormat::Table if cfg.is_empty() => {
                    output::print_info(&format!("Nothing saved in {}", store.path().display()));
                }
                OutputFormat::Table => {
                    output::print_header("Saved settings");
                    for key in [ConfigKey::ApiUrl, ConfigKey::ApiKey] {
                        if let Some(value) = cfg.get(key) {
                            output::print_detail(&key.to_string(), value);
                        }
                    }
                }
                _ => output::print_item(&cfg, format)?,
            }
        }

        ConfigCommands::Path => println!("{}", store.path().display()),

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This deletes every saved setting. Use --force to confirm.");
                return Ok(());
            }
            if store.remove()? {
                output::print_success("Saved settings removed");
            } else {
                output::print_info("Nothing to remove");
            }
        }
    }

    Ok(())
}
