//! # Configuration
//!
//! TOML configuration for the bot: which messengers to connect, where to keep
//! player records, how fast time passes for the pets and how busy players are
//! handled. Every field has a default, so a config file only needs to name
//! what it changes.
//!
//! ## Sections
//!
//! - [`BotConfig`] - pet defaults and the canned replies the gateway uses
//! - [`StorageConfig`] - data directory for the sled database
//! - [`SimRules`] - decay rates, growth thresholds and other simulation knobs
//! - [`SchedulerConfig`] - background tick interval, parallelism and retries
//! - [`GatewayConfig`] - busy policy and delivery retries
//! - [`CommandsConfig`] - enabled verbs and extra aliases
//! - [`LoggingConfig`] - log level and optional log file
//! - [`ConsoleConfig`], [`TelegramConfig`], [`IrcConfig`] - messenger adapters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tinypet::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Tick every {}s", config.scheduler.tick_interval_secs);
//!     Ok(())
//! }
//! ```
//!
//! ## Example
//!
//! ```toml
//! [bot]
//! pet_name = "Feini"
//!
//! [simulation]
//! max_level = 100
//! [simulation.hunger]
//! period_secs = 900
//! step = 1
//!
//! [scheduler]
//! tick_interval_secs = 300
//!
//! [gateway]
//! busy_policy = "queue"
//!
//! [telegram]
//! enabled = true
//! token = "123456:ABC..."
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::fs;

use crate::sim::commands::{CommandTable, Verb};
use crate::sim::rules::SimRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Name every new pet starts with.
    pub pet_name: String,
    /// Sent ahead of the first reply a new player gets.
    pub welcome_message: String,
    /// Reply when a command hit a transient failure.
    pub fallback_message: String,
    /// Reply when a message arrives while the player is still being served.
    pub busy_message: String,
    /// Reply when the player's record is quarantined.
    pub flagged_message: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            pet_name: "Feini".to_string(),
            welcome_message: "🥚 Welcome! An egg is waiting for you. Say `help` to see what you can do."
                .to_string(),
            fallback_message: "⚠️ Oops, something went wrong. Please try again in a moment."
                .to_string(),
            busy_message: "⏳ Still working on your last message, one moment.".to_string(),
            flagged_message:
                "🛠️ Your pet needs a check-up from the caretaker. Please try again later."
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
    /// Players ticked concurrently within one pass.
    pub max_workers: usize,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            max_workers: 8,
            retry_attempts: 3,
            retry_base_ms: 250,
        }
    }
}

/// What to do with a message for a player whose previous message is still
/// being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Hold it and process it afterwards, in arrival order.
    Queue,
    /// Answer with the busy message and drop it.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub busy_policy: BusyPolicy,
    /// Queued messages allowed per player before new ones get the busy reply.
    pub max_pending: usize,
    pub delivery_retries: u32,
    pub delivery_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            busy_policy: BusyPolicy::Queue,
            max_pending: 8,
            delivery_retries: 3,
            delivery_backoff_ms: 1000,
        }
    }
}

fn default_enabled_verbs() -> Vec<String> {
    Verb::ALL
        .iter()
        .map(|verb| verb.canonical().to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_enabled_verbs")]
    pub enabled: Vec<String>,
    /// Extra alias -> canonical verb.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_verbs(),
            aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`; `-v` overrides it.
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsoleConfig {
    /// Play from the terminal as `console:local`.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: String,
    pub api_url: String,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            api_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    pub nick: String,
    pub channels: Vec<String>,
    pub reconnect_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "irc.libera.chat".to_string(),
            port: 6667,
            nick: "tinypet".to_string(),
            channels: Vec::new(),
            reconnect_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub simulation: SimRules,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub irc: IrcConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Check values that parse fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        self.simulation
            .validate()
            .map_err(|e| anyhow!("Invalid config: {}", e))?;
        if self.scheduler.tick_interval_secs == 0 {
            return Err(anyhow!("Invalid config: scheduler.tick_interval_secs must be > 0"));
        }
        if self.scheduler.max_workers == 0 {
            return Err(anyhow!("Invalid config: scheduler.max_workers must be > 0"));
        }
        if self.bot.pet_name.trim().is_empty()
            || self.bot.pet_name.chars().count() > self.simulation.name_max_len
        {
            return Err(anyhow!(
                "Invalid config: bot.pet_name must be 1..={} characters",
                self.simulation.name_max_len
            ));
        }
        CommandTable::new(&self.commands).map_err(|e| anyhow!("Invalid config: {}", e))?;
        if self.telegram.enabled && self.telegram.token.trim().is_empty() {
            return Err(anyhow!("Invalid config: telegram.token is required when telegram is enabled"));
        }
        if self.irc.enabled && (self.irc.server.is_empty() || self.irc.nick.is_empty()) {
            return Err(anyhow!("Invalid config: irc.server and irc.nick are required when irc is enabled"));
        }
        Ok(())
    }
}
