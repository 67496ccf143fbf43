//! Messenger adapters. Each one implements [`crate::gateway::Adapter`].

pub mod console;
pub mod irc;
#[cfg(feature = "telegram")]
pub mod telegram;

pub use console::ConsoleAdapter;
pub use irc::IrcAdapter;
#[cfg(feature = "telegram")]
pub use telegram::TelegramAdapter;

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::Adapter;

/// Build every adapter the configuration enables.
pub fn from_config(config: &Config) -> anyhow::Result<Vec<Arc<dyn Adapter>>> {
    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
    if config.console.enabled {
        adapters.push(Arc::new(ConsoleAdapter::new()));
    }
    if config.telegram.enabled {
        #[cfg(feature = "telegram")]
        adapters.push(Arc::new(TelegramAdapter::new(config.telegram.clone())));
        #[cfg(not(feature = "telegram"))]
        anyhow::bail!("telegram is enabled in the config but this build lacks the `telegram` feature");
    }
    if config.irc.enabled {
        adapters.push(Arc::new(IrcAdapter::new(config.irc.clone())));
    }
    Ok(adapters)
}
