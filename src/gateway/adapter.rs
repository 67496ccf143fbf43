//! Messenger adapter contract.
//!
//! An adapter owns one transport (a bot API, an IRC connection, a terminal).
//! It pushes every inbound chat line to the gateway as an [`Inbound`] and
//! accepts outbound text for one of its chats. Framing, authentication and
//! rate limits stay inside the adapter.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::sim::types::PlayerId;

/// One line of text received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub adapter: String,
    pub chat: String,
    pub text: String,
}

impl Inbound {
    pub fn new(adapter: &str, chat: &str, text: &str) -> Self {
        Self {
            adapter: adapter.to_string(),
            chat: chat.to_string(),
            text: text.to_string(),
        }
    }

    pub fn player(&self) -> PlayerId {
        PlayerId::new(&self.adapter, &self.chat)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Worth retrying: timeouts, rate limits, a dropped connection.
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// The chat is gone or blocked the bot. Retrying will not help.
    #[error("chat unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Prefix of every player identity this adapter produces.
    fn name(&self) -> &str;

    /// Receive messages until the transport closes for good, forwarding each
    /// one to `inbound`. Returning ends the adapter; the gateway keeps going.
    async fn run(&self, inbound: mpsc::UnboundedSender<Inbound>) -> anyhow::Result<()>;

    async fn send(&self, chat: &str, text: &str) -> Result<(), DeliveryError>;
}
