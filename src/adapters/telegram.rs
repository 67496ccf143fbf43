//! Telegram Bot API adapter: long-polls `getUpdates`, answers with
//! `sendMessage`. Every private or group chat is one player, `telegram:<chat id>`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::TelegramConfig;
use crate::gateway::adapter::{Adapter, DeliveryError, Inbound};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
enum PollError {
    #[error("telegram rejected the bot token")]
    Unauthorized,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("getUpdates failed: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramAdapter {
    client: reqwest::Client,
    config: TelegramConfig,
}

impl TelegramAdapter {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, PollError> {
        let timeout = self.config.poll_timeout_secs;
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .timeout(Duration::from_secs(timeout + 10))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PollError::Unauthorized);
        }
        let body: ApiResponse<Vec<Update>> = response.json().await?;
        if !body.ok {
            return Err(PollError::Api(body.description.unwrap_or_default()));
        }
        Ok(body.result.unwrap_or_default())
    }
}

fn to_inbound(update: Update) -> Option<Inbound> {
    let message = update.message?;
    let text = message.text?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // Commands in groups arrive as "/feed@botname"; the verb table wants "feed".
    let text = text.strip_prefix('/').unwrap_or(text);
    let text = match text.split_once(' ') {
        Some((head, rest)) => format!("{} {}", strip_mention(head), rest),
        None => strip_mention(text).to_string(),
    };
    Some(Inbound::new("telegram", &message.chat.id.to_string(), &text))
}

fn strip_mention(word: &str) -> &str {
    word.split_once('@').map(|(verb, _)| verb).unwrap_or(word)
}

/// Map a failed `sendMessage` onto the gateway's delivery errors.
fn classify(status: u16, description: &str) -> DeliveryError {
    let description = description.to_string();
    match status {
        403 => DeliveryError::Unreachable(description),
        400 if description.contains("chat not found") => DeliveryError::Unreachable(description),
        _ => DeliveryError::Transient(format!("{}: {}", status, description)),
    }
}

#[async_trait]
impl Adapter for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn run(&self, inbound: mpsc::UnboundedSender<Inbound>) -> anyhow::Result<()> {
        let mut offset = 0i64;
        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(PollError::Unauthorized) => return Err(PollError::Unauthorized.into()),
                Err(e) => {
                    warn!("telegram poll failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(msg) = to_inbound(update) {
                    if inbound.send(msg).is_err() {
                        debug!("gateway gone, telegram adapter stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn send(&self, chat: &str, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id: chat, text })
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        let body: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        if body.ok {
            return Ok(());
        }
        Err(classify(
            body.error_code.unwrap_or(status),
            &body.description.unwrap_or_default(),
        ))
    }
}
