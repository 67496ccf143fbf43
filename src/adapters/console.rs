//! Terminal adapter: every stdin line is a message from `console:local`,
//! replies are printed to stdout.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::gateway::adapter::{Adapter, DeliveryError, Inbound};

pub const CONSOLE_CHAT: &str = "local";

pub struct ConsoleAdapter {
    stdout: Mutex<tokio::io::Stdout>,
}

impl ConsoleAdapter {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for ConsoleAdapter {
    fn name(&self) -> &str {
        "console"
    }

    async fn run(&self, inbound: mpsc::UnboundedSender<Inbound>) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if inbound.send(Inbound::new("console", CONSOLE_CHAT, text)).is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn send(&self, _chat: &str, text: &str) -> Result<(), DeliveryError> {
        let mut out = self.stdout.lock().await;
        let mut block = String::with_capacity(text.len() + 2);
        block.push_str(text);
        block.push_str("\n\n");
        out.write_all(block.as_bytes())
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))
    }
}
