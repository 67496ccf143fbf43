//! In-process adapter for the integration tests: messages are injected by
//! calling [`MemoryAdapter::inject`] and replies are collected in memory.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use tinypet::gateway::{Adapter, DeliveryError, Inbound};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat: String,
    pub text: String,
}

pub struct MemoryAdapter {
    name: String,
    feed_tx: mpsc::UnboundedSender<Inbound>,
    feed_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    sent: Mutex<Vec<Sent>>,
    failures: Mutex<VecDeque<DeliveryError>>,
    delivered: Notify,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryAdapter {
    pub fn new(name: &str) -> Self {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        Self {
            name: name.to_string(),
            feed_tx,
            feed_rx: Mutex::new(Some(feed_rx)),
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            delivered: Notify::new(),
        }
    }

    /// Queue a message as if `chat` had typed it. Messages injected before
    /// [`Adapter::run`] starts are held until it does.
    pub fn inject(&self, chat: &str, text: &str) {
        let _ = self.feed_tx.send(Inbound::new(&self.name, chat, text));
    }

    /// Make the next sends fail with these errors, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = DeliveryError>) {
        guard(&self.failures).extend(errors);
    }

    pub fn sent(&self) -> Vec<Sent> {
        guard(&self.sent).clone()
    }

    pub fn sent_to(&self, chat: &str) -> Vec<String> {
        guard(&self.sent)
            .iter()
            .filter(|s| s.chat == chat)
            .map(|s| s.text.clone())
            .collect()
    }

    /// Wait until at least `count` messages were delivered, or `timeout`
    /// passes. Returns everything delivered so far either way.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<Sent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            if guard(&self.sent).len() >= count {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }
        self.sent()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, inbound: mpsc::UnboundedSender<Inbound>) -> anyhow::Result<()> {
        let Some(mut feed) = guard(&self.feed_rx).take() else {
            anyhow::bail!("memory adapter {} is already running", self.name);
        };
        while let Some(msg) = feed.recv().await {
            if inbound.send(msg).is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn send(&self, chat: &str, text: &str) -> Result<(), DeliveryError> {
        if let Some(err) = guard(&self.failures).pop_front() {
            return Err(err);
        }
        guard(&self.sent).push(Sent {
            chat: chat.to_string(),
            text: text.to_string(),
        });
        self.delivered.notify_waiters();
        Ok(())
    }
}
