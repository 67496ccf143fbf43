//! Outbound delivery.
//!
//! Replies and tick notices are wrapped in an [`Envelope`] and handed to a
//! router task, which forwards them to one worker per adapter. A worker sends
//! its envelopes strictly in order, so a player's replies never overtake each
//! other. Transient failures are retried with exponential backoff plus jitter;
//! the same text is sent again, nothing is recomputed. An unreachable chat
//! soft-deactivates the player so ticks stop producing notices for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::adapter::{Adapter, DeliveryError};
use crate::config::GatewayConfig;
use crate::logutil::{escape_log, redact_identity};
use crate::metrics;
use crate::sim::errors::PetError;
use crate::sim::storage::PetStore;
use crate::sim::types::PlayerId;

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub retries: u32,
    pub retry_base: Duration,
}

impl From<&GatewayConfig> for OutboxConfig {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            retries: cfg.delivery_retries,
            retry_base: Duration::from_millis(cfg.delivery_backoff_ms),
        }
    }
}

impl OutboxConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(10);
        let base = self.retry_base.saturating_mul(factor);
        let jitter_cap = (self.retry_base.as_millis() as u64 / 2).max(1);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_cap))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnvelopeKind {
    /// The one answer to an inbound message.
    Reply,
    /// Unsolicited, produced by a background tick.
    Notice,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Uuid,
    pub kind: EnvelopeKind,
    pub player: PlayerId,
    pub text: String,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, player: PlayerId, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            player,
            text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub sent: u64,
    pub retries: u64,
    pub failed: u64,
    pub unreachable: u64,
}

pub enum OutboxCommand {
    Deliver(Envelope),
    /// Resolves once every envelope queued before it was handled.
    Flush(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<OutboxStats>),
    Shutdown(oneshot::Sender<()>),
}

enum WorkerMsg {
    Deliver(Envelope),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct OutboxHandle {
    tx: mpsc::UnboundedSender<OutboxCommand>,
}

impl OutboxHandle {
    pub fn enqueue(&self, kind: EnvelopeKind, player: PlayerId, text: String) -> Uuid {
        let envelope = Envelope::new(kind, player, text);
        let id = envelope.id;
        let _ = self.tx.send(OutboxCommand::Deliver(envelope));
        id
    }

    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(OutboxCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn snapshot(&self) -> Option<OutboxStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(OutboxCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Deliver what is already queued, then stop.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(OutboxCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

pub fn start_outbox(
    cfg: OutboxConfig,
    adapters: Vec<Arc<dyn Adapter>>,
    store: Arc<PetStore>,
) -> OutboxHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboxCommand>();
    let handle = OutboxHandle { tx };
    let stats = Arc::new(Mutex::new(OutboxStats::default()));

    let mut workers: HashMap<String, (mpsc::UnboundedSender<WorkerMsg>, JoinHandle<()>)> =
        HashMap::new();
    for adapter in adapters {
        let (wtx, wrx) = mpsc::unbounded_channel();
        let name = adapter.name().to_string();
        let task = tokio::spawn(run_worker(
            cfg.clone(),
            adapter,
            store.clone(),
            stats.clone(),
            wrx,
        ));
        workers.insert(name, (wtx, task));
    }

    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                OutboxCommand::Deliver(envelope) => {
                    match workers.get(envelope.player.adapter()) {
                        Some((worker, _)) => {
                            let _ = worker.send(WorkerMsg::Deliver(envelope));
                        }
                        None => {
                            warn!(
                                "no adapter for {}, dropping envelope {}",
                                redact_identity(envelope.player.as_str()),
                                envelope.id
                            );
                            metrics::inc_deliveries_failed();
                            bump(&stats, |s| s.failed += 1);
                        }
                    }
                }
                OutboxCommand::Flush(done) => {
                    let mut waits = Vec::with_capacity(workers.len());
                    for (worker, _) in workers.values() {
                        let (tx, rx) = oneshot::channel();
                        if worker.send(WorkerMsg::Flush(tx)).is_ok() {
                            waits.push(rx);
                        }
                    }
                    for wait in waits {
                        let _ = wait.await;
                    }
                    let _ = done.send(());
                }
                OutboxCommand::Snapshot(resp) => {
                    let current = stats.lock().map(|s| s.clone()).unwrap_or_default();
                    let _ = resp.send(current);
                }
                OutboxCommand::Shutdown(done) => {
                    for (name, (worker, task)) in workers.drain() {
                        drop(worker);
                        if let Err(e) = task.await {
                            warn!("outbox worker {} ended abnormally: {}", name, e);
                        }
                    }
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!("outbox stopped");
    });

    handle
}

fn bump(stats: &Mutex<OutboxStats>, f: impl FnOnce(&mut OutboxStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

async fn run_worker(
    cfg: OutboxConfig,
    adapter: Arc<dyn Adapter>,
    store: Arc<PetStore>,
    stats: Arc<Mutex<OutboxStats>>,
    mut rx: mpsc::UnboundedReceiver<WorkerMsg>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMsg::Deliver(envelope) => {
                deliver(&cfg, adapter.as_ref(), &store, &stats, &envelope).await;
            }
            WorkerMsg::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("outbox worker for {} drained", adapter.name());
}

async fn deliver(
    cfg: &OutboxConfig,
    adapter: &dyn Adapter,
    store: &PetStore,
    stats: &Mutex<OutboxStats>,
    envelope: &Envelope,
) {
    let who = redact_identity(envelope.player.as_str());
    let mut retries = 0;
    loop {
        match adapter.send(envelope.player.chat(), &envelope.text).await {
            Ok(()) => {
                metrics::inc_deliveries_sent();
                bump(stats, |s| s.sent += 1);
                debug!(
                    "delivered {} to {}: {}",
                    envelope.id,
                    who,
                    escape_log(&envelope.text)
                );
                return;
            }
            Err(DeliveryError::Transient(e)) if retries < cfg.retries => {
                retries += 1;
                metrics::inc_delivery_retries();
                bump(stats, |s| s.retries += 1);
                let delay = cfg.backoff(retries);
                debug!(
                    "delivery {} to {} failed ({}), retry {} in {:?}",
                    envelope.id, who, e, retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(DeliveryError::Transient(e)) => {
                metrics::inc_deliveries_failed();
                bump(stats, |s| s.failed += 1);
                warn!(
                    "giving up on {} to {} after {} retries: {}",
                    envelope.id, who, retries, e
                );
                return;
            }
            Err(DeliveryError::Unreachable(e)) => {
                metrics::inc_deliveries_failed();
                bump(stats, |s| s.unreachable += 1);
                info!("{} is unreachable ({}), deactivating", who, e);
                deactivate(store, &envelope.player).await;
                return;
            }
        }
    }
}

async fn deactivate(store: &PetStore, player: &PlayerId) {
    let result = store
        .with_lock(player, |record| {
            record.active = false;
            Ok(())
        })
        .await;
    match result {
        Ok(()) | Err(PetError::NotFound(_)) => {}
        Err(e) => warn!(
            "could not deactivate {}: {}",
            redact_identity(player.as_str()),
            e
        ),
    }
}
