//! Gateway server: fans in messages from every adapter, runs each one
//! against the sender's pet and fans replies back out through the outbox.
//!
//! A player has at most one message in flight. The first message marks the
//! player busy and spawns a worker that drains that player's FIFO; whatever
//! arrives meanwhile is queued or answered with the busy text, depending on
//! [`BusyPolicy`]. Different players are served concurrently.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;

use super::adapter::{Adapter, Inbound};
use super::outbox::{start_outbox, EnvelopeKind, OutboxConfig, OutboxHandle};
use crate::config::{BotConfig, BusyPolicy, Config};
use crate::logutil::{escape_log, redact_identity};
use crate::metrics;
use crate::sim::clock::catch_up;
use crate::sim::commands::CommandTable;
use crate::sim::errors::PetError;
use crate::sim::interpreter::{Interpreter, ReplyKind};
use crate::sim::scheduler::{start_ticker, TickConfig};
use crate::sim::storage::{PetStore, PetStoreBuilder};
use crate::sim::types::{PlayerId, PlayerRecord, World};

/// How long shutdown waits for in-flight messages before giving up on them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Gateway {
    config: Config,
    core: Arc<Core>,
}

struct Core {
    store: Arc<PetStore>,
    interpreter: Interpreter,
    bot: BotConfig,
    policy: BusyPolicy,
    max_pending: usize,
    /// Players with a worker running, and what they sent since.
    inflight: Mutex<HashMap<PlayerId, VecDeque<Inbound>>>,
    idle: Notify,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Gateway {
    /// Open the sled store under `storage.data_dir` and build the gateway.
    pub fn new(config: Config) -> Result<Self> {
        let store = PetStoreBuilder::new(&config.storage.data_dir)
            .rules(config.simulation.clone())
            .open()?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: Config, store: Arc<PetStore>) -> Result<Self> {
        let table = CommandTable::new(&config.commands)?;
        let interpreter = Interpreter::new(table, config.simulation.clone());
        let core = Core {
            store,
            interpreter,
            bot: config.bot.clone(),
            policy: config.gateway.busy_policy,
            max_pending: config.gateway.max_pending,
            inflight: Mutex::new(HashMap::new()),
            idle: Notify::new(),
        };
        Ok(Self {
            config,
            core: Arc::new(core),
        })
    }

    pub fn store(&self) -> &Arc<PetStore> {
        &self.core.store
    }

    /// Handle one message outside the inbox registry and return its reply.
    pub async fn process(&self, msg: &Inbound) -> String {
        self.core.process(msg).await
    }

    /// Serve until Ctrl-C.
    pub async fn run(&self, adapters: Vec<Arc<dyn Adapter>>) -> Result<()> {
        self.serve(adapters, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Serve until `shutdown` resolves or every adapter has stopped.
    pub async fn serve<F>(&self, adapters: Vec<Arc<dyn Adapter>>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if adapters.is_empty() {
            anyhow::bail!("no adapters enabled");
        }
        let outbox = start_outbox(
            OutboxConfig::from(&self.config.gateway),
            adapters.clone(),
            self.core.store.clone(),
        );
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let ticker = start_ticker(
            TickConfig::from(&self.config.scheduler),
            self.core.store.clone(),
            notice_tx,
        );

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Inbound>();
        let mut running = JoinSet::new();
        for adapter in adapters {
            let tx = inbound_tx.clone();
            info!("starting adapter {}", adapter.name());
            running.spawn(async move {
                let name = adapter.name().to_string();
                match adapter.run(tx).await {
                    Ok(()) => info!("adapter {} stopped", name),
                    Err(e) => error!("adapter {} failed: {:#}", name, e),
                }
            });
        }
        drop(inbound_tx);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                msg = inbound_rx.recv() => match msg {
                    Some(msg) => self.core.accept(msg, &outbox),
                    None => {
                        info!("all adapters stopped");
                        break;
                    }
                },
                Some(notice) = notice_rx.recv() => {
                    outbox.enqueue(EnvelopeKind::Notice, notice.player, notice.text);
                }
            }
        }

        ticker.shutdown().await;
        self.core.wait_idle(DRAIN_TIMEOUT).await;
        outbox.shutdown().await;
        running.shutdown().await;
        info!("gateway stopped: {}", metrics::snapshot());
        Ok(())
    }
}

impl Core {
    fn accept(self: &Arc<Self>, msg: Inbound, outbox: &OutboxHandle) {
        let id = msg.player();
        let mut inflight = locked(&self.inflight);
        match inflight.get_mut(&id) {
            Some(queue) => {
                if self.policy == BusyPolicy::Reject || queue.len() >= self.max_pending {
                    drop(inflight);
                    metrics::inc_messages_busy();
                    debug!("{} is busy, bouncing message", redact_identity(id.as_str()));
                    outbox.enqueue(EnvelopeKind::Reply, id, self.bot.busy_message.clone());
                } else {
                    queue.push_back(msg);
                }
            }
            None => {
                inflight.insert(id.clone(), VecDeque::new());
                drop(inflight);
                let core = self.clone();
                let outbox = outbox.clone();
                tokio::spawn(async move { core.drain(id, msg, outbox).await });
            }
        }
    }

    async fn drain(self: Arc<Self>, id: PlayerId, first: Inbound, outbox: OutboxHandle) {
        let mut next = Some(first);
        while let Some(msg) = next {
            let reply = self.process(&msg).await;
            outbox.enqueue(EnvelopeKind::Reply, id.clone(), reply);
            let mut inflight = locked(&self.inflight);
            next = inflight.get_mut(&id).and_then(|queue| queue.pop_front());
            if next.is_none() {
                inflight.remove(&id);
                if inflight.is_empty() {
                    self.idle.notify_waiters();
                }
            }
        }
    }

    async fn wait_idle(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            let busy = locked(&self.inflight).len();
            if busy == 0 {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!("shutting down with {} players still in flight", busy);
                return;
            }
        }
    }

    /// Exactly one reply text per message, whatever happens underneath.
    async fn process(&self, msg: &Inbound) -> String {
        let id = msg.player();
        let now = Utc::now();
        let rules = self.interpreter.rules();
        let result = self
            .store
            .with_lock_or_insert(
                &id,
                || PlayerRecord::new(id.clone(), now, World::new(&self.bot.pet_name, rules)),
                |record| {
                    if !record.active {
                        info!("reactivating {}", redact_identity(id.as_str()));
                        record.active = true;
                    }
                    let notices = catch_up(record, now, rules);
                    record.touch(now);
                    let reply = self.interpreter.handle(record, &msg.text, now);
                    Ok((notices, reply))
                },
            )
            .await;

        match result {
            Ok(((notices, reply), created)) => {
                if reply.kind == ReplyKind::Rejected {
                    metrics::inc_commands_rejected();
                } else {
                    metrics::inc_commands_handled();
                }
                debug!(
                    "{} {:?}: {}",
                    redact_identity(id.as_str()),
                    reply.kind,
                    escape_log(&msg.text)
                );
                let mut text = String::new();
                if created {
                    info!("new player {}", redact_identity(id.as_str()));
                    text.push_str(&self.bot.welcome_message);
                    text.push_str("\n\n");
                }
                for notice in notices {
                    text.push_str(&notice.to_string());
                    text.push('\n');
                }
                text.push_str(&reply.text);
                text
            }
            Err(e) => {
                metrics::inc_commands_failed();
                match e {
                    PetError::Quarantined(_)
                    | PetError::Corrupt { .. }
                    | PetError::SchemaMismatch { .. } => {
                        warn!("{} is flagged: {}", redact_identity(id.as_str()), e);
                        self.bot.flagged_message.clone()
                    }
                    _ => {
                        warn!(
                            "command from {} failed: {}",
                            redact_identity(id.as_str()),
                            e
                        );
                        self.bot.fallback_message.clone()
                    }
                }
            }
        }
    }
}
