//! Background tick scheduler.
//!
//! A spawned loop wakes every `tick_interval` and runs one pass over every
//! known player: lock, catch up to the current time, save. Players are
//! ticked concurrently, at most `max_workers` at a time, so one slow record
//! never holds up the rest; per-player ordering with inbound commands comes
//! from the session lock. Transient store failures are retried with
//! exponential backoff plus jitter; fatal ones leave the player flagged.
//!
//! Notices produced by a tick (hungry pet, spoiled food...) are pushed onto
//! an unbounded channel for the gateway to deliver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::logutil::redact_identity;
use crate::metrics;
use crate::sim::clock::catch_up;
use crate::sim::errors::PetError;
use crate::sim::storage::PetStore;
use crate::sim::types::PlayerId;

#[derive(Debug, Clone)]
pub struct TickConfig {
    pub interval: Duration,
    pub max_workers: usize,
    pub retry_attempts: u32,
    pub retry_base: Duration,
}

impl From<&SchedulerConfig> for TickConfig {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.tick_interval_secs.max(1)),
            max_workers: cfg.max_workers.max(1),
            retry_attempts: cfg.retry_attempts,
            retry_base: Duration::from_millis(cfg.retry_base_ms),
        }
    }
}

impl TickConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(10);
        let base = self.retry_base.saturating_mul(factor);
        let jitter_cap = (self.retry_base.as_millis() as u64 / 2).max(1);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_cap))
    }
}

/// A message for a player that was not asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickNotice {
    pub player: PlayerId,
    pub text: String,
}

/// Summary of one pass over all players.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub ticked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retries: u32,
    pub notices: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub passes: u64,
    pub ticked_total: u64,
    pub failed_total: u64,
    pub retries_total: u64,
    pub notices_total: u64,
    pub last_pass_ms: u64,
}

pub enum TickCommand {
    RunNow(oneshot::Sender<PassReport>),
    Snapshot(oneshot::Sender<TickStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct TickHandle {
    tx: mpsc::UnboundedSender<TickCommand>,
}

impl TickHandle {
    /// Run a pass immediately and wait for its report.
    pub async fn run_now(&self) -> Option<PassReport> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(TickCommand::RunNow(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn snapshot(&self) -> Option<TickStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(TickCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(TickCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

pub fn start_ticker(
    cfg: TickConfig,
    store: Arc<PetStore>,
    notices: mpsc::UnboundedSender<TickNotice>,
) -> TickHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<TickCommand>();
    let handle = TickHandle { tx };

    tokio::spawn(async move {
        let mut stats = TickStats::default();
        let mut interval = tokio::time::interval(cfg.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; skip it so a
        // restart does not race the first inbound messages.
        interval.tick().await;
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(TickCommand::RunNow(resp)) => {
                        let report = timed_pass(&cfg, &store, &notices, &mut stats).await;
                        let _ = resp.send(report);
                    }
                    Some(TickCommand::Snapshot(resp)) => {
                        let _ = resp.send(stats.clone());
                    }
                    Some(TickCommand::Shutdown(done)) => {
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    timed_pass(&cfg, &store, &notices, &mut stats).await;
                }
            }
        }
        debug!("tick scheduler stopped after {} passes", stats.passes);
    });

    handle
}

async fn timed_pass(
    cfg: &TickConfig,
    store: &Arc<PetStore>,
    notices: &mpsc::UnboundedSender<TickNotice>,
    stats: &mut TickStats,
) -> PassReport {
    let started = Instant::now();
    let report = run_pass(cfg, store, Utc::now(), notices).await;
    stats.passes += 1;
    stats.ticked_total += report.ticked as u64;
    stats.failed_total += report.failed as u64;
    stats.retries_total += u64::from(report.retries);
    stats.notices_total += report.notices as u64;
    stats.last_pass_ms = started.elapsed().as_millis() as u64;
    if report.failed > 0 {
        warn!(
            "tick pass: {} ticked, {} skipped, {} failed, {} retries ({} ms)",
            report.ticked, report.skipped, report.failed, report.retries, stats.last_pass_ms
        );
    } else {
        info!(
            "tick pass: {} ticked, {} skipped, {} notices ({} ms)",
            report.ticked, report.skipped, report.notices, stats.last_pass_ms
        );
    }
    report
}

enum PlayerTick {
    Ticked { notices: usize, retries: u32 },
    Skipped,
    Failed { retries: u32 },
}

/// One pass over all stored players, simulating each up to `now`.
pub async fn run_pass(
    cfg: &TickConfig,
    store: &Arc<PetStore>,
    now: DateTime<Utc>,
    notices: &mpsc::UnboundedSender<TickNotice>,
) -> PassReport {
    let mut report = PassReport::default();
    let (listed, list_retries) = list_with_retry(cfg, store).await;
    report.retries += list_retries;
    let ids = match listed {
        Ok(ids) => ids,
        Err(e) => {
            warn!("tick pass aborted, cannot list players: {}", e);
            report.failed = 1;
            return report;
        }
    };

    let permits = Arc::new(Semaphore::new(cfg.max_workers));
    let mut workers = JoinSet::new();
    for id in ids {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let store = store.clone();
        let notices = notices.clone();
        let cfg = cfg.clone();
        workers.spawn(async move {
            let outcome = tick_player(&cfg, &store, &id, now, &notices).await;
            drop(permit);
            outcome
        });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(PlayerTick::Ticked { notices, retries }) => {
                report.ticked += 1;
                report.notices += notices;
                report.retries += retries;
            }
            Ok(PlayerTick::Skipped) => report.skipped += 1,
            Ok(PlayerTick::Failed { retries }) => {
                report.failed += 1;
                report.retries += retries;
            }
            Err(e) => {
                warn!("tick worker panicked: {}", e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Returns the listing result and how many retries it took.
async fn list_with_retry(
    cfg: &TickConfig,
    store: &PetStore,
) -> (Result<Vec<PlayerId>, PetError>, u32) {
    let mut attempt = 0;
    loop {
        match store.list_player_ids() {
            Err(e) if e.is_transient() && attempt < cfg.retry_attempts => {
                attempt += 1;
                metrics::inc_tick_retries();
                debug!("listing players failed ({}), retry {}", e, attempt);
                tokio::time::sleep(cfg.backoff(attempt)).await;
            }
            other => return (other, attempt),
        }
    }
}

async fn tick_player(
    cfg: &TickConfig,
    store: &PetStore,
    id: &PlayerId,
    now: DateTime<Utc>,
    notices: &mpsc::UnboundedSender<TickNotice>,
) -> PlayerTick {
    match store.is_flagged(id) {
        Ok(true) => return PlayerTick::Skipped,
        Ok(false) => {}
        Err(e) => debug!("flag check for {} failed: {}", redact_identity(id.as_str()), e),
    }

    let rules = store.rules().clone();
    let mut retries = 0;
    loop {
        let result = store
            .with_lock(id, |record| {
                if !record.active {
                    return Ok(None);
                }
                Ok(Some(catch_up(record, now, &rules)))
            })
            .await;
        match result {
            Ok(None) => return PlayerTick::Skipped,
            Ok(Some(produced)) => {
                metrics::inc_ticks_applied();
                let count = produced.len();
                for notice in produced {
                    let _ = notices.send(TickNotice {
                        player: id.clone(),
                        text: notice.to_string(),
                    });
                }
                return PlayerTick::Ticked {
                    notices: count,
                    retries,
                };
            }
            Err(e) if e.is_transient() && retries < cfg.retry_attempts => {
                retries += 1;
                metrics::inc_tick_retries();
                let delay = cfg.backoff(retries);
                debug!(
                    "tick for {} failed ({}), retry {} in {:?}",
                    redact_identity(id.as_str()),
                    e,
                    retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                metrics::inc_tick_failures();
                warn!("tick for {} failed: {}", redact_identity(id.as_str()), e);
                return PlayerTick::Failed { retries };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::rules::{DecayRule, SimRules};
    use crate::sim::storage::MemoryBackend;
    use crate::sim::types::{PlayerRecord, World};
    use chrono::TimeZone;

    fn cfg() -> TickConfig {
        TickConfig {
            interval: Duration::from_secs(3600),
            max_workers: 2,
            retry_attempts: 3,
            retry_base: Duration::from_millis(1),
        }
    }

    fn rules() -> SimRules {
        SimRules {
            hunger: DecayRule::new(1, 1),
            ..SimRules::default()
        }
    }

    fn seeded(n: usize) -> (Arc<PetStore>, Arc<MemoryBackend>, DateTime<Utc>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(PetStore::with_backend(backend.clone(), rules()));
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        for i in 0..n {
            let id = PlayerId::new("irc", &format!("p{}", i));
            let mut world = World::new("Feini", &rules());
            world.pet.care = 1;
            crate::sim::clock::grow(&mut world, &rules());
            store
                .save(&PlayerRecord::new(id, start, world))
                .expect("seed");
        }
        (store, backend, start)
    }

    #[tokio::test]
    async fn pass_catches_up_every_player() {
        let (store, _, start) = seeded(5);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let now = start + chrono::Duration::seconds(200);
        let report = run_pass(&cfg(), &store, now, &tx).await;
        assert_eq!(report.ticked, 5);
        assert_eq!(report.failed, 0);
        for id in store.list_player_ids().expect("ids") {
            let rec = store.load(&id).expect("load");
            assert_eq!(rec.last_simulated, now);
            assert_eq!(rec.world.pet.needs.hunger, 0);
        }
        let mut hungry = 0;
        while let Ok(notice) = rx.try_recv() {
            if notice.text.contains("hungry") {
                hungry += 1;
            }
        }
        assert_eq!(hungry, 5);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (store, backend, start) = seeded(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        backend.fail_next(2);
        let report = run_pass(&cfg(), &store, start + chrono::Duration::seconds(10), &tx).await;
        assert_eq!(report.ticked, 1);
        assert!(report.retries >= 1);
    }

    #[tokio::test]
    async fn player_tick_retries_after_listing() {
        let (store, backend, start) = seeded(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = store.list_player_ids().expect("ids").remove(0);
        let now = start + chrono::Duration::seconds(10);
        backend.fail_next(1);
        match tick_player(&cfg(), &store, &id, now, &tx).await {
            PlayerTick::Ticked { retries, .. } => assert_eq!(retries, 1),
            _ => panic!("tick did not recover"),
        }
        assert_eq!(store.load(&id).expect("load").last_simulated, now);
    }

    #[tokio::test]
    async fn persistent_outage_fails_without_saving() {
        let (store, backend, start) = seeded(1);
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = store.list_player_ids().expect("ids").remove(0);
        backend.set_unavailable(true);
        let report = run_pass(&cfg(), &store, start + chrono::Duration::seconds(10), &tx).await;
        assert_eq!(report.failed, 1);
        backend.set_unavailable(false);
        assert_eq!(store.load(&id).expect("load").last_simulated, start);
    }

    #[tokio::test]
    async fn inactive_and_flagged_players_are_skipped() {
        let (store, backend, start) = seeded(2);
        let ids = store.list_player_ids().expect("ids");
        store
            .with_lock(&ids[0], |rec| {
                rec.active = false;
                Ok(())
            })
            .await
            .expect("deactivate");
        crate::sim::storage::StateBackend::flag(backend.as_ref(), ids[1].as_str(), "test")
            .expect("flag");
        let (tx, _rx) = mpsc::unbounded_channel();
        let report = run_pass(&cfg(), &store, start + chrono::Duration::seconds(10), &tx).await;
        assert_eq!(report.skipped, 2);
        assert_eq!(report.ticked, 0);
    }

    #[tokio::test]
    async fn handle_runs_passes_on_demand() {
        let (store, _, _) = seeded(3);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = start_ticker(cfg(), store, tx);
        let report = tokio::time::timeout(Duration::from_secs(5), handle.run_now())
            .await
            .expect("pass finished")
            .expect("report");
        assert_eq!(report.ticked, 3);
        let stats = handle.snapshot().await.expect("stats");
        assert_eq!(stats.passes, 1);
        handle.shutdown().await;
        assert!(handle.snapshot().await.is_none());
    }

    #[test]
    fn backoff_grows() {
        let cfg = TickConfig {
            retry_base: Duration::from_millis(100),
            ..cfg()
        };
        assert!(cfg.backoff(1) < Duration::from_millis(150));
        assert!(cfg.backoff(3) >= Duration::from_millis(400));
    }
}
