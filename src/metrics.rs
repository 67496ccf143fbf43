//! Process-wide counters. Read by `tinypet status` and logged on shutdown.
use std::sync::atomic::{AtomicU64, Ordering};

static COMMANDS_HANDLED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_REJECTED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_FAILED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_BUSY: AtomicU64 = AtomicU64::new(0);
static TICKS_APPLIED: AtomicU64 = AtomicU64::new(0);
static TICK_RETRIES: AtomicU64 = AtomicU64::new(0);
static TICK_FAILURES: AtomicU64 = AtomicU64::new(0);
static DELIVERIES_SENT: AtomicU64 = AtomicU64::new(0);
static DELIVERY_RETRIES: AtomicU64 = AtomicU64::new(0);
static DELIVERIES_FAILED: AtomicU64 = AtomicU64::new(0);
static PLAYERS_FLAGGED: AtomicU64 = AtomicU64::new(0);

pub fn inc_commands_handled() {
    COMMANDS_HANDLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_rejected() {
    COMMANDS_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_failed() {
    COMMANDS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_busy() {
    MESSAGES_BUSY.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_ticks_applied() {
    TICKS_APPLIED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_tick_retries() {
    TICK_RETRIES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_tick_failures() {
    TICK_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_deliveries_sent() {
    DELIVERIES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_delivery_retries() {
    DELIVERY_RETRIES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_deliveries_failed() {
    DELIVERIES_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_players_flagged() {
    PLAYERS_FLAGGED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub commands_handled: u64,
    pub commands_rejected: u64,
    pub commands_failed: u64,
    pub messages_busy: u64,
    pub ticks_applied: u64,
    pub tick_retries: u64,
    pub tick_failures: u64,
    pub deliveries_sent: u64,
    pub delivery_retries: u64,
    pub deliveries_failed: u64,
    pub players_flagged: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        commands_handled: COMMANDS_HANDLED.load(Ordering::Relaxed),
        commands_rejected: COMMANDS_REJECTED.load(Ordering::Relaxed),
        commands_failed: COMMANDS_FAILED.load(Ordering::Relaxed),
        messages_busy: MESSAGES_BUSY.load(Ordering::Relaxed),
        ticks_applied: TICKS_APPLIED.load(Ordering::Relaxed),
        tick_retries: TICK_RETRIES.load(Ordering::Relaxed),
        tick_failures: TICK_FAILURES.load(Ordering::Relaxed),
        deliveries_sent: DELIVERIES_SENT.load(Ordering::Relaxed),
        delivery_retries: DELIVERY_RETRIES.load(Ordering::Relaxed),
        deliveries_failed: DELIVERIES_FAILED.load(Ordering::Relaxed),
        players_flagged: PLAYERS_FLAGGED.load(Ordering::Relaxed),
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "commands={} rejected={} failed={} busy={} ticks={} tick_retries={} tick_failures={} sent={} delivery_retries={} undelivered={} flagged={}",
            self.commands_handled,
            self.commands_rejected,
            self.commands_failed,
            self.messages_busy,
            self.ticks_applied,
            self.tick_retries,
            self.tick_failures,
            self.deliveries_sent,
            self.delivery_retries,
            self.deliveries_failed,
            self.players_flagged
        )
    }
}
