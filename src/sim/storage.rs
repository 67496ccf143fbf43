//! Player persistence and the per-player session lock.
//!
//! Records live in a [`StateBackend`]: sled on disk in production, a plain
//! map in tests. [`PetStore`] sits on top, owns the bincode codec and the
//! load-time invariant checks, and hands out exclusive access to one
//! player at a time through [`PetStore::with_lock`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use log::{debug, error, warn};

use crate::logutil::redact_identity;
use crate::metrics;
use crate::sim::errors::{ErrorClass, PetError};
use crate::sim::rules::SimRules;
use crate::sim::types::{PlayerId, PlayerRecord, PLAYER_SCHEMA_VERSION};

const TREE_PLAYERS: &str = "players";
const TREE_FLAGGED: &str = "flagged";
const LOCK_FILE: &str = "tinypet.lock";

/// Raw record storage. Implementations only move bytes; decoding and
/// validation happen in [`PetStore`].
pub trait StateBackend: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, PetError>;
    fn put(&self, id: &str, bytes: Vec<u8>) -> Result<(), PetError>;
    fn player_ids(&self) -> Result<Vec<String>, PetError>;
    fn flag(&self, id: &str, reason: &str) -> Result<(), PetError>;
    /// Returns true when a flag was present.
    fn unflag(&self, id: &str) -> Result<bool, PetError>;
    fn flag_reason(&self, id: &str) -> Result<Option<String>, PetError>;
    fn flagged(&self) -> Result<Vec<(String, String)>, PetError>;
}

/// Sled-backed record storage.
pub struct SledBackend {
    _db: sled::Db,
    players: sled::Tree,
    flagged: sled::Tree,
    _lock: File,
}

impl SledBackend {
    /// Open (or create) the database rooted at `path`. Fails if another
    /// process already holds the directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PetError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path_ref.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|e| {
            PetError::Internal(format!(
                "data directory {} is in use by another process: {}",
                path_ref.display(),
                e
            ))
        })?;
        let db = sled::open(path_ref.join("db"))?;
        let players = db.open_tree(TREE_PLAYERS)?;
        let flagged = db.open_tree(TREE_FLAGGED)?;
        Ok(Self {
            _db: db,
            players,
            flagged,
            _lock: lock,
        })
    }

    fn players_key(id: &str) -> Vec<u8> {
        format!("players:{}", id).into_bytes()
    }
}

impl StateBackend for SledBackend {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, PetError> {
        Ok(self.players.get(Self::players_key(id))?.map(|v| v.to_vec()))
    }

    fn put(&self, id: &str, bytes: Vec<u8>) -> Result<(), PetError> {
        self.players.insert(Self::players_key(id), bytes)?;
        self.players.flush()?;
        Ok(())
    }

    fn player_ids(&self) -> Result<Vec<String>, PetError> {
        let mut ids = Vec::new();
        for entry in self.players.scan_prefix(b"players:") {
            let (key, _) = entry?;
            let text = std::str::from_utf8(&key)
                .map_err(|e| PetError::Internal(format!("non-utf8 player key: {}", e)))?;
            if let Some(id) = text.strip_prefix("players:") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    fn flag(&self, id: &str, reason: &str) -> Result<(), PetError> {
        self.flagged.insert(id.as_bytes(), reason.as_bytes())?;
        self.flagged.flush()?;
        Ok(())
    }

    fn unflag(&self, id: &str) -> Result<bool, PetError> {
        let had = self.flagged.remove(id.as_bytes())?.is_some();
        self.flagged.flush()?;
        Ok(had)
    }

    fn flag_reason(&self, id: &str) -> Result<Option<String>, PetError> {
        Ok(self
            .flagged
            .get(id.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn flagged(&self) -> Result<Vec<(String, String)>, PetError> {
        let mut out = Vec::new();
        for entry in self.flagged.iter() {
            let (key, value) = entry?;
            out.push((
                String::from_utf8_lossy(&key).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            ));
        }
        Ok(out)
    }
}

/// In-memory record storage with switchable outages, for tests and dry runs.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Vec<u8>>>,
    flags: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
    failures_left: AtomicUsize,
    writes: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`PetError::Unavailable`] until reset.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Fail the next `n` operations, then recover.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PetError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PetError::Unavailable("memory backend offline".to_string()));
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(PetError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn guard<T>(lock: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, PetError> {
        lock.lock()
            .map_err(|_| PetError::Internal("memory backend poisoned".to_string()))
    }
}

impl StateBackend for MemoryBackend {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, PetError> {
        self.check()?;
        Ok(Self::guard(&self.records)?.get(id).cloned())
    }

    fn put(&self, id: &str, bytes: Vec<u8>) -> Result<(), PetError> {
        self.check()?;
        Self::guard(&self.records)?.insert(id.to_string(), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn player_ids(&self) -> Result<Vec<String>, PetError> {
        self.check()?;
        let mut ids: Vec<String> = Self::guard(&self.records)?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn flag(&self, id: &str, reason: &str) -> Result<(), PetError> {
        Self::guard(&self.flags)?.insert(id.to_string(), reason.to_string());
        Ok(())
    }

    fn unflag(&self, id: &str) -> Result<bool, PetError> {
        Ok(Self::guard(&self.flags)?.remove(id).is_some())
    }

    fn flag_reason(&self, id: &str) -> Result<Option<String>, PetError> {
        Ok(Self::guard(&self.flags)?.get(id).cloned())
    }

    fn flagged(&self) -> Result<Vec<(String, String)>, PetError> {
        let mut out: Vec<(String, String)> = Self::guard(&self.flags)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort();
        Ok(out)
    }
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct PetStoreBuilder {
    path: PathBuf,
    rules: SimRules,
}

impl PetStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rules: SimRules::default(),
        }
    }

    /// Rules used to validate records on load.
    pub fn rules(mut self, rules: SimRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn open(self) -> Result<PetStore, PetError> {
        let backend = SledBackend::open(&self.path)?;
        Ok(PetStore::with_backend(Arc::new(backend), self.rules))
    }
}

type SessionLock = Arc<tokio::sync::Mutex<()>>;

/// Player store with per-player session locks.
pub struct PetStore {
    backend: Arc<dyn StateBackend>,
    rules: SimRules,
    sessions: Mutex<HashMap<PlayerId, SessionLock>>,
}

impl PetStore {
    pub fn with_backend(backend: Arc<dyn StateBackend>, rules: SimRules) -> Self {
        Self {
            backend,
            rules,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn rules(&self) -> &SimRules {
        &self.rules
    }

    pub fn encode(record: &PlayerRecord) -> Result<Vec<u8>, PetError> {
        Ok(bincode::serialize(record)?)
    }

    /// Decode and validate a stored record. Anything that does not decode
    /// cleanly into a structurally sound record is corrupt. Levels above the
    /// current caps are clamped, not rejected: they only mean the caps were
    /// lowered since the record was written.
    pub fn decode(
        id: &PlayerId,
        bytes: &[u8],
        rules: &SimRules,
    ) -> Result<PlayerRecord, PetError> {
        let mut record: PlayerRecord = bincode::deserialize(bytes).map_err(|e| PetError::Corrupt {
            player: id.to_string(),
            reason: format!("undecodable record: {}", e),
        })?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(PetError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        if &record.id != id {
            return Err(PetError::Corrupt {
                player: id.to_string(),
                reason: format!("record belongs to {}", record.id),
            });
        }
        record
            .check_invariants()
            .map_err(|reason| PetError::Corrupt {
                player: id.to_string(),
                reason,
            })?;
        if record.world.conform(rules) {
            debug!("{}: levels clamped to current rules", redact_identity(id.as_str()));
        }
        Ok(record)
    }

    /// Load a player record without taking its session lock.
    pub fn load(&self, id: &PlayerId) -> Result<PlayerRecord, PetError> {
        if self.backend.flag_reason(id.as_str())?.is_some() {
            return Err(PetError::Quarantined(id.to_string()));
        }
        let Some(bytes) = self.backend.get(id.as_str())? else {
            return Err(PetError::NotFound(format!("player: {}", id)));
        };
        Self::decode(id, &bytes, &self.rules)
    }

    /// Atomically replace the stored record.
    pub fn save(&self, record: &PlayerRecord) -> Result<(), PetError> {
        let mut record = record.clone();
        record.schema_version = PLAYER_SCHEMA_VERSION;
        let bytes = Self::encode(&record)?;
        self.backend.put(record.id.as_str(), bytes)
    }

    /// List all stored player identities.
    pub fn list_player_ids(&self) -> Result<Vec<PlayerId>, PetError> {
        Ok(self
            .backend
            .player_ids()?
            .iter()
            .filter_map(|raw| PlayerId::parse(raw))
            .collect())
    }

    pub fn is_flagged(&self, id: &PlayerId) -> Result<bool, PetError> {
        Ok(self.backend.flag_reason(id.as_str())?.is_some())
    }

    pub fn flagged(&self) -> Result<Vec<(String, String)>, PetError> {
        self.backend.flagged()
    }

    /// Clear a quarantine flag after the record was repaired by hand.
    pub fn release(&self, id: &PlayerId) -> Result<bool, PetError> {
        self.backend.unflag(id.as_str())
    }

    fn flag(&self, id: &PlayerId, err: &PetError) {
        error!(
            "flagging player {} for inspection: {}",
            redact_identity(id.as_str()),
            err
        );
        metrics::inc_players_flagged();
        if let Err(e) = self.backend.flag(id.as_str(), &err.to_string()) {
            warn!("could not persist flag for {}: {}", redact_identity(id.as_str()), e);
        }
    }

    fn session_lock(&self, id: &PlayerId) -> Result<SessionLock, PetError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| PetError::Internal("session table poisoned".to_string()))?;
        Ok(sessions.entry(id.clone()).or_default().clone())
    }

    /// Drop the table entry once nobody else holds or waits on it.
    fn forget_session(&self, id: &PlayerId) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(lock) = sessions.get(id) {
                if Arc::strong_count(lock) == 1 {
                    sessions.remove(id);
                }
            }
        }
    }

    /// Run `f` on the freshly loaded record while holding the player's
    /// session lock. The record is saved only when `f` returns `Ok` and
    /// changed something; on any error (or a panic inside `f`) the stored
    /// state is left as it was. The lock is released on every path.
    pub async fn with_lock<T, F>(&self, id: &PlayerId, f: F) -> Result<T, PetError>
    where
        F: FnOnce(&mut PlayerRecord) -> Result<T, PetError>,
    {
        let (value, _) = self.locked(id, None::<fn() -> PlayerRecord>, f).await?;
        Ok(value)
    }

    /// Like [`with_lock`](Self::with_lock) but creates the record with
    /// `make` when the player is new. Also reports whether it was created.
    pub async fn with_lock_or_insert<T, M, F>(
        &self,
        id: &PlayerId,
        make: M,
        f: F,
    ) -> Result<(T, bool), PetError>
    where
        M: FnOnce() -> PlayerRecord,
        F: FnOnce(&mut PlayerRecord) -> Result<T, PetError>,
    {
        self.locked(id, Some(make), f).await
    }

    async fn locked<T, M, F>(
        &self,
        id: &PlayerId,
        make: Option<M>,
        f: F,
    ) -> Result<(T, bool), PetError>
    where
        M: FnOnce() -> PlayerRecord,
        F: FnOnce(&mut PlayerRecord) -> Result<T, PetError>,
    {
        let lock = self.session_lock(id)?;
        let result = {
            let _guard = lock.lock().await;
            debug!("session lock acquired for {}", redact_identity(id.as_str()));
            self.run_locked(id, make, f)
        };
        drop(lock);
        self.forget_session(id);
        result
    }

    fn run_locked<T, M, F>(
        &self,
        id: &PlayerId,
        make: Option<M>,
        f: F,
    ) -> Result<(T, bool), PetError>
    where
        M: FnOnce() -> PlayerRecord,
        F: FnOnce(&mut PlayerRecord) -> Result<T, PetError>,
    {
        let (mut record, created) = match (self.load(id), make) {
            (Ok(record), _) => (record, false),
            (Err(PetError::NotFound(_)), Some(make)) => (make(), true),
            (Err(err), _) => {
                let already_known = matches!(err, PetError::Quarantined(_) | PetError::NotFound(_));
                if err.class() == ErrorClass::Fatal && !already_known {
                    self.flag(id, &err);
                }
                return Err(err);
            }
        };
        let original = (!created).then(|| record.clone());
        let value = f(&mut record)?;
        if original.as_ref() == Some(&record) {
            return Ok((value, created));
        }
        if let Err(reason) = record.check_invariants() {
            let err = PetError::Internal(format!("refusing to save invalid state: {}", reason));
            error!("{}: {}", redact_identity(id.as_str()), err);
            return Err(err);
        }
        self.save(&record)?;
        Ok((value, created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::items::Item;
    use crate::sim::types::{GrowthStage, Needs, World};
    use chrono::Utc;
    use tempfile::TempDir;

    fn new_record(id: &PlayerId) -> PlayerRecord {
        PlayerRecord::new(id.clone(), Utc::now(), World::new("Feini", &SimRules::default()))
    }

    fn memory_store() -> (PetStore, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let store = PetStore::with_backend(backend.clone(), SimRules::default());
        (store, backend)
    }

    #[test]
    fn sled_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let store = PetStoreBuilder::new(dir.path()).open().expect("open");
        let id = PlayerId::new("telegram", "7");
        let record = new_record(&id);
        store.save(&record).expect("save");
        assert_eq!(store.load(&id).expect("load"), record);
        assert_eq!(store.list_player_ids().expect("ids"), vec![id]);
    }

    #[test]
    fn second_process_cannot_open_same_dir() {
        let dir = TempDir::new().expect("tempdir");
        let _first = PetStoreBuilder::new(dir.path()).open().expect("open");
        assert!(PetStoreBuilder::new(dir.path()).open().is_err());
    }

    #[test]
    fn missing_player_is_not_found() {
        let (store, _) = memory_store();
        let err = store.load(&PlayerId::new("irc", "nobody")).unwrap_err();
        assert!(matches!(err, PetError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_closure_saves_nothing() {
        let (store, backend) = memory_store();
        let id = PlayerId::new("irc", "ann");
        store.save(&new_record(&id)).expect("seed");
        let writes = backend.writes();
        let res: Result<(), PetError> = store
            .with_lock(&id, |rec| {
                rec.world.pet.name = "Changed".into();
                Err(PetError::Internal("boom".into()))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(backend.writes(), writes);
        assert_eq!(store.load(&id).expect("load").world.pet.name, "Feini");
    }

    #[tokio::test]
    async fn lock_released_after_error() {
        let (store, _) = memory_store();
        let id = PlayerId::new("irc", "ann");
        store.save(&new_record(&id)).expect("seed");
        let _ = store
            .with_lock(&id, |_| Err::<(), _>(PetError::Internal("x".into())))
            .await;
        let name = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            store.with_lock(&id, |rec| Ok(rec.world.pet.name.clone())),
        )
        .await
        .expect("lock was not released")
        .expect("with_lock");
        assert_eq!(name, "Feini");
    }

    #[tokio::test]
    async fn unavailable_backend_is_transient() {
        let (store, backend) = memory_store();
        let id = PlayerId::new("irc", "ann");
        backend.set_unavailable(true);
        let err = store
            .with_lock_or_insert(&id, || new_record(&id), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        backend.set_unavailable(false);
        let (_, created) = store
            .with_lock_or_insert(&id, || new_record(&id), |_| Ok(()))
            .await
            .expect("recovered");
        assert!(created);
    }

    #[tokio::test]
    async fn corrupt_record_is_flagged_not_repaired() {
        let (store, backend) = memory_store();
        let id = PlayerId::new("irc", "ann");
        let mut record = new_record(&id);
        record.world.tools.insert(Item::Carrot);
        backend
            .put(id.as_str(), PetStore::encode(&record).expect("encode"))
            .expect("put");
        let err = store.with_lock(&id, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, PetError::Corrupt { .. }));
        assert!(store.is_flagged(&id).expect("flag"));
        let again = store.with_lock(&id, |_| Ok(())).await.unwrap_err();
        assert!(matches!(again, PetError::Quarantined(_)));
        let raw = backend.get(id.as_str()).expect("get").expect("still stored");
        let decoded: PlayerRecord = bincode::deserialize(&raw).expect("decode");
        assert!(decoded.world.tools.contains(&Item::Carrot));
    }

    #[tokio::test]
    async fn retuned_rules_do_not_quarantine_existing_players() {
        let backend = Arc::new(MemoryBackend::new());
        let id = PlayerId::new("irc", "ann");
        let old_rules = SimRules::default();
        let mut record = new_record(&id);
        record.world.pet.stage = GrowthStage::Hatchling;
        record.world.pet.care = 1;
        record.world.pet.fur = old_rules.fur_max;
        record.world.pet.needs = Needs::full(old_rules.max_level);
        PetStore::with_backend(backend.clone(), old_rules)
            .save(&record)
            .expect("save under old rules");

        let mut stricter = SimRules::default();
        stricter.hatch.min_care = 5;
        stricter.max_level = 60;
        stricter.fur_max = 3;
        let store = PetStore::with_backend(backend, stricter.clone());
        let seen = store
            .with_lock(&id, |rec| Ok(rec.world.clone()))
            .await
            .expect("record still loads");
        assert!(!store.is_flagged(&id).expect("flag"));
        assert_eq!(seen.pet.stage, GrowthStage::Hatchling);
        assert_eq!(seen.pet.needs, Needs::full(stricter.max_level));
        assert_eq!(seen.pet.fur, stricter.fur_max);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sessions_never_lose_an_update() {
        let (store, _) = memory_store();
        let store = Arc::new(store);
        let id = PlayerId::new("irc", "ann");
        store.save(&new_record(&id)).expect("seed");

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    store
                        .with_lock(&id, |rec| {
                            rec.world.pet.care += 1;
                            Ok(())
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("update");
        }
        assert_eq!(store.load(&id).expect("load").world.pet.care, 20);
        assert!(store.sessions.lock().expect("table").is_empty());
    }

    #[tokio::test]
    async fn garbage_bytes_are_corrupt() {
        let (store, backend) = memory_store();
        let id = PlayerId::new("irc", "ann");
        backend.put(id.as_str(), vec![1, 2, 3]).expect("put");
        let err = store.with_lock(&id, |_| Ok(())).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(store.release(&id).expect("release"));
    }

    #[tokio::test]
    async fn unchanged_record_is_not_rewritten() {
        let (store, backend) = memory_store();
        let id = PlayerId::new("irc", "ann");
        store.save(&new_record(&id)).expect("seed");
        let writes = backend.writes();
        store.with_lock(&id, |_| Ok(())).await.expect("noop");
        assert_eq!(backend.writes(), writes);
        store
            .with_lock(&id, |rec| {
                rec.active = false;
                Ok(())
            })
            .await
            .expect("write");
        assert_eq!(backend.writes(), writes + 1);
    }

    #[tokio::test]
    async fn session_table_is_pruned() {
        let (store, _) = memory_store();
        let id = PlayerId::new("irc", "ann");
        store
            .with_lock_or_insert(&id, || new_record(&id), |_| Ok(()))
            .await
            .expect("insert");
        assert!(store.sessions.lock().expect("table").is_empty());
    }
}
