//! Sled-backed store: records survive restarts bit for bit, the data
//! directory is exclusive, and background passes work against real files.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::mpsc;

use tinypet::sim::scheduler::run_pass;
use tinypet::sim::{
    catch_up, GrowthStage, Hike, Item, Pending, PetStore, PetStoreBuilder, PlayerId, PlayerRecord,
    SewingChapter, SimRules, TickConfig, TutorialChapter, Visitor, World,
};

fn open(dir: &TempDir) -> PetStore {
    PetStoreBuilder::new(dir.path()).open().unwrap()
}

fn busy_record(id: &PlayerId, rules: &SimRules) -> PlayerRecord {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
    let mut world = World::new("Pebble", rules);
    world.pet.stage = GrowthStage::Juvenile;
    world.pet.care = 20;
    world.pet.age = Duration::from_secs(90_000);
    world.pet.fur = 3;
    world.inventory.add(Item::Carrot, 3);
    world.inventory.add(Item::Wool, 2);
    world.tools.insert(Item::Axe);
    world.blueprints.insert(Item::Teddy);
    world.room.furniture.push(Item::Ball);
    world.room.meadow = 2;
    world.pet.clothing = Some(Item::Scarf);
    world.tools.insert(Item::Compass);
    world.hike = Some(Hike::generate(9, true));
    world.visitor = Some(Visitor::ghost());
    world.sewing = SewingChapter::Quest;
    let mut record = PlayerRecord::new(id.clone(), start, world);
    record.pending = Some(Pending::UseTarget { item: Item::Sponge });
    record.tutorial = TutorialChapter::Craft;
    record
}

#[test]
fn record_survives_reopen_unchanged() {
    let dir = TempDir::new().unwrap();
    let rules = SimRules::default();
    let id = PlayerId::new("irc", "#garden");
    let record = busy_record(&id, &rules);
    {
        let store = open(&dir);
        store.save(&record).unwrap();
    }
    let store = open(&dir);
    assert_eq!(store.load(&id).unwrap(), record);
    assert_eq!(store.list_player_ids().unwrap(), vec![id]);
}

#[test]
fn data_directory_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let _first = open(&dir);
    assert!(PetStoreBuilder::new(dir.path()).open().is_err());
}

#[tokio::test]
async fn quarantine_flag_survives_restart() {
    let dir = TempDir::new().unwrap();
    let rules = SimRules::default();
    let id = PlayerId::new("telegram", "77");
    {
        let store = open(&dir);
        let mut record = busy_record(&id, &rules);
        record.world.room.furniture.push(Item::Wool);
        store.save(&record).unwrap();
        let result = store.with_lock(&id, |_| Ok(())).await;
        assert!(result.is_err());
        assert!(store.is_flagged(&id).unwrap());
    }
    let store = open(&dir);
    assert!(store.is_flagged(&id).unwrap());
    assert_eq!(store.flagged().unwrap().len(), 1);
    assert!(store.release(&id).unwrap());
    assert!(!store.is_flagged(&id).unwrap());
}

#[tokio::test]
async fn catching_up_in_two_sessions_matches_one() {
    let rules = SimRules::default();
    let id = PlayerId::new("telegram", "5");
    let record = busy_record(&id, &rules);
    let halfway = record.last_simulated + chrono::Duration::seconds(4_321);
    let end = record.last_simulated + chrono::Duration::seconds(9 * 3_600 + 17);

    let mut once = record.clone();
    catch_up(&mut once, end, &rules);

    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.save(&record).unwrap();
        store
            .with_lock(&id, |rec| {
                catch_up(rec, halfway, &rules);
                Ok(())
            })
            .await
            .unwrap();
    }
    let store = open(&dir);
    store
        .with_lock(&id, |rec| {
            catch_up(rec, end, &rules);
            Ok(())
        })
        .await
        .unwrap();
    let twice = store.load(&id).unwrap();
    assert_eq!(twice.world, once.world);
    assert_eq!(twice.last_simulated, end);
}

#[tokio::test]
async fn tick_pass_against_sled_decays_and_notifies() {
    let dir = TempDir::new().unwrap();
    let rules = SimRules::default();
    let store = Arc::new(open(&dir));
    let id = PlayerId::new("irc", "dana");
    let record = busy_record(&id, &rules);
    let start = record.last_simulated;
    store.save(&record).unwrap();

    let cfg = TickConfig {
        interval: Duration::from_secs(3600),
        max_workers: 4,
        retry_attempts: 1,
        retry_base: Duration::from_millis(1),
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let later = start + chrono::Duration::days(2);
    let report = run_pass(&cfg, &store, later, &tx).await;
    assert_eq!(report.ticked, 1);

    let after = store.load(&id).unwrap();
    assert_eq!(after.world.pet.needs.hunger, 0);
    assert!(after.world.pet.age > record.world.pet.age);
    assert!(after.world.pet.stage >= record.world.pet.stage);
    // One spoil period crossed: one carrot lost.
    assert_eq!(after.world.inventory.count(Item::Carrot), 2);
    assert_eq!(after.world.inventory.count(Item::Wool), 2);

    let mut texts = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        assert_eq!(notice.player, id);
        texts.push(notice.text);
    }
    assert!(texts.iter().any(|t| t.contains("hungry")), "notices: {:?}", texts);
    assert!(texts.iter().any(|t| t.contains("went bad")), "notices: {:?}", texts);
}
