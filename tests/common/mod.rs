#![allow(dead_code)]

mod memory_adapter;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use tinypet::config::Config;
use tinypet::gateway::{Adapter, Gateway};
use tinypet::sim::{
    GrowthStage, Item, MemoryBackend, PetStore, PlayerId, PlayerRecord, SimRules, World,
};

pub use memory_adapter::MemoryAdapter;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.gateway.delivery_backoff_ms = 1;
    config.scheduler.retry_base_ms = 1;
    config
}

pub fn memory_store(rules: SimRules) -> (Arc<MemoryBackend>, Arc<PetStore>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(PetStore::with_backend(backend.clone(), rules));
    (backend, store)
}

/// A hatched pet with some room to eat, play and be petted.
pub fn hatched_record(id: &PlayerId, rules: &SimRules) -> PlayerRecord {
    let mut world = World::new("Feini", rules);
    world.pet.stage = GrowthStage::Hatchling;
    world.pet.care = 1;
    world.pet.needs.hunger = 50;
    world.pet.needs.affection = 50;
    world.inventory.add(Item::Carrot, 1);
    PlayerRecord::new(id.clone(), Utc::now(), world)
}

pub struct Running {
    pub gateway: Arc<Gateway>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

/// Serve the gateway in the background with one memory adapter.
pub fn serve(gateway: Gateway, adapter: Arc<MemoryAdapter>) -> Running {
    let gateway = Arc::new(gateway);
    let (stop, stopped) = oneshot::channel::<()>();
    let serving = gateway.clone();
    let adapters: Vec<Arc<dyn Adapter>> = vec![adapter];
    let task = tokio::spawn(async move {
        serving
            .serve(adapters, async {
                let _ = stopped.await;
            })
            .await
    });
    Running {
        gateway,
        stop: Some(stop),
        task,
    }
}
