use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hike::Hike;
use super::inventory::Inventory;
use super::items::{Item, ItemCategory};
use super::rules::SimRules;
use super::story::{SewingChapter, Visitor};

pub const PLAYER_SCHEMA_VERSION: u8 = 1;

/// Opaque player identity, `"<adapter>:<chat>"`.
///
/// The adapter prefix is how background notices find their way back to the
/// messenger the player uses.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(adapter: &str, chat: &str) -> Self {
        Self(format!("{}:{}", adapter, chat))
    }

    /// Parse a stored or user-supplied identity. Both halves must be present.
    pub fn parse(raw: &str) -> Option<Self> {
        let (adapter, chat) = raw.split_once(':')?;
        if adapter.is_empty() || chat.is_empty() {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn adapter(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or(&self.0)
    }

    pub fn chat(&self) -> &str {
        self.0.split_once(':').map(|(_, c)| c).unwrap_or("")
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GrowthStage {
    Egg,
    Hatchling,
    Juvenile,
    Adult,
}

impl GrowthStage {
    pub fn next(self) -> Option<GrowthStage> {
        match self {
            GrowthStage::Egg => Some(GrowthStage::Hatchling),
            GrowthStage::Hatchling => Some(GrowthStage::Juvenile),
            GrowthStage::Juvenile => Some(GrowthStage::Adult),
            GrowthStage::Adult => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GrowthStage::Egg => "egg",
            GrowthStage::Hatchling => "hatchling",
            GrowthStage::Juvenile => "juvenile",
            GrowthStage::Adult => "adult",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            GrowthStage::Egg => "🥚",
            GrowthStage::Hatchling => "🐣",
            GrowthStage::Juvenile => "🐶",
            GrowthStage::Adult => "🐕",
        }
    }

    /// Blueprints learned when the pet reaches this stage.
    pub fn unlocks(self) -> &'static [Item] {
        match self {
            GrowthStage::Egg => &[Item::Axe],
            GrowthStage::Hatchling => &[Item::Scissors, Item::Boomerang, Item::Ball],
            GrowthStage::Juvenile => &[Item::Pan, Item::Teddy, Item::Plant, Item::Compass],
            GrowthStage::Adult => &[Item::Couch, Item::Fountain],
        }
    }

    /// One-time present for reaching this stage. Never perishable, so it
    /// cannot interact with spoiling during a catch-up.
    pub fn gift(self) -> &'static [(Item, u32)] {
        match self {
            GrowthStage::Egg => &[],
            GrowthStage::Hatchling => &[(Item::Stone, 1)],
            GrowthStage::Juvenile => &[(Item::Wool, 3)],
            GrowthStage::Adult => &[(Item::Wood, 4), (Item::Stone, 4)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Need {
    Hunger,
    Energy,
    Affection,
    Hygiene,
}

impl Need {
    pub const ALL: [Need; 4] = [Need::Hunger, Need::Energy, Need::Affection, Need::Hygiene];

    pub fn label(self) -> &'static str {
        match self {
            Need::Hunger => "hunger",
            Need::Energy => "energy",
            Need::Affection => "affection",
            Need::Hygiene => "hygiene",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Need::Hunger => "🍖",
            Need::Energy => "⚡",
            Need::Affection => "💕",
            Need::Hygiene => "🫧",
        }
    }
}

/// Need levels. Full is `SimRules::max_level`, zero is the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: u32,
    pub energy: u32,
    pub affection: u32,
    pub hygiene: u32,
}

impl Needs {
    pub fn full(max: u32) -> Self {
        Self {
            hunger: max,
            energy: max,
            affection: max,
            hygiene: max,
        }
    }

    pub fn get(&self, need: Need) -> u32 {
        match need {
            Need::Hunger => self.hunger,
            Need::Energy => self.energy,
            Need::Affection => self.affection,
            Need::Hygiene => self.hygiene,
        }
    }

    pub fn get_mut(&mut self, need: Need) -> &mut u32 {
        match need {
            Need::Hunger => &mut self.hunger,
            Need::Energy => &mut self.energy,
            Need::Affection => &mut self.affection,
            Need::Hygiene => &mut self.hygiene,
        }
    }

    /// Raise a need by `amount`, clamped to `max`.
    pub fn raise(&mut self, need: Need, amount: u32, max: u32) {
        let level = self.get_mut(need);
        *level = level.saturating_add(amount).min(max);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub name: String,
    pub stage: GrowthStage,
    pub needs: Needs,
    /// Total simulated time the pet has lived through. Every decay and
    /// regrowth boundary is counted against this clock.
    pub age: Duration,
    /// Cumulative care points from petting, feeding, playing and washing.
    pub care: u32,
    pub fur: u32,
    pub clothing: Option<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub furniture: Vec<Item>,
    pub meadow: u32,
    pub woods: u32,
    pub trail: u32,
}

/// The simulated aggregate: everything transitions read and write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub pet: Pet,
    pub inventory: Inventory,
    pub tools: BTreeSet<Item>,
    pub blueprints: BTreeSet<Item>,
    pub room: Room,
    /// Hike in progress, if any.
    pub hike: Option<Hike>,
    pub hikes_done: u32,
    pub visitor: Option<Visitor>,
    pub sewing: SewingChapter,
}

impl World {
    pub fn new(pet_name: &str, rules: &SimRules) -> Self {
        Self {
            pet: Pet {
                name: pet_name.to_string(),
                stage: GrowthStage::Egg,
                needs: Needs::full(rules.max_level),
                age: Duration::ZERO,
                care: 0,
                fur: 0,
                clothing: None,
            },
            inventory: Inventory::new(),
            tools: [Item::Basket, Item::Sponge, Item::Hammer].into_iter().collect(),
            blueprints: GrowthStage::Egg.unlocks().iter().copied().collect(),
            room: Room {
                furniture: Vec::new(),
                meadow: rules.meadow_max,
                woods: rules.woods_max,
                trail: rules.trail_max,
            },
            hike: None,
            hikes_done: 0,
            visitor: None,
            sewing: SewingChapter::Scissors,
        }
    }

    pub fn hatched(&self) -> bool {
        self.pet.stage > GrowthStage::Egg
    }

    /// Check the structural invariants a persisted world must satisfy. A
    /// violation means the record is corrupt; it is reported, never patched.
    /// Nothing here reads [`SimRules`], so retuning the simulation can never
    /// turn a healthy record into a corrupt one.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.pet.name.trim().is_empty() {
            return Err("pet has no name".to_string());
        }
        if let Some(item) = self.tools.iter().find(|item| item.category() != ItemCategory::Tool) {
            return Err(format!("{:?} stored as a tool", item));
        }
        if let Some(item) = self
            .room
            .furniture
            .iter()
            .find(|item| item.category() != ItemCategory::Furniture)
        {
            return Err(format!("{:?} placed as furniture", item));
        }
        if let Some(item) = self.blueprints.iter().find(|item| item.blueprint().is_none()) {
            return Err(format!("blueprint for uncraftable {:?}", item));
        }
        if let Some(item) = self
            .pet
            .clothing
            .filter(|item| item.category() != ItemCategory::Clothing)
        {
            return Err(format!("pet is wearing {:?}", item));
        }
        Ok(())
    }

    /// Pull levels back under the caps of the current rules. Used when a
    /// record saved under older, looser rules is loaded. Returns true when
    /// anything changed.
    pub fn conform(&mut self, rules: &SimRules) -> bool {
        let mut changed = false;
        let mut clamp = |level: &mut u32, cap: u32| {
            if *level > cap {
                *level = cap;
                changed = true;
            }
        };
        for need in Need::ALL {
            clamp(self.pet.needs.get_mut(need), rules.max_level);
        }
        clamp(&mut self.pet.fur, rules.fur_max);
        clamp(&mut self.room.meadow, rules.meadow_max);
        clamp(&mut self.room.woods, rules.woods_max);
        clamp(&mut self.room.trail, rules.trail_max);
        changed
    }
}

/// Follow-up the interpreter is waiting for. `None` on the record is Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pending {
    UseTarget { item: Item },
    CraftBlueprint,
    PetName,
    SewPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TutorialChapter {
    Start,
    Touch,
    Gather,
    Feed,
    Craft,
    Done,
}

/// Persisted root of one player's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Wall-clock instant up to which `world` has been simulated.
    pub last_simulated: DateTime<Utc>,
    /// Cleared when the player's messenger account becomes unreachable.
    pub active: bool,
    pub pending: Option<Pending>,
    pub tutorial: TutorialChapter,
    pub world: World,
    pub schema_version: u8,
}

impl PlayerRecord {
    pub fn new(id: PlayerId, now: DateTime<Utc>, world: World) -> Self {
        Self {
            id,
            created_at: now,
            last_active: now,
            last_simulated: now,
            active: true,
            pending: None,
            tutorial: TutorialChapter::Start,
            world,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.last_simulated < self.created_at {
            return Err("simulated before it was created".to_string());
        }
        self.world.check_invariants()
    }
}
