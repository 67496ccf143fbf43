/// Inventory bookkeeping: item counts owned by one player
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::items::Item;

/// Mapping from item to quantity. Zero counts are never stored, so two
/// inventories holding the same items always compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    counts: BTreeMap<Item, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: &[(Item, u32)]) -> Self {
        let mut inv = Self::new();
        for (item, count) in items {
            inv.add(*item, *count);
        }
        inv
    }

    pub fn count(&self, item: Item) -> u32 {
        self.counts.get(&item).copied().unwrap_or(0)
    }

    pub fn has(&self, item: Item, quantity: u32) -> bool {
        self.count(item) >= quantity
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn add(&mut self, item: Item, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let entry = self.counts.entry(item).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// Remove `quantity` of `item`. Returns false, leaving the inventory
    /// untouched, when there is not enough.
    pub fn remove(&mut self, item: Item, quantity: u32) -> bool {
        let have = self.count(item);
        if have < quantity {
            return false;
        }
        self.set(item, have - quantity);
        true
    }

    /// Remove up to `quantity`, flooring at zero. Returns how many went.
    pub fn remove_up_to(&mut self, item: Item, quantity: u32) -> u32 {
        let have = self.count(item);
        let gone = have.min(quantity);
        self.set(item, have - gone);
        gone
    }

    /// True when every listed material is present in the needed amount.
    pub fn covers(&self, materials: &[(Item, u32)]) -> bool {
        materials.iter().all(|(item, n)| self.has(*item, *n))
    }

    /// Remove a whole material list, or nothing at all.
    pub fn consume(&mut self, materials: &[(Item, u32)]) -> bool {
        if !self.covers(materials) {
            return false;
        }
        for (item, n) in materials {
            self.remove(*item, *n);
        }
        true
    }

    pub fn first_food(&self) -> Option<Item> {
        self.iter()
            .map(|(item, _)| item)
            .find(|item| item.is_food())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Item, u32)> + '_ {
        self.counts.iter().map(|(item, count)| (*item, *count))
    }

    fn set(&mut self, item: Item, count: u32) {
        if count == 0 {
            self.counts.remove(&item);
        } else {
            self.counts.insert(item, count);
        }
    }
}

/// Compact one-line listing in catalog order, e.g. `🥕×2 🪨 🧶×3`.
pub fn format_inventory_compact(inventory: &Inventory) -> String {
    if inventory.is_empty() {
        return "empty".to_string();
    }
    inventory
        .iter()
        .map(|(item, count)| {
            if count > 1 {
                format!("{}×{}", item.emoji(), count)
            } else {
                item.emoji().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
