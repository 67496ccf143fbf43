//! Item catalog: every object a player can hold, place or craft.
//!
//! Items are a closed enum so inventories stay compact in bincode and can be
//! matched exhaustively. Each item has an emoji (its canonical display form)
//! and a word name; both are accepted from chat, along with the handful of
//! look-alike emoji that messenger keyboards tend to produce.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Item {
    Carrot,
    Stew,
    Stone,
    Wood,
    Wool,
    Basket,
    Sponge,
    Hammer,
    Axe,
    Scissors,
    Pan,
    Boomerang,
    Ball,
    Teddy,
    Couch,
    Plant,
    Fountain,
    // Appended so the bincode tags of the items above never shift.
    Needle,
    Compass,
    Cap,
    SunHat,
    Headphones,
    Glasses,
    Sunglasses,
    Goggles,
    Scarf,
    Ribbon,
    Ring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCategory {
    Food,
    Resource,
    Tool,
    Furniture,
    Clothing,
}

impl Item {
    pub const ALL: [Item; 28] = [
        Item::Carrot,
        Item::Stew,
        Item::Stone,
        Item::Wood,
        Item::Wool,
        Item::Basket,
        Item::Sponge,
        Item::Hammer,
        Item::Axe,
        Item::Scissors,
        Item::Pan,
        Item::Boomerang,
        Item::Ball,
        Item::Teddy,
        Item::Couch,
        Item::Plant,
        Item::Fountain,
        Item::Needle,
        Item::Compass,
        Item::Cap,
        Item::SunHat,
        Item::Headphones,
        Item::Glasses,
        Item::Sunglasses,
        Item::Goggles,
        Item::Scarf,
        Item::Ribbon,
        Item::Ring,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            Item::Carrot => "🥕",
            Item::Stew => "🍲",
            Item::Stone => "🪨",
            Item::Wood => "🪵",
            Item::Wool => "🧶",
            Item::Basket => "🧺",
            Item::Sponge => "🧽",
            Item::Hammer => "🔨",
            Item::Axe => "🪓",
            Item::Scissors => "✂️",
            Item::Pan => "🍳",
            Item::Boomerang => "🪃",
            Item::Ball => "⚾",
            Item::Teddy => "🧸",
            Item::Couch => "🛋️",
            Item::Plant => "🪴",
            Item::Fountain => "⛲",
            Item::Needle => "🪡",
            Item::Compass => "🧭",
            Item::Cap => "🧢",
            Item::SunHat => "👒",
            Item::Headphones => "🎧",
            Item::Glasses => "👓",
            Item::Sunglasses => "🕶️",
            Item::Goggles => "🥽",
            Item::Scarf => "🧣",
            Item::Ribbon => "🎀",
            Item::Ring => "💍",
        }
    }

    pub fn word(self) -> &'static str {
        match self {
            Item::Carrot => "carrot",
            Item::Stew => "stew",
            Item::Stone => "stone",
            Item::Wood => "wood",
            Item::Wool => "wool",
            Item::Basket => "basket",
            Item::Sponge => "sponge",
            Item::Hammer => "hammer",
            Item::Axe => "axe",
            Item::Scissors => "scissors",
            Item::Pan => "pan",
            Item::Boomerang => "boomerang",
            Item::Ball => "ball",
            Item::Teddy => "teddy",
            Item::Couch => "couch",
            Item::Plant => "plant",
            Item::Fountain => "fountain",
            Item::Needle => "needle",
            Item::Compass => "compass",
            Item::Cap => "cap",
            Item::SunHat => "sunhat",
            Item::Headphones => "headphones",
            Item::Glasses => "glasses",
            Item::Sunglasses => "sunglasses",
            Item::Goggles => "goggles",
            Item::Scarf => "scarf",
            Item::Ribbon => "ribbon",
            Item::Ring => "ring",
        }
    }

    /// Look-alike emoji that should resolve to this item.
    fn alternates(self) -> &'static [&'static str] {
        match self {
            Item::Hammer => &["⚒", "🛠"],
            Item::Sponge => &["🧴", "🧼"],
            Item::Boomerang => &["🥏"],
            Item::Ball => &["🥎"],
            Item::Stew => &["🥘"],
            Item::SunHat => &["hat", "🎩"],
            Item::Headphones => &["headphone"],
            Item::Ribbon => &["bow"],
            Item::Sunglasses => &["shades"],
            _ => &[],
        }
    }

    pub fn category(self) -> ItemCategory {
        match self {
            Item::Carrot | Item::Stew => ItemCategory::Food,
            Item::Stone | Item::Wood | Item::Wool => ItemCategory::Resource,
            Item::Basket
            | Item::Sponge
            | Item::Hammer
            | Item::Axe
            | Item::Scissors
            | Item::Pan
            | Item::Needle
            | Item::Compass => ItemCategory::Tool,
            Item::Boomerang
            | Item::Ball
            | Item::Teddy
            | Item::Couch
            | Item::Plant
            | Item::Fountain => ItemCategory::Furniture,
            Item::Cap
            | Item::SunHat
            | Item::Headphones
            | Item::Glasses
            | Item::Sunglasses
            | Item::Goggles
            | Item::Scarf
            | Item::Ribbon
            | Item::Ring => ItemCategory::Clothing,
        }
    }

    pub fn is_food(self) -> bool {
        self.category() == ItemCategory::Food
    }

    /// Resolve a chat token (emoji, look-alike emoji, word or plural word).
    pub fn from_token(token: &str) -> Option<Item> {
        let token = strip_variation_selectors(token).to_lowercase();
        if token.is_empty() {
            return None;
        }
        Item::ALL.into_iter().find(|item| {
            strip_variation_selectors(item.emoji()) == token
                || item.word() == token
                || token.strip_suffix('s') == Some(item.word())
                || item.alternates().iter().any(|alt| *alt == token)
        })
    }

    /// Materials consumed when crafting this item, if it can be crafted at all.
    pub fn blueprint(self) -> Option<&'static [(Item, u32)]> {
        let materials: &'static [(Item, u32)] = match self {
            Item::Axe => &[(Item::Stone, 1)],
            Item::Scissors => &[(Item::Stone, 3), (Item::Wood, 1)],
            Item::Pan => &[(Item::Stone, 4), (Item::Wood, 1)],
            Item::Boomerang => &[(Item::Wood, 2)],
            Item::Ball => &[(Item::Wood, 2), (Item::Wool, 3)],
            Item::Teddy => &[(Item::Stone, 1), (Item::Wool, 4)],
            Item::Plant => &[(Item::Stone, 2), (Item::Wood, 5)],
            Item::Couch => &[(Item::Stone, 1), (Item::Wood, 4), (Item::Wool, 4)],
            Item::Fountain => &[(Item::Stone, 8)],
            Item::Needle => &[(Item::Wood, 5)],
            Item::Compass => &[(Item::Stone, 4)],
            _ => return None,
        };
        Some(materials)
    }

    /// Sewing pattern for a piece of clothing. Clothing is sewn with the 🪡,
    /// never crafted.
    pub fn pattern(self) -> Option<&'static [(Item, u32)]> {
        let materials: &'static [(Item, u32)] = match self {
            Item::Cap => &[(Item::Wood, 1), (Item::Wool, 3)],
            Item::SunHat => &[(Item::Wood, 4), (Item::Wool, 1)],
            Item::Headphones => &[(Item::Stone, 2), (Item::Wool, 3)],
            Item::Glasses | Item::Sunglasses => &[(Item::Stone, 2), (Item::Wood, 2), (Item::Wool, 1)],
            Item::Goggles => &[(Item::Stone, 2), (Item::Wool, 3)],
            Item::Scarf => &[(Item::Wool, 6)],
            Item::Ribbon => &[(Item::Wool, 4)],
            Item::Ring => &[(Item::Stone, 4), (Item::Wool, 1)],
            _ => return None,
        };
        Some(materials)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

/// Messenger keyboards append U+FE0E/U+FE0F to some emoji and not others.
pub fn strip_variation_selectors(token: &str) -> String {
    token
        .chars()
        .filter(|c| *c != '\u{FE0E}' && *c != '\u{FE0F}')
        .collect()
}

/// Render a material list the way players see it, e.g. `🪨🪨🪵`.
pub fn format_materials(materials: &[(Item, u32)]) -> String {
    let mut out = String::new();
    for (item, count) in materials {
        for _ in 0..*count {
            out.push_str(item.emoji());
        }
    }
    out
}
