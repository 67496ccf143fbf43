//! Pure state transitions, one per verb.
//!
//! Every function takes the current [`World`] by reference and returns either
//! a fresh world plus the reply text, or a [`Rejection`] explaining why
//! nothing happened. None of them look at the wall clock; whatever time they
//! need arrives as an argument.

use thiserror::Error;

use super::clock::{grow, Ambient};
use super::hike::{format_steps, Direction, Hike, Tile, STEPS};
use super::inventory::format_inventory_compact;
use super::items::{format_materials, Item, ItemCategory};
use super::rules::SimRules;
use super::types::{GrowthStage, Need, World};

/// A command that could not be applied. The text is shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("🤔 I don't understand \"{0}\". Send \"help\" for a list of commands.")]
    NotUnderstood(String),
    #[error("{0}")]
    Usage(&'static str),
    #[error("You don't have any {0}.")]
    Missing(Item),
    #[error("You have nothing to eat. Try \"gather\" in the meadow first.")]
    NoFood,
    #[error("{0} is not something to eat.")]
    NotFood(Item),
    #[error("\"{0}\" is not an item I know.")]
    UnknownItem(String),
    #[error("\"{0}\" is not something you can use things on. Try pet, meadow or woods.")]
    UnknownTarget(String),
    #[error("You can't use {item} on the {target}.")]
    InvalidTarget { item: Item, target: &'static str },
    #[error("The egg has to hatch first. Try \"pet\".")]
    StillEgg,
    #[error("{0} is not hungry.")]
    NotHungry(String),
    #[error("{0} is too tired to play. Let it \"sleep\".")]
    TooTired(String),
    #[error("{0} is wide awake.")]
    NotTired(String),
    #[error("{0} is already clean.")]
    AlreadyClean(String),
    #[error("There is nothing to harvest in the {0} yet.")]
    NotGrown(&'static str),
    #[error("{0}'s fur is still too short.")]
    FurTooShort(String),
    #[error("{0} cannot be crafted.")]
    NotCraftable(Item),
    #[error("You don't know how to craft {0} yet.")]
    UnknownBlueprint(Item),
    #[error("You already have {0}.")]
    AlreadyOwned(Item),
    #[error("You need {materials} to make {item}.")]
    NeedMaterials { item: Item, materials: String },
    #[error("A name needs between 1 and {0} letters.")]
    BadName(usize),
    #[error("{0} is not something to wear.")]
    NotClothing(Item),
    #[error("{0} is not wearing anything.")]
    NotDressed(String),
    #[error("You are not on a hike. Send \"hike\" to start one.")]
    NoHike,
    #[error("There is nobody here to talk to.")]
    NobodyHere,
}

/// A successfully applied command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub world: World,
    pub text: String,
}

pub type Transition = Result<Outcome, Rejection>;

fn done(world: World, text: impl Into<String>) -> Transition {
    Ok(Outcome {
        world,
        text: text.into(),
    })
}

fn require_hatched(world: &World) -> Result<(), Rejection> {
    if world.hatched() {
        Ok(())
    } else {
        Err(Rejection::StillEgg)
    }
}

fn require_tool(world: &World, tool: Item) -> Result<(), Rejection> {
    if world.tools.contains(&tool) {
        Ok(())
    } else {
        Err(Rejection::Missing(tool))
    }
}

/// Add care and report any stage the pet grew into as a result.
fn cared_for(world: &mut World, rules: &SimRules) -> String {
    world.pet.care = world.pet.care.saturating_add(rules.gains.care_per_action);
    grow(world, rules)
        .into_iter()
        .map(|stage| match stage {
            GrowthStage::Hatchling => format!(
                "\n{} The egg cracks open! Say hello to {}.",
                stage.emoji(),
                world.pet.name
            ),
            _ => format!(
                "\n{} {} grew into a {}!",
                stage.emoji(),
                world.pet.name,
                stage.label()
            ),
        })
        .collect()
}

/// What the pet is up to right now, derived from its age and the room.
pub fn activity(world: &World, rules: &SimRules) -> String {
    let pet = &world.pet;
    if !world.hatched() {
        return "is still an egg. It wobbles a little.".to_string();
    }
    if pet.needs.hunger == 0 {
        return "stares at you with big hungry eyes.".to_string();
    }
    if pet.needs.hygiene == 0 {
        return "is covered in mud.".to_string();
    }
    if pet.needs.energy == 0 {
        return "is fast asleep.".to_string();
    }
    let slot = match rules.activity_period_secs {
        0 => 0,
        period => pet.age.as_secs() / period,
    };
    let choices = world.room.furniture.len() as u64 + 2;
    match (slot % choices) as usize {
        0 => "is wagging its tail.".to_string(),
        1 => "is napping in a sunny spot.".to_string(),
        n => {
            let item = world.room.furniture[n - 2];
            match item {
                Item::Boomerang => format!("is chasing the {}.", item),
                Item::Ball => format!("is rolling the {} around.", item),
                Item::Teddy => format!("is cuddling the {}.", item),
                Item::Couch => format!("is dozing on the {}.", item),
                Item::Plant => format!("is sniffing the {}.", item),
                Item::Fountain => format!("is splashing in the {}.", item),
                other => format!("is playing with the {}.", other),
            }
        }
    }
}

fn needs_line(world: &World, rules: &SimRules) -> String {
    Need::ALL
        .iter()
        .map(|need| {
            format!(
                "{} {} {}/{}",
                need.emoji(),
                need.label(),
                world.pet.needs.get(*need),
                rules.max_level
            )
        })
        .collect::<Vec<_>>()
        .join(" · ")
}

fn furniture_line(world: &World) -> String {
    if world.room.furniture.is_empty() {
        "none".to_string()
    } else {
        world
            .room
            .furniture
            .iter()
            .map(|item| item.emoji())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn look(world: &World, rules: &SimRules, ambient: Ambient) -> Transition {
    let pet = &world.pet;
    let headline = if world.hatched() {
        let outfit = pet
            .clothing
            .map(|item| format!(" wearing {}", item))
            .unwrap_or_default();
        format!(
            "{} {} the {}{} {}",
            pet.stage.emoji(),
            pet.name,
            pet.stage.label(),
            outfit,
            activity(world, rules)
        )
    } else {
        format!("{} {} {}", pet.stage.emoji(), pet.name, activity(world, rules))
    };
    let text = format!(
        "{}\n{}\n⛺ 🌱 meadow {}/{} · 🌲 woods {}/{} · furniture: {}\n🎒 Inventory: {}\n{}",
        headline,
        needs_line(world, rules),
        world.room.meadow,
        rules.meadow_max,
        world.room.woods,
        rules.woods_max,
        furniture_line(world),
        format_inventory_compact(&world.inventory),
        ambient
    );
    done(world.clone(), text)
}

pub fn inventory(world: &World) -> Transition {
    let tools = world
        .tools
        .iter()
        .map(|item| item.emoji())
        .collect::<Vec<_>>()
        .join(" ");
    let blueprints = world
        .blueprints
        .iter()
        .map(|item| format!("{}={}", item, format_materials(item.blueprint().unwrap_or(&[]))))
        .collect::<Vec<_>>()
        .join(" ");
    let mut text = format!(
        "🎒 {}\n🧰 Tools: {}\n📜 Blueprints: {}",
        format_inventory_compact(&world.inventory),
        tools,
        blueprints
    );
    if world.tools.contains(&Item::Needle) {
        text.push_str("\n🪡 Patterns: ");
        text.push_str(&pattern_list());
    }
    done(world.clone(), text)
}

pub fn pet(world: &World, rules: &SimRules) -> Transition {
    let mut next = world.clone();
    if !world.hatched() {
        let grew = cared_for(&mut next, rules);
        let text = if grew.is_empty() {
            "👋 You stroke the egg. Something inside moves.".to_string()
        } else {
            format!("👋 You stroke the egg.{}", grew)
        };
        return done(next, text);
    }
    next.pet
        .needs
        .raise(Need::Affection, rules.gains.pet_affection, rules.max_level);
    let grew = cared_for(&mut next, rules);
    let text = format!("👋 You pet {}. It leans into your hand. 💕{}", next.pet.name, grew);
    done(next, text)
}

pub fn feed(world: &World, food: Option<Item>, rules: &SimRules) -> Transition {
    require_hatched(world)?;
    let food = match food {
        Some(item) if !item.is_food() => return Err(Rejection::NotFood(item)),
        Some(item) => item,
        None => world.inventory.first_food().ok_or(Rejection::NoFood)?,
    };
    if !world.inventory.has(food, 1) {
        return Err(Rejection::Missing(food));
    }
    if world.pet.needs.hunger >= rules.max_level {
        return Err(Rejection::NotHungry(world.pet.name.clone()));
    }
    let gain = match food {
        Item::Stew => rules.gains.stew,
        _ => rules.gains.carrot,
    };
    let mut next = world.clone();
    next.inventory.remove(food, 1);
    next.pet.needs.raise(Need::Hunger, gain, rules.max_level);
    let grew = cared_for(&mut next, rules);
    let text = format!("{} {} munches happily. 😋{}", food, next.pet.name, grew);
    done(next, text)
}

/// Play with the pet, optionally with a specific toy from the room.
pub fn play(world: &World, toy: Option<Item>, rules: &SimRules) -> Transition {
    require_hatched(world)?;
    if let Some(toy) = toy {
        if !world.room.furniture.contains(&toy) {
            return Err(Rejection::Missing(toy));
        }
    }
    if world.pet.needs.energy < rules.gains.play_energy_cost {
        return Err(Rejection::TooTired(world.pet.name.clone()));
    }
    let mut next = world.clone();
    next.pet.needs.energy -= rules.gains.play_energy_cost;
    next.pet
        .needs
        .raise(Need::Affection, rules.gains.play_affection, rules.max_level);
    let grew = cared_for(&mut next, rules);
    let text = match toy {
        Some(toy) => format!("{} You play with {} and the {}. 🎉{}", toy, next.pet.name, toy, grew),
        None => format!("🎾 You play tag with {}. 🎉{}", next.pet.name, grew),
    };
    done(next, text)
}

pub fn sleep(world: &World, rules: &SimRules) -> Transition {
    require_hatched(world)?;
    if world.pet.needs.energy >= rules.max_level {
        return Err(Rejection::NotTired(world.pet.name.clone()));
    }
    let mut next = world.clone();
    next.pet
        .needs
        .raise(Need::Energy, rules.gains.sleep_energy, rules.max_level);
    let text = format!("💤 {} curls up for a nap.", next.pet.name);
    done(next, text)
}

pub fn wash(world: &World, rules: &SimRules) -> Transition {
    require_tool(world, Item::Sponge)?;
    require_hatched(world)?;
    if world.pet.needs.hygiene >= rules.max_level {
        return Err(Rejection::AlreadyClean(world.pet.name.clone()));
    }
    let mut next = world.clone();
    next.pet.needs.hygiene = rules.max_level;
    let grew = cared_for(&mut next, rules);
    let text = format!("🧽 You scrub {} until it sparkles. ✨{}", next.pet.name, grew);
    done(next, text)
}

pub fn gather(world: &World, rules: &SimRules) -> Transition {
    require_tool(world, Item::Basket)?;
    if world.room.meadow < rules.meadow_max {
        return Err(Rejection::NotGrown("meadow"));
    }
    let mut next = world.clone();
    next.room.meadow = 0;
    next.inventory.add(Item::Carrot, 2);
    next.inventory.add(Item::Stone, 1);
    done(next, "🧺 You gather 🥕🥕 and find a 🪨 in the meadow.")
}

pub fn chop(world: &World, rules: &SimRules) -> Transition {
    require_tool(world, Item::Axe)?;
    if world.room.woods < rules.woods_max {
        return Err(Rejection::NotGrown("woods"));
    }
    let mut next = world.clone();
    next.room.woods = 0;
    next.inventory.add(Item::Wood, 3);
    done(next, "🪓 You chop 🪵🪵🪵 in the woods.")
}

pub fn shear(world: &World, rules: &SimRules) -> Transition {
    require_tool(world, Item::Scissors)?;
    require_hatched(world)?;
    if world.pet.fur < rules.fur_max {
        return Err(Rejection::FurTooShort(world.pet.name.clone()));
    }
    let mut next = world.clone();
    next.pet.fur = 0;
    next.inventory.add(Item::Wool, 2);
    let text = format!("✂️ You give {} a haircut and keep 🧶🧶.", next.pet.name);
    done(next, text)
}

pub fn cook(world: &World) -> Transition {
    require_tool(world, Item::Pan)?;
    const RECIPE: [(Item, u32); 1] = [(Item::Carrot, 2)];
    let mut next = world.clone();
    if !next.inventory.consume(&RECIPE) {
        return Err(Rejection::NeedMaterials {
            item: Item::Stew,
            materials: format_materials(&RECIPE),
        });
    }
    next.inventory.add(Item::Stew, 1);
    done(next, "🍳 You cook a hearty 🍲.")
}

pub fn craft(world: &World, item: Item) -> Transition {
    require_tool(world, Item::Hammer)?;
    let Some(materials) = item.blueprint() else {
        return Err(Rejection::NotCraftable(item));
    };
    if !world.blueprints.contains(&item) {
        return Err(Rejection::UnknownBlueprint(item));
    }
    let owned = match item.category() {
        ItemCategory::Furniture => world.room.furniture.contains(&item),
        _ => world.tools.contains(&item),
    };
    if owned {
        return Err(Rejection::AlreadyOwned(item));
    }
    let mut next = world.clone();
    if !next.inventory.consume(materials) {
        return Err(Rejection::NeedMaterials {
            item,
            materials: format_materials(materials),
        });
    }
    let text = match item.category() {
        ItemCategory::Furniture => {
            next.room.furniture.push(item);
            format!("🔨 You build {} and put it in the room.", item)
        }
        _ => {
            next.tools.insert(item);
            format!("🔨 You craft {}. It goes into your toolbox.", item)
        }
    };
    done(next, text)
}

pub fn rename(world: &World, name: &str, rules: &SimRules) -> Transition {
    let name = name.trim();
    let letters = name.chars().count();
    if letters == 0 || letters > rules.name_max_len || name.chars().any(char::is_control) {
        return Err(Rejection::BadName(rules.name_max_len));
    }
    let mut next = world.clone();
    let old = std::mem::replace(&mut next.pet.name, name.to_string());
    let text = format!("✏️ {} is now called {}.", old, next.pet.name);
    done(next, text)
}

/// Every sewing pattern with its materials, e.g. `🧣=🧶🧶🧶🧶🧶🧶`.
pub fn pattern_list() -> String {
    Item::ALL
        .iter()
        .filter_map(|item| item.pattern().map(|m| format!("{}={}", item, format_materials(m))))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sew a piece of clothing into the inventory.
pub fn sew(world: &World, pattern: Item) -> Transition {
    require_tool(world, Item::Needle)?;
    let Some(materials) = pattern.pattern() else {
        return Err(Rejection::NotClothing(pattern));
    };
    let mut next = world.clone();
    if !next.inventory.consume(materials) {
        return Err(Rejection::NeedMaterials {
            item: pattern,
            materials: format_materials(materials),
        });
    }
    next.inventory.add(pattern, 1);
    done(next, format!("🪡 You sew {}. It goes into your bag.", pattern))
}

/// Put `clothing` on the pet, or take off what it wears with `None`. Whatever
/// it wore before goes back into the inventory.
pub fn dress(world: &World, clothing: Option<Item>) -> Transition {
    require_hatched(world)?;
    let mut next = world.clone();
    let name = world.pet.name.clone();
    let old = next.pet.clothing.take();
    if let Some(old) = old {
        next.inventory.add(old, 1);
    }
    let text = match clothing {
        Some(item) => {
            if item.category() != ItemCategory::Clothing {
                return Err(Rejection::NotClothing(item));
            }
            if !next.inventory.remove(item, 1) {
                return Err(Rejection::Missing(item));
            }
            next.pet.clothing = Some(item);
            format!("{} {} looks great in the {}!", item, name, item.word())
        }
        None => match old {
            Some(old) => format!("{} You take the {} off {}.", old, old.word(), name),
            None => return Err(Rejection::NotDressed(name)),
        },
    };
    done(next, text)
}

/// Seed for the next hike map. Changes with every finished hike, so two
/// hikes in a row never share a map.
fn hike_seed(world: &World) -> u64 {
    let name = world
        .pet
        .name
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
    name ^ world.pet.age.as_secs().wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ u64::from(world.hikes_done).rotate_left(32)
}

/// Start a hike, or show the one already under way.
pub fn hike(world: &World, rules: &SimRules) -> Transition {
    require_tool(world, Item::Compass)?;
    if let Some(hike) = &world.hike {
        let text = format!(
            "🧭 You are on a hike. Find 📍 in {} steps, e.g. \"hike ➡️⬇️⬅️⬆️\".\n{}",
            STEPS,
            hike.render(false)
        );
        return done(world.clone(), text);
    }
    let mut next = world.clone();
    let hike = Hike::generate(hike_seed(world), world.room.trail >= rules.trail_max);
    let text = format!(
        "🧭 You set off from ✴️. Find 📍 in {} steps, e.g. \"hike ➡️⬇️⬅️⬆️\".\n{}",
        STEPS,
        hike.render(false)
    );
    next.hike = Some(hike);
    done(next, text)
}

/// Walk one move of the current hike. Reaching 📍 ends the hike and stores
/// whatever was picked up on the way.
pub fn hike_move(world: &World, directions: [Direction; STEPS]) -> Transition {
    require_tool(world, Item::Compass)?;
    let Some(mut hike) = world.hike.clone() else {
        return Err(Rejection::NoHike);
    };
    let mut next = world.clone();
    let steps = hike.walk(directions);
    let walked = format_steps(&steps);
    if !hike.finished() {
        let blocked = steps.last().is_some_and(|(_, tile)| tile.blocks());
        let ending = if blocked {
            "The path ends at a tree. Back to ✴️."
        } else {
            "No 📍 yet. Back to ✴️."
        };
        let text = format!("🥾 {}\n{}\n{}", walked, ending, hike.render(false));
        next.hike = Some(hike);
        return done(next, text);
    }
    next.hike = None;
    next.hikes_done = next.hikes_done.saturating_add(1);
    let found = if hike.gathered.is_empty() {
        String::new()
    } else {
        for item in &hike.gathered {
            next.inventory.add(*item, 1);
        }
        next.room.trail = 0;
        let items: String = hike.gathered.iter().map(|item| item.emoji()).collect();
        format!(" You found {} on the way.", items)
    };
    let text = format!(
        "🥾 {}\n{} You made it in {} moves!{}\n{}",
        walked,
        Tile::Destination,
        hike.moves.len(),
        found,
        hike.render(true)
    );
    done(next, text)
}

/// Talk to the visitor. Lines that ask for something repeat until the
/// player has it; the items are handed over as the talk moves on.
pub fn talk(world: &World) -> Transition {
    let visitor = world.visitor.as_ref().ok_or(Rejection::NobodyHere)?;
    let name = &world.pet.name;
    let Some(current) = visitor.current() else {
        return Err(Rejection::NobodyHere);
    };
    let Some(upcoming) = visitor.dialogue.get(1).copied() else {
        return done(world.clone(), current.line(name));
    };
    let request = current.request();
    let mut next = world.clone();
    if !request.is_empty() && !next.inventory.consume(request) {
        return done(world.clone(), current.line(name));
    }
    if let Some(visitor) = next.visitor.as_mut() {
        visitor.dialogue.pop_front();
    }
    let text = if request.is_empty() {
        upcoming.line(name)
    } else {
        format!(
            "You hand over {}.\n{}",
            format_materials(request),
            upcoming.line(name)
        )
    };
    done(next, text)
}

/// Things an item can be used on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Pet,
    Meadow,
    Woods,
}

impl Target {
    pub fn label(self) -> &'static str {
        match self {
            Target::Pet => "pet",
            Target::Meadow => "meadow",
            Target::Woods => "woods",
        }
    }

    /// Resolve a target word. The pet answers to "pet", its stage emoji and
    /// its own name.
    pub fn parse(token: &str, world: &World) -> Option<Target> {
        let token = token.trim().to_lowercase();
        let stripped = super::items::strip_variation_selectors(&token);
        match stripped.as_str() {
            "pet" | "it" => Some(Target::Pet),
            "meadow" | "field" | "🌱" => Some(Target::Meadow),
            "woods" | "forest" | "🌲" | "🌳" => Some(Target::Woods),
            other if other == world.pet.name.to_lowercase() => Some(Target::Pet),
            other if other == world.pet.stage.emoji() => Some(Target::Pet),
            _ => None,
        }
    }
}

/// `use <item> on <target>`: route to the transition the pair stands for.
pub fn use_item(world: &World, item: Item, target: Target, rules: &SimRules) -> Transition {
    let invalid = Rejection::InvalidTarget {
        item,
        target: target.label(),
    };
    match (item.category(), target) {
        (ItemCategory::Food, Target::Pet) => feed(world, Some(item), rules),
        (ItemCategory::Clothing, Target::Pet) => dress(world, Some(item)),
        (ItemCategory::Furniture, Target::Pet) => match item {
            Item::Boomerang | Item::Ball | Item::Teddy => play(world, Some(item), rules),
            _ => Err(invalid),
        },
        (ItemCategory::Tool, _) => match (item, target) {
            (Item::Sponge, Target::Pet) => wash(world, rules),
            (Item::Scissors, Target::Pet) => shear(world, rules),
            (Item::Basket, Target::Meadow) => gather(world, rules),
            (Item::Axe, Target::Woods) => chop(world, rules),
            _ => Err(invalid),
        },
        _ => Err(invalid),
    }
}
