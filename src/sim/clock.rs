//! Simulated time.
//!
//! Everything time-driven is expressed as "how many period boundaries did
//! the pet's age cross", computed from the absolute age before and after.
//! Because boundary counts over `(t0, t1]` and `(t1, t2]` always sum to the
//! count over `(t0, t2]`, and every per-boundary effect is a saturating add
//! or subtract, `apply_elapsed` gives the same world whether a stretch of
//! time is applied in one step or many.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};

use super::items::Item;
use super::rules::{DecayRule, SimRules, StageThreshold};
use super::story::{self, Visitor};
use super::types::{GrowthStage, Need, PlayerRecord, World};

/// Wall-clock time between two instants. A clock that stepped backwards
/// yields zero rather than rewinding the pet.
pub fn elapsed_since(last: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last).to_std().unwrap_or(Duration::ZERO)
}

/// Advance `world` by `elapsed` of simulated time.
pub fn apply_elapsed(world: &World, elapsed: Duration, rules: &SimRules) -> World {
    let mut next = world.clone();
    let t0 = world.pet.age;
    let t1 = t0.saturating_add(elapsed);
    next.pet.age = t1;

    for need in Need::ALL {
        let rule = decay_rule(rules, need);
        let drop = crossings(t0, t1, rule.period_secs).saturating_mul(rule.step);
        let level = next.pet.needs.get_mut(need);
        *level = level.saturating_sub(drop);
    }

    next.pet.fur = regrow(next.pet.fur, crossings(t0, t1, rules.fur_period_secs), rules.fur_max);
    next.room.meadow = regrow(
        next.room.meadow,
        crossings(t0, t1, rules.meadow_period_secs),
        rules.meadow_max,
    );
    next.room.woods = regrow(
        next.room.woods,
        crossings(t0, t1, rules.woods_period_secs),
        rules.woods_max,
    );
    next.room.trail = regrow(
        next.room.trail,
        crossings(t0, t1, rules.trail_period_secs),
        rules.trail_max,
    );

    next.inventory
        .remove_up_to(Item::Carrot, crossings(t0, t1, rules.carrot_spoil_secs));
    next.inventory
        .remove_up_to(Item::Stew, crossings(t0, t1, rules.stew_spoil_secs));

    grow(&mut next, rules);
    story::advance(&mut next);
    next
}

/// Bring a record up to `now`: apply the wall-clock time since it was last
/// simulated and report what the player should hear about.
pub fn catch_up(record: &mut PlayerRecord, now: DateTime<Utc>, rules: &SimRules) -> Vec<Notice> {
    let elapsed = elapsed_since(record.last_simulated, now);
    if elapsed.is_zero() {
        return Vec::new();
    }
    let next = apply_elapsed(&record.world, elapsed, rules);
    let before = std::mem::replace(&mut record.world, next);
    record.last_simulated = now;
    notices_between(&before, &record.world, rules)
}

fn decay_rule(rules: &SimRules, need: Need) -> DecayRule {
    match need {
        Need::Hunger => rules.hunger,
        Need::Energy => rules.energy,
        Need::Affection => rules.affection,
        Need::Hygiene => rules.hygiene,
    }
}

/// Number of multiples of `period_secs` in `(t0, t1]`.
fn crossings(t0: Duration, t1: Duration, period_secs: u64) -> u32 {
    if period_secs == 0 {
        return 0;
    }
    let period = u128::from(period_secs) * 1_000_000_000;
    let count = t1.as_nanos() / period - t0.as_nanos() / period;
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn regrow(level: u32, steps: u32, cap: u32) -> u32 {
    if level >= cap {
        return level;
    }
    level.saturating_add(steps).min(cap)
}

fn threshold(rules: &SimRules, stage: GrowthStage) -> Option<StageThreshold> {
    match stage {
        GrowthStage::Egg => None,
        GrowthStage::Hatchling => Some(rules.hatch),
        GrowthStage::Juvenile => Some(rules.juvenile),
        GrowthStage::Adult => Some(rules.adult),
    }
}

/// Promote the pet through every stage whose threshold it now meets,
/// applying each stage's unlocks and gift exactly once. Returns the stages
/// entered, oldest first. Never demotes.
pub fn grow(world: &mut World, rules: &SimRules) -> Vec<GrowthStage> {
    let mut entered = Vec::new();
    while let Some(next) = world.pet.stage.next() {
        let Some(needed) = threshold(rules, next) else {
            break;
        };
        let age_secs = world.pet.age.as_secs();
        if age_secs < needed.min_age_secs || world.pet.care < needed.min_care {
            break;
        }
        world.pet.stage = next;
        world.blueprints.extend(next.unlocks().iter().copied());
        for (item, count) in next.gift() {
            world.inventory.add(*item, *count);
        }
        entered.push(next);
    }
    entered
}

/// Unsolicited messages produced by the passage of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Hungry { name: String },
    Dirty { name: String },
    Grew { name: String, stage: GrowthStage },
    MeadowReady,
    Spoiled { item: Item, count: u32 },
    Visitor,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Hungry { name } => write!(f, "🍽️ {} is hungry!", name),
            Notice::Dirty { name } => write!(f, "💩 {} is all dirty and needs a wash.", name),
            Notice::Grew { name, stage } => {
                write!(f, "{} {} grew into a {}!", stage.emoji(), name, stage.label())
            }
            Notice::MeadowReady => f.write_str("🌱 The meadow is full of vegetables again."),
            Notice::Spoiled { item, count } => write!(f, "🪰 {} × {} went bad.", item, count),
            Notice::Visitor => write!(
                f,
                "{} Someone is floating around your tent. Send \"talk\" to say hi.",
                Visitor::AVATAR
            ),
        }
    }
}

/// Compare two snapshots of the same world and report the threshold
/// crossings a player would want to hear about.
pub fn notices_between(before: &World, after: &World, rules: &SimRules) -> Vec<Notice> {
    let name = after.pet.name.clone();
    let mut notices = Vec::new();
    if after.hatched() {
        if before.pet.needs.hunger > 0 && after.pet.needs.hunger == 0 {
            notices.push(Notice::Hungry { name: name.clone() });
        }
        if before.pet.needs.hygiene > 0 && after.pet.needs.hygiene == 0 {
            notices.push(Notice::Dirty { name: name.clone() });
        }
    }
    if after.pet.stage > before.pet.stage {
        notices.push(Notice::Grew {
            name,
            stage: after.pet.stage,
        });
    }
    if before.room.meadow < rules.meadow_max && after.room.meadow >= rules.meadow_max {
        notices.push(Notice::MeadowReady);
    }
    for item in [Item::Carrot, Item::Stew] {
        let lost = before
            .inventory
            .count(item)
            .saturating_sub(after.inventory.count(item));
        if lost > 0 {
            notices.push(Notice::Spoiled { item, count: lost });
        }
    }
    if before.visitor.is_none() && after.visitor.is_some() {
        notices.push(Notice::Visitor);
    }
    notices
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Night,
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weather {
    Sunny,
    Cloudy,
    Rainy,
    Windy,
    Snowy,
}

/// Environment derived from the wall clock. Shared by every room and never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ambient {
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
}

pub fn ambient_at(now: DateTime<Utc>) -> Ambient {
    let time_of_day = match now.hour() {
        6..=11 => TimeOfDay::Morning,
        12..=17 => TimeOfDay::Afternoon,
        18..=21 => TimeOfDay::Evening,
        _ => TimeOfDay::Night,
    };
    // Same weather all day, everywhere.
    let day_seed = (now.year() as u64)
        .wrapping_mul(1000)
        .wrapping_add(u64::from(now.ordinal()))
        .wrapping_mul(2_654_435_761);
    let winter = matches!(now.month(), 12 | 1 | 2);
    let weather = match (day_seed >> 7) % 5 {
        0 => Weather::Sunny,
        1 => Weather::Cloudy,
        2 => Weather::Rainy,
        3 => Weather::Windy,
        _ if winter => Weather::Snowy,
        _ => Weather::Sunny,
    };
    Ambient {
        time_of_day,
        weather,
    }
}

impl fmt::Display for Ambient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = match self.time_of_day {
            TimeOfDay::Night => "🌙 night",
            TimeOfDay::Morning => "🌅 morning",
            TimeOfDay::Afternoon => "🌞 afternoon",
            TimeOfDay::Evening => "🌆 evening",
        };
        let weather = match self.weather {
            Weather::Sunny => "☀️ sunny",
            Weather::Cloudy => "☁️ cloudy",
            Weather::Rainy => "🌧️ rainy",
            Weather::Windy => "🌬️ windy",
            Weather::Snowy => "🌨️ snowy",
        };
        write!(f, "{}, {}", time, weather)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::inventory::Inventory;
    use crate::sim::rules::DecayRule;
    use crate::sim::story::SewingChapter;
    use chrono::TimeZone;

    fn unit_rules() -> SimRules {
        SimRules {
            hunger: DecayRule::new(1, 1),
            ..SimRules::default()
        }
    }

    fn hatched_world(rules: &SimRules) -> World {
        let mut world = World::new("Feini", rules);
        world.pet.care = rules.hatch.min_care;
        grow(&mut world, rules);
        world
    }

    #[test]
    fn hunger_clamps_at_zero() {
        let rules = unit_rules();
        let mut world = hatched_world(&rules);
        world.pet.needs.hunger = 10;
        let after = apply_elapsed(&world, Duration::from_secs(1000), &rules);
        assert_eq!(after.pet.needs.hunger, 0);
    }

    #[test]
    fn split_application_matches_single_step() {
        let rules = SimRules::default();
        let mut start = hatched_world(&rules);
        start.pet.needs.hunger = 37;
        start.room.meadow = 0;
        start.room.woods = 2;
        start.inventory = Inventory::with_items(&[(Item::Carrot, 3), (Item::Stew, 2)]);
        start.pet.care = 60;
        start.room.trail = 5;
        start.sewing = SewingChapter::Visit {
            arrives_at: Duration::from_secs(2 * 3600),
        };

        let splits: [(u64, u64); 6] = [
            (0, 0),
            (1, 1),
            (899, 1),
            (3_599, 7_201),
            (24 * 3600 - 1, 3600),
            (50 * 3600 + 17, 30 * 3600 + 911),
        ];
        for (a, b) in splits {
            let d1 = Duration::from_secs(a);
            let d2 = Duration::from_secs(b);
            let stepped = apply_elapsed(&apply_elapsed(&start, d1, &rules), d2, &rules);
            let whole = apply_elapsed(&start, d1 + d2, &rules);
            assert_eq!(stepped, whole, "split {}+{}", a, b);
        }
    }

    #[test]
    fn subsecond_splits_add_up() {
        let rules = unit_rules();
        let world = hatched_world(&rules);
        let half = Duration::from_millis(500);
        let stepped = apply_elapsed(&apply_elapsed(&world, half, &rules), half, &rules);
        let whole = apply_elapsed(&world, Duration::from_secs(1), &rules);
        assert_eq!(stepped, whole);
        assert_eq!(whole.pet.needs.hunger, rules.max_level - 1);
    }

    #[test]
    fn growth_is_monotonic_and_unlocks_once() {
        let rules = SimRules::default();
        let mut world = hatched_world(&rules);
        world.pet.care = rules.adult.min_care;
        let mut last = world.pet.stage;
        let mut stones_before = world.inventory.count(Item::Stone);
        for _ in 0..100 {
            world = apply_elapsed(&world, Duration::from_secs(3 * 3600), &rules);
            assert!(world.pet.stage >= last);
            last = world.pet.stage;
            let stones = world.inventory.count(Item::Stone);
            assert!(stones >= stones_before);
            stones_before = stones;
        }
        assert_eq!(world.pet.stage, GrowthStage::Adult);
        assert_eq!(world.inventory.count(Item::Stone), 1 + 4);
        assert!(world.blueprints.contains(&Item::Fountain));
    }

    #[test]
    fn egg_without_care_never_hatches_from_time_alone() {
        let rules = SimRules::default();
        let world = World::new("Feini", &rules);
        let after = apply_elapsed(&world, Duration::from_secs(1_000_000), &rules);
        assert_eq!(after.pet.stage, GrowthStage::Egg);
    }

    #[test]
    fn perishables_spoil_one_per_period() {
        let rules = SimRules::default();
        let mut world = hatched_world(&rules);
        world.inventory.add(Item::Carrot, 5);
        let after = apply_elapsed(&world, Duration::from_secs(2 * rules.carrot_spoil_secs), &rules);
        assert_eq!(after.inventory.count(Item::Carrot), 3);
        let notices = notices_between(&world, &after, &rules);
        assert!(notices.contains(&Notice::Spoiled {
            item: Item::Carrot,
            count: 2
        }));
    }

    #[test]
    fn hunger_notice_fires_on_crossing_only() {
        let rules = unit_rules();
        let mut world = hatched_world(&rules);
        world.pet.needs.hunger = 5;
        let starved = apply_elapsed(&world, Duration::from_secs(10), &rules);
        let notices = notices_between(&world, &starved, &rules);
        assert!(notices.iter().any(|n| matches!(n, Notice::Hungry { .. })));
        let still = apply_elapsed(&starved, Duration::from_secs(10), &rules);
        assert!(notices_between(&starved, &still, &rules)
            .iter()
            .all(|n| !matches!(n, Notice::Hungry { .. })));
    }

    #[test]
    fn scheduled_ghost_arrives_with_a_notice() {
        let rules = SimRules::default();
        let mut world = hatched_world(&rules);
        world.sewing = SewingChapter::Visit {
            arrives_at: Duration::from_secs(rules.visit_delay_secs),
        };
        let early = apply_elapsed(&world, Duration::from_secs(rules.visit_delay_secs - 1), &rules);
        assert!(early.visitor.is_none());
        let arrived = apply_elapsed(&early, Duration::from_secs(1), &rules);
        assert_eq!(arrived.sewing, SewingChapter::Quest);
        assert!(notices_between(&early, &arrived, &rules).contains(&Notice::Visitor));
        let later = apply_elapsed(&arrived, Duration::from_secs(3600), &rules);
        assert!(!notices_between(&arrived, &later, &rules).contains(&Notice::Visitor));
    }

    #[test]
    fn trail_refills_to_its_cap() {
        let rules = SimRules::default();
        let mut world = hatched_world(&rules);
        world.room.trail = 0;
        let after = apply_elapsed(&world, Duration::from_secs(100 * 3600), &rules);
        assert_eq!(after.room.trail, rules.trail_max);
    }

    #[test]
    fn catch_up_moves_the_simulation_mark() {
        let rules = unit_rules();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut record = PlayerRecord::new(
            crate::sim::types::PlayerId::new("irc", "ann"),
            start,
            hatched_world(&rules),
        );
        let now = start + chrono::Duration::seconds(30);
        catch_up(&mut record, now, &rules);
        assert_eq!(record.last_simulated, now);
        assert_eq!(record.world.pet.needs.hunger, rules.max_level - 30);
        // Replaying the same instant changes nothing.
        let snapshot = record.clone();
        assert!(catch_up(&mut record, now, &rules).is_empty());
        assert_eq!(record, snapshot);
    }

    #[test]
    fn backwards_clock_is_zero_elapsed() {
        let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        assert_eq!(elapsed_since(later, earlier), Duration::ZERO);
        assert_eq!(elapsed_since(earlier, later), Duration::from_secs(3600));
    }

    #[test]
    fn ambient_depends_only_on_clock() {
        let noon = Utc.with_ymd_and_hms(2024, 7, 3, 12, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 7, 3, 13, 30, 0).unwrap();
        assert_eq!(ambient_at(noon).time_of_day, TimeOfDay::Afternoon);
        assert_eq!(ambient_at(noon).weather, ambient_at(later).weather);
        assert_ne!(ambient_at(noon).weather, Weather::Snowy);
    }
}
