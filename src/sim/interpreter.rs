//! Per-player command interpreter.
//!
//! Two states: Idle (`record.pending == None`) and awaiting a follow-up
//! (`Some(Pending)`). The pending question is stored on the record, so it is
//! read and written under the same session lock as the rest of the player's
//! state and survives restarts.

use chrono::{DateTime, Utc};

use super::clock::ambient_at;
use super::commands::{Command, CommandTable, Verb};
use super::hike::Direction;
use super::items::{format_materials, Item};
use super::rules::SimRules;
use super::story;
use super::transitions::{self, Rejection, Target, Transition};
use super::tutorial;
use super::types::{Pending, PlayerRecord, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// The command changed (or showed) the world.
    Applied,
    /// Nothing changed; the text explains why.
    Rejected,
    /// The interpreter asked a follow-up question.
    Prompted,
    /// A pending question was dropped.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub kind: ReplyKind,
    pub verb: Option<Verb>,
}

enum Step {
    Apply(Verb, Transition),
    Ask(Pending, String),
    Say(Verb, String),
}

pub struct Interpreter {
    table: CommandTable,
    rules: SimRules,
}

impl Interpreter {
    pub fn new(table: CommandTable, rules: SimRules) -> Self {
        Self { table, rules }
    }

    pub fn rules(&self) -> &SimRules {
        &self.rules
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Interpret one inbound message against an already caught-up record.
    /// A rejected command leaves `record.world` untouched.
    pub fn handle(&self, record: &mut PlayerRecord, text: &str, now: DateTime<Utc>) -> Reply {
        let step = match record.pending.take() {
            Some(pending) => {
                if self.is_cancel(text) {
                    return Reply {
                        text: "👌 Never mind.".to_string(),
                        kind: ReplyKind::Cancelled,
                        verb: Some(Verb::Cancel),
                    };
                }
                self.answer(pending, text, &record.world)
            }
            None => match self.table.parse(text) {
                Ok(command) => self.dispatch(command, &record.world, now),
                Err(rejection) => {
                    return self.finish(record, None, rejection.to_string(), ReplyKind::Rejected)
                }
            },
        };

        match step {
            Step::Apply(verb, Ok(outcome)) => {
                record.world = outcome.world;
                self.finish(record, Some(verb), outcome.text, ReplyKind::Applied)
            }
            Step::Apply(verb, Err(rejection)) => Reply {
                text: rejection.to_string(),
                kind: ReplyKind::Rejected,
                verb: Some(verb),
            },
            Step::Ask(pending, question) => {
                record.pending = Some(pending);
                Reply {
                    text: question,
                    kind: ReplyKind::Prompted,
                    verb: None,
                }
            }
            Step::Say(verb, text) => self.finish(record, Some(verb), text, ReplyKind::Applied),
        }
    }

    fn is_cancel(&self, text: &str) -> bool {
        let mut tokens = text.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(word), None) => self.table.resolve(word) == Some(Verb::Cancel),
            _ => false,
        }
    }

    /// Advance the sewing story after an applied command, then append a
    /// tutorial hint when this reply completes a chapter.
    fn finish(
        &self,
        record: &mut PlayerRecord,
        verb: Option<Verb>,
        text: String,
        kind: ReplyKind,
    ) -> Reply {
        let mut text = text;
        if kind == ReplyKind::Applied {
            if let Some(line) = story::after_command(&mut record.world, &self.rules) {
                text.push('\n');
                text.push_str(&line);
            }
        }
        if let Some((next, hint)) = tutorial::progress(record.tutorial, verb, &record.world) {
            record.tutorial = next;
            text.push_str("\n\n");
            text.push_str(hint);
        }
        Reply { text, kind, verb }
    }

    fn dispatch(&self, command: Command, world: &World, now: DateTime<Utc>) -> Step {
        let rules = &self.rules;
        let Command { verb, args } = command;
        let first = args.first().map(String::as_str);
        let apply = |t: Transition| Step::Apply(verb, t);
        match verb {
            Verb::Look => apply(transitions::look(world, rules, ambient_at(now))),
            Verb::Pet => apply(transitions::pet(world, rules)),
            Verb::Feed => match first.map(parse_item).transpose() {
                Ok(food) => apply(transitions::feed(world, food, rules)),
                Err(rejection) => apply(Err(rejection)),
            },
            Verb::Play => match first.map(parse_item).transpose() {
                Ok(toy) => apply(transitions::play(world, toy, rules)),
                Err(rejection) => apply(Err(rejection)),
            },
            Verb::Sleep => apply(transitions::sleep(world, rules)),
            Verb::Wash => apply(transitions::wash(world, rules)),
            Verb::Gather => apply(transitions::gather(world, rules)),
            Verb::Chop => apply(transitions::chop(world, rules)),
            Verb::Shear => apply(transitions::shear(world, rules)),
            Verb::Cook => apply(transitions::cook(world)),
            Verb::Craft => {
                if args.is_empty() {
                    return Step::Ask(Pending::CraftBlueprint, craft_question(world));
                }
                match parse_item(&args.join(" ")) {
                    Ok(item) => apply(transitions::craft(world, item)),
                    Err(rejection) => apply(Err(rejection)),
                }
            }
            Verb::Sew => {
                if !world.tools.contains(&Item::Needle) {
                    return apply(Err(Rejection::Missing(Item::Needle)));
                }
                if args.is_empty() {
                    let question = format!(
                        "🪡 What do you want to sew? {}",
                        transitions::pattern_list()
                    );
                    return Step::Ask(Pending::SewPattern, question);
                }
                apply(parse_item(&args.join(" ")).and_then(|item| transitions::sew(world, item)))
            }
            Verb::Dress => match first.map(parse_item).transpose() {
                Ok(clothing) => apply(transitions::dress(world, clothing)),
                Err(rejection) => apply(Err(rejection)),
            },
            Verb::Hike => {
                if args.is_empty() {
                    return apply(transitions::hike(world, rules));
                }
                match Direction::parse_move(&args.join(" ")) {
                    Some(directions) => apply(transitions::hike_move(world, directions)),
                    None => apply(Err(Rejection::Usage(
                        "A move is four steps, e.g. \"hike ➡️⬇️⬅️⬆️\" or \"hike rdlu\".",
                    ))),
                }
            }
            Verb::Talk => apply(transitions::talk(world)),
            Verb::Use => self.use_command(&args, world),
            Verb::Name => {
                if args.is_empty() {
                    let question = format!("✏️ What should {} be called?", world.pet.name);
                    return Step::Ask(Pending::PetName, question);
                }
                apply(transitions::rename(world, &args.join(" "), rules))
            }
            Verb::Inventory => apply(transitions::inventory(world)),
            Verb::Help => Step::Say(verb, self.table.help_text()),
            Verb::Cancel => apply(Err(Rejection::Usage("There is nothing to cancel."))),
        }
    }

    fn use_command(&self, args: &[String], world: &World) -> Step {
        let step = |t: Transition| Step::Apply(Verb::Use, t);
        let Some(item_token) = args.first() else {
            return step(Err(Rejection::Usage(
                "Use what? Try \"use 🧽 on pet\".",
            )));
        };
        let item = match parse_item(item_token) {
            Ok(item) => item,
            Err(rejection) => return step(Err(rejection)),
        };
        if !owns(world, item) {
            return step(Err(Rejection::Missing(item)));
        }
        let rest: Vec<&str> = args[1..]
            .iter()
            .map(String::as_str)
            .filter(|word| !matches!(word.to_lowercase().as_str(), "on" | "with" | "at"))
            .collect();
        if rest.is_empty() {
            let question = format!("{} Use it on what? pet, meadow or woods?", item);
            return Step::Ask(Pending::UseTarget { item }, question);
        }
        let target_text = rest.join(" ");
        match Target::parse(&target_text, world) {
            Some(target) => step(transitions::use_item(world, item, target, &self.rules)),
            None => step(Err(Rejection::UnknownTarget(target_text))),
        }
    }

    /// Interpret `text` as the answer to an earlier question.
    fn answer(&self, pending: Pending, text: &str, world: &World) -> Step {
        let text = text.trim();
        match pending {
            Pending::UseTarget { item } => {
                let result = match Target::parse(text, world) {
                    Some(target) => transitions::use_item(world, item, target, &self.rules),
                    None => Err(Rejection::UnknownTarget(text.to_string())),
                };
                Step::Apply(Verb::Use, result)
            }
            Pending::CraftBlueprint => {
                let result = parse_item(text).and_then(|item| transitions::craft(world, item));
                Step::Apply(Verb::Craft, result)
            }
            Pending::PetName => {
                Step::Apply(Verb::Name, transitions::rename(world, text, &self.rules))
            }
            Pending::SewPattern => {
                let result = parse_item(text).and_then(|item| transitions::sew(world, item));
                Step::Apply(Verb::Sew, result)
            }
        }
    }
}

fn parse_item(token: &str) -> Result<Item, Rejection> {
    Item::from_token(token.trim()).ok_or_else(|| Rejection::UnknownItem(token.trim().to_string()))
}

fn owns(world: &World, item: Item) -> bool {
    world.tools.contains(&item)
        || world.inventory.has(item, 1)
        || world.room.furniture.contains(&item)
}

fn craft_question(world: &World) -> String {
    let options = world
        .blueprints
        .iter()
        .map(|item| {
            format!(
                "{} {} ({})",
                item,
                item.word(),
                format_materials(item.blueprint().unwrap_or(&[]))
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("🔨 What do you want to craft? {}", options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandsConfig;
    use crate::sim::story::SewingChapter;
    use crate::sim::types::{GrowthStage, PlayerId, TutorialChapter};
    use std::time::Duration;

    fn interpreter() -> Interpreter {
        let table = CommandTable::new(&CommandsConfig::default()).expect("table");
        Interpreter::new(table, SimRules::default())
    }

    fn record() -> PlayerRecord {
        PlayerRecord::new(
            PlayerId::new("irc", "ann"),
            Utc::now(),
            World::new("Feini", &SimRules::default()),
        )
    }

    fn hatched_record(interp: &Interpreter) -> PlayerRecord {
        let mut rec = record();
        interp.handle(&mut rec, "pet", Utc::now());
        assert_eq!(rec.world.pet.stage, GrowthStage::Hatchling);
        rec
    }

    #[test]
    fn first_look_describes_egg_and_starts_tutorial() {
        let interp = interpreter();
        let mut rec = record();
        let reply = interp.handle(&mut rec, "look", Utc::now());
        assert_eq!(reply.kind, ReplyKind::Applied);
        assert!(reply.text.contains("egg"));
        assert!(reply.text.contains("Inventory: empty"));
        assert!(reply.text.contains("You found an egg"));
        assert_eq!(rec.tutorial, TutorialChapter::Touch);
    }

    #[test]
    fn unknown_verb_gets_not_understood_reply() {
        let interp = interpreter();
        let mut rec = record();
        rec.tutorial = TutorialChapter::Done;
        let before = rec.clone();
        let reply = interp.handle(&mut rec, "xyzzy", Utc::now());
        assert_eq!(reply.kind, ReplyKind::Rejected);
        assert!(reply.text.contains("xyzzy"));
        assert_eq!(rec, before);
    }

    #[test]
    fn rejected_feed_leaves_world_untouched() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        rec.world.pet.needs.hunger = 10;
        let world_before = rec.world.clone();
        let reply = interp.handle(&mut rec, "feed", Utc::now());
        assert_eq!(reply.kind, ReplyKind::Rejected);
        assert_eq!(rec.world, world_before);
    }

    #[test]
    fn use_without_target_asks_then_applies_answer() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        rec.world.pet.needs.hygiene = 1;
        let ask = interp.handle(&mut rec, "use sponge", Utc::now());
        assert_eq!(ask.kind, ReplyKind::Prompted);
        assert_eq!(rec.pending, Some(Pending::UseTarget { item: Item::Sponge }));

        // "pet" is a verb too, but here it answers the question.
        let done = interp.handle(&mut rec, "pet", Utc::now());
        assert_eq!(done.kind, ReplyKind::Applied);
        assert_eq!(rec.pending, None);
        assert_eq!(rec.world.pet.needs.hygiene, interp.rules().max_level);
    }

    #[test]
    fn cancel_drops_the_question() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        interp.handle(&mut rec, "craft", Utc::now());
        assert_eq!(rec.pending, Some(Pending::CraftBlueprint));
        let reply = interp.handle(&mut rec, "cancel", Utc::now());
        assert_eq!(reply.kind, ReplyKind::Cancelled);
        assert_eq!(rec.pending, None);
    }

    #[test]
    fn name_prompt_takes_whole_answer() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        interp.handle(&mut rec, "name", Utc::now());
        let reply = interp.handle(&mut rec, "Sir Biscuit", Utc::now());
        assert_eq!(reply.kind, ReplyKind::Applied);
        assert_eq!(rec.world.pet.name, "Sir Biscuit");
    }

    #[test]
    fn use_with_unowned_item_is_rejected_before_prompting() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        let reply = interp.handle(&mut rec, "use axe", Utc::now());
        assert_eq!(reply.kind, ReplyKind::Rejected);
        assert_eq!(rec.pending, None);
    }

    #[test]
    fn tutorial_walks_through_gather_and_feed() {
        let interp = interpreter();
        let mut rec = record();
        interp.handle(&mut rec, "look", Utc::now());
        let hatch = interp.handle(&mut rec, "pet", Utc::now());
        assert!(hatch.text.contains("gather"));
        let gathered = interp.handle(&mut rec, "gather", Utc::now());
        assert!(gathered.text.contains("feed"));
        rec.world.pet.needs.hunger = 10;
        let fed = interp.handle(&mut rec, "feed", Utc::now());
        assert_eq!(fed.kind, ReplyKind::Applied);
        assert_eq!(rec.tutorial, TutorialChapter::Craft);
        let crafted = interp.handle(&mut rec, "craft axe", Utc::now());
        assert_eq!(crafted.kind, ReplyKind::Applied);
        assert_eq!(rec.tutorial, TutorialChapter::Done);
    }

    #[test]
    fn owning_scissors_brings_the_ghost_and_its_needle() {
        let interp = interpreter();
        let rules = interp.rules().clone();
        let mut rec = hatched_record(&interp);
        rec.tutorial = TutorialChapter::Done;
        rec.world.inventory.add(Item::Stone, 3);
        rec.world.inventory.add(Item::Wood, 1);
        interp.handle(&mut rec, "craft scissors", Utc::now());
        assert!(matches!(rec.world.sewing, SewingChapter::Visit { .. }));

        let arrival = Duration::from_secs(rules.visit_delay_secs);
        rec.world = crate::sim::clock::apply_elapsed(&rec.world, arrival, &rules);
        assert!(rec.world.visitor.is_some());

        for _ in 0..3 {
            interp.handle(&mut rec, "talk", Utc::now());
        }
        rec.world.inventory.add(Item::Wool, 3);
        let learned = interp.handle(&mut rec, "talk", Utc::now());
        assert!(learned.text.contains("blueprint"), "reply was: {}", learned.text);
        assert!(rec.world.blueprints.contains(&Item::Needle));

        let bye = interp.handle(&mut rec, "talk", Utc::now());
        assert!(bye.text.contains("fades away"), "reply was: {}", bye.text);
        assert!(rec.world.visitor.is_none());
        assert_eq!(rec.world.sewing, SewingChapter::Done);
    }

    #[test]
    fn sew_without_pattern_asks_which_one() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        let refused = interp.handle(&mut rec, "sew", Utc::now());
        assert_eq!(refused.kind, ReplyKind::Rejected);

        rec.world.tools.insert(Item::Needle);
        rec.world.inventory.add(Item::Wool, 4);
        let ask = interp.handle(&mut rec, "sew", Utc::now());
        assert_eq!(ask.kind, ReplyKind::Prompted);
        assert!(ask.text.contains("🎀"));
        let sewn = interp.handle(&mut rec, "ribbon", Utc::now());
        assert_eq!(sewn.kind, ReplyKind::Applied);
        assert_eq!(rec.world.inventory.count(Item::Ribbon), 1);

        let dressed = interp.handle(&mut rec, "wear 🎀", Utc::now());
        assert_eq!(dressed.kind, ReplyKind::Applied);
        assert_eq!(rec.world.pet.clothing, Some(Item::Ribbon));
    }

    #[test]
    fn hike_with_bad_directions_is_a_usage_error() {
        let interp = interpreter();
        let mut rec = hatched_record(&interp);
        rec.world.tools.insert(Item::Compass);
        let started = interp.handle(&mut rec, "hike", Utc::now());
        assert_eq!(started.kind, ReplyKind::Applied);
        assert!(rec.world.hike.is_some());
        let before = rec.world.clone();
        let bad = interp.handle(&mut rec, "hike ➡️⬇️", Utc::now());
        assert_eq!(bad.kind, ReplyKind::Rejected);
        assert_eq!(rec.world, before);
        let walked = interp.handle(&mut rec, "hike u u u u", Utc::now());
        assert_eq!(walked.kind, ReplyKind::Applied);
    }
}
