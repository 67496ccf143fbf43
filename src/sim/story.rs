//! Visitors and the sewing story.
//!
//! Once the player owns ✂️, a ghost drops by after a while. Talking through
//! its dialogue and handing over the wool it asks for teaches the 🪡
//! blueprint, which in turn unlocks sewing clothes. Chapter changes driven
//! by time live in [`advance`]; the ones driven by the player's own actions
//! live in [`after_command`].

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::items::{format_materials, Item};
use super::rules::SimRules;
use super::types::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Greeting,
    Hello,
    Daughter,
    Request,
    Blueprint,
    Goodbye,
}

const REQUEST: [(Item, u32); 1] = [(Item::Wool, 3)];

impl Topic {
    /// Items the visitor wants before moving past this line.
    pub fn request(self) -> &'static [(Item, u32)] {
        match self {
            Topic::Request => &REQUEST,
            _ => &[],
        }
    }

    pub fn line(self, pet: &str) -> String {
        let text = match self {
            Topic::Greeting => "Oooh... someone who can see me! Say \"talk\" if you dare.".to_string(),
            Topic::Hello => format!("Hello! I lived in this meadow long ago. And hello to you, {}.", pet),
            Topic::Daughter => {
                "My daughter loved to sew. I still dream of the clothes she made.".to_string()
            }
            Topic::Request => format!(
                "Would you bring me {}? I want to feel soft wool once more.",
                format_materials(&REQUEST)
            ),
            Topic::Blueprint => format!(
                "Thank you! Let me show you how to make a {} like hers.",
                Item::Needle
            ),
            Topic::Goodbye => format!("I can rest now. Take good care of {}. Goodbye!", pet),
        };
        format!("{} {}", Visitor::AVATAR, text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    /// Lines still to be said; the front one is what the visitor says now.
    pub dialogue: VecDeque<Topic>,
}

impl Visitor {
    pub const AVATAR: &'static str = "👻";

    pub fn ghost() -> Self {
        Self {
            dialogue: VecDeque::from([
                Topic::Greeting,
                Topic::Hello,
                Topic::Daughter,
                Topic::Request,
                Topic::Blueprint,
                Topic::Goodbye,
            ]),
        }
    }

    pub fn current(&self) -> Option<Topic> {
        self.dialogue.front().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SewingChapter {
    /// Waiting for the player to own ✂️.
    Scissors,
    /// The ghost arrives once the pet's age reaches `arrives_at`.
    Visit { arrives_at: Duration },
    /// The ghost is here, waiting for its wool.
    Quest,
    /// 🪡 blueprint learned, goodbye still to come.
    Leave,
    Done,
}

/// Time-driven chapter changes. Only depends on the pet's age, so applying
/// time in pieces gives the same result as applying it at once.
pub fn advance(world: &mut World) {
    if let SewingChapter::Visit { arrives_at } = world.sewing {
        if world.pet.age >= arrives_at {
            world.visitor = Some(Visitor::ghost());
            world.sewing = SewingChapter::Quest;
        }
    }
}

/// Chapter changes caused by the command just applied. Returns a line to
/// add to the reply when the player should hear about it.
pub fn after_command(world: &mut World, rules: &SimRules) -> Option<String> {
    let topic = world.visitor.as_ref().and_then(Visitor::current);
    match world.sewing {
        SewingChapter::Scissors if world.tools.contains(&Item::Scissors) => {
            let delay = Duration::from_secs(rules.visit_delay_secs);
            world.sewing = SewingChapter::Visit {
                arrives_at: world.pet.age.saturating_add(delay),
            };
            None
        }
        SewingChapter::Quest if matches!(topic, Some(Topic::Blueprint | Topic::Goodbye)) => {
            world.blueprints.insert(Item::Needle);
            world.sewing = SewingChapter::Leave;
            Some(format!("📜 You learned the {} blueprint!", Item::Needle))
        }
        SewingChapter::Leave if topic == Some(Topic::Goodbye) => {
            world.visitor = None;
            world.sewing = SewingChapter::Done;
            Some(format!("{} The ghost fades away with a smile.", Visitor::AVATAR))
        }
        _ => None,
    }
}
