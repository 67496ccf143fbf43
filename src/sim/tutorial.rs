//! Intro tutorial progression.
//!
//! The tutorial is a short chain of chapters. Each chapter has a goal; once
//! the player's world (or the command they just ran) meets it, the chapter
//! advances and the player gets a hint for the next step.

use super::commands::Verb;
use super::items::Item;
use super::types::{TutorialChapter, World};

/// Check whether `chapter` is complete given the command just applied (if
/// any) and the resulting world. Returns the next chapter and its hint.
pub fn progress(
    chapter: TutorialChapter,
    applied: Option<Verb>,
    world: &World,
) -> Option<(TutorialChapter, &'static str)> {
    match chapter {
        TutorialChapter::Start => Some((
            TutorialChapter::Touch,
            "🥚 You found an egg! Send \"pet\" to keep it warm.",
        )),
        TutorialChapter::Touch if world.hatched() => Some((
            TutorialChapter::Gather,
            "🧺 Pets get hungry. Send \"gather\" to pick vegetables in the meadow.",
        )),
        TutorialChapter::Gather if world.inventory.first_food().is_some() => Some((
            TutorialChapter::Feed,
            "🥕 Now send \"feed\" to give your pet a snack.",
        )),
        TutorialChapter::Feed if applied == Some(Verb::Feed) => Some((
            TutorialChapter::Craft,
            "🔨 You know how to make an 🪓. Send \"craft axe\" when you have a 🪨.",
        )),
        TutorialChapter::Craft if applied == Some(Verb::Craft) && world.tools.contains(&Item::Axe) => {
            Some((
                TutorialChapter::Done,
                "🎓 That's the basics! Send \"help\" whenever you need a reminder.",
            ))
        }
        _ => None,
    }
}
