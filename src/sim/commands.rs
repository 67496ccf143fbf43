//! Verb table and command parsing.
//!
//! The set of verbs is closed: [`Verb`] lists every command the simulation
//! knows, each with built-in aliases. Operators can disable verbs and add
//! aliases in the config; [`CommandTable::new`] checks those settings once
//! at startup so a typo in the config fails loudly instead of silently
//! swallowing commands.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::items::{strip_variation_selectors, Item};
use super::transitions::Rejection;
use crate::config::CommandsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Look,
    Pet,
    Feed,
    Play,
    Sleep,
    Wash,
    Gather,
    Chop,
    Shear,
    Cook,
    Craft,
    Sew,
    Dress,
    Hike,
    Talk,
    Use,
    Name,
    Inventory,
    Help,
    Cancel,
}

impl Verb {
    pub const ALL: [Verb; 20] = [
        Verb::Look,
        Verb::Pet,
        Verb::Feed,
        Verb::Play,
        Verb::Sleep,
        Verb::Wash,
        Verb::Gather,
        Verb::Chop,
        Verb::Shear,
        Verb::Cook,
        Verb::Craft,
        Verb::Sew,
        Verb::Dress,
        Verb::Hike,
        Verb::Talk,
        Verb::Use,
        Verb::Name,
        Verb::Inventory,
        Verb::Help,
        Verb::Cancel,
    ];

    pub fn canonical(self) -> &'static str {
        match self {
            Verb::Look => "look",
            Verb::Pet => "pet",
            Verb::Feed => "feed",
            Verb::Play => "play",
            Verb::Sleep => "sleep",
            Verb::Wash => "wash",
            Verb::Gather => "gather",
            Verb::Chop => "chop",
            Verb::Shear => "shear",
            Verb::Cook => "cook",
            Verb::Craft => "craft",
            Verb::Sew => "sew",
            Verb::Dress => "dress",
            Verb::Hike => "hike",
            Verb::Talk => "talk",
            Verb::Use => "use",
            Verb::Name => "name",
            Verb::Inventory => "inventory",
            Verb::Help => "help",
            Verb::Cancel => "cancel",
        }
    }

    /// Built-in aliases, already lowercased and free of variation selectors.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Verb::Look => &["l", "status", "👀"],
            Verb::Pet => &["touch", "pat", "👋", "🤚", "✋", "🖐"],
            Verb::Feed => &["eat", "🥕", "🍲"],
            Verb::Play => &["fetch", "🎾"],
            Verb::Sleep => &["rest", "nap", "💤"],
            Verb::Wash => &["bath", "clean", "🧽", "🛁"],
            Verb::Gather => &["harvest", "🧺"],
            Verb::Chop => &["🪓"],
            Verb::Shear => &["✂"],
            Verb::Cook => &["🍳"],
            Verb::Craft => &["build", "make", "🔨", "⚒", "🛠"],
            Verb::Sew => &["stitch", "🪡"],
            Verb::Dress => &["wear", "👕", "👗"],
            Verb::Hike => &["walk", "explore", "🧭", "🥾"],
            Verb::Talk => &["chat", "💬", "👻"],
            Verb::Use => &[],
            Verb::Name => &["rename", "✏", "🖊"],
            Verb::Inventory => &["i", "inv", "tent", "⛺", "🏕"],
            Verb::Help => &["h", "?", "commands"],
            Verb::Cancel => &["nevermind", "stop"],
        }
    }

    pub fn usage(self) -> &'static str {
        match self {
            Verb::Look => "look - see how your pet is doing",
            Verb::Pet => "pet - give your pet some love",
            Verb::Feed => "feed [food] - feed your pet",
            Verb::Play => "play [toy] - play with your pet",
            Verb::Sleep => "sleep - put your pet to bed",
            Verb::Wash => "wash - scrub your pet clean",
            Verb::Gather => "gather - pick vegetables in the meadow",
            Verb::Chop => "chop - chop wood in the woods",
            Verb::Shear => "shear - trim your pet's fur for wool",
            Verb::Cook => "cook - turn 🥕🥕 into 🍲",
            Verb::Craft => "craft <item> - build a tool or furniture",
            Verb::Sew => "sew <clothing> - sew clothes with the 🪡",
            Verb::Dress => "dress [clothing] - dress your pet, or undress it",
            Verb::Hike => "hike [➡️⬇️⬅️⬆️] - go hiking with the 🧭, four steps per move",
            Verb::Talk => "talk - talk to whoever is visiting",
            Verb::Use => "use <item> on <pet|meadow|woods>",
            Verb::Name => "name <name> - rename your pet",
            Verb::Inventory => "inventory - list items, tools and blueprints",
            Verb::Help => "help - this list",
            Verb::Cancel => "cancel - forget a question I asked",
        }
    }

    pub fn from_canonical(name: &str) -> Option<Verb> {
        let name = name.trim().to_lowercase();
        Verb::ALL.into_iter().find(|v| v.canonical() == name)
    }
}

/// One parsed command: a verb and its raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub args: Vec<String>,
}

fn normalize(token: &str) -> String {
    strip_variation_selectors(token).to_lowercase()
}

/// Lookup from any accepted spelling to its canonical verb.
#[derive(Debug, Clone)]
pub struct CommandTable {
    lookup: HashMap<String, Verb>,
    enabled: Vec<Verb>,
}

impl CommandTable {
    /// Build the table from config, rejecting unknown verbs, aliases that
    /// point at disabled verbs, and aliases that collide.
    pub fn new(cfg: &CommandsConfig) -> Result<Self> {
        let mut enabled = Vec::new();
        for name in &cfg.enabled {
            let verb = Verb::from_canonical(name)
                .ok_or_else(|| anyhow!("commands.enabled: unknown verb '{}'", name))?;
            if !enabled.contains(&verb) {
                enabled.push(verb);
            }
        }
        if !enabled.contains(&Verb::Help) {
            return Err(anyhow!("commands.enabled must include 'help'"));
        }

        let mut lookup = HashMap::new();
        for verb in &enabled {
            lookup.insert(verb.canonical().to_string(), *verb);
            for alias in verb.aliases() {
                lookup.insert((*alias).to_string(), *verb);
            }
        }

        let mut extra: Vec<(&String, &String)> = cfg.aliases.iter().collect();
        extra.sort();
        for (alias, target) in extra {
            let verb = Verb::from_canonical(target).ok_or_else(|| {
                anyhow!("commands.aliases: '{}' points at unknown verb '{}'", alias, target)
            })?;
            if !enabled.contains(&verb) {
                return Err(anyhow!(
                    "commands.aliases: '{}' points at disabled verb '{}'",
                    alias,
                    target
                ));
            }
            let key = normalize(alias);
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(anyhow!("commands.aliases: '{}' must be a single word", alias));
            }
            if let Some(existing) = lookup.get(&key) {
                if *existing != verb {
                    return Err(anyhow!(
                        "commands.aliases: '{}' already means '{}'",
                        alias,
                        existing.canonical()
                    ));
                }
            }
            lookup.insert(key, verb);
        }
        Ok(Self { lookup, enabled })
    }

    pub fn enabled(&self) -> &[Verb] {
        &self.enabled
    }

    pub fn resolve(&self, token: &str) -> Option<Verb> {
        self.lookup.get(&normalize(token)).copied()
    }

    /// Split raw chat text into a command. Unknown verbs come back as a
    /// rejection carrying the offending word.
    pub fn parse(&self, text: &str) -> Result<Command, Rejection> {
        let mut tokens = text.split_whitespace();
        let Some(first) = tokens.next() else {
            return Err(Rejection::Usage(
                "Say something! Send \"help\" for a list of commands.",
            ));
        };
        let verb = self
            .resolve(first)
            .ok_or_else(|| Rejection::NotUnderstood(first.to_string()))?;
        let mut args: Vec<String> = tokens.map(str::to_string).collect();
        // "🥕" on its own means "feed 🥕".
        if verb == Verb::Feed {
            if let Some(food) = Item::from_token(first).filter(|item| item.is_food()) {
                args.insert(0, food.emoji().to_string());
            }
        }
        Ok(Command { verb, args })
    }

    pub fn help_text(&self) -> String {
        let mut lines = vec!["📖 Commands:".to_string()];
        lines.extend(self.enabled.iter().map(|verb| format!("• {}", verb.usage())));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CommandTable {
        CommandTable::new(&CommandsConfig::default()).expect("default table")
    }

    #[test]
    fn verbs_are_case_insensitive_and_aliased() {
        let t = table();
        assert_eq!(t.parse("LOOK").expect("look").verb, Verb::Look);
        assert_eq!(t.parse("  l ").expect("l").verb, Verb::Look);
        assert_eq!(t.parse("👋").expect("wave").verb, Verb::Pet);
        assert_eq!(t.parse("✂️").expect("scissors").verb, Verb::Shear);
        assert_eq!(t.parse("🛠️").expect("tools").verb, Verb::Craft);
    }

    #[test]
    fn arguments_keep_their_order() {
        let cmd = table().parse("use  🧽 on   pet").expect("use");
        assert_eq!(cmd.verb, Verb::Use);
        assert_eq!(cmd.args, vec!["🧽", "on", "pet"]);
    }

    #[test]
    fn hike_moves_stay_arguments() {
        let cmd = table().parse("🧭 ➡️⬇️⬅️⬆️").expect("hike");
        assert_eq!(cmd.verb, Verb::Hike);
        assert_eq!(cmd.args, vec!["➡️⬇️⬅️⬆️"]);
        assert_eq!(table().parse("wear 🧢").expect("wear").verb, Verb::Dress);
        assert_eq!(table().parse("👻").expect("ghost").verb, Verb::Talk);
    }

    #[test]
    fn food_emoji_implies_feed_argument() {
        let cmd = table().parse("🍲").expect("stew");
        assert_eq!(cmd.verb, Verb::Feed);
        assert_eq!(cmd.args, vec!["🍲"]);
    }

    #[test]
    fn unknown_verb_is_not_understood() {
        let err = table().parse("dance wildly").unwrap_err();
        assert_eq!(err, Rejection::NotUnderstood("dance".into()));
        assert!(err.to_string().contains("don't understand"));
        assert!(matches!(table().parse("   "), Err(Rejection::Usage(_))));
    }

    #[test]
    fn disabled_verbs_are_unknown() {
        let cfg = CommandsConfig {
            enabled: vec!["look".into(), "help".into()],
            aliases: Default::default(),
        };
        let t = CommandTable::new(&cfg).expect("table");
        assert!(t.parse("feed").is_err());
        assert!(t.parse("🥕").is_err());
        assert_eq!(t.enabled(), &[Verb::Look, Verb::Help]);
    }

    #[test]
    fn config_typos_fail_at_startup() {
        let cfg = CommandsConfig {
            enabled: vec!["look".into(), "help".into(), "fede".into()],
            aliases: Default::default(),
        };
        assert!(CommandTable::new(&cfg).is_err());

        let mut cfg = CommandsConfig::default();
        cfg.aliases.insert("snack".into(), "feeed".into());
        assert!(CommandTable::new(&cfg).is_err());

        let mut cfg = CommandsConfig::default();
        cfg.aliases.insert("l".into(), "feed".into());
        assert!(CommandTable::new(&cfg).is_err());
    }

    #[test]
    fn extra_aliases_resolve() {
        let mut cfg = CommandsConfig::default();
        cfg.aliases.insert("Snack".into(), "feed".into());
        let t = CommandTable::new(&cfg).expect("table");
        assert_eq!(t.parse("snack").expect("snack").verb, Verb::Feed);
    }
}
