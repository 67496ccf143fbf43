//! Pet simulation core: the world model, elapsed-time rules, player verbs and
//! the sled-backed store that keeps one record per player. Nothing in here
//! knows about messengers; the gateway feeds text in and sends text out.

pub mod clock;
pub mod commands;
pub mod errors;
pub mod hike;
pub mod interpreter;
pub mod inventory;
pub mod items;
pub mod rules;
pub mod scheduler;
pub mod storage;
pub mod story;
pub mod transitions;
pub mod tutorial;
pub mod types;

pub use clock::{ambient_at, apply_elapsed, catch_up, Ambient, Notice};
pub use commands::{Command, CommandTable, Verb};
pub use errors::{ErrorClass, PetError};
pub use hike::{Direction, Hike, Tile};
pub use interpreter::{Interpreter, Reply, ReplyKind};
pub use inventory::{format_inventory_compact, Inventory};
pub use items::{Item, ItemCategory};
pub use rules::SimRules;
pub use scheduler::{start_ticker, TickConfig, TickHandle, TickNotice};
pub use storage::{MemoryBackend, PetStore, PetStoreBuilder, SledBackend, StateBackend};
pub use story::{SewingChapter, Topic, Visitor};
pub use transitions::{Outcome, Rejection, Target};
pub use types::*;
