//! # tinypet - a virtual pet that lives in your chat
//!
//! tinypet runs one small pet world per chat. Players talk to it over
//! Telegram, IRC or a local console with short words or emoji (`feed 🥕`,
//! `pet`, `🎾`). Time keeps passing while nobody is looking: needs decay,
//! food spoils, the meadow regrows and the pet grows from an egg to an adult.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tinypet::config::Config;
//! use tinypet::gateway::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.run(Vec::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`sim`] - world model, elapsed-time rules, verbs, store and tick scheduler
//! - [`gateway`] - adapter trait, per-player ordering and reply delivery
//! - [`adapters`] - console, Telegram and IRC messengers
//! - [`config`] - TOML configuration and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Adapters     │ ← Telegram / IRC / console
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │     Gateway     │ ← ordering, busy policy, outbox
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Interpreter   │ ← verbs and transitions
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   PetStore      │ ← sled, session locks
//! └─────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod gateway;
pub mod logutil;
pub mod metrics;
pub mod sim;
