//! Messenger-facing side of the bot: the [`Adapter`] contract, the
//! [`Gateway`] that serializes each player's messages and the outbox that
//! delivers replies and notices.

pub mod adapter;
pub mod outbox;
pub mod server;

pub use adapter::{Adapter, DeliveryError, Inbound};
pub use outbox::{start_outbox, Envelope, EnvelopeKind, OutboxConfig, OutboxHandle, OutboxStats};
pub use server::Gateway;
