//! Client-side conversation state machine.

pub mod controller;
pub mod directory;
pub mod error;
pub mod gate;
pub mod identity;
pub mod selector;
pub mod subscription;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Change, ChatController, Command, Event, Mailbox, Outbox, mailbox};
pub use directory::{Directory, Listing};
pub use error::{AuthError, ChatError};
pub use gate::{GateView, SessionGate};
pub use selector::Selection;
pub use thread::{ThreadView, Ticket};
