//! Sublym run events and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`RunEvent`]: the envelope published when a run reaches a terminal state.
//! - [`delivery`]: external delivery channels (email).
//! - [`CompletionNotifier`]: background task that emails users a link to
//!   their finished result.

pub mod bus;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, RunEvent};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use notifier::CompletionNotifier;
