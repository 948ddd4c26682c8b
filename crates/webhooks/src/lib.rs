#![warn(clippy::unwrap_used)]

pub mod events;
pub mod handlers;
pub mod signature;

pub use events::{parse_event, InboundEvent, WebhookKind};
pub use handlers::{IntakeStatus, WebhookProcessor};
pub use signature::verify_signature;
