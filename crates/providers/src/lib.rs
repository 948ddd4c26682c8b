#![warn(clippy::unwrap_used)]

pub mod adapter;
pub mod client;
pub mod gate;
pub mod outflow;
pub mod personalization;
pub mod sendline;

pub use adapter::{AdapterFactory, ContactPresence, LiveAdapterFactory, ProviderAdapter, StepDraft};
pub use client::{AuthVariant, ProviderClient, RequestOpts};
pub use gate::{Lane, RateGate};
