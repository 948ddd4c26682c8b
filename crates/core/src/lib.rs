#![warn(clippy::unwrap_used)]

pub mod category;
pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AtlasError, AtlasResult};
