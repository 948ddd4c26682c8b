#![warn(clippy::unwrap_used)]

pub mod store;

pub use store::{
    ActivityKey, AtlasStore, CampaignMetric, DailyDelta, HourlyField, InsertOutcome,
};
