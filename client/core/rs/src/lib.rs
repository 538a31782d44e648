//! Shared entity model and request grammar for the Ferry migration
//! service. Both surface grammars (legacy flat JSON and semantic
//! JSON-LD) normalize into the internal [Task](entities::task::Task)
//! model defined here.

pub mod entities;
pub mod error;

/// Current unix timestamp in milliseconds.
pub fn unix_timestamp_ms() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// Current UTC date formatted as `YYYY-MM-DD`.
pub fn utc_date_string() -> String {
  chrono::Utc::now().format("%Y-%m-%d").to_string()
}
