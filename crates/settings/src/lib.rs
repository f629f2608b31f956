//! Per-user persisted configuration for Concierge.
//!
//! Two logical tables keyed by user: feature flags (one row per capability
//! kind) and parameters (one row per key, shared across kinds). Every
//! operation is a single transactional read or upsert.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteSettingsStore;
pub use store::{SettingsStore, MAX_KEY_LEN, MAX_VALUE_LEN};
