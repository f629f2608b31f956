//! Per-user sessions for Concierge.
//!
//! A session bundles one user's resolved capabilities, the orchestrator
//! bound to them, and that user's conversation memory. Sessions are created
//! on first use and rebuilt from scratch after every configuration change.

pub mod manager;
pub mod slots;

pub use manager::{SessionManager, SessionSummary};
pub use slots::SessionSlots;
