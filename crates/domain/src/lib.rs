//! Shared types for the Concierge workspace: conversation messages, tool
//! call payloads, the error type, structured trace events and the TOML
//! configuration tree.

pub mod config;
pub mod error;
pub mod tool;
pub mod trace;
