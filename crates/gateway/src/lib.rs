//! Command-line front-end for Concierge.

pub mod bootstrap;
pub mod cli;
