//! # mamaz-core
//!
//! Core types, traits, configuration, and session state for the mamaz relay.

pub mod config;
pub mod dedup;
pub mod error;
pub mod jid;
pub mod message;
pub mod session;
pub mod traits;
