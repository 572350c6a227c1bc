//! # herald-core
//!
//! Core types, traits, grammar, configuration, and error handling for Herald.

pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod grammar;
pub mod message;
pub mod query;
pub mod traits;

pub use config::shellexpand;
