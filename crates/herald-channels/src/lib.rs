//! # herald-channels
//!
//! Messaging platform integrations for Herald.

pub mod zulip;
