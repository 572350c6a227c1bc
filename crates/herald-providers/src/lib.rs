//! # herald-providers
//!
//! Completion providers and external query sources for Herald.

pub mod arxiv;
pub mod openai;
