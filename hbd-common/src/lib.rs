//! # HBD Common Library
//!
//! Shared code for the birthday detection workspace including:
//! - Record types (messages, participants, clusters, identities)
//! - Analysis configuration loading and defaults
//! - Error taxonomy
//! - Progress event types and the EventBus
//! - Calendar helpers

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use config::AnalysisConfig;
pub use error::{Error, Result};
