//! Test Helper Utilities
//!
//! Shared transcript fixtures and log capture for hbd-analyzer integration tests

#![allow(dead_code)]

pub mod log_capture;
pub mod transcripts;

pub use log_capture::{capture_logs, LogCapture};
pub use transcripts::{write_raw, TranscriptBuilder};
