//! hbd-analyzer - Birthday extraction from chat transcripts
//!
//! Reads exported chat transcripts, finds bursts of birthday wishes,
//! works out whose birthday each burst celebrates and merges the evidence
//! across chats and years into scored birthday identities.
//!
//! Stages: [`services::TranscriptParser`] → [`services::WishDetector`] →
//! [`services::ClusterEngine`] → [`services::TargetInferencer`] →
//! [`services::DateAdjuster`] → [`services::IdentityResolver`] →
//! [`services::ConfidenceScorer`], orchestrated by [`BirthdayPipeline`].

pub mod enrichment;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod services;
pub mod store;

pub use error::{AnalyzerError, AnalyzerResult};
pub use pipeline::{BatchReport, BirthdayPipeline, FileOutcome, FileReport, ScoredIdentity};
pub use store::{InMemoryStore, RecordStore};
