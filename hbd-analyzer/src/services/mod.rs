//! Analysis pipeline components
//!
//! Leaf-first: parser, detector, cluster engine, target inferencer, date
//! adjuster, identity resolver, confidence scorer. Each component compiles
//! its configuration once and then acts as a pure function of its inputs.

pub mod cluster_engine;
pub mod confidence_scorer;
pub mod date_adjuster;
pub mod identity_resolver;
pub mod target_inferencer;
pub mod transcript_parser;
pub mod wish_detector;

pub use cluster_engine::ClusterEngine;
pub use confidence_scorer::{Adjustment, ConfidenceExplanation, ConfidenceScorer};
pub use date_adjuster::DateAdjuster;
pub use identity_resolver::{IdentityKey, IdentityResolver};
pub use target_inferencer::TargetInferencer;
pub use transcript_parser::{ParsedTranscript, TranscriptParser};
pub use wish_detector::WishDetector;
