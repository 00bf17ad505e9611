//! Confidence scoring for identities
//!
//! Additive model: a base score plus bonuses and penalties derived from the
//! evidence summary, clamped to [0, 1]. The same adjustment list drives both
//! the score and its explanation, so the audit trail always matches the
//! number.

use hbd_common::config::{AnalysisConfig, ConfidenceConfig};
use hbd_common::models::Identity;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Total wishers earning the full wishers bonus
const MANY_WISHERS: usize = 5;
/// Total wishers earning half the wishers bonus
const SOME_WISHERS: usize = 3;
/// Years beyond the first that keep adding to the multi-year bonus
const MULTI_YEAR_CAP: usize = 3;

/// One applied bonus or penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub name: String,
    /// Signed contribution
    pub value: f64,
    pub reason: String,
}

/// Audit view of a confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceExplanation {
    pub base: f64,
    pub adjustments: Vec<Adjustment>,
    /// Base plus adjustments, before clamping
    pub raw_total: f64,
    pub final_score: f64,
}

impl ConfidenceExplanation {
    /// Human-readable multi-line rendering
    pub fn render(&self) -> String {
        let mut lines = vec![format!("base score: {:+.3}", self.base)];
        for adj in &self.adjustments {
            lines.push(format!("{}: {:+.3} ({})", adj.name, adj.value, adj.reason));
        }
        lines.push(format!("final: {:.3}", self.final_score));
        lines.join("\n")
    }
}

/// Identity confidence scorer
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            config: config.confidence.clone(),
        }
    }

    pub fn min_threshold(&self) -> f64 {
        self.config.min_threshold
    }

    /// Score with its explanation
    pub fn score_confidence(&self, identity: &Identity) -> (f64, ConfidenceExplanation) {
        let adjustments = self.adjustments(identity);
        let raw_total = self.config.base_score + adjustments.iter().map(|a| a.value).sum::<f64>();
        let final_score = raw_total.clamp(0.0, 1.0);

        debug!(
            name = %identity.canonical_name,
            raw_total,
            final_score,
            adjustments = adjustments.len(),
            "Confidence scored"
        );

        (
            final_score,
            ConfidenceExplanation {
                base: self.config.base_score,
                adjustments,
                raw_total,
                final_score,
            },
        )
    }

    pub fn score(&self, identity: &Identity) -> f64 {
        self.score_confidence(identity).0
    }

    /// Score every identity, sort descending and keep those at or above the
    /// minimum threshold
    pub fn score_identities(&self, identities: Vec<Identity>) -> Vec<Identity> {
        let total = identities.len();
        let mut scored: Vec<Identity> = identities
            .into_iter()
            .map(|mut identity| {
                identity.confidence = self.score(&identity);
                identity
            })
            .filter(|identity| identity.confidence >= self.config.min_threshold)
            .collect();
        scored.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        info!(
            scored = total,
            kept = scored.len(),
            threshold = self.config.min_threshold,
            "Confidence scoring complete"
        );
        scored
    }

    fn adjustments(&self, identity: &Identity) -> Vec<Adjustment> {
        let c = &self.config;
        let evidence = &identity.evidence_summary;
        let years = identity.years_observed;
        let wishers = identity.total_wishers;
        let mut adjustments = Vec::new();
        let mut push = |name: &str, value: f64, reason: String| {
            adjustments.push(Adjustment {
                name: name.to_string(),
                value,
                reason,
            });
        };

        if years > 1 {
            let extra_years = (years - 1).min(MULTI_YEAR_CAP);
            push(
                "multi_year_bonus",
                c.multi_year_bonus * extra_years as f64 / MULTI_YEAR_CAP as f64,
                format!("observed in {} different years", years),
            );
        }

        if wishers >= MANY_WISHERS {
            push(
                "unique_wishers_bonus",
                c.unique_wishers_bonus,
                format!("{} total wishers", wishers),
            );
        } else if wishers >= SOME_WISHERS {
            push(
                "unique_wishers_bonus",
                c.unique_wishers_bonus / 2.0,
                format!("{} total wishers (partial bonus)", wishers),
            );
        }

        if evidence.has_explicit_mentions {
            push(
                "explicit_mention_bonus",
                c.explicit_mention_bonus,
                "wishes mention the person explicitly".to_string(),
            );
        }

        if evidence.has_thanks_messages {
            push(
                "thanks_bonus",
                c.thanks_bonus,
                "the person thanked well-wishers".to_string(),
            );
        }

        if identity.phone.is_some() {
            push("phone_bonus", c.phone_bonus, "phone number known".to_string());
            if evidence.chats > 1 {
                push(
                    "multi_chat_phone_bonus",
                    c.multi_chat_phone_bonus,
                    format!("phone seen across {} chats", evidence.chats),
                );
            }
        }

        if evidence.date_consistency {
            push(
                "date_consistency_bonus",
                c.date_consistency_bonus,
                "all observations agree on the date".to_string(),
            );
        } else {
            push(
                "conflicting_dates_penalty",
                -c.conflicting_dates_penalty.abs(),
                format!("observations disagree, resolved as {:?}", evidence.date_resolution),
            );
        }

        if years == 1 && wishers < SOME_WISHERS {
            push(
                "low_evidence_penalty",
                -c.low_evidence_penalty.abs(),
                format!("single year with only {} wishers", wishers),
            );
        }

        if !evidence.has_explicit_mentions && !evidence.has_thanks_messages {
            push(
                "group_inference_penalty",
                -c.group_inference_penalty.abs(),
                "target inferred without mentions or thanks".to_string(),
            );
        }

        adjustments
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}
