//! Cluster enrichment boundary
//!
//! An optional collaborator (typically a language-model service) can look at
//! a cluster and its messages and return a structured guess: date, person,
//! phone, confidence, year and rationale. Enrichment is strictly downstream
//! of the core pipeline and best-effort: whenever the collaborator is
//! unavailable, fails or exceeds its timeout, the deterministic
//! [`HeuristicEnricher`] answers instead.

use crate::error::{AnalyzerError, AnalyzerResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use hbd_common::models::{Message, MonthDay, Participant, WishCluster};
use hbd_common::time::now;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Confidence reported by the heuristic fallback
pub const HEURISTIC_CONFIDENCE: f64 = 0.4;

/// Earliest plausible birth year
const MIN_BIRTH_YEAR: i32 = 1900;

const SELECTION_KEYWORDS: &[&str] = &[
    "happy birthday",
    "hbd",
    "birthday",
    "bday",
    "born",
    "birth",
    "wish",
    "celebrate",
];

/// Where an enrichment result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    Collaborator,
    Heuristic,
}

/// Structured answer about one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub date: Option<MonthDay>,
    pub person: Option<String>,
    pub phone: Option<String>,
    /// Within [0, 1] after validation
    pub confidence: f64,
    /// Birth year, if the messages reveal it
    pub year: Option<i32>,
    pub rationale: String,
    pub source: EnrichmentSource,
}

/// Enrichment collaborator contract
#[async_trait]
pub trait ClusterEnricher: Send + Sync {
    /// Enricher name for provenance tracking
    fn name(&self) -> &str;

    /// Whether the collaborator can currently answer
    async fn is_available(&self) -> bool;

    /// Analyze one cluster given its messages
    async fn enrich(&self, cluster: &WishCluster, messages: &[Message]) -> AnalyzerResult<EnrichmentResult>;
}

/// Deterministic local enricher
///
/// Uses the resolved target participant when there is one; otherwise the
/// first capitalized word and the first long digit token in the messages.
#[derive(Debug, Clone, Default)]
pub struct HeuristicEnricher {
    participants: Vec<Participant>,
}

impl HeuristicEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enricher that can name resolved targets from these participants
    pub fn with_participants(participants: Vec<Participant>) -> Self {
        Self { participants }
    }

    /// Infallible analysis used as the fallback path
    pub fn analyze(&self, cluster: &WishCluster, messages: &[Message]) -> EnrichmentResult {
        let target = cluster.target_participant_id.and_then(|id| {
            self.participants
                .iter()
                .find(|p| p.id == id && p.chat_id == cluster.chat_id)
        });

        let person = target
            .and_then(|p| p.display_name.clone())
            .or_else(|| first_capitalized_word(messages));
        let phone = target
            .and_then(|p| p.phone.clone())
            .or_else(|| first_phone_token(messages));

        EnrichmentResult {
            date: Some(MonthDay::of(cluster.date)),
            person,
            phone,
            confidence: HEURISTIC_CONFIDENCE,
            year: None,
            rationale: format!("heuristic analysis of {} messages", messages.len()),
            source: EnrichmentSource::Heuristic,
        }
    }
}

#[async_trait]
impl ClusterEnricher for HeuristicEnricher {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn enrich(&self, cluster: &WishCluster, messages: &[Message]) -> AnalyzerResult<EnrichmentResult> {
        Ok(self.analyze(cluster, messages))
    }
}

/// Ask the primary enricher, falling back to the heuristic on
/// unavailability, error or timeout
pub async fn enrich_with_fallback(
    primary: Option<&dyn ClusterEnricher>,
    fallback: &HeuristicEnricher,
    cluster: &WishCluster,
    messages: &[Message],
    timeout: Duration,
) -> EnrichmentResult {
    if let Some(primary) = primary {
        let available = tokio::time::timeout(timeout, primary.is_available())
            .await
            .unwrap_or_else(|_| {
                warn!(enricher = primary.name(), "Availability check timed out after {}ms", timeout.as_millis());
                false
            });
        if available {
            let outcome = match tokio::time::timeout(timeout, primary.enrich(cluster, messages)).await {
                Ok(result) => result,
                Err(_) => Err(AnalyzerError::Enrichment(format!(
                    "{} timed out after {}ms",
                    primary.name(),
                    timeout.as_millis()
                ))),
            };
            match outcome {
                Ok(result) => {
                    debug!(enricher = primary.name(), chat_id = cluster.chat_id, "Cluster enriched");
                    return validate(result, cluster);
                }
                Err(e) => {
                    warn!(enricher = primary.name(), chat_id = cluster.chat_id, "{}; using heuristic fallback", e);
                }
            }
        } else {
            debug!(enricher = primary.name(), "Enricher unavailable, using heuristic fallback");
        }
    }

    validate(fallback.analyze(cluster, messages), cluster)
}

/// Normalize a collaborator answer
///
/// Confidence is clamped to [0, 1]; years outside 1900..=current year, and
/// "null"/"none"/"unknown" names and phones are discarded; an invalid date
/// falls back to the cluster date.
pub fn validate(mut result: EnrichmentResult, cluster: &WishCluster) -> EnrichmentResult {
    result.confidence = if result.confidence.is_finite() {
        result.confidence.clamp(0.0, 1.0)
    } else {
        HEURISTIC_CONFIDENCE
    };

    let current_year = now().year();
    result.year = result.year.filter(|y| (MIN_BIRTH_YEAR..=current_year).contains(y));

    let is_placeholder = |s: &str| {
        let s = s.trim();
        s.is_empty() || ["null", "none", "unknown"].contains(&s.to_lowercase().as_str())
    };
    result.person = result
        .person
        .map(|p| p.trim().to_string())
        .filter(|p| !is_placeholder(p.as_str()));
    result.phone = result
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !is_placeholder(p.as_str()) && p.chars().any(|c| c.is_ascii_digit()));

    // Any real month/day exists in leap year 2000
    let valid_date = result
        .date
        .filter(|md| NaiveDate::from_ymd_opt(2000, md.month, md.day).is_some());
    result.date = valid_date.or_else(|| Some(MonthDay::of(cluster.date)));

    result
}

/// Most informative messages, at most `max`, in their original order
///
/// Keywords weigh most, then capitalized words (likely names), digits
/// (likely phones) and length.
pub fn select_messages_for_analysis(messages: &[Message], max: usize) -> Vec<&Message> {
    if messages.len() <= max {
        return messages.iter().collect();
    }

    let mut scored: Vec<(usize, usize)> = messages
        .iter()
        .enumerate()
        .map(|(index, m)| (selection_score(&m.text), index))
        .collect();
    // Stable: equal scores keep transcript order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut chosen: Vec<usize> = scored.into_iter().take(max).map(|(_, i)| i).collect();
    chosen.sort_unstable();
    chosen.into_iter().map(|i| &messages[i]).collect()
}

fn selection_score(text: &str) -> usize {
    let lower = text.to_lowercase();
    let keywords = SELECTION_KEYWORDS.iter().filter(|k| lower.contains(*k)).count() * 10;
    let capitalized = text
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && w.chars().next().is_some_and(char::is_uppercase))
        .count()
        * 2;
    let digits = if text.chars().any(|c| c.is_ascii_digit()) { 5 } else { 0 };
    let length = (text.chars().count() / 10).min(5);
    keywords + capitalized + digits + length
}

fn first_capitalized_word(messages: &[Message]) -> Option<String> {
    messages.iter().find_map(|m| {
        m.text
            .split_whitespace()
            .find(|w| {
                w.chars().count() > 2
                    && w.chars().all(char::is_alphabetic)
                    && w.chars().next().is_some_and(char::is_uppercase)
            })
            .map(str::to_string)
    })
}

fn first_phone_token(messages: &[Message]) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[+]?\d{10,15}").expect("phone token regex should compile"));
    messages
        .iter()
        .find_map(|m| re.find(&m.text).map(|found| found.as_str().to_string()))
}
