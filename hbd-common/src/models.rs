//! Record types shared between the analysis core and its collaborators
//!
//! All records are flat and serializable so a storage or reporting
//! collaborator can consume them without knowing the pipeline internals.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat identifier (assigned by the record store, provisional before that)
pub type ChatId = i64;
/// Message identifier
pub type MessageId = i64;
/// Participant identifier
pub type ParticipantId = i64;
/// Cluster identifier
pub type ClusterId = i64;
/// Identity identifier
pub type IdentityId = i64;

/// Kind of transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Normal,
    System,
    MediaOmitted,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Normal => "normal",
            MessageType::System => "system",
            MessageType::MediaOmitted => "media_omitted",
        }
    }
}

/// Chat kind, inferred from filename hints and early transcript content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Direct,
    Group,
    Unknown,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Direct => "direct",
            ChatType::Group => "group",
            ChatType::Unknown => "unknown",
        }
    }
}

/// Single parsed transcript message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub timestamp: Option<NaiveDateTime>,
    /// Display name or phone as written in the transcript
    pub sender: Option<String>,
    pub text: String,
    pub message_type: MessageType,
    /// Header line plus any continuation lines
    pub original_line: String,
}

impl Message {
    /// Calendar date of the message, if it has a timestamp
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date())
    }
}

/// Distinct sender identity within one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub chat_id: ChatId,
    pub display_name: Option<String>,
    /// Normalized phone (digits with optional leading `+`)
    pub phone: Option<String>,
    pub canonical_name: Option<String>,
}

/// Chat-level metadata produced by the transcript parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMeta {
    pub id: ChatId,
    pub name: String,
    pub chat_type: ChatType,
    pub source_path: Option<String>,
    pub message_count: usize,
    pub date_range: Option<(NaiveDateTime, NaiveDateTime)>,
}

/// Timing qualifier on a wish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Belated,
    Advance,
}

/// Birthday-wish analysis of one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishMessage {
    pub message_id: MessageId,
    /// Always within [0, 1]
    pub wish_score: f64,
    /// Name mentions, plus `@<digits>` phone mentions kept with their prefix
    pub mentioned_names: Vec<String>,
    pub is_thanks: bool,
    pub modifiers: Vec<Modifier>,
    pub patterns_matched: Vec<String>,
}

impl WishMessage {
    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    /// Digits of `@<digits>` mentions (prefix stripped)
    pub fn phone_mentions(&self) -> impl Iterator<Item = &str> {
        self.mentioned_names.iter().filter_map(|m| {
            m.strip_prefix('@')
                .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        })
    }

    /// Mentions that are not phone mentions
    pub fn name_mentions(&self) -> impl Iterator<Item = &str> {
        self.mentioned_names.iter().map(String::as_str).filter(|m| {
            !m.strip_prefix('@')
                .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false)
        })
    }
}

/// Group of wishes believed to celebrate one birthday event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishCluster {
    pub id: Option<ClusterId>,
    pub chat_id: ChatId,
    /// Peak date, possibly corrected by timing modifiers
    pub date: NaiveDate,
    pub target_participant_id: Option<ParticipantId>,
    /// Never empty
    pub wish_messages: Vec<WishMessage>,
    /// Distinct senders across all member wishes, thanks-senders included
    pub unique_wishers: usize,
    pub total_wish_score: f64,
    pub has_thanks: bool,
    pub has_explicit_mentions: bool,
}

impl WishCluster {
    /// Same cluster with the inferred target set
    pub fn with_target(self, target_participant_id: Option<ParticipantId>) -> Self {
        Self {
            target_participant_id,
            ..self
        }
    }

    /// Same cluster with the event date replaced
    pub fn with_date(self, date: NaiveDate) -> Self {
        Self { date, ..self }
    }
}

/// Month/day pair of a birthday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

/// How conflicting (month, day) observations were settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateResolution {
    /// All observations agree
    Unanimous,
    /// Top two candidates one day apart; the more frequent won
    AdjacentMajority,
    /// Feb 28 / Feb 29 / Mar 1 pattern resolved to Feb 29
    LeapDay,
    /// Unrelated candidates; the most frequent won
    MostFrequent,
}

/// Snapshot of the strongest single observation of an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestObservation {
    pub date: NaiveDate,
    pub chat_id: ChatId,
    pub wishers: usize,
    pub score: f64,
    pub has_mentions: bool,
    pub has_thanks: bool,
}

/// Aggregate signals backing an identity's confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub total_observations: usize,
    pub years: Vec<i32>,
    /// Number of distinct source chats
    pub chats: usize,
    pub chat_ids: Vec<ChatId>,
    pub total_wishers: usize,
    pub has_explicit_mentions: bool,
    pub has_thanks_messages: bool,
    pub date_consistency: bool,
    pub date_resolution: DateResolution,
    pub best_observation: BestObservation,
}

/// Durable cross-chat, cross-year person record with an inferred birthday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Option<IdentityId>,
    pub canonical_name: String,
    pub phone: Option<String>,
    pub birthday_month: u32,
    pub birthday_day: u32,
    /// Always within [0, 1]; zero until scored
    pub confidence: f64,
    pub years_observed: usize,
    pub total_wishers: usize,
    pub evidence_summary: EvidenceSummary,
}

impl Identity {
    pub fn birthday(&self) -> MonthDay {
        MonthDay::new(self.birthday_month, self.birthday_day)
    }
}
