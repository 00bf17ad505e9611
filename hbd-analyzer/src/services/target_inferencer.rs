//! Target inference: who is a wish cluster about?
//!
//! Direct chats rely on the thanks-reply and elimination patterns. Group
//! chats try, in order: dominant phone mention, dominant name mention,
//! single thanks-sender, elimination. An unresolved target is a normal
//! outcome.

use crate::services::transcript_parser::normalize_phone;
use hbd_common::models::{ChatType, Message, MessageId, Participant, ParticipantId, WishCluster};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Strategy that resolved a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStrategy {
    PhoneMention,
    NameMention,
    ThanksSender,
    Elimination,
}

/// Cluster target inferencer
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetInferencer;

impl TargetInferencer {
    pub fn new() -> Self {
        Self
    }

    /// Probable subject participant of the cluster, if any
    pub fn infer_target(
        &self,
        cluster: &WishCluster,
        participants: &[Participant],
        messages: &[Message],
        chat_type: ChatType,
    ) -> Option<ParticipantId> {
        self.infer_with_strategy(cluster, participants, messages, chat_type)
            .map(|(id, _)| id)
    }

    /// Like [`infer_target`](Self::infer_target), also reporting the strategy used
    pub fn infer_with_strategy(
        &self,
        cluster: &WishCluster,
        participants: &[Participant],
        messages: &[Message],
        chat_type: ChatType,
    ) -> Option<(ParticipantId, TargetStrategy)> {
        let ctx = ClusterContext::new(cluster, participants, messages);

        let result = match chat_type {
            ChatType::Direct => ctx
                .by_thanks_sender()
                .map(|id| (id, TargetStrategy::ThanksSender))
                .or_else(|| ctx.by_elimination().map(|id| (id, TargetStrategy::Elimination))),
            ChatType::Group | ChatType::Unknown => ctx
                .by_phone_mention()
                .map(|id| (id, TargetStrategy::PhoneMention))
                .or_else(|| ctx.by_name_mention().map(|id| (id, TargetStrategy::NameMention)))
                .or_else(|| ctx.by_thanks_sender().map(|id| (id, TargetStrategy::ThanksSender)))
                .or_else(|| ctx.by_elimination().map(|id| (id, TargetStrategy::Elimination))),
        };

        match result {
            Some((id, strategy)) => {
                debug!(chat_id = cluster.chat_id, date = %cluster.date, participant_id = id, ?strategy, "Target inferred");
            }
            None => {
                warn!(chat_id = cluster.chat_id, date = %cluster.date, "Target unresolved");
            }
        }
        result
    }
}

/// Lookups shared by the strategies
struct ClusterContext<'a> {
    cluster: &'a WishCluster,
    participants: Vec<&'a Participant>,
    senders: HashMap<MessageId, &'a str>,
}

impl<'a> ClusterContext<'a> {
    fn new(cluster: &'a WishCluster, participants: &'a [Participant], messages: &'a [Message]) -> Self {
        let members: HashSet<MessageId> = cluster.wish_messages.iter().map(|w| w.message_id).collect();
        let senders = messages
            .iter()
            .filter(|m| members.contains(&m.id))
            .filter_map(|m| m.sender.as_deref().map(|s| (m.id, s)))
            .collect();
        Self {
            cluster,
            participants: participants
                .iter()
                .filter(|p| p.chat_id == cluster.chat_id)
                .collect(),
            senders,
        }
    }

    /// Participant whose display name is the sender, or whose phone is the
    /// sender's normalized phone
    fn participant_for_sender(&self, sender: &str) -> Option<&'a Participant> {
        self.participants
            .iter()
            .copied()
            .find(|p| p.display_name.as_deref() == Some(sender))
            .or_else(|| {
                let phone = normalize_phone(sender)?;
                self.participants
                    .iter()
                    .copied()
                    .find(|p| p.phone.as_deref() == Some(phone.as_str()))
            })
    }

    fn by_phone_mention(&self) -> Option<ParticipantId> {
        let digits = most_common(self.cluster.wish_messages.iter().flat_map(|w| w.phone_mentions()))?;
        self.participants
            .iter()
            .find(|p| {
                p.phone.as_deref().is_some_and(|phone| {
                    phone.replace(['+', ' '], "").contains(digits.as_str())
                })
            })
            .map(|p| p.id)
    }

    fn by_name_mention(&self) -> Option<ParticipantId> {
        let name = most_common(self.cluster.wish_messages.iter().flat_map(|w| w.name_mentions()))?;
        let needle = name.trim_start_matches('@').to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.participants
            .iter()
            .find(|p| {
                p.display_name
                    .as_deref()
                    .is_some_and(|display| display.to_lowercase().contains(&needle))
            })
            .map(|p| p.id)
    }

    fn by_thanks_sender(&self) -> Option<ParticipantId> {
        let mut thanks_senders: Vec<&str> = Vec::new();
        for wish in self.cluster.wish_messages.iter().filter(|w| w.is_thanks) {
            if let Some(&sender) = self.senders.get(&wish.message_id) {
                if !thanks_senders.contains(&sender) {
                    thanks_senders.push(sender);
                }
            }
        }
        match thanks_senders.as_slice() {
            [only] => self.participant_for_sender(only).map(|p| p.id),
            _ => None,
        }
    }

    fn by_elimination(&self) -> Option<ParticipantId> {
        let wishers: HashSet<ParticipantId> = self
            .cluster
            .wish_messages
            .iter()
            .filter(|w| !w.is_thanks)
            .filter_map(|w| self.senders.get(&w.message_id))
            .filter_map(|sender| self.participant_for_sender(sender))
            .map(|p| p.id)
            .collect();

        let remaining: Vec<ParticipantId> = self
            .participants
            .iter()
            .map(|p| p.id)
            .filter(|id| !wishers.contains(id))
            .collect();
        match remaining.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Most frequent value; ties go to the value seen first
fn most_common<'s>(values: impl Iterator<Item = &'s str>) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((value, n));
        }
    }
    best.map(|(v, _)| v.to_string())
}
