//! Identity Resolver
//!
//! Merges cluster-level observations ("participant P of chat C was wished on
//! date D") into durable identities that span chats and years.
//!
//! # Identity keys
//! In priority order:
//! 1. Normalized phone number of the target participant
//! 2. Display name, unless the name collides (same name in ≥2 chats with
//!    more than one distinct phone), in which case the chat id is part of
//!    the key so two different people are not merged
//! 3. Chat-scoped participant id as a last resort
//!
//! # Birthday resolution
//! - All observations agree → accept
//! - Top two (month, day) candidates one day apart → the more frequent one
//!   (logging/timezone artifact)
//! - Feb 28 / Feb 29 / Mar 1 confusion → Feb 29 when it is a candidate
//! - Otherwise → the most frequent candidate

use hbd_common::models::{
    BestObservation, ChatId, DateResolution, EvidenceSummary, Identity, MonthDay, Participant,
    ParticipantId, WishCluster,
};
use hbd_common::time::{are_adjacent, is_leap_adjacency, LEAP_DAY};
use chrono::Datelike;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Grouping key for observations of the same person
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Phone(String),
    Name(String),
    NameInChat { name: String, chat_id: ChatId },
    Participant { chat_id: ChatId, participant_id: ParticipantId },
}

/// One cluster with its resolved target participant
#[derive(Debug, Clone, Copy)]
struct Observation<'a> {
    cluster: &'a WishCluster,
    participant: &'a Participant,
}

/// Cross-chat identity resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Merge targeted clusters into identities
    ///
    /// Clusters without a target, or whose target is not among
    /// `participants`, yield no identity. Confidence is left at zero for the
    /// scorer. Identities come out in first-observation order.
    pub fn resolve_identities(
        &self,
        clusters: &[WishCluster],
        participants: &[Participant],
    ) -> Vec<Identity> {
        let lookup: HashMap<(ChatId, ParticipantId), &Participant> =
            participants.iter().map(|p| ((p.chat_id, p.id), p)).collect();
        let collisions = name_collisions(participants);

        let mut order: Vec<IdentityKey> = Vec::new();
        let mut groups: HashMap<IdentityKey, Vec<Observation>> = HashMap::new();

        for cluster in clusters {
            let Some(target) = cluster.target_participant_id else {
                continue;
            };
            let Some(&participant) = lookup.get(&(cluster.chat_id, target)) else {
                warn!(chat_id = cluster.chat_id, participant_id = target, "Cluster target not found among participants");
                continue;
            };

            let key = identity_key(participant, &collisions);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups
                .entry(key)
                .or_default()
                .push(Observation { cluster, participant });
        }

        let identities: Vec<Identity> = order
            .iter()
            .filter_map(|key| {
                let observations = groups.get(key)?;
                build_identity(key, observations)
            })
            .collect();

        info!(
            clusters = clusters.len(),
            identities = identities.len(),
            "Identity resolution complete"
        );
        identities
    }
}

/// Display names shared across ≥2 chats by participants with >1 distinct phone
fn name_collisions(participants: &[Participant]) -> HashSet<String> {
    let mut chats: HashMap<&str, HashSet<ChatId>> = HashMap::new();
    let mut phones: HashMap<&str, HashSet<&str>> = HashMap::new();
    for p in participants {
        if let Some(name) = p.display_name.as_deref() {
            chats.entry(name).or_default().insert(p.chat_id);
            if let Some(phone) = p.phone.as_deref() {
                phones.entry(name).or_default().insert(phone);
            }
        }
    }

    chats
        .into_iter()
        .filter(|(name, chat_ids)| {
            chat_ids.len() >= 2 && phones.get(name).map_or(0, |p| p.len()) > 1
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Key for a target participant
pub fn identity_key(participant: &Participant, collisions: &HashSet<String>) -> IdentityKey {
    if let Some(phone) = participant.phone.as_deref().filter(|p| !p.is_empty()) {
        return IdentityKey::Phone(phone.to_string());
    }
    if let Some(name) = participant.display_name.as_deref().filter(|n| !n.is_empty()) {
        if collisions.contains(name) {
            return IdentityKey::NameInChat {
                name: name.to_string(),
                chat_id: participant.chat_id,
            };
        }
        return IdentityKey::Name(name.to_string());
    }
    IdentityKey::Participant {
        chat_id: participant.chat_id,
        participant_id: participant.id,
    }
}

/// Settle a birthday from (month, day) observations
///
/// `None` only for an empty slice.
pub fn determine_birthday(observations: &[MonthDay]) -> Option<(MonthDay, DateResolution)> {
    // Counts in first-seen order so stable sorting breaks ties by appearance
    let mut counts: Vec<(MonthDay, usize)> = Vec::new();
    for &md in observations {
        match counts.iter_mut().find(|(v, _)| *v == md) {
            Some((_, n)) => *n += 1,
            None => counts.push((md, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    match counts.as_slice() {
        [] => None,
        [(only, _)] => Some((*only, DateResolution::Unanimous)),
        [(first, _), (second, _), ..] => {
            if are_adjacent(*first, *second) {
                Some((*first, DateResolution::AdjacentMajority))
            } else if is_leap_adjacency(*first, *second) && (*first == LEAP_DAY || *second == LEAP_DAY) {
                Some((LEAP_DAY, DateResolution::LeapDay))
            } else {
                Some((*first, DateResolution::MostFrequent))
            }
        }
    }
}

fn build_identity(key: &IdentityKey, observations: &[Observation]) -> Option<Identity> {
    let dates: Vec<MonthDay> = observations
        .iter()
        .map(|o| MonthDay::of(o.cluster.date))
        .collect();
    let (birthday, resolution) = determine_birthday(&dates)?;

    let canonical_name = most_common(observations.iter().filter_map(|o| o.participant.display_name.as_deref()))
        .or_else(|| most_common(observations.iter().filter_map(|o| o.participant.phone.as_deref())))
        .unwrap_or_else(|| "Unknown".to_string());

    let distinct_phones: BTreeSet<&str> = observations
        .iter()
        .filter_map(|o| o.participant.phone.as_deref())
        .collect();
    if distinct_phones.len() > 1 {
        warn!(
            name = %canonical_name,
            phones = distinct_phones.len(),
            "Multiple phone numbers for one identity, keeping the most common"
        );
    }
    let phone = most_common(observations.iter().filter_map(|o| o.participant.phone.as_deref()));

    let years: Vec<i32> = observations
        .iter()
        .map(|o| o.cluster.date.year())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let chat_ids: Vec<ChatId> = observations
        .iter()
        .map(|o| o.cluster.chat_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let total_wishers: usize = observations.iter().map(|o| o.cluster.unique_wishers).sum();

    let best = observations.iter().fold(None::<&Observation>, |best, o| match best {
        Some(b)
            if (b.cluster.unique_wishers, b.cluster.total_wish_score)
                >= (o.cluster.unique_wishers, o.cluster.total_wish_score) =>
        {
            Some(b)
        }
        _ => Some(o),
    })?;

    let evidence_summary = EvidenceSummary {
        total_observations: observations.len(),
        chats: chat_ids.len(),
        chat_ids,
        total_wishers,
        has_explicit_mentions: observations.iter().any(|o| o.cluster.has_explicit_mentions),
        has_thanks_messages: observations.iter().any(|o| o.cluster.has_thanks),
        date_consistency: dates.iter().all(|d| *d == dates[0]),
        date_resolution: resolution,
        best_observation: BestObservation {
            date: best.cluster.date,
            chat_id: best.cluster.chat_id,
            wishers: best.cluster.unique_wishers,
            score: best.cluster.total_wish_score,
            has_mentions: best.cluster.has_explicit_mentions,
            has_thanks: best.cluster.has_thanks,
        },
        years: years.clone(),
    };

    debug!(
        ?key,
        birthday = %birthday,
        ?resolution,
        observations = observations.len(),
        "Identity built"
    );

    Some(Identity {
        id: None,
        canonical_name,
        phone,
        birthday_month: birthday.month,
        birthday_day: birthday.day,
        confidence: 0.0,
        years_observed: years.len(),
        total_wishers,
        evidence_summary,
    })
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
    counts
        .into_iter()
        .fold(None::<(&str, usize)>, |best, (v, n)| match best {
            Some((_, b)) if b >= n => best,
            _ => Some((v, n)),
        })
        .map(|(v, _)| v.to_string())
}
