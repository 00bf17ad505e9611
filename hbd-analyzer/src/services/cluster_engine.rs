//! Date-window clustering of wish messages
//!
//! Wishes are grouped by the calendar date of their message. Candidate
//! dates are visited in ascending order; each unclaimed date opens a window
//! of `window_hours` from its midnight and absorbs every unclaimed date whose
//! midnight falls inside. Windows reaching `min_wish_score` become clusters
//! and claim their dates, so no date is ever split across two clusters.

use chrono::{Duration, NaiveDate};
use hbd_common::config::AnalysisConfig;
use hbd_common::models::{ChatId, Message, MessageId, WishCluster, WishMessage};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Sliding-window cluster engine
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    window: Duration,
    min_wish_score: f64,
}

impl ClusterEngine {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            window: Duration::seconds(config.clustering.window_seconds()),
            min_wish_score: config.clustering.min_wish_score,
        }
    }

    /// Partition wishes into per-event clusters
    ///
    /// Wishes whose message is unknown or has no timestamp are ignored.
    pub fn cluster_wishes(
        &self,
        messages: &[Message],
        wishes: &[WishMessage],
        chat_id: ChatId,
    ) -> Vec<WishCluster> {
        let by_id: HashMap<MessageId, &Message> = messages.iter().map(|m| (m.id, m)).collect();

        let mut by_date: BTreeMap<NaiveDate, Vec<&WishMessage>> = BTreeMap::new();
        for wish in wishes {
            if let Some(date) = by_id.get(&wish.message_id).and_then(|m| m.date()) {
                by_date.entry(date).or_default().push(wish);
            }
        }

        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let mut claimed: HashSet<NaiveDate> = HashSet::new();
        let mut clusters = Vec::new();

        for &start in &dates {
            if claimed.contains(&start) {
                continue;
            }

            let window_start = start.and_time(chrono::NaiveTime::MIN);
            let window_end = window_start + self.window;
            let absorbed: Vec<NaiveDate> = dates
                .iter()
                .copied()
                .filter(|d| !claimed.contains(d))
                .filter(|d| {
                    let midnight = d.and_time(chrono::NaiveTime::MIN);
                    midnight >= window_start && midnight < window_end
                })
                .collect();

            let total: f64 = absorbed
                .iter()
                .flat_map(|d| by_date[d].iter())
                .map(|w| w.wish_score)
                .sum();

            if total < self.min_wish_score {
                debug!(chat_id, %start, total, "Window below threshold, dates left unclaimed");
                continue;
            }

            let Some(peak) = peak_date(&absorbed, &by_date) else {
                continue;
            };
            let members: Vec<WishMessage> = absorbed
                .iter()
                .flat_map(|d| by_date[d].iter().map(|w| (*w).clone()))
                .collect();

            let unique_wishers = members
                .iter()
                .filter_map(|w| by_id.get(&w.message_id).and_then(|m| m.sender.as_deref()))
                .collect::<HashSet<_>>()
                .len();

            debug!(
                chat_id,
                %peak,
                dates = absorbed.len(),
                wishes = members.len(),
                unique_wishers,
                "Cluster formed"
            );

            claimed.extend(absorbed.iter().copied());
            clusters.push(WishCluster {
                id: None,
                chat_id,
                date: peak,
                target_participant_id: None,
                has_thanks: members.iter().any(|w| w.is_thanks),
                has_explicit_mentions: members.iter().any(|w| !w.mentioned_names.is_empty()),
                unique_wishers,
                total_wish_score: total,
                wish_messages: members,
            });
        }

        info!(chat_id, clusters = clusters.len(), "Clustering complete");
        clusters
    }
}

/// Date with the highest (summed score, wish count); earliest wins ties
fn peak_date(absorbed: &[NaiveDate], by_date: &BTreeMap<NaiveDate, Vec<&WishMessage>>) -> Option<NaiveDate> {
    let mut best = *absorbed.first()?;
    let mut best_key = (f64::MIN, 0usize);
    for &date in absorbed {
        let wishes = &by_date[&date];
        let key = (wishes.iter().map(|w| w.wish_score).sum::<f64>(), wishes.len());
        if key.0 > best_key.0 || (key.0 == best_key.0 && key.1 > best_key.1) {
            best = date;
            best_key = key;
        }
    }
    Some(best)
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbd_common::models::MessageType;

    fn msg(id: i64, sender: &str, date: (i32, u32, u32), hour: u32) -> Message {
        Message {
            id,
            chat_id: 1,
            timestamp: Some(
                NaiveDate::from_ymd_opt(date.0, date.1, date.2)
                    .unwrap()
                    .and_hms_opt(hour, 0, 0)
                    .unwrap(),
            ),
            sender: Some(sender.to_string()),
            text: String::new(),
            message_type: MessageType::Normal,
            original_line: String::new(),
        }
    }

    fn wish(id: i64, score: f64) -> WishMessage {
        WishMessage {
            message_id: id,
            wish_score: score,
            mentioned_names: vec![],
            is_thanks: false,
            modifiers: vec![],
            patterns_matched: vec![],
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine(window_hours: f64) -> ClusterEngine {
        let mut config = AnalysisConfig::default();
        config.clustering.window_hours = window_hours;
        ClusterEngine::new(&config)
    }

    #[test]
    fn test_adjacent_days_merge_within_36h() {
        let messages = vec![msg(1, "A", (2024, 8, 1), 23), msg(2, "B", (2024, 8, 2), 8)];
        let wishes = vec![wish(1, 0.8), wish(2, 0.8)];

        let clusters = engine(36.0).cluster_wishes(&messages, &wishes, 1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].wish_messages.len(), 2);
        assert_eq!(clusters[0].unique_wishers, 2);
    }

    #[test]
    fn test_adjacent_days_split_with_short_window() {
        let messages = vec![msg(1, "A", (2024, 8, 1), 23), msg(2, "B", (2024, 8, 2), 8)];
        let wishes = vec![wish(1, 0.8), wish(2, 0.8)];

        let clusters = engine(12.0).cluster_wishes(&messages, &wishes, 1);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_two_days_apart_never_merge_at_36h() {
        let messages = vec![msg(1, "A", (2024, 8, 1), 9), msg(2, "B", (2024, 8, 3), 9)];
        let wishes = vec![wish(1, 0.8), wish(2, 0.8)];

        let clusters = engine(36.0).cluster_wishes(&messages, &wishes, 1);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_no_date_in_two_clusters() {
        let messages: Vec<Message> = (0..10)
            .map(|i| msg(i + 1, "A", (2024, 8, 1 + i as u32), 12))
            .collect();
        let wishes: Vec<WishMessage> = (0..10).map(|i| wish(i + 1, 0.5)).collect();

        let clusters = engine(36.0).cluster_wishes(&messages, &wishes, 1);
        let by_id: HashMap<i64, NaiveDate> =
            messages.iter().map(|m| (m.id, m.date().unwrap())).collect();

        let mut seen = HashSet::new();
        for cluster in &clusters {
            let dates: HashSet<NaiveDate> =
                cluster.wish_messages.iter().map(|w| by_id[&w.message_id]).collect();
            for date in dates {
                assert!(seen.insert(date), "{} appears in two clusters", date);
            }
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_below_threshold_window_is_discarded() {
        let messages = vec![msg(1, "A", (2024, 8, 1), 9), msg(2, "B", (2024, 8, 5), 9)];
        let wishes = vec![wish(1, 0.1), wish(2, 0.8)];

        let clusters = engine(36.0).cluster_wishes(&messages, &wishes, 1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].date, day(2024, 8, 5));
    }

    #[test]
    fn test_peak_date_prefers_higher_score_then_count_then_earliest() {
        let messages = vec![
            msg(1, "A", (2024, 8, 1), 20),
            msg(2, "B", (2024, 8, 2), 9),
            msg(3, "C", (2024, 8, 2), 10),
        ];
        let clusters = engine(36.0).cluster_wishes(
            &messages,
            &[wish(1, 0.8), wish(2, 0.5), wish(3, 0.5)],
            1,
        );
        assert_eq!(clusters[0].date, day(2024, 8, 2));

        let tie = engine(36.0).cluster_wishes(&messages[..2], &[wish(1, 0.8), wish(2, 0.8)], 1);
        assert_eq!(tie[0].date, day(2024, 8, 1));
    }

    #[test]
    fn test_aggregates() {
        let messages = vec![
            msg(1, "A", (2024, 8, 1), 9),
            msg(2, "A", (2024, 8, 1), 10),
            msg(3, "B", (2024, 8, 1), 11),
        ];
        let mut thanks = wish(3, 0.8);
        thanks.is_thanks = true;
        let mut mention = wish(1, 0.8);
        mention.mentioned_names = vec!["Sam".to_string()];

        let clusters = engine(36.0).cluster_wishes(&messages, &[mention, wish(2, 0.8), thanks], 9);
        let cluster = &clusters[0];
        assert_eq!(cluster.chat_id, 9);
        assert_eq!(cluster.unique_wishers, 2);
        assert!((cluster.total_wish_score - 2.4).abs() < 1e-9);
        assert!(cluster.has_thanks);
        assert!(cluster.has_explicit_mentions);
        assert_eq!(cluster.target_participant_id, None);
        assert_eq!(cluster.id, None);
    }

    #[test]
    fn test_extreme_windows_do_not_panic() {
        let messages = vec![msg(1, "A", (2024, 8, 1), 9), msg(2, "B", (2024, 8, 2), 9)];
        let wishes = vec![wish(1, 0.8), wish(2, 0.8)];

        let mut config = AnalysisConfig::default();
        config.clustering.window_hours = 1e13;
        let clusters = ClusterEngine::new(&config).cluster_wishes(&messages, &wishes, 1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].wish_messages.len(), 2);

        config.clustering.window_hours = 0.0001;
        config.clustering.min_wish_score = 0.0;
        let clusters = ClusterEngine::new(&config).cluster_wishes(&messages, &wishes, 1);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].date, day(2024, 8, 1));
        assert_eq!(clusters[1].date, day(2024, 8, 2));
    }

    #[test]
    fn test_untimestamped_and_empty_inputs() {
        let mut undated = msg(1, "A", (2024, 8, 1), 9);
        undated.timestamp = None;
        assert!(engine(36.0).cluster_wishes(&[undated], &[wish(1, 0.8)], 1).is_empty());
        assert!(engine(36.0).cluster_wishes(&[], &[], 1).is_empty());
    }
}
