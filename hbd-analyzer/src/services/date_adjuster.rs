//! Cluster date correction from timing modifiers
//!
//! When most wishes in a cluster say they are late, the birthday was the
//! day before the peak; when most say they are early, the day after.

use chrono::{Duration, NaiveDate};
use hbd_common::models::{Modifier, WishCluster};
use tracing::debug;

/// Majority-vote date adjuster
#[derive(Debug, Clone, Copy, Default)]
pub struct DateAdjuster;

impl DateAdjuster {
    pub fn new() -> Self {
        Self
    }

    /// Corrected event date for the cluster
    ///
    /// Majorities are strict (> half) and counted over every wish in the
    /// cluster. Belated is checked first.
    pub fn adjust_date(&self, cluster: &WishCluster) -> NaiveDate {
        let total = cluster.wish_messages.len();
        let count = |modifier: Modifier| {
            cluster
                .wish_messages
                .iter()
                .filter(|w| w.has_modifier(modifier))
                .count()
        };

        let belated = count(Modifier::Belated);
        let advance = count(Modifier::Advance);

        let adjusted = if belated * 2 > total {
            cluster.date - Duration::days(1)
        } else if advance * 2 > total {
            cluster.date + Duration::days(1)
        } else {
            cluster.date
        };

        if adjusted != cluster.date {
            debug!(
                chat_id = cluster.chat_id,
                from = %cluster.date,
                to = %adjusted,
                belated,
                advance,
                total,
                "Cluster date adjusted"
            );
        }
        adjusted
    }

    /// Same cluster with its date corrected
    pub fn apply(&self, cluster: WishCluster) -> WishCluster {
        let date = self.adjust_date(&cluster);
        cluster.with_date(date)
    }
}
