//! Pattern Extractor
//!
//! Groups recent, non-archived episodes by (topic, emotion). A group seen at
//! least `min_frequency` times becomes a [`Pattern`]; one-offs are ignored.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::clock::{days, earlier};
use crate::episode::EpisodeStore;
use crate::error::Result;
use crate::types::Pattern;

type GroupKey = (String, Option<String>);

#[derive(Default)]
struct Group {
    importance_sum: u64,
    episode_ids: Vec<String>,
    first_seen: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

/// Finds recurring (topic, emotion) pairs in the episode window
pub struct PatternExtractor {
    episodes: EpisodeStore,
    min_frequency: usize,
    batch_size: usize,
}

impl PatternExtractor {
    pub fn new(episodes: EpisodeStore, min_frequency: usize, batch_size: usize) -> Self {
        Self {
            episodes,
            min_frequency: min_frequency.max(2),
            batch_size: batch_size.max(1),
        }
    }

    /// Extract patterns from episodes that happened within `window_days` of `now`.
    ///
    /// Most frequent first, then higher average importance, then by key.
    pub async fn extract(&self, window_days: i64, now: DateTime<Utc>) -> Result<Vec<Pattern>> {
        let since = earlier(now, days(window_days)?)?;
        let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
        let mut cursor = None;
        let mut scanned = 0usize;

        loop {
            let page = self.episodes.window_page(since, cursor, self.batch_size).await?;
            let Some(last) = page.last() else { break };
            cursor = Some((last.happened_at, last.id.clone()));
            let exhausted = page.len() < self.batch_size;
            scanned += page.len();

            for episode in page {
                let key = (
                    normalize(&episode.topic),
                    episode.emotion.as_deref().map(normalize).filter(|e| !e.is_empty()),
                );
                let group = groups.entry(key).or_default();
                if group.episode_ids.contains(&episode.id) {
                    continue;
                }
                group.importance_sum += episode.importance as u64;
                group.episode_ids.push(episode.id);
                group.first_seen = Some(match group.first_seen {
                    Some(seen) => seen.min(episode.happened_at),
                    None => episode.happened_at,
                });
                group.last_seen = Some(match group.last_seen {
                    Some(seen) => seen.max(episode.happened_at),
                    None => episode.happened_at,
                });
            }

            if exhausted {
                break;
            }
        }

        let mut patterns: Vec<Pattern> = groups
            .into_iter()
            .filter(|(_, g)| g.episode_ids.len() >= self.min_frequency)
            .filter_map(|((topic, emotion), g)| {
                let frequency = g.episode_ids.len();
                Some(Pattern {
                    topic,
                    emotion,
                    frequency,
                    avg_importance: g.importance_sum as f64 / frequency as f64,
                    first_seen: g.first_seen?,
                    last_seen: g.last_seen?,
                    episode_ids: g.episode_ids,
                })
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| {
                    b.avg_importance
                        .partial_cmp(&a.avg_importance)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| (&a.topic, &a.emotion).cmp(&(&b.topic, &b.emotion)))
        });

        tracing::info!(
            window_days,
            scanned,
            patterns = patterns.len(),
            "Extracted patterns"
        );
        Ok(patterns)
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}
