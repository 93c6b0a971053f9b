//! Episode Builder
//!
//! Promotes settled working records into durable episodes. Promotion is a
//! one-way move: the episode insert and the working-record delete commit in
//! the same transaction, so a record is never in both tiers and never in
//! neither.
//!
//! ```text
//! WorkingRecord ──derive──▶ Episode ──┬─ INSERT episodes
//!                                     ├─ INSERT reinforcement_state
//!                                     └─ DELETE working_records   (one transaction)
//! ```

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::clock::{from_millis, to_millis};
use crate::config::EpisodeConfig;
use crate::db::{json_list, json_value, to_json_list, Db};
use crate::error::{Error, Result};
use crate::reinforcement::insert_state;
use crate::summarizer::{summarize_bounded, Summarizer};
use crate::types::{Episode, RecordKind, UnitRef, WorkingRecord};

const SELECT_COLUMNS: &str = "id, title, summary, full_content, participants_json, topic, location,
     emotion, happened_at, importance, strength, emotional_tags_json, retrieval_cues_json,
     source_record_ids_json, archived, folded";

/// Topic used when the classifier did not assign one
pub const DEFAULT_TOPIC: &str = "general";

/// Builds episodes from working records
pub struct EpisodeBuilder {
    db: Db,
    config: EpisodeConfig,
    decay_rate: f64,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl EpisodeBuilder {
    pub fn new(db: Db, config: EpisodeConfig, decay_rate: f64) -> Self {
        Self {
            db,
            config,
            decay_rate,
            summarizer: None,
        }
    }

    /// Attach a summarizer; its output replaces the derived summary.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Promote one working record into an episode.
    ///
    /// The working record is deleted only if the episode was stored. A record
    /// that vanished (already promoted or swept) is a consistency violation.
    pub async fn promote(&self, record: &WorkingRecord, now: DateTime<Utc>) -> Result<Episode> {
        let mut episode = derive_episode(record, &self.config);

        // Outside the write lock: this may wait on the network.
        if let Some(summarizer) = &self.summarizer {
            let timeout = StdDuration::from_millis(self.config.summarizer_timeout_ms);
            if let Some(summary) = summarize_bounded(summarizer.as_ref(), record, timeout).await {
                episode.summary = summary;
            }
        }

        let mut db = self.db.write().await;
        let tx = db.transaction()?;

        let still_present = tx
            .query_row(
                "SELECT 1 FROM working_records WHERE id = ?1",
                params![&record.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !still_present {
            return Err(Error::consistency(format!(
                "working record {} vanished before promotion",
                record.id
            )));
        }

        tx.execute(
            "INSERT INTO episodes
             (id, primary_source_id, title, summary, full_content, participants_json, topic,
              location, emotion, happened_at, importance, strength, emotional_tags_json,
              retrieval_cues_json, source_record_ids_json, archived, folded, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, 0, ?16)",
            params![
                &episode.id,
                &record.id,
                &episode.title,
                &episode.summary,
                &episode.full_content,
                to_json_list(&episode.participants)?,
                &episode.topic,
                &episode.location,
                &episode.emotion,
                to_millis(episode.happened_at),
                episode.importance,
                episode.strength,
                to_json_list(&episode.emotional_tags)?,
                serde_json::to_string(&episode.retrieval_cues)?,
                to_json_list(&episode.source_record_ids)?,
                to_millis(now),
            ],
        )?;

        insert_state(
            &tx,
            &UnitRef::episode(&episode.id),
            episode.strength,
            self.decay_rate,
            now,
        )?;

        let deleted = tx.execute("DELETE FROM working_records WHERE id = ?1", params![&record.id])?;
        if deleted != 1 {
            return Err(Error::consistency(format!(
                "working record {} could not be removed during promotion",
                record.id
            )));
        }

        tx.commit()?;

        tracing::info!(
            record_id = %record.id,
            episode_id = %episode.id,
            topic = %episode.topic,
            importance = episode.importance,
            "Promoted working record to episode"
        );
        Ok(episode)
    }
}

/// Build the episode for a record without touching storage.
pub fn derive_episode(record: &WorkingRecord, config: &EpisodeConfig) -> Episode {
    let topic = record
        .topic
        .clone()
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    Episode {
        id: Uuid::new_v4().to_string(),
        title: derive_title(&topic, record.emotion.as_deref()),
        summary: derive_summary(record, &topic, config),
        full_content: record.content.clone(),
        participants: infer_participants(record.speaker.as_deref(), record.kind, config),
        location: record
            .context
            .get("location")
            .and_then(|v| v.as_str())
            .map(String::from),
        emotion: record.emotion.clone(),
        happened_at: record.created_at,
        importance: record.importance,
        strength: record.importance as f64 / 10.0,
        emotional_tags: emotional_tags(record),
        retrieval_cues: retrieval_cues(record),
        source_record_ids: vec![record.id.clone()],
        archived: false,
        folded: false,
        topic,
    }
}

/// "Travel (joy)", or just "Travel" without an emotion.
pub fn derive_title(topic: &str, emotion: Option<&str>) -> String {
    let mut chars = topic.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    match emotion {
        Some(e) => format!("{} ({})", capitalized, e),
        None => capitalized,
    }
}

fn derive_summary(record: &WorkingRecord, topic: &str, config: &EpisodeConfig) -> String {
    let speaker = record.speaker.as_deref().unwrap_or(&config.agent_name);
    format!(
        "[{} · {}] {}",
        speaker,
        topic,
        truncate_chars(&record.content, config.summary_max_chars)
    )
}

/// Truncate on a char boundary, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Who took part in the observation.
///
/// - no speaker: the agent itself
/// - `"both"`: user and agent
/// - `"a & b"`, `"a and b"`, `"a, b"`: each named party
/// - a conversation with one speaker also involves the other party
pub fn infer_participants(
    speaker: Option<&str>,
    kind: RecordKind,
    config: &EpisodeConfig,
) -> Vec<String> {
    let Some(speaker) = speaker.map(str::trim).filter(|s| !s.is_empty()) else {
        return vec![config.agent_name.clone()];
    };

    if speaker.eq_ignore_ascii_case("both") {
        return vec![config.user_name.clone(), config.agent_name.clone()];
    }

    let parties: Vec<String> = speaker
        .replace(" and ", ",")
        .replace('&', ",")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect();

    let mut participants = Vec::new();
    for party in parties {
        if !participants.contains(&party) {
            participants.push(party);
        }
    }

    if participants.len() == 1 && kind == RecordKind::Conversation {
        let counterpart = if participants[0] == config.agent_name {
            config.user_name.clone()
        } else {
            config.agent_name.clone()
        };
        participants.push(counterpart);
    }

    participants
}

/// Union of emotion, explicit tags and an importance tag, in first-seen order.
pub fn emotional_tags(record: &WorkingRecord) -> Vec<String> {
    let importance_tag = match record.importance {
        9..=10 => Some("critical"),
        7..=8 => Some("important"),
        _ => None,
    };

    let mut tags: Vec<String> = Vec::new();
    let candidates = record
        .emotion
        .iter()
        .map(String::as_str)
        .chain(record.tags.iter().map(String::as_str))
        .chain(importance_tag);

    for tag in candidates {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn retrieval_cues(record: &WorkingRecord) -> serde_json::Value {
    serde_json::json!({
        "sessionId": record.session_id,
        "kind": record.kind.as_str(),
        "speaker": record.speaker,
        "topic": record.topic,
        "context": record.context,
        "createdAt": record.created_at.to_rfc3339(),
        "expiresAt": record.expires_at.to_rfc3339(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Episode reads and bulk updates
// ─────────────────────────────────────────────────────────────────────────────

/// Read access to episodes plus the bulk updates used by later stages
#[derive(Clone)]
pub struct EpisodeStore {
    db: Db,
}

impl EpisodeStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Episode>> {
        let db = self.db.read().await;
        let sql = format!("SELECT {} FROM episodes WHERE id = ?1", SELECT_COLUMNS);
        Ok(db.query_row(&sql, params![id], map_episode).optional()?)
    }

    pub async fn count(&self) -> Result<usize> {
        let db = self.db.read().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Non-archived episodes since `since`, ordered by (happened_at, id) and
    /// resumed after the `after` cursor.
    pub async fn window_page(
        &self,
        since: DateTime<Utc>,
        after: Option<(DateTime<Utc>, String)>,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        let (after_ts, after_id) = match after {
            Some((ts, id)) => (to_millis(ts), id),
            None => (i64::MIN, String::new()),
        };

        let db = self.db.read().await;
        let sql = format!(
            "SELECT {} FROM episodes
             WHERE archived = 0 AND happened_at >= ?1
               AND (happened_at > ?2 OR (happened_at = ?2 AND id > ?3))
             ORDER BY happened_at ASC, id ASC
             LIMIT ?4",
            SELECT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let episodes = stmt
            .query_map(
                params![to_millis(since), after_ts, after_id, limit as i64],
                map_episode,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    /// Archive up to `limit` episodes older than `cutoff` in one transaction.
    pub async fn archive_chunk(
        &self,
        cutoff: DateTime<Utc>,
        require_folded: bool,
        limit: usize,
    ) -> Result<usize> {
        let mut db = self.db.write().await;
        let tx = db.transaction()?;
        let archived = tx.execute(
            "UPDATE episodes SET archived = 1
             WHERE id IN (
                SELECT id FROM episodes
                WHERE archived = 0 AND happened_at < ?1 AND (folded = 1 OR ?2 = 0)
                ORDER BY happened_at ASC, id ASC
                LIMIT ?3
             )",
            params![to_millis(cutoff), require_folded, limit as i64],
        )?;
        tx.commit()?;
        Ok(archived)
    }
}

fn map_episode(row: &Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        full_content: row.get(3)?,
        participants: json_list(row, 4)?,
        topic: row.get(5)?,
        location: row.get(6)?,
        emotion: row.get(7)?,
        happened_at: from_millis(row.get(8)?),
        importance: row.get(9)?,
        strength: row.get(10)?,
        emotional_tags: json_list(row, 11)?,
        retrieval_cues: json_value(row, 12)?,
        source_record_ids: json_list(row, 13)?,
        archived: row.get(14)?,
        folded: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::db::open_in_memory;
    use crate::types::NewWorkingRecord;
    use crate::working::WorkingStore;
    use chrono::Duration;

    fn config() -> EpisodeConfig {
        EpisodeConfig::default()
    }

    fn start() -> DateTime<Utc> {
        from_millis(1_760_000_000_000)
    }

    fn sample(importance: u8) -> NewWorkingRecord {
        NewWorkingRecord {
            kind: RecordKind::Conversation,
            topic: Some("travel".into()),
            emotion: Some("joy".into()),
            tags: vec!["Lisbon".into(), "joy".into()],
            speaker: Some("user".into()),
            context: serde_json::json!({ "location": "Lisbon" }),
            ..NewWorkingRecord::new("session-1", "We finally booked the trip to Lisbon", importance)
        }
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("travel", Some("joy")), "Travel (joy)");
        assert_eq!(derive_title("work", None), "Work");
        assert_eq!(derive_title("", None), "");
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_chars("ab  cd", 3), "ab…");
    }

    #[test]
    fn test_infer_participants() {
        let cfg = config();

        assert_eq!(infer_participants(None, RecordKind::Activity, &cfg), vec!["assistant"]);
        assert_eq!(
            infer_participants(Some("both"), RecordKind::Activity, &cfg),
            vec!["user", "assistant"]
        );
        assert_eq!(
            infer_participants(Some("user"), RecordKind::Conversation, &cfg),
            vec!["user", "assistant"]
        );
        assert_eq!(
            infer_participants(Some("assistant"), RecordKind::Conversation, &cfg),
            vec!["assistant", "user"]
        );
        assert_eq!(
            infer_participants(Some("alice & bob"), RecordKind::Conversation, &cfg),
            vec!["alice", "bob"]
        );
        assert_eq!(
            infer_participants(Some("alice and bob, alice"), RecordKind::Activity, &cfg),
            vec!["alice", "bob"]
        );
        assert_eq!(
            infer_participants(Some("user"), RecordKind::Emotion, &cfg),
            vec!["user"]
        );
    }

    #[test]
    fn test_emotional_tags_union() {
        let record = WorkingRecord {
            id: "r".into(),
            session_id: "s".into(),
            kind: RecordKind::Emotion,
            content: "c".into(),
            context: serde_json::json!({}),
            importance: 9,
            emotion: Some("joy".into()),
            tags: vec!["Joy".into(), "family".into(), " ".into()],
            topic: None,
            speaker: None,
            created_at: start(),
            expires_at: start() + Duration::hours(1),
        };
        assert_eq!(emotional_tags(&record), vec!["joy", "family", "critical"]);

        let calm = WorkingRecord { importance: 3, emotion: None, tags: vec![], ..record };
        assert!(emotional_tags(&calm).is_empty());
    }

    #[tokio::test]
    async fn test_promote_moves_record_into_episode() {
        let db = open_in_memory().unwrap();
        let working = WorkingStore::new(db.clone());
        let episodes = EpisodeStore::new(db.clone());
        let builder = EpisodeBuilder::new(db.clone(), config(), 0.05);
        let clock = ManualClock::new(start());

        let record = working.put(sample(8), clock.now()).await.unwrap();
        clock.advance(Duration::hours(2));

        let episode = builder.promote(&record, clock.now()).await.unwrap();

        assert_eq!(episode.title, "Travel (joy)");
        assert_eq!(episode.participants, vec!["user", "assistant"]);
        assert_eq!(episode.location.as_deref(), Some("Lisbon"));
        assert_eq!(episode.emotional_tags, vec!["joy", "lisbon", "important"]);
        assert_eq!(episode.source_record_ids, vec![record.id.clone()]);
        assert!(episode.summary.starts_with("[user · travel]"));
        assert_eq!(episode.retrieval_cues["sessionId"], "session-1");
        assert_eq!(episode.happened_at, record.created_at);

        assert!(working.get(&record.id).await.unwrap().is_none());
        let stored = episodes.get(&episode.id).await.unwrap().unwrap();
        assert_eq!(stored.title, episode.title);
        assert_eq!(stored.emotional_tags, episode.emotional_tags);
        assert!(!stored.archived);
        assert_eq!(episodes.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promote_vanished_record_is_consistency_violation() {
        let db = open_in_memory().unwrap();
        let working = WorkingStore::new(db.clone());
        let builder = EpisodeBuilder::new(db.clone(), config(), 0.05);

        let record = working.put(sample(8), start()).await.unwrap();
        builder.promote(&record, start()).await.unwrap();

        let err = builder.promote(&record, start()).await.unwrap_err();
        assert!(matches!(err, Error::ConsistencyViolation(_)));
        assert_eq!(EpisodeStore::new(db).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_episode_insert_keeps_working_record() {
        let db = open_in_memory().unwrap();
        let working = WorkingStore::new(db.clone());
        let builder = EpisodeBuilder::new(db.clone(), config(), 0.05);

        let record = working.put(sample(8), start()).await.unwrap();
        db.write().await.execute_batch("DROP TABLE episodes").unwrap();

        assert!(builder.promote(&record, start()).await.is_err());
        assert!(working.get(&record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_window_page_skips_archived_and_paginates() {
        let db = open_in_memory().unwrap();
        let working = WorkingStore::new(db.clone());
        let builder = EpisodeBuilder::new(db.clone(), config(), 0.05);
        let episodes = EpisodeStore::new(db.clone());
        let clock = ManualClock::new(start());

        let mut ids = Vec::new();
        for _ in 0..3 {
            let record = working.put(sample(8), clock.now()).await.unwrap();
            ids.push(builder.promote(&record, clock.now()).await.unwrap().id);
            clock.advance(Duration::minutes(1));
        }
        db.write()
            .await
            .execute("UPDATE episodes SET archived = 1 WHERE id = ?1", params![&ids[0]])
            .unwrap();

        let first = episodes.window_page(start(), None, 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, ids[1]);

        let cursor = Some((first[0].happened_at, first[0].id.clone()));
        let second = episodes.window_page(start(), cursor, 10).await.unwrap();
        assert_eq!(second.iter().map(|e| e.id.clone()).collect::<Vec<_>>(), vec![ids[2].clone()]);
    }
}
