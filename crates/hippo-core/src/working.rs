//! Working Store
//!
//! Bounded-lifetime, append-only records. A record leaves this tier in exactly
//! one of two ways: promotion into an episode, or deletion once it has
//! expired without being promoted.

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use uuid::Uuid;

use crate::clock::{earlier, from_millis, later, to_millis};
use crate::db::{json_list, json_value, parsed, to_json_list, Db};
use crate::error::{Error, Result};
use crate::types::{NewWorkingRecord, WorkingRecord};

const SELECT_COLUMNS: &str = "id, session_id, kind, content, context_json, importance, emotion, topic,
     tags_json, speaker, created_at, expires_at";

/// Store for short-lived working records
#[derive(Clone)]
pub struct WorkingStore {
    db: Db,
}

impl WorkingStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Validate and append a new record created at `now`.
    pub async fn put(&self, input: NewWorkingRecord, now: DateTime<Utc>) -> Result<WorkingRecord> {
        validate(&input)?;
        let expires_at = later(now, input.ttl)?;

        let record = WorkingRecord {
            id: Uuid::new_v4().to_string(),
            session_id: input.session_id,
            kind: input.kind,
            content: input.content,
            context: input.context,
            importance: input.importance,
            emotion: normalize_label(input.emotion),
            topic: normalize_label(input.topic),
            tags: input.tags,
            speaker: input.speaker.filter(|s| !s.trim().is_empty()),
            created_at: now,
            expires_at,
        };

        let db = self.db.write().await;
        db.execute(
            "INSERT INTO working_records
             (id, session_id, kind, content, context_json, importance, emotion, topic,
              tags_json, speaker, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &record.id,
                &record.session_id,
                record.kind.as_str(),
                &record.content,
                serde_json::to_string(&record.context)?,
                record.importance,
                &record.emotion,
                &record.topic,
                to_json_list(&record.tags)?,
                &record.speaker,
                to_millis(record.created_at),
                to_millis(record.expires_at),
            ],
        )?;

        tracing::debug!(
            record_id = %record.id,
            session_id = %record.session_id,
            importance = record.importance,
            "Stored working record"
        );
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<WorkingRecord>> {
        let db = self.db.read().await;
        let sql = format!("SELECT {} FROM working_records WHERE id = ?1", SELECT_COLUMNS);
        Ok(db.query_row(&sql, params![id], map_record).optional()?)
    }

    pub async fn count(&self) -> Result<usize> {
        let db = self.db.read().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM working_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete records past `expires_at`. Promoted records are already gone,
    /// so everything deleted here was never promoted.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.sweep_expired_except(now, None, &[]).await
    }

    /// Delete expired records except `keep_ids` and, when `protect_from` is
    /// set, every record at or above that importance.
    pub async fn sweep_expired_except(
        &self,
        now: DateTime<Utc>,
        protect_from: Option<u8>,
        keep_ids: &[String],
    ) -> Result<usize> {
        let mut sql = String::from(
            "DELETE FROM working_records WHERE expires_at <= ? AND importance < ?",
        );
        let mut values = vec![
            Value::Integer(to_millis(now)),
            Value::Integer(protect_from.map_or(i64::MAX, i64::from)),
        ];
        if !keep_ids.is_empty() {
            let marks = vec!["?"; keep_ids.len()].join(", ");
            sql.push_str(&format!(" AND id NOT IN ({})", marks));
            values.extend(keep_ids.iter().cloned().map(Value::Text));
        }

        let db = self.db.write().await;
        let swept = db.execute(&sql, params_from_iter(values))?;

        if swept > 0 {
            tracing::info!(swept, kept = keep_ids.len(), "Swept expired working records");
        }
        Ok(swept)
    }

    /// Records important enough to promote that have had `min_age` to settle.
    /// A record about to expire counts as settled. Oldest first, at most
    /// `limit` rows.
    pub async fn select_promotable(
        &self,
        min_importance: u8,
        min_age: Duration,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WorkingRecord>> {
        self.promotable_page(min_importance, min_age, now, None, limit)
            .await
    }

    /// [`select_promotable`](Self::select_promotable) resumed after a
    /// `(created_at, id)` cursor.
    pub(crate) async fn promotable_page(
        &self,
        min_importance: u8,
        min_age: Duration,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, String)>,
        limit: usize,
    ) -> Result<Vec<WorkingRecord>> {
        let settled_before = earlier(now, min_age)?;
        let (after_ts, after_id) = match after {
            Some((ts, id)) => (to_millis(ts), id),
            None => (i64::MIN, String::new()),
        };

        let db = self.db.read().await;
        let sql = format!(
            "SELECT {} FROM working_records
             WHERE importance >= ?1
               AND (created_at <= ?2 OR expires_at <= ?3)
               AND (created_at > ?4 OR (created_at = ?4 AND id > ?5))
             ORDER BY created_at ASC, id ASC
             LIMIT ?6",
            SELECT_COLUMNS
        );
        let mut stmt = db.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![
                    min_importance,
                    to_millis(settled_before),
                    to_millis(now),
                    after_ts,
                    after_id,
                    limit as i64
                ],
                map_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

fn validate(input: &NewWorkingRecord) -> Result<()> {
    if !(1..=10).contains(&input.importance) {
        return Err(Error::validation(format!(
            "importance must be within 1..=10, got {}",
            input.importance
        )));
    }
    if input.ttl <= Duration::zero() {
        return Err(Error::validation("ttl must be positive"));
    }
    if input.session_id.trim().is_empty() {
        return Err(Error::validation("session id cannot be empty"));
    }
    if input.content.trim().is_empty() {
        return Err(Error::validation("content cannot be empty"));
    }
    if !input.context.is_object() {
        return Err(Error::validation("context must be a JSON object"));
    }
    Ok(())
}

/// Labels group episodes later on, so casing and padding must not split them.
fn normalize_label(label: Option<String>) -> Option<String> {
    label
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
}

pub(crate) fn map_record(row: &Row) -> rusqlite::Result<WorkingRecord> {
    Ok(WorkingRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: parsed(row, 2)?,
        content: row.get(3)?,
        context: json_value(row, 4)?,
        importance: row.get(5)?,
        emotion: row.get(6)?,
        topic: row.get(7)?,
        tags: json_list(row, 8)?,
        speaker: row.get(9)?,
        created_at: from_millis(row.get(10)?),
        expires_at: from_millis(row.get(11)?),
    })
}
