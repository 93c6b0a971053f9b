//! Reinforcement & Decay Engine
//!
//! Owns `reinforcement_state`. Units that were used recently gain activation,
//! units left alone for too long lose it. Both passes are chunked, run one
//! transaction per unit and are idempotent within a tick.
//!
//! Activation of an episode is mirrored into `episodes.strength`; a semantic
//! fact additionally carries its confidence in `semantic_facts.confidence`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::cache::FactCache;
use crate::clock::{days, earlier, from_millis, hours, to_millis};
use crate::config::ReinforcementConfig;
use crate::consolidation::StopHandle;
use crate::db::{parsed, Db};
use crate::error::{Error, Result};
use crate::types::{
    AuditEntry, KnowledgeType, Outcome, ReinforcementState, Stage, StageReport, UnitKind,
    UnitRef,
};

const SELECT_COLUMNS: &str = "unit_kind, unit_id, activation_strength, reinforcement_count,
     last_reinforced_at, last_touched_at, last_decayed_at, decay_rate";

/// Retired facts keep their state row but take no further part in either pass.
const SKIP_RETIRED: &str = "NOT EXISTS (
        SELECT 1 FROM semantic_facts f
        WHERE reinforcement_state.unit_kind = 'semantic_fact'
          AND f.id = reinforcement_state.unit_id AND f.active = 0)";

// ─────────────────────────────────────────────────────────────────────────────
// Scalar rules
// ─────────────────────────────────────────────────────────────────────────────

/// Raise `value` by `step`, never past 1.0.
pub fn reinforced(value: f64, step: f64) -> f64 {
    (value + step).min(1.0)
}

/// Lower `value` by `amount`, never below `floor`. A value already under the
/// floor is left where it is.
pub fn decayed(value: f64, amount: f64, floor: f64) -> f64 {
    if value <= floor {
        value
    } else {
        (value - amount).max(floor)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers shared with the builder and the merger
// ─────────────────────────────────────────────────────────────────────────────

/// Create the state row for a new unit. Creation counts as the first touch.
pub(crate) fn insert_state(
    conn: &Connection,
    unit: &UnitRef,
    activation: f64,
    decay_rate: f64,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO reinforcement_state
         (unit_kind, unit_id, activation_strength, reinforcement_count,
          last_reinforced_at, last_touched_at, last_decayed_at, decay_rate)
         VALUES (?1, ?2, ?3, 0, ?4, ?4, NULL, ?5)",
        params![
            unit.kind.as_str(),
            &unit.id,
            activation.clamp(0.0, 1.0),
            to_millis(now),
            decay_rate
        ],
    )?;
    Ok(())
}

/// Stamp usage on a unit. Returns whether a state row existed.
pub(crate) fn touch_in(conn: &Connection, unit: &UnitRef, now: DateTime<Utc>) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE reinforcement_state SET last_touched_at = MAX(last_touched_at, ?3)
         WHERE unit_kind = ?1 AND unit_id = ?2",
        params![unit.kind.as_str(), &unit.id, to_millis(now)],
    )?;
    Ok(updated > 0)
}

fn load_state(conn: &Connection, unit: &UnitRef) -> Result<Option<ReinforcementState>> {
    let sql = format!(
        "SELECT {} FROM reinforcement_state WHERE unit_kind = ?1 AND unit_id = ?2",
        SELECT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![unit.kind.as_str(), &unit.id], map_state)
        .optional()?)
}

/// Confidence of an active fact and the key its cache entry lives under.
struct FactConfidence {
    confidence: f64,
    knowledge_type: KnowledgeType,
    knowledge_key: String,
}

fn load_confidence(conn: &Connection, unit: &UnitRef) -> Result<Option<FactConfidence>> {
    if unit.kind != UnitKind::SemanticFact {
        return Ok(None);
    }
    let fact = conn
        .query_row(
            "SELECT confidence, knowledge_type, knowledge_key
             FROM semantic_facts WHERE id = ?1 AND active = 1",
            params![&unit.id],
            |row| {
                Ok(FactConfidence {
                    confidence: row.get(0)?,
                    knowledge_type: parsed(row, 1)?,
                    knowledge_key: row.get(2)?,
                })
            },
        )
        .optional()?;
    match fact {
        Some(fact) => Ok(Some(fact)),
        None => Err(Error::consistency(format!("fact {} is missing or retired", unit.id))),
    }
}

/// Write the new scalars to the unit's own table.
fn mirror(conn: &Connection, unit: &UnitRef, strength: f64, confidence: Option<f64>) -> Result<()> {
    match unit.kind {
        UnitKind::Episode => {
            conn.execute(
                "UPDATE episodes SET strength = ?2 WHERE id = ?1",
                params![&unit.id, strength],
            )?;
        }
        UnitKind::SemanticFact => {
            if let Some(confidence) = confidence {
                conn.execute(
                    "UPDATE semantic_facts SET confidence = ?2 WHERE id = ?1",
                    params![&unit.id, confidence],
                )?;
            }
        }
    }
    Ok(())
}

fn map_state(row: &Row) -> rusqlite::Result<ReinforcementState> {
    let last_decayed_at: Option<i64> = row.get(6)?;
    Ok(ReinforcementState {
        unit: UnitRef {
            kind: parsed(row, 0)?,
            id: row.get(1)?,
        },
        activation_strength: row.get(2)?,
        reinforcement_count: row.get(3)?,
        last_reinforced_at: from_millis(row.get(4)?),
        last_touched_at: from_millis(row.get(5)?),
        last_decayed_at: last_decayed_at.map(from_millis),
        decay_rate: row.get(7)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Applies reinforcement and decay to every decayable unit
#[derive(Clone)]
pub struct ReinforcementEngine {
    db: Db,
    cache: FactCache,
    config: ReinforcementConfig,
    batch_size: usize,
}

impl ReinforcementEngine {
    /// `cache` must be the one the Semantic Merger serves lookups from.
    pub fn new(db: Db, cache: FactCache, config: ReinforcementConfig, batch_size: usize) -> Self {
        Self {
            db,
            cache,
            config,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn state(&self, unit: &UnitRef) -> Result<Option<ReinforcementState>> {
        let db = self.db.read().await;
        load_state(&db, unit)
    }

    /// Record that a unit was used. Returns `false` for an unknown unit.
    pub async fn touch(&self, unit: &UnitRef, now: DateTime<Utc>) -> Result<bool> {
        let db = self.db.write().await;
        touch_in(&db, unit, now)
    }

    /// Reinforce every unit touched within `lookback_days` and since its last
    /// reinforcement. The report's `Reinforced` count is the number of units
    /// strengthened.
    pub async fn reinforce_active(
        &self,
        lookback_days: i64,
        now: DateTime<Utc>,
        stop: &StopHandle,
    ) -> Result<StageReport> {
        let since = to_millis(earlier(now, days(lookback_days)?)?);
        let mut report = StageReport::new(Stage::Reinforce, now);
        let sql = format!(
            "SELECT {} FROM reinforcement_state
             WHERE last_touched_at >= ?1
               AND last_touched_at > last_reinforced_at
               AND activation_strength < 1.0
               AND {}
               AND (unit_kind > ?2 OR (unit_kind = ?2 AND unit_id > ?3))
             ORDER BY unit_kind ASC, unit_id ASC
             LIMIT ?4",
            SELECT_COLUMNS, SKIP_RETIRED
        );

        let mut cursor = (String::new(), String::new());
        loop {
            if stop.is_stopped() {
                report.stopped_early = true;
                break;
            }

            let chunk = self.candidates(&sql, since, &cursor).await?;
            let Some(last) = chunk.last() else { break };
            cursor = (last.unit.kind.as_str().to_string(), last.unit.id.clone());
            let exhausted = chunk.len() < self.batch_size;

            for state in chunk {
                match self.reinforce_one(&state.unit, now).await {
                    Ok(Some(entry)) => {
                        report.record(Outcome::Reinforced);
                        report.audit.push(entry);
                    }
                    Ok(None) => report.record(Outcome::Unchanged),
                    Err(e) => {
                        tracing::warn!(unit = %state.unit, error = %e, "Reinforcement failed");
                        report.fail(state.unit.to_string(), &e);
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        tracing::info!(
            reinforced = report.count(Outcome::Reinforced),
            failed = report.errors.len(),
            "Reinforcement pass complete"
        );
        Ok(report)
    }

    /// Decay every unit not reinforced within `inactivity_days`, at most once
    /// per `min_tick_hours`. The report's `Decayed` count is the number of
    /// units whose activation or confidence actually dropped.
    pub async fn decay_stale(
        &self,
        inactivity_days: i64,
        now: DateTime<Utc>,
        stop: &StopHandle,
    ) -> Result<StageReport> {
        let stale_before = to_millis(earlier(now, days(inactivity_days)?)?);
        let tick_start = to_millis(earlier(now, hours(self.config.min_tick_hours)?)?);
        let mut report = StageReport::new(Stage::Decay, now);
        let sql = format!(
            "SELECT {} FROM reinforcement_state
             WHERE last_reinforced_at < ?1
               AND (last_decayed_at IS NULL OR last_decayed_at < {})
               AND {}
               AND (unit_kind > ?2 OR (unit_kind = ?2 AND unit_id > ?3))
             ORDER BY unit_kind ASC, unit_id ASC
             LIMIT ?4",
            SELECT_COLUMNS, tick_start, SKIP_RETIRED
        );

        let mut cursor = (String::new(), String::new());
        loop {
            if stop.is_stopped() {
                report.stopped_early = true;
                break;
            }

            let chunk = self.candidates(&sql, stale_before, &cursor).await?;
            let Some(last) = chunk.last() else { break };
            cursor = (last.unit.kind.as_str().to_string(), last.unit.id.clone());
            let exhausted = chunk.len() < self.batch_size;

            for state in chunk {
                match self.decay_one(&state.unit, now, tick_start).await {
                    Ok(Some(entry)) => {
                        report.record(Outcome::Decayed);
                        report.audit.push(entry);
                    }
                    Ok(None) => report.record(Outcome::Unchanged),
                    Err(e) => {
                        tracing::warn!(unit = %state.unit, error = %e, "Decay failed");
                        report.fail(state.unit.to_string(), &e);
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        tracing::info!(
            decayed = report.count(Outcome::Decayed),
            failed = report.errors.len(),
            "Decay pass complete"
        );
        Ok(report)
    }

    async fn invalidate(&self, fact: Option<&FactConfidence>) {
        if let Some(fact) = fact {
            self.cache
                .invalidate(fact.knowledge_type, &fact.knowledge_key)
                .await;
        }
    }

    async fn candidates(
        &self,
        sql: &str,
        threshold: i64,
        cursor: &(String, String),
    ) -> Result<Vec<ReinforcementState>> {
        let db = self.db.read().await;
        let mut stmt = db.prepare(sql)?;
        let states = stmt
            .query_map(
                params![threshold, &cursor.0, &cursor.1, self.batch_size as i64],
                map_state,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }

    async fn reinforce_one(&self, unit: &UnitRef, now: DateTime<Utc>) -> Result<Option<AuditEntry>> {
        let mut db = self.db.write().await;
        let tx = db.transaction()?;

        // Re-check under the write lock; another pass may have got here first.
        let Some(state) = load_state(&tx, unit)? else {
            return Ok(None);
        };
        if state.last_touched_at <= state.last_reinforced_at || state.activation_strength >= 1.0 {
            return Ok(None);
        }
        let fact = load_confidence(&tx, unit)?;
        let confidence_before = fact.as_ref().map(|f| f.confidence);

        let strength_after = reinforced(state.activation_strength, self.config.strength_step);
        let confidence_after = confidence_before.map(|c| reinforced(c, self.config.confidence_step));

        tx.execute(
            "UPDATE reinforcement_state
             SET activation_strength = ?3,
                 reinforcement_count = reinforcement_count + 1,
                 last_reinforced_at = ?4
             WHERE unit_kind = ?1 AND unit_id = ?2",
            params![unit.kind.as_str(), &unit.id, strength_after, to_millis(now)],
        )?;
        mirror(&tx, unit, strength_after, confidence_after)?;
        tx.commit()?;
        drop(db);
        self.invalidate(fact.as_ref()).await;

        tracing::debug!(
            unit = %unit,
            strength_before = state.activation_strength,
            strength_after,
            confidence_before = ?confidence_before,
            confidence_after = ?confidence_after,
            "Reinforced unit"
        );

        Ok(Some(AuditEntry {
            unit: unit.clone(),
            strength_before: state.activation_strength,
            strength_after,
            confidence_before,
            confidence_after,
        }))
    }

    async fn decay_one(
        &self,
        unit: &UnitRef,
        now: DateTime<Utc>,
        tick_start: i64,
    ) -> Result<Option<AuditEntry>> {
        let mut db = self.db.write().await;
        let tx = db.transaction()?;

        let Some(state) = load_state(&tx, unit)? else {
            return Ok(None);
        };
        if state
            .last_decayed_at
            .is_some_and(|at| to_millis(at) >= tick_start)
        {
            return Ok(None);
        }
        let fact = load_confidence(&tx, unit)?;
        let confidence_before = fact.as_ref().map(|f| f.confidence);

        let strength_after = decayed(
            state.activation_strength,
            state.decay_rate,
            self.config.strength_floor,
        );
        let confidence_after = confidence_before.map(|c| {
            decayed(
                c,
                state.decay_rate * self.config.confidence_decay_ratio,
                self.config.confidence_floor,
            )
        });

        tx.execute(
            "UPDATE reinforcement_state
             SET activation_strength = ?3, last_decayed_at = ?4
             WHERE unit_kind = ?1 AND unit_id = ?2",
            params![unit.kind.as_str(), &unit.id, strength_after, to_millis(now)],
        )?;
        mirror(&tx, unit, strength_after, confidence_after)?;
        tx.commit()?;
        drop(db);
        self.invalidate(fact.as_ref()).await;

        let changed =
            strength_after < state.activation_strength || confidence_after < confidence_before;
        if !changed {
            return Ok(None);
        }

        tracing::info!(
            unit = %unit,
            strength_before = state.activation_strength,
            strength_after,
            confidence_before = ?confidence_before,
            confidence_after = ?confidence_after,
            "Decayed unit"
        );

        Ok(Some(AuditEntry {
            unit: unit.clone(),
            strength_before: state.activation_strength,
            strength_after,
            confidence_before,
            confidence_after,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::types::SemanticFact;
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        from_millis(1_760_000_000_000)
    }

    fn engine(db: &Db) -> ReinforcementEngine {
        ReinforcementEngine::new(
            db.clone(),
            FactCache::new(),
            ReinforcementConfig::default(),
            2,
        )
    }

    async fn insert_fact(db: &Db, id: &str, confidence: f64, activation: f64, at: DateTime<Utc>) {
        let conn = db.write().await;
        conn.execute(
            "INSERT INTO semantic_facts
             (id, knowledge_type, knowledge_key, description, confidence, evidence_count,
              category, importance, last_verified_at, active, created_at)
             VALUES (?1, 'topic_interest', ?1, 'd', ?2, 2, 'interest', 5, ?3, 1, ?3)",
            params![id, confidence, to_millis(at)],
        )
        .unwrap();
        insert_state(&conn, &UnitRef::fact(id), activation, 0.05, at).unwrap();
    }

    #[test]
    fn test_reinforced_is_bounded() {
        assert!((reinforced(0.5, 0.02) - 0.52).abs() < 1e-9);
        assert_eq!(reinforced(0.99, 0.02), 1.0);
        assert_eq!(reinforced(1.0, 0.02), 1.0);
    }

    #[test]
    fn test_decayed_respects_floor() {
        assert!((decayed(0.5, 0.05, 0.1) - 0.45).abs() < 1e-9);
        assert_eq!(decayed(0.12, 0.05, 0.1), 0.1);
        assert_eq!(decayed(0.1, 0.05, 0.1), 0.1);
        // Below the floor stays put rather than being lifted
        assert_eq!(decayed(0.05, 0.05, 0.1), 0.05);
    }

    #[tokio::test]
    async fn test_decay_stale_fact_after_inactivity() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.65, 0.5, start()).await;
        let engine = engine(&db);
        let now = start() + Duration::days(45);

        let report = engine.decay_stale(30, now, &StopHandle::new()).await.unwrap();

        assert_eq!(report.count(Outcome::Decayed), 1);
        let state = engine.state(&UnitRef::fact("f1")).await.unwrap().unwrap();
        assert!((state.activation_strength - 0.45).abs() < 1e-9);
        assert_eq!(state.last_decayed_at, Some(now));

        let entry = &report.audit[0];
        assert!((entry.strength_before - 0.5).abs() < 1e-9);
        assert!((entry.confidence_after.unwrap() - 0.625).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_decay_is_idempotent_within_tick() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.65, 0.5, start()).await;
        let engine = engine(&db);
        let now = start() + Duration::days(45);

        engine.decay_stale(30, now, &StopHandle::new()).await.unwrap();
        let again = engine
            .decay_stale(30, now + Duration::hours(1), &StopHandle::new())
            .await
            .unwrap();
        assert_eq!(again.count(Outcome::Decayed), 0);

        let next_tick = engine
            .decay_stale(30, now + Duration::hours(13), &StopHandle::new())
            .await
            .unwrap();
        assert_eq!(next_tick.count(Outcome::Decayed), 1);
        let state = engine.state(&UnitRef::fact("f1")).await.unwrap().unwrap();
        assert!((state.activation_strength - 0.40).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_decay_never_crosses_floors() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.31, 0.12, start()).await;
        let engine = engine(&db);

        let mut now = start() + Duration::days(40);
        for _ in 0..10 {
            engine.decay_stale(30, now, &StopHandle::new()).await.unwrap();
            now += Duration::days(1);
        }

        let state = engine.state(&UnitRef::fact("f1")).await.unwrap().unwrap();
        assert_eq!(state.activation_strength, 0.1);
        let confidence: f64 = db
            .read()
            .await
            .query_row("SELECT confidence FROM semantic_facts WHERE id = 'f1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(confidence, 0.3);
    }

    #[tokio::test]
    async fn test_recent_units_do_not_decay() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.65, 0.5, start()).await;
        let engine = engine(&db);

        let report = engine
            .decay_stale(30, start() + Duration::days(10), &StopHandle::new())
            .await
            .unwrap();
        assert_eq!(report.count(Outcome::Decayed), 0);
    }

    #[tokio::test]
    async fn test_reinforce_touched_units_only() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "touched", 0.65, 0.5, start()).await;
        insert_fact(&db, "idle", 0.65, 0.5, start()).await;
        let engine = engine(&db);

        let touch_at = start() + Duration::days(1);
        assert!(engine.touch(&UnitRef::fact("touched"), touch_at).await.unwrap());
        assert!(!engine.touch(&UnitRef::fact("nope"), touch_at).await.unwrap());

        let now = start() + Duration::days(2);
        let report = engine.reinforce_active(7, now, &StopHandle::new()).await.unwrap();
        assert_eq!(report.count(Outcome::Reinforced), 1);

        let state = engine.state(&UnitRef::fact("touched")).await.unwrap().unwrap();
        assert!((state.activation_strength - 0.52).abs() < 1e-9);
        assert_eq!(state.reinforcement_count, 1);
        assert_eq!(state.last_reinforced_at, now);
        assert!((report.audit[0].confidence_after.unwrap() - 0.66).abs() < 1e-9);

        // Same tick, nothing new touched
        let again = engine.reinforce_active(7, now, &StopHandle::new()).await.unwrap();
        assert_eq!(again.count(Outcome::Reinforced), 0);
    }

    #[tokio::test]
    async fn test_reinforcement_is_monotonic_and_capped() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.99, 0.97, start()).await;
        let engine = engine(&db);

        let mut now = start();
        let mut previous = 0.97;
        for _ in 0..5 {
            now += Duration::hours(1);
            engine.touch(&UnitRef::fact("f1"), now).await.unwrap();
            now += Duration::hours(1);
            engine.reinforce_active(7, now, &StopHandle::new()).await.unwrap();

            let state = engine.state(&UnitRef::fact("f1")).await.unwrap().unwrap();
            assert!(state.activation_strength >= previous);
            assert!(state.activation_strength <= 1.0);
            previous = state.activation_strength;
        }
        assert_eq!(previous, 1.0);
    }

    #[tokio::test]
    async fn test_retired_facts_are_left_alone() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.65, 0.5, start()).await;
        db.write()
            .await
            .execute("UPDATE semantic_facts SET active = 0 WHERE id = 'f1'", [])
            .unwrap();
        let engine = engine(&db);

        let report = engine
            .decay_stale(30, start() + Duration::days(45), &StopHandle::new())
            .await
            .unwrap();
        assert_eq!(report.count(Outcome::Decayed), 0);
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn test_chunked_pass_covers_every_unit() {
        let db = open_in_memory().unwrap();
        for i in 0..5 {
            insert_fact(&db, &format!("f{}", i), 0.65, 0.5, start()).await;
        }
        let engine = engine(&db);

        let report = engine
            .decay_stale(30, start() + Duration::days(45), &StopHandle::new())
            .await
            .unwrap();
        assert_eq!(report.count(Outcome::Decayed), 5);
    }

    #[tokio::test]
    async fn test_stop_handle_ends_pass_between_chunks() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.65, 0.5, start()).await;
        let engine = engine(&db);
        let stop = StopHandle::new();
        stop.stop();

        let report = engine
            .decay_stale(30, start() + Duration::days(45), &stop)
            .await
            .unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.count(Outcome::Decayed), 0);
    }

    #[tokio::test]
    async fn test_fact_updates_invalidate_cached_entry() {
        let db = open_in_memory().unwrap();
        insert_fact(&db, "f1", 0.65, 0.5, start()).await;
        let cache = FactCache::new();
        let engine =
            ReinforcementEngine::new(db.clone(), cache.clone(), ReinforcementConfig::default(), 2);
        let cached = || SemanticFact {
            id: "f1".into(),
            knowledge_type: KnowledgeType::TopicInterest,
            knowledge_key: "f1".into(),
            knowledge_value: serde_json::json!({}),
            description: "d".into(),
            confidence: 0.65,
            evidence_count: 2,
            source_episode_ids: Vec::new(),
            category: "interest".into(),
            tags: Vec::new(),
            importance: 5,
            last_verified_at: start(),
            active: true,
        };

        cache.insert(cached()).await;
        let now = start() + Duration::days(45);
        let report = engine.decay_stale(30, now, &StopHandle::new()).await.unwrap();
        assert_eq!(report.count(Outcome::Decayed), 1);
        assert!(cache.get(KnowledgeType::TopicInterest, "f1").await.is_none());

        cache.insert(cached()).await;
        engine.touch(&UnitRef::fact("f1"), now + Duration::hours(1)).await.unwrap();
        let report = engine
            .reinforce_active(7, now + Duration::hours(2), &StopHandle::new())
            .await
            .unwrap();
        assert_eq!(report.count(Outcome::Reinforced), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_unrepresentable_windows_are_rejected() {
        let db = open_in_memory().unwrap();
        let engine = engine(&db);

        let err = engine
            .decay_stale(i64::MAX, start(), &StopHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = engine
            .reinforce_active(-7, start(), &StopHandle::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
