//! Semantic Merger
//!
//! Folds patterns into deduplicated semantic facts. A fact is identified by
//! `(knowledge_type, knowledge_key)` among active facts; evidence is counted
//! per distinct episode, so merging the same episodes twice changes nothing.
//!
//! Confidence starts at `min(cap0, base + per_occurrence * frequency)` and each
//! merge that brings new evidence closes a fixed fraction of the remaining
//! headroom, never past `confidence_cap` and never downwards.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::cache::FactCache;
use crate::clock::{from_millis, to_millis};
use crate::config::{ReinforcementConfig, SemanticConfig};
use crate::db::{json_list, json_value, parsed, placeholders, to_json_list, Db};
use crate::error::{Error, Result};
use crate::reinforcement::{insert_state, touch_in};
use crate::types::{KnowledgeType, MergeOutcome, Pattern, SemanticFact, UnitRef};

const SELECT_COLUMNS: &str = "id, knowledge_type, knowledge_key, knowledge_value_json, description,
     confidence, evidence_count, source_episode_ids_json, category, tags_json, importance,
     last_verified_at, active";

/// Dedup key for a (topic, emotion) pair.
///
/// `("Travel ", Some("Joy"))` becomes `(EmotionalPattern, "travel::joy")`; a
/// pattern without emotion is a `TopicInterest` keyed by the topic alone.
pub fn knowledge_key(topic: &str, emotion: Option<&str>) -> (KnowledgeType, String) {
    let topic = topic.trim().to_lowercase();
    match emotion.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) {
        Some(emotion) => (
            KnowledgeType::EmotionalPattern,
            format!("{}::{}", topic, emotion),
        ),
        None => (KnowledgeType::TopicInterest, topic),
    }
}

/// Confidence of a fact created from `frequency` distinct episodes.
pub fn initial_confidence(frequency: usize, config: &SemanticConfig) -> f64 {
    (config.initial_confidence_base + config.initial_confidence_per_occurrence * frequency as f64)
        .min(config.initial_confidence_cap)
        .clamp(0.0, 1.0)
}

/// Confidence after a merge that brought new evidence.
pub fn grown_confidence(old: f64, config: &SemanticConfig) -> f64 {
    let grown = (old + config.confidence_growth * (1.0 - old)).min(config.confidence_cap);
    old.max(grown).clamp(0.0, 1.0)
}

fn describe(knowledge_type: KnowledgeType, pattern: &Pattern) -> (String, &'static str) {
    match (knowledge_type, pattern.emotion.as_deref()) {
        (KnowledgeType::EmotionalPattern, Some(emotion)) => (
            format!("{} tends to bring up {}", pattern.topic, emotion),
            "emotion",
        ),
        _ => (format!("Recurring interest in {}", pattern.topic), "interest"),
    }
}

fn knowledge_value(
    pattern: &Pattern,
    evidence_count: u32,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "topic": pattern.topic,
        "emotion": pattern.emotion,
        "frequency": evidence_count,
        "avgImportance": pattern.avg_importance,
        "firstSeen": first_seen.to_rfc3339(),
        "lastSeen": last_seen.to_rfc3339(),
    })
}

/// A timestamp previously written into a fact's `knowledge_value`.
fn recorded_at(fact: &SemanticFact, field: &str) -> Option<DateTime<Utc>> {
    let raw = fact.knowledge_value.get(field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn map_fact(row: &Row) -> rusqlite::Result<SemanticFact> {
    Ok(SemanticFact {
        id: row.get(0)?,
        knowledge_type: parsed(row, 1)?,
        knowledge_key: row.get(2)?,
        knowledge_value: json_value(row, 3)?,
        description: row.get(4)?,
        confidence: row.get(5)?,
        evidence_count: row.get(6)?,
        source_episode_ids: json_list(row, 7)?,
        category: row.get(8)?,
        tags: json_list(row, 9)?,
        importance: row.get(10)?,
        last_verified_at: from_millis(row.get(11)?),
        active: row.get(12)?,
    })
}

fn load_active(
    conn: &Connection,
    knowledge_type: KnowledgeType,
    key: &str,
) -> Result<Option<SemanticFact>> {
    let sql = format!(
        "SELECT {} FROM semantic_facts
         WHERE knowledge_type = ?1 AND knowledge_key = ?2 AND active = 1",
        SELECT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![knowledge_type.as_str(), key], map_fact)
        .optional()?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Read access to semantic facts
#[derive(Clone)]
pub struct SemanticStore {
    db: Db,
}

impl SemanticStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: &str) -> Result<Option<SemanticFact>> {
        let db = self.db.read().await;
        let sql = format!("SELECT {} FROM semantic_facts WHERE id = ?1", SELECT_COLUMNS);
        Ok(db.query_row(&sql, params![id], map_fact).optional()?)
    }

    pub async fn get_active(
        &self,
        knowledge_type: KnowledgeType,
        key: &str,
    ) -> Result<Option<SemanticFact>> {
        let db = self.db.read().await;
        load_active(&db, knowledge_type, key)
    }

    pub async fn count_active(&self) -> Result<usize> {
        let db = self.db.read().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM semantic_facts WHERE active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Merger
// ─────────────────────────────────────────────────────────────────────────────

/// The only writer of semantic facts
#[derive(Clone)]
pub struct SemanticMerger {
    db: Db,
    store: SemanticStore,
    cache: FactCache,
    config: SemanticConfig,
    reinforcement: ReinforcementConfig,
}

impl SemanticMerger {
    pub fn new(
        db: Db,
        cache: FactCache,
        config: SemanticConfig,
        reinforcement: ReinforcementConfig,
    ) -> Self {
        Self {
            store: SemanticStore::new(db.clone()),
            db,
            cache,
            config,
            reinforcement,
        }
    }

    pub fn store(&self) -> &SemanticStore {
        &self.store
    }

    /// Fold one pattern into its fact, creating the fact on first sight.
    pub async fn merge_pattern(&self, pattern: &Pattern, now: DateTime<Utc>) -> Result<MergeOutcome> {
        let (knowledge_type, key) = knowledge_key(&pattern.topic, pattern.emotion.as_deref());
        if key.is_empty() {
            return Err(Error::validation("pattern topic cannot be empty"));
        }

        let mut episode_ids: Vec<String> = Vec::with_capacity(pattern.episode_ids.len());
        for id in &pattern.episode_ids {
            if !episode_ids.contains(id) {
                episode_ids.push(id.clone());
            }
        }
        if episode_ids.is_empty() {
            return Err(Error::validation(format!("pattern {} has no episodes", key)));
        }

        let mut db = self.db.write().await;
        let tx = db.transaction()?;

        let (outcome, fact_id, new_ids) = match load_active(&tx, knowledge_type, &key)? {
            Some(fact) => {
                let new_ids: Vec<String> = episode_ids
                    .into_iter()
                    .filter(|id| !fact.source_episode_ids.contains(id))
                    .collect();
                if new_ids.is_empty() {
                    tracing::debug!(%knowledge_type, key = %key, "Pattern already merged");
                    return Ok(MergeOutcome::Unchanged);
                }

                let evidence_count = fact.evidence_count + new_ids.len() as u32;
                let confidence = grown_confidence(fact.confidence, &self.config);
                let mut source_ids = fact.source_episode_ids.clone();
                source_ids.extend(new_ids.iter().cloned());
                // The fact's span covers every window it was merged from
                let first_seen = recorded_at(&fact, "firstSeen")
                    .map_or(pattern.first_seen, |at| at.min(pattern.first_seen));
                let last_seen = recorded_at(&fact, "lastSeen")
                    .map_or(pattern.last_seen, |at| at.max(pattern.last_seen));
                let value = knowledge_value(pattern, evidence_count, first_seen, last_seen);

                tx.execute(
                    "UPDATE semantic_facts
                     SET evidence_count = ?2, confidence = ?3, source_episode_ids_json = ?4,
                         knowledge_value_json = ?5, importance = MAX(importance, ?6),
                         last_verified_at = ?7
                     WHERE id = ?1",
                    params![
                        &fact.id,
                        evidence_count,
                        confidence,
                        to_json_list(&source_ids)?,
                        serde_json::to_string(&value)?,
                        rounded_importance(pattern),
                        to_millis(now),
                    ],
                )?;

                tracing::info!(
                    fact_id = %fact.id,
                    key = %key,
                    new_evidence = new_ids.len(),
                    evidence_count,
                    confidence_before = fact.confidence,
                    confidence_after = confidence,
                    "Updated semantic fact"
                );
                (MergeOutcome::Updated, fact.id, new_ids)
            }
            None => {
                let fact_id = Uuid::new_v4().to_string();
                let evidence_count = episode_ids.len() as u32;
                let confidence = initial_confidence(episode_ids.len(), &self.config);
                let (description, category) = describe(knowledge_type, pattern);
                let mut tags = vec![pattern.topic.trim().to_lowercase()];
                if let Some(emotion) = &pattern.emotion {
                    tags.push(emotion.trim().to_lowercase());
                }

                tx.execute(
                    "INSERT INTO semantic_facts
                     (id, knowledge_type, knowledge_key, knowledge_value_json, description,
                      confidence, evidence_count, source_episode_ids_json, category, tags_json,
                      importance, last_verified_at, active, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?12)",
                    params![
                        &fact_id,
                        knowledge_type.as_str(),
                        &key,
                        serde_json::to_string(&knowledge_value(
                            pattern,
                            evidence_count,
                            pattern.first_seen,
                            pattern.last_seen,
                        ))?,
                        description,
                        confidence,
                        evidence_count,
                        to_json_list(&episode_ids)?,
                        category,
                        to_json_list(&tags)?,
                        rounded_importance(pattern),
                        to_millis(now),
                    ],
                )?;
                insert_state(
                    &tx,
                    &UnitRef::fact(&fact_id),
                    self.reinforcement.initial_activation,
                    self.reinforcement.default_decay_rate,
                    now,
                )?;

                tracing::info!(
                    fact_id = %fact_id,
                    key = %key,
                    evidence_count,
                    confidence,
                    "Created semantic fact"
                );
                (MergeOutcome::Created, fact_id, episode_ids)
            }
        };

        let sql = format!(
            "UPDATE episodes SET folded = 1 WHERE id IN ({})",
            placeholders(new_ids.len())
        );
        tx.execute(&sql, params_from_iter(new_ids.iter()))?;

        touch_in(&tx, &UnitRef::fact(&fact_id), now)?;
        for id in &new_ids {
            touch_in(&tx, &UnitRef::episode(id), now)?;
        }

        tx.commit()?;
        drop(db);

        self.cache.invalidate(knowledge_type, &key).await;
        Ok(outcome)
    }

    /// Cached read of an active fact. A hit counts as usage of the fact.
    pub async fn lookup(
        &self,
        knowledge_type: KnowledgeType,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SemanticFact>> {
        let fact = match self.cache.get(knowledge_type, key).await {
            Some(fact) => Some(fact),
            None => {
                // Fill while still holding the read lock: a writer can only
                // commit, and then invalidate, after the entry is in place.
                let db = self.db.read().await;
                let loaded = load_active(&db, knowledge_type, key)?;
                if let Some(fact) = &loaded {
                    self.cache.insert(fact.clone()).await;
                }
                loaded
            }
        };

        if let Some(fact) = &fact {
            let db = self.db.write().await;
            touch_in(&db, &UnitRef::fact(&fact.id), now)?;
        }
        Ok(fact)
    }

    /// Deactivate a fact so its key can start over. Returns whether one was active.
    pub async fn retire(&self, knowledge_type: KnowledgeType, key: &str) -> Result<bool> {
        let retired = {
            let db = self.db.write().await;
            db.execute(
                "UPDATE semantic_facts SET active = 0
                 WHERE knowledge_type = ?1 AND knowledge_key = ?2 AND active = 1",
                params![knowledge_type.as_str(), key],
            )?
        };
        self.cache.invalidate(knowledge_type, key).await;

        if retired > 0 {
            tracing::info!(%knowledge_type, key, "Retired semantic fact");
        }
        Ok(retired > 0)
    }
}

fn rounded_importance(pattern: &Pattern) -> u8 {
    pattern.avg_importance.round().clamp(1.0, 10.0) as u8
}
