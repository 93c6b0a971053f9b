//! Shared types for hippo-core.
//!
//! These types are used by the stores, the consolidation stages and the
//! structured stage reports handed back to the scheduler.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// Working Records
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of observation captured in working memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Conversation,
    Emotion,
    Activity,
    Observation,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Emotion => "emotion",
            Self::Activity => "activity",
            Self::Observation => "observation",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(Self::Conversation),
            "emotion" => Ok(Self::Emotion),
            "activity" => Ok(Self::Activity),
            "observation" => Ok(Self::Observation),
            _ => Err(format!("Invalid record kind: {}", s)),
        }
    }
}

/// Short-lived observation owned by the working store until promoted or expired
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingRecord {
    pub id: String,
    pub session_id: String,
    pub kind: RecordKind,
    pub content: String,
    pub context: serde_json::Value,
    pub importance: u8,
    pub emotion: Option<String>,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub speaker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkingRecord {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for creating a working record. Usually produced by a classifier.
#[derive(Debug, Clone)]
pub struct NewWorkingRecord {
    pub session_id: String,
    pub kind: RecordKind,
    pub content: String,
    pub context: serde_json::Value,
    pub importance: u8,
    pub emotion: Option<String>,
    pub topic: Option<String>,
    pub tags: Vec<String>,
    pub speaker: Option<String>,
    pub ttl: Duration,
}

impl NewWorkingRecord {
    /// Minimal record; remaining fields default to empty.
    pub fn new(session_id: impl Into<String>, content: impl Into<String>, importance: u8) -> Self {
        Self {
            session_id: session_id.into(),
            kind: RecordKind::Observation,
            content: content.into(),
            context: serde_json::Value::Object(Default::default()),
            importance,
            emotion: None,
            topic: None,
            tags: Vec::new(),
            speaker: None,
            ttl: Duration::hours(24),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Episodes
// ─────────────────────────────────────────────────────────────────────────────

/// Durable record of one promoted observation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub full_content: String,
    pub participants: Vec<String>,
    pub topic: String,
    pub location: Option<String>,
    pub emotion: Option<String>,
    pub happened_at: DateTime<Utc>,
    pub importance: u8,
    pub strength: f64,
    pub emotional_tags: Vec<String>,
    pub retrieval_cues: serde_json::Value,
    pub source_record_ids: Vec<String>,
    pub archived: bool,
    /// Set once a pattern this episode contributed to has been merged
    pub folded: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Patterns & Semantic Facts
// ─────────────────────────────────────────────────────────────────────────────

/// Recurring (topic, emotion) co-occurrence found in the episode window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub topic: String,
    pub emotion: Option<String>,
    pub frequency: usize,
    pub avg_importance: f64,
    pub episode_ids: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Kind of generalized knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    /// A topic that repeatedly evokes the same emotion
    EmotionalPattern,
    /// A topic that recurs without a dominant emotion
    TopicInterest,
}

impl KnowledgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmotionalPattern => "emotional_pattern",
            Self::TopicInterest => "topic_interest",
        }
    }
}

impl std::fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KnowledgeType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emotional_pattern" => Ok(Self::EmotionalPattern),
            "topic_interest" => Ok(Self::TopicInterest),
            _ => Err(format!("Invalid knowledge type: {}", s)),
        }
    }
}

/// Deduplicated, confidence-scored knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFact {
    pub id: String,
    pub knowledge_type: KnowledgeType,
    pub knowledge_key: String,
    pub knowledge_value: serde_json::Value,
    pub description: String,
    pub confidence: f64,
    pub evidence_count: u32,
    pub source_episode_ids: Vec<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub importance: u8,
    pub last_verified_at: DateTime<Utc>,
    pub active: bool,
}

/// What a merge did to the semantic store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Created,
    Updated,
    /// Every episode id was already counted
    Unchanged,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reinforcement State
// ─────────────────────────────────────────────────────────────────────────────

/// Which table a decayable unit lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    SemanticFact,
    Episode,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemanticFact => "semantic_fact",
            Self::Episode => "episode",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UnitKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic_fact" => Ok(Self::SemanticFact),
            "episode" => Ok(Self::Episode),
            _ => Err(format!("Invalid unit kind: {}", s)),
        }
    }
}

/// Reference to a decayable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRef {
    pub kind: UnitKind,
    pub id: String,
}

impl UnitRef {
    pub fn fact(id: impl Into<String>) -> Self {
        Self { kind: UnitKind::SemanticFact, id: id.into() }
    }

    pub fn episode(id: impl Into<String>) -> Self {
        Self { kind: UnitKind::Episode, id: id.into() }
    }
}

impl std::fmt::Display for UnitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Activation bookkeeping attached to a decayable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReinforcementState {
    pub unit: UnitRef,
    pub activation_strength: f64,
    pub reinforcement_count: u32,
    pub last_reinforced_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub last_decayed_at: Option<DateTime<Utc>>,
    pub decay_rate: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage Reports
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduler-facing entry point that produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Nightly,
    Weekly,
    Reinforce,
    Decay,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nightly => "nightly",
            Self::Weekly => "weekly",
            Self::Reinforce => "reinforce",
            Self::Decay => "decay",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record outcome counted in a stage report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Promoted,
    Swept,
    PatternsFound,
    Created,
    Updated,
    Unchanged,
    Archived,
    Reinforced,
    Decayed,
    /// Consistency violation or invalid input; the record was left alone
    Skipped,
    Failed,
}

impl From<MergeOutcome> for Outcome {
    fn from(outcome: MergeOutcome) -> Self {
        match outcome {
            MergeOutcome::Created => Self::Created,
            MergeOutcome::Updated => Self::Updated,
            MergeOutcome::Unchanged => Self::Unchanged,
        }
    }
}

/// A per-record failure that did not abort the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageError {
    pub subject: String,
    pub message: String,
    pub retryable: bool,
}

/// Before/after pair for one adjusted unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub unit: UnitRef,
    pub strength_before: f64,
    pub strength_after: f64,
    pub confidence_before: Option<f64>,
    pub confidence_after: Option<f64>,
}

/// Structured result returned by every entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub counts: BTreeMap<Outcome, usize>,
    pub errors: Vec<StageError>,
    pub audit: Vec<AuditEntry>,
    /// The stop handle fired between chunks
    pub stopped_early: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl StageReport {
    pub fn new(stage: Stage, started_at: DateTime<Utc>) -> Self {
        Self {
            stage,
            counts: BTreeMap::new(),
            errors: Vec::new(),
            audit: Vec::new(),
            stopped_early: false,
            started_at,
            duration_ms: 0,
        }
    }

    pub fn add(&mut self, outcome: Outcome, n: usize) {
        if n > 0 {
            *self.counts.entry(outcome).or_insert(0) += n;
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.add(outcome, 1);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    /// Count a per-record failure, classifying it as skipped or failed.
    pub fn fail(&mut self, subject: impl Into<String>, err: &crate::Error) {
        let outcome = if err.is_skippable() { Outcome::Skipped } else { Outcome::Failed };
        self.record(outcome);
        self.errors.push(StageError {
            subject: subject.into(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        });
    }

    /// Merge another report's counts, errors and audit trail into this one.
    pub fn absorb(&mut self, other: StageReport) {
        for (outcome, n) in other.counts {
            self.add(outcome, n);
        }
        self.errors.extend(other.errors);
        self.audit.extend(other.audit);
        self.stopped_early |= other.stopped_early;
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Total records affected, excluding skips and failures.
    pub fn total_affected(&self) -> usize {
        self.counts
            .iter()
            .filter(|(o, _)| !matches!(o, Outcome::Skipped | Outcome::Failed | Outcome::Unchanged))
            .map(|(_, n)| n)
            .sum()
    }
}
