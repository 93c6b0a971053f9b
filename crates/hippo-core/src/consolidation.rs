//! Consolidation entry points.
//!
//! [`ConsolidationEngine`] wires the tiers together and exposes the four
//! stages an external scheduler invokes:
//!
//! | Stage     | Entry point              | Work                                  |
//! |-----------|--------------------------|---------------------------------------|
//! | nightly   | `nightly_consolidate()`  | promote settled records, then sweep   |
//! | weekly    | `weekly_consolidate()`   | extract → merge → archive             |
//! | reinforce | `reinforce_patterns()`   | strengthen recently used units        |
//! | decay     | `decay_patterns()`       | weaken units left idle                |
//!
//! Each stage holds its own guard, so a stage never overlaps with itself, and
//! takes a single "now" from the injected clock for the whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

use crate::archive::Archivist;
use crate::cache::FactCache;
use crate::classifier::{Classifier, KeywordClassifier};
use crate::clock::{hours, minutes, Clock, SystemClock};
use crate::config::Config;
use crate::db::Db;
use crate::episode::{EpisodeBuilder, EpisodeStore};
use crate::error::{Error, Result};
use crate::goal::{Goal, GoalEvidence, GoalScore};
use crate::pattern::PatternExtractor;
use crate::reinforcement::ReinforcementEngine;
use crate::semantic::SemanticMerger;
use crate::summarizer::Summarizer;
use crate::types::{NewWorkingRecord, Outcome, RecordKind, Stage, StageReport, WorkingRecord};
use crate::working::WorkingStore;

/// Cooperative cancellation shared by every stage of one engine.
///
/// Batches check it between chunks, never inside a transaction.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Allow stages to run again after a stop.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StageGuards {
    nightly: Mutex<()>,
    weekly: Mutex<()>,
    reinforce: Mutex<()>,
    decay: Mutex<()>,
}

impl StageGuards {
    fn acquire(&self, stage: Stage) -> Result<MutexGuard<'_, ()>> {
        let lock = match stage {
            Stage::Nightly => &self.nightly,
            Stage::Weekly => &self.weekly,
            Stage::Reinforce => &self.reinforce,
            Stage::Decay => &self.decay,
        };
        lock.try_lock()
            .map_err(|_| Error::transient(format!("{} stage is already running", stage)))
    }
}

pub struct ConsolidationEngine {
    config: Config,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn Classifier>,
    working: WorkingStore,
    episodes: EpisodeStore,
    builder: EpisodeBuilder,
    extractor: PatternExtractor,
    merger: SemanticMerger,
    reinforcement: ReinforcementEngine,
    archivist: Archivist,
    stop: StopHandle,
    guards: StageGuards,
}

impl ConsolidationEngine {
    /// Engine over `db` with the system clock and the keyword classifier.
    pub fn new(db: Db, config: Config) -> Self {
        let batch_size = config.storage.batch_size;
        let episodes = EpisodeStore::new(db.clone());
        // Shared so that confidence written by decay is never served stale
        let cache = FactCache::new();

        Self {
            clock: Arc::new(SystemClock),
            classifier: Arc::new(KeywordClassifier::default()),
            working: WorkingStore::new(db.clone()),
            builder: EpisodeBuilder::new(
                db.clone(),
                config.episode.clone(),
                config.reinforcement.default_decay_rate,
            ),
            extractor: PatternExtractor::new(
                episodes.clone(),
                config.patterns.min_frequency,
                batch_size,
            ),
            merger: SemanticMerger::new(
                db.clone(),
                cache.clone(),
                config.semantic.clone(),
                config.reinforcement.clone(),
            ),
            reinforcement: ReinforcementEngine::new(
                db,
                cache,
                config.reinforcement.clone(),
                batch_size,
            ),
            archivist: Archivist::new(episodes.clone(), config.archive.clone(), batch_size),
            episodes,
            stop: StopHandle::new(),
            guards: StageGuards::default(),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.builder = self.builder.with_summarizer(summarizer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn working(&self) -> &WorkingStore {
        &self.working
    }

    pub fn episodes(&self) -> &EpisodeStore {
        &self.episodes
    }

    pub fn semantic(&self) -> &SemanticMerger {
        &self.merger
    }

    pub fn reinforcement(&self) -> &ReinforcementEngine {
        &self.reinforcement
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingest
    // ─────────────────────────────────────────────────────────────────────────

    /// Classify raw text and store it as a working record.
    pub async fn ingest(
        &self,
        session_id: &str,
        text: &str,
        speaker: Option<&str>,
    ) -> Result<WorkingRecord> {
        let classification = self.classifier.classify(text);

        let input = NewWorkingRecord {
            kind: if speaker.is_some() {
                RecordKind::Conversation
            } else {
                RecordKind::Observation
            },
            topic: classification.topic,
            emotion: classification.emotion,
            speaker: speaker.map(String::from),
            ttl: hours(self.config.working.default_ttl_hours)?,
            ..NewWorkingRecord::new(session_id, text, classification.importance)
        };

        self.working.put(input, self.clock.now()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────────────────────────

    /// Promote every settled record at or above the promotion bar, then sweep
    /// expired leftovers.
    ///
    /// Records below the bar are always swept once expired. A record whose
    /// promotion failed is held back for the next run, and when promotion
    /// stopped early every record at or above the bar is held back.
    pub async fn nightly_consolidate(&self) -> Result<StageReport> {
        let _guard = self.guards.acquire(Stage::Nightly)?;
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = StageReport::new(Stage::Nightly, now);

        let min_importance = self.config.working.promotion_min_importance;
        let settle = minutes(self.config.working.settle_minutes)?;
        let batch_size = self.config.storage.batch_size;
        let mut cursor = None;
        let mut failed = Vec::new();

        loop {
            if self.stop.is_stopped() {
                report.stopped_early = true;
                break;
            }

            let chunk = self
                .working
                .promotable_page(min_importance, settle, now, cursor, batch_size)
                .await?;
            let Some(last) = chunk.last() else { break };
            cursor = Some((last.created_at, last.id.clone()));
            let exhausted = chunk.len() < batch_size;

            for record in &chunk {
                match self.builder.promote(record, now).await {
                    Ok(_) => report.record(Outcome::Promoted),
                    Err(e) => {
                        tracing::warn!(record_id = %record.id, error = %e, "Promotion failed");
                        report.fail(record.id.clone(), &e);
                        failed.push(record.id.clone());
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        let protect_from = report.stopped_early.then_some(min_importance);
        if protect_from.is_some() || !failed.is_empty() {
            tracing::warn!(
                stopped_early = report.stopped_early,
                held_back = failed.len(),
                "Holding promotable records back from the sweep"
            );
        }
        let swept = self
            .working
            .sweep_expired_except(now, protect_from, &failed)
            .await?;
        report.add(Outcome::Swept, swept);

        Ok(finish(report, started))
    }

    /// Extract patterns from the trailing window, merge each into semantic
    /// memory, then archive old episodes.
    pub async fn weekly_consolidate(&self) -> Result<StageReport> {
        let _guard = self.guards.acquire(Stage::Weekly)?;
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = StageReport::new(Stage::Weekly, now);

        let patterns = self
            .extractor
            .extract(self.config.patterns.window_days, now)
            .await?;
        report.add(Outcome::PatternsFound, patterns.len());

        for chunk in patterns.chunks(self.config.storage.batch_size.max(1)) {
            if self.stop.is_stopped() {
                report.stopped_early = true;
                break;
            }

            for pattern in chunk {
                match self.merger.merge_pattern(pattern, now).await {
                    Ok(outcome) => report.record(outcome.into()),
                    Err(e) => {
                        let subject = format!("{}/{}", pattern.topic, pattern.emotion.as_deref().unwrap_or("-"));
                        tracing::warn!(pattern = %subject, error = %e, "Merge failed");
                        report.fail(subject, &e);
                    }
                }
            }
        }

        // Patterns must be folded upward before their episodes are archived.
        if report.stopped_early || report.has_errors() {
            tracing::warn!(
                stopped_early = report.stopped_early,
                failed = report.errors.len(),
                "Skipping archive until every pattern merges cleanly"
            );
        } else {
            let archived = self
                .archivist
                .archive_older_than(self.config.archive.older_than_days, now, &self.stop)
                .await?;
            report.absorb(archived);
        }

        Ok(finish(report, started))
    }

    pub async fn reinforce_patterns(&self) -> Result<StageReport> {
        let _guard = self.guards.acquire(Stage::Reinforce)?;
        let started = Instant::now();
        let report = self
            .reinforcement
            .reinforce_active(
                self.config.reinforcement.lookback_days,
                self.clock.now(),
                &self.stop,
            )
            .await?;
        Ok(finish(report, started))
    }

    pub async fn decay_patterns(&self) -> Result<StageReport> {
        let _guard = self.guards.acquire(Stage::Decay)?;
        let started = Instant::now();
        let report = self
            .reinforcement
            .decay_stale(
                self.config.reinforcement.inactivity_days,
                self.clock.now(),
                &self.stop,
            )
            .await?;
        Ok(finish(report, started))
    }

    /// Score a goal against the non-archived episodes on `topic` since the
    /// goal was created.
    pub async fn goal_progress(&self, goal: &Goal, topic: &str) -> Result<GoalScore> {
        let now = self.clock.now();
        let batch_size = self.config.storage.batch_size;
        let mut episodes = Vec::new();
        let mut cursor = None;

        loop {
            let page = self
                .episodes
                .window_page(goal.created_at, cursor, batch_size)
                .await?;
            let Some(last) = page.last() else { break };
            cursor = Some((last.happened_at, last.id.clone()));
            let exhausted = page.len() < batch_size;
            episodes.extend(page);
            if exhausted {
                break;
            }
        }

        let evidence = GoalEvidence::from_episodes(&episodes, topic);
        Ok(goal.score(&evidence, now))
    }
}

fn finish(mut report: StageReport, started: Instant) -> StageReport {
    report.duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        stage = %report.stage,
        affected = report.total_affected(),
        errors = report.errors.len(),
        stopped_early = report.stopped_early,
        duration_ms = report.duration_ms,
        "Stage complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{from_millis, ManualClock};
    use crate::db::open_in_memory;
    use crate::goal::GoalKind;
    use crate::types::{KnowledgeType, UnitRef};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    fn start() -> chrono::DateTime<Utc> {
        from_millis(1_760_000_000_000)
    }

    fn engine(clock: Arc<ManualClock>) -> ConsolidationEngine {
        engine_on(open_in_memory().unwrap(), clock)
    }

    fn engine_on(db: Db, clock: Arc<ManualClock>) -> ConsolidationEngine {
        ConsolidationEngine::new(db, Config::default()).with_clock(clock)
    }

    fn travel(importance: u8) -> NewWorkingRecord {
        NewWorkingRecord {
            kind: RecordKind::Conversation,
            topic: Some("travel".into()),
            emotion: Some("joy".into()),
            speaker: Some("user".into()),
            ..NewWorkingRecord::new("session-1", "Planning the Lisbon trip", importance)
        }
    }

    /// Three travel/joy episodes promoted at `start() + 2h`.
    async fn promote_three(engine: &ConsolidationEngine, clock: &ManualClock) {
        for _ in 0..3 {
            engine.working().put(travel(8), clock.now()).await.unwrap();
        }
        clock.advance(Duration::hours(2));
        let report = engine.nightly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Promoted), 3);
    }

    #[tokio::test]
    async fn test_nightly_promotes_important_and_sweeps_the_rest() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());

        let important = engine.working().put(travel(9), clock.now()).await.unwrap();
        let trivial = NewWorkingRecord {
            ttl: Duration::hours(1),
            ..NewWorkingRecord::new("session-1", "Said hello", 3)
        };
        engine.working().put(trivial, clock.now()).await.unwrap();

        clock.advance(Duration::hours(2));
        let report = engine.nightly_consolidate().await.unwrap();

        assert_eq!(report.count(Outcome::Promoted), 1);
        assert_eq!(report.count(Outcome::Swept), 1);
        assert!(!report.has_errors());
        assert_eq!(engine.working().count().await.unwrap(), 0);
        assert_eq!(engine.episodes().count().await.unwrap(), 1);
        assert!(engine.working().get(&important.id).await.unwrap().is_none());

        // Nothing left to do on a rerun
        let rerun = engine.nightly_consolidate().await.unwrap();
        assert_eq!(rerun.total_affected(), 0);
    }

    #[tokio::test]
    async fn test_scenario_promotion_of_critical_record() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());

        let record = engine.working().put(travel(9), clock.now()).await.unwrap();
        clock.advance(Duration::hours(2));

        let promotable = engine
            .working()
            .select_promotable(7, Duration::hours(1), clock.now(), 100)
            .await
            .unwrap();
        assert_eq!(promotable.len(), 1);
        assert_eq!(promotable[0].id, record.id);

        let before = engine.working().count().await.unwrap();
        let report = engine.nightly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Promoted), 1);
        assert_eq!(engine.working().count().await.unwrap(), before - 1);

        let page = engine.episodes().window_page(start(), None, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].emotional_tags.contains(&"critical".to_string()));
        assert_eq!(page[0].source_record_ids, vec![record.id]);
    }

    #[tokio::test]
    async fn test_settling_records_wait_for_next_run() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());

        engine.working().put(travel(9), clock.now()).await.unwrap();
        clock.advance(Duration::minutes(10));

        let report = engine.nightly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Promoted), 0);
        assert_eq!(engine.working().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scenario_weekly_creates_fact_then_is_idempotent() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());
        promote_three(&engine, &clock).await;

        let report = engine.weekly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::PatternsFound), 1);
        assert_eq!(report.count(Outcome::Created), 1);

        let fact = engine
            .semantic()
            .store()
            .get_active(KnowledgeType::EmotionalPattern, "travel::joy")
            .await
            .unwrap()
            .unwrap();
        assert!((fact.confidence - 0.65).abs() < 1e-9);
        assert_eq!(fact.evidence_count, 3);

        // Same three episodes again
        let rerun = engine.weekly_consolidate().await.unwrap();
        assert_eq!(rerun.count(Outcome::Unchanged), 1);
        let after = engine.semantic().store().get(&fact.id).await.unwrap().unwrap();
        assert_eq!(after.confidence, fact.confidence);
        assert_eq!(after.evidence_count, fact.evidence_count);
    }

    #[tokio::test]
    async fn test_scenario_decay_after_inactivity() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());
        promote_three(&engine, &clock).await;
        engine.weekly_consolidate().await.unwrap();

        let fact = engine
            .semantic()
            .store()
            .get_active(KnowledgeType::EmotionalPattern, "travel::joy")
            .await
            .unwrap()
            .unwrap();

        clock.advance(Duration::days(45));
        let report = engine.decay_patterns().await.unwrap();

        // The fact and its three episodes
        assert_eq!(report.count(Outcome::Decayed), 4);
        let state = engine
            .reinforcement()
            .state(&UnitRef::fact(&fact.id))
            .await
            .unwrap()
            .unwrap();
        assert!((state.activation_strength - 0.45).abs() < 1e-9);

        let decayed = engine.semantic().store().get(&fact.id).await.unwrap().unwrap();
        assert!((decayed.confidence - 0.625).abs() < 1e-9);

        let episodes = engine.episodes().window_page(start(), None, 10).await.unwrap();
        assert!(episodes.iter().all(|e| (e.strength - 0.75).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_merged_episodes_are_reinforced() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());
        promote_three(&engine, &clock).await;

        clock.advance(Duration::days(1));
        engine.weekly_consolidate().await.unwrap();

        clock.advance(Duration::days(1));
        let report = engine.reinforce_patterns().await.unwrap();
        assert_eq!(report.count(Outcome::Reinforced), 3);
        assert_eq!(report.audit.len(), 3);

        let episodes = engine.episodes().window_page(start(), None, 10).await.unwrap();
        assert!(episodes.iter().all(|e| (e.strength - 0.82).abs() < 1e-9));
        assert!(episodes.iter().all(|e| e.folded));
    }

    #[tokio::test]
    async fn test_weekly_archives_old_episodes_after_merge() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());
        promote_three(&engine, &clock).await;
        engine.weekly_consolidate().await.unwrap();

        clock.advance(Duration::days(100));
        let report = engine.weekly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Archived), 3);
        assert_eq!(report.count(Outcome::PatternsFound), 0);
        assert_eq!(engine.episodes().count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stage_does_not_reenter() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock);

        let _held = engine.guards.acquire(Stage::Nightly).unwrap();
        let err = engine.nightly_consolidate().await.unwrap_err();
        assert!(err.is_retryable());

        // Other stages are unaffected
        assert!(engine.decay_patterns().await.is_ok());
    }

    #[tokio::test]
    async fn test_stopped_nightly_keeps_promotable_records() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());

        let important = NewWorkingRecord {
            ttl: Duration::hours(1),
            ..travel(9)
        };
        let important = engine.working().put(important, clock.now()).await.unwrap();
        let trivial = NewWorkingRecord {
            ttl: Duration::hours(1),
            ..NewWorkingRecord::new("session-1", "noise", 2)
        };
        engine.working().put(trivial, clock.now()).await.unwrap();
        clock.advance(Duration::hours(2));

        let stop = engine.stop_handle();
        stop.stop();
        let report = engine.nightly_consolidate().await.unwrap();
        assert!(report.stopped_early);
        assert_eq!(report.count(Outcome::Swept), 1);
        assert_eq!(engine.working().count().await.unwrap(), 1);
        assert!(engine.working().get(&important.id).await.unwrap().is_some());

        stop.reset();
        let report = engine.nightly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Promoted), 1);
        assert_eq!(report.count(Outcome::Swept), 0);
        assert_eq!(engine.working().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_promotion_does_not_block_sweep() {
        let db = open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine_on(db.clone(), clock.clone());

        let expiring = |importance| NewWorkingRecord {
            ttl: Duration::hours(1),
            ..travel(importance)
        };
        let stuck = engine.working().put(expiring(9), clock.now()).await.unwrap();
        engine.working().put(expiring(8), clock.now()).await.unwrap();
        let trivial = engine.working().put(expiring(3), clock.now()).await.unwrap();
        db.write()
            .await
            .execute_batch(&format!(
                "CREATE TRIGGER reject_stuck BEFORE INSERT ON episodes
                 WHEN NEW.primary_source_id = '{}'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                stuck.id
            ))
            .unwrap();
        clock.advance(Duration::hours(2));

        let report = engine.nightly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Promoted), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].subject, stuck.id);
        assert_eq!(report.count(Outcome::Swept), 1);
        assert!(engine.working().get(&trivial.id).await.unwrap().is_none());
        assert!(engine.working().get(&stuck.id).await.unwrap().is_some());

        db.write().await.execute_batch("DROP TRIGGER reject_stuck;").unwrap();
        let retry = engine.nightly_consolidate().await.unwrap();
        assert_eq!(retry.count(Outcome::Promoted), 1);
        assert!(!retry.has_errors());
        assert_eq!(engine.working().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_merge_holds_back_archive() {
        let db = open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine_on(db.clone(), clock.clone());
        promote_three(&engine, &clock).await;

        clock.advance(Duration::days(100));
        promote_three(&engine, &clock).await;
        db.write()
            .await
            .execute_batch(
                "CREATE TRIGGER reject_facts BEFORE INSERT ON semantic_facts
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let report = engine.weekly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::PatternsFound), 1);
        assert!(report.has_errors());
        assert_eq!(report.count(Outcome::Archived), 0);
        let live = engine.episodes().window_page(start(), None, 10).await.unwrap();
        assert_eq!(live.len(), 6);

        db.write().await.execute_batch("DROP TRIGGER reject_facts;").unwrap();
        let report = engine.weekly_consolidate().await.unwrap();
        assert_eq!(report.count(Outcome::Created), 1);
        assert_eq!(report.count(Outcome::Archived), 3);
    }

    #[tokio::test]
    async fn test_lookup_reflects_decayed_confidence() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());
        promote_three(&engine, &clock).await;
        engine.weekly_consolidate().await.unwrap();

        let before = engine
            .semantic()
            .lookup(KnowledgeType::EmotionalPattern, "travel::joy", clock.now())
            .await
            .unwrap()
            .unwrap();
        assert!((before.confidence - 0.65).abs() < 1e-9);

        clock.advance(Duration::days(45));
        let report = engine.decay_patterns().await.unwrap();
        assert_eq!(report.count(Outcome::Decayed), 4);

        let stored = engine.semantic().store().get(&before.id).await.unwrap().unwrap();
        let looked_up = engine
            .semantic()
            .lookup(KnowledgeType::EmotionalPattern, "travel::joy", clock.now())
            .await
            .unwrap()
            .unwrap();
        assert!((stored.confidence - 0.625).abs() < 1e-9);
        assert_eq!(looked_up.confidence, stored.confidence);
    }

    #[tokio::test]
    async fn test_unrepresentable_config_spans_fail_cleanly() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut config = Config::default();
        config.working.default_ttl_hours = 400_000_000_000;
        config.working.settle_minutes = i64::MAX;
        let engine = ConsolidationEngine::new(open_in_memory().unwrap(), config).with_clock(clock);

        let err = engine.ingest("session-1", "Booked flights", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = engine.nightly_consolidate().await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_ingest_classifies_text() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock);

        let record = engine
            .ingest("session-9", "So excited about the flight!", Some("user"))
            .await
            .unwrap();
        assert_eq!(record.kind, RecordKind::Conversation);
        assert_eq!(record.topic.as_deref(), Some("travel"));
        assert_eq!(record.emotion.as_deref(), Some("joy"));
        assert_eq!(record.importance, 7);
        assert_eq!(record.expires_at - record.created_at, Duration::hours(24));

        let err = engine.ingest("session-9", "  ", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    struct Fixed;

    #[async_trait]
    impl Summarizer for Fixed {
        async fn summarize(&self, _record: &WorkingRecord) -> Result<String> {
            Ok("A trip is being planned".into())
        }
    }

    #[tokio::test]
    async fn test_summarizer_replaces_derived_summary() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone()).with_summarizer(Arc::new(Fixed));

        engine.working().put(travel(9), clock.now()).await.unwrap();
        clock.advance(Duration::hours(2));
        engine.nightly_consolidate().await.unwrap();

        let page = engine.episodes().window_page(start(), None, 10).await.unwrap();
        assert_eq!(page[0].summary, "A trip is being planned");
    }

    #[tokio::test]
    async fn test_goal_progress_from_episodes() {
        let clock = Arc::new(ManualClock::new(start()));
        let engine = engine(clock.clone());
        let goal = Goal::new("travel more", GoalKind::Count { target: 6 }, start()).unwrap();

        promote_three(&engine, &clock).await;

        let score = engine.goal_progress(&goal, "Travel").await.unwrap();
        assert_eq!(score.progress, 0.5);
        assert!(!score.achieved);
    }
}
