//! Archivist
//!
//! Flags old episodes as archived so they drop out of pattern extraction.
//! Archiving never deletes content; archived episodes stay readable.

use chrono::{DateTime, Utc};

use crate::clock::{days as span_days, earlier};
use crate::config::ArchiveConfig;
use crate::consolidation::StopHandle;
use crate::episode::EpisodeStore;
use crate::error::Result;
use crate::types::{Outcome, Stage, StageReport};

pub struct Archivist {
    episodes: EpisodeStore,
    config: ArchiveConfig,
    batch_size: usize,
}

impl Archivist {
    pub fn new(episodes: EpisodeStore, config: ArchiveConfig, batch_size: usize) -> Self {
        Self {
            episodes,
            config,
            batch_size: batch_size.max(1),
        }
    }

    /// Archive episodes that happened more than `days` before `now`, one chunk
    /// per transaction. With `require_folded` set, only episodes whose pattern
    /// has been merged are eligible.
    pub async fn archive_older_than(
        &self,
        days: i64,
        now: DateTime<Utc>,
        stop: &StopHandle,
    ) -> Result<StageReport> {
        let cutoff = earlier(now, span_days(days)?)?;
        let mut report = StageReport::new(Stage::Weekly, now);

        loop {
            if stop.is_stopped() {
                report.stopped_early = true;
                break;
            }

            match self
                .episodes
                .archive_chunk(cutoff, self.config.require_folded, self.batch_size)
                .await
            {
                Ok(archived) => {
                    report.add(Outcome::Archived, archived);
                    if archived < self.batch_size {
                        break;
                    }
                }
                Err(e) => {
                    // The same rows would be picked again; leave them for the next run.
                    tracing::warn!(error = %e, "Archive chunk failed");
                    report.fail("archive", &e);
                    break;
                }
            }
        }

        tracing::info!(
            archived = report.count(Outcome::Archived),
            older_than_days = days,
            require_folded = self.config.require_folded,
            "Archived episodes"
        );
        Ok(report)
    }
}
