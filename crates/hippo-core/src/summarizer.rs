//! Optional summarization hook used during episode creation.
//!
//! A summarizer may call out to a model over the network, so it is always
//! bounded by a timeout. Any failure falls back to the derived summary and
//! never fails promotion.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::WorkingRecord;

/// Produces a human-readable summary for a record about to become an episode.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, record: &WorkingRecord) -> Result<String>;
}

/// Run the summarizer under `timeout`.
///
/// Returns `None` on timeout, error, or an empty summary.
pub async fn summarize_bounded(
    summarizer: &dyn Summarizer,
    record: &WorkingRecord,
    timeout: Duration,
) -> Option<String> {
    let outcome = match tokio::time::timeout(timeout, summarizer.summarize(record)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { duration_ms: timeout.as_millis() as u64 }),
    };

    match outcome {
        Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(
                record_id = %record.id,
                error = %e,
                "Summarizer failed, storing derived summary"
            );
            None
        }
    }
}
