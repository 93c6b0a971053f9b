//! Goal scoring.
//!
//! A goal's kind is chosen when the goal is created and decides how its
//! progress is scored. Each kind owns its own strategy:
//!
//! | Kind        | Progress                                          |
//! |-------------|---------------------------------------------------|
//! | `Count`     | occurrences / target                              |
//! | `Streak`    | consecutive days with an occurrence / target days |
//! | `Threshold` | latest value relative to the target               |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::types::Episode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalKind {
    /// Reach `target` occurrences in total
    Count { target: u32 },
    /// Keep up at least one occurrence a day for `target_days` days running
    Streak { target_days: u32 },
    /// Bring the latest measured value to `target`
    Threshold { target: f64, higher_is_better: bool },
}

impl GoalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count { .. } => "count",
            Self::Streak { .. } => "streak",
            Self::Threshold { .. } => "threshold",
        }
    }
}

/// What has been observed towards a goal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalEvidence {
    pub occurrences: Vec<DateTime<Utc>>,
    pub latest_value: Option<f64>,
}

impl GoalEvidence {
    /// Occurrences of `topic` across episodes, by when they happened.
    pub fn from_episodes<'a>(episodes: impl IntoIterator<Item = &'a Episode>, topic: &str) -> Self {
        let topic = topic.trim().to_lowercase();
        let mut occurrences: Vec<DateTime<Utc>> = episodes
            .into_iter()
            .filter(|e| e.topic == topic)
            .map(|e| e.happened_at)
            .collect();
        occurrences.sort();
        Self { occurrences, latest_value: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalScore {
    /// 0.0 to 1.0
    pub progress: f64,
    pub achieved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub kind: GoalKind,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(name: impl Into<String>, kind: GoalKind, created_at: DateTime<Utc>) -> Result<Self> {
        match &kind {
            GoalKind::Count { target: 0 } | GoalKind::Streak { target_days: 0 } => {
                return Err(Error::validation("goal target must be positive"));
            }
            GoalKind::Threshold { target, .. } if !target.is_finite() => {
                return Err(Error::validation("goal threshold must be finite"));
            }
            _ => {}
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            created_at,
        })
    }

    /// Score the evidence gathered since the goal was created.
    pub fn score(&self, evidence: &GoalEvidence, now: DateTime<Utc>) -> GoalScore {
        let progress = match &self.kind {
            GoalKind::Count { target } => {
                let seen = evidence
                    .occurrences
                    .iter()
                    .filter(|at| **at >= self.created_at && **at <= now)
                    .count();
                seen as f64 / *target as f64
            }
            GoalKind::Streak { target_days } => {
                current_streak(&evidence.occurrences, now) as f64 / *target_days as f64
            }
            GoalKind::Threshold { target, higher_is_better } => match evidence.latest_value {
                None => 0.0,
                Some(value) if *higher_is_better => {
                    if *target <= 0.0 {
                        if value >= *target { 1.0 } else { 0.0 }
                    } else {
                        value / target
                    }
                }
                Some(value) => {
                    if value <= *target {
                        1.0
                    } else if value <= 0.0 {
                        0.0
                    } else {
                        target / value
                    }
                }
            },
        };

        let progress = progress.clamp(0.0, 1.0);
        GoalScore {
            progress,
            achieved: progress >= 1.0,
        }
    }
}

/// Days in a row, ending today or yesterday, with at least one occurrence.
fn current_streak(occurrences: &[DateTime<Utc>], now: DateTime<Utc>) -> u32 {
    let days: BTreeSet<NaiveDate> = occurrences
        .iter()
        .filter(|at| **at <= now)
        .map(|at| at.date_naive())
        .collect();

    let today = now.date_naive();
    let mut day = if days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt()
    };

    let mut streak = 0;
    while let Some(current) = day.filter(|d| days.contains(d)) {
        streak += 1;
        day = current.pred_opt();
    }
    streak
}
