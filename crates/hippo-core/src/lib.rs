//! hippo-core - Memory consolidation engine
//!
//! Turns a stream of short-lived observations into durable, deduplicated
//! knowledge, and keeps that knowledge's strength in step with how often it
//! is used:
//!
//! - **working**: bounded-lifetime working records
//! - **episode**: promotion of settled records into durable episodes
//! - **pattern**: recurring (topic, emotion) pairs across recent episodes
//! - **semantic**: confidence-scored facts merged from patterns
//! - **reinforcement**: activation gain on use, decay on neglect
//! - **archive**: retirement of old episodes from extraction
//! - **consolidation**: the scheduler-facing entry points

pub mod archive;
pub mod cache;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod consolidation;
pub mod db;
pub mod episode;
pub mod error;
pub mod goal;
pub mod pattern;
pub mod reinforcement;
pub mod semantic;
pub mod summarizer;
pub mod types;
pub mod working;

// Re-export commonly used types
pub use classifier::{Classification, Classifier, KeywordClassifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use consolidation::{ConsolidationEngine, StopHandle};
pub use db::Db;
pub use error::{Error, Result};
pub use summarizer::Summarizer;
pub use types::*;
