//! Read-through cache for active semantic facts.
//!
//! Entries are keyed by `(knowledge_type, knowledge_key)`. Every writer of a
//! fact (the Semantic Merger and the Reinforcement engine) invalidates its
//! entry right after committing. Fills happen under the database read lock,
//! so no fill can land after the invalidation of a newer commit.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{KnowledgeType, SemanticFact};

type CacheKey = (KnowledgeType, String);

#[derive(Clone, Default)]
pub struct FactCache {
    entries: Arc<RwLock<HashMap<CacheKey, SemanticFact>>>,
}

impl FactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, knowledge_type: KnowledgeType, key: &str) -> Option<SemanticFact> {
        self.entries
            .read()
            .await
            .get(&(knowledge_type, key.to_string()))
            .cloned()
    }

    pub async fn insert(&self, fact: SemanticFact) {
        let key = (fact.knowledge_type, fact.knowledge_key.clone());
        self.entries.write().await.insert(key, fact);
    }

    pub async fn invalidate(&self, knowledge_type: KnowledgeType, key: &str) {
        let removed = self
            .entries
            .write()
            .await
            .remove(&(knowledge_type, key.to_string()));
        if removed.is_some() {
            tracing::debug!(%knowledge_type, key, "Invalidated cached fact");
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
