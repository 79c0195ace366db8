// ── External collaborators ──
//
// Capabilities the controller consumes but does not own: a key-value
// repository for presets and snapshots, and fire-and-forget analytics.
// Front ends inject their own implementations; the in-memory and
// tracing-backed ones here are the defaults.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use crate::error::CoreError;

/// Collection holding saved device-state presets.
pub const PRESETS: &str = "presets";
/// Collection holding persisted snapshot rings, keyed by device id.
pub const SNAPSHOTS: &str = "snapshots";

// ── Repository ──────────────────────────────────────────────────────

/// Key-value store grouped into named collections.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save(&self, collection: &str, key: &str, value: Value) -> Result<(), CoreError>;

    async fn find(&self, collection: &str, key: &str) -> Result<Option<Value>, CoreError>;

    /// Returns `true` if the key existed.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, CoreError>;

    /// Keys in a collection, sorted.
    async fn keys(&self, collection: &str) -> Result<Vec<String>, CoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    entries: DashMap<(String, String), Value>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save(&self, collection: &str, key: &str, value: Value) -> Result<(), CoreError> {
        self.entries.insert((collection.into(), key.into()), value);
        Ok(())
    }

    async fn find(&self, collection: &str, key: &str) -> Result<Option<Value>, CoreError> {
        Ok(self
            .entries
            .get(&(collection.to_owned(), key.to_owned()))
            .map(|e| e.value().clone()))
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, CoreError> {
        Ok(self
            .entries
            .remove(&(collection.to_owned(), key.to_owned()))
            .is_some())
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>, CoreError> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == collection)
            .map(|e| e.key().1.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

// ── Analytics ───────────────────────────────────────────────────────

/// Fire-and-forget usage recording. Implementations must not block.
pub trait Analytics: Send + Sync {
    fn track(&self, event: &str, properties: Value);
}

/// Records analytics as structured log events.
#[derive(Debug, Default)]
pub struct TracingAnalytics;

impl Analytics for TracingAnalytics {
    fn track(&self, event: &str, properties: Value) {
        info!(target: "lumen::analytics", event, %properties, "track");
    }
}

#[derive(Debug, Default)]
pub struct NoopAnalytics;

impl Analytics for NoopAnalytics {
    fn track(&self, _event: &str, _properties: Value) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn collections_are_isolated() {
        let repo = InMemoryRepository::new();
        repo.save(PRESETS, "sunset", json!({"brightness": 40}))
            .await
            .unwrap();
        repo.save(SNAPSHOTS, "sunset", json!([])).await.unwrap();
        repo.save(PRESETS, "focus", json!({})).await.unwrap();

        assert_eq!(repo.keys(PRESETS).await.unwrap(), vec!["focus", "sunset"]);
        assert_eq!(
            repo.find(PRESETS, "sunset").await.unwrap(),
            Some(json!({"brightness": 40}))
        );
        assert!(repo.delete(PRESETS, "sunset").await.unwrap());
        assert!(!repo.delete(PRESETS, "sunset").await.unwrap());
        assert!(repo.find(SNAPSHOTS, "sunset").await.unwrap().is_some());
    }
}
