//! Relay actor registry
//!
//! Singleton-by-key ownership: each stream key addresses exactly one actor,
//! created lazily on first request and kept for the process lifetime unless
//! the host explicitly reclaims it. Each actor's adapter/connection maps are
//! its own; nothing here is shared across actors.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::config::{Config, RelayConfig};
use crate::models::StreamKey;
use crate::relay::RelayActor;
use crate::upstream::UpstreamClient;

pub struct RelayRegistry {
    actors: DashMap<StreamKey, Arc<RelayActor>>,
    relay_config: RelayConfig,
    upstream: UpstreamClient,
}

impl RelayRegistry {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            actors: DashMap::new(),
            relay_config: config.relay.clone(),
            upstream: UpstreamClient::new(&config.upstream),
        }
    }

    /// Get the actor for a stream key, creating it on first use.
    #[must_use]
    pub fn get_or_create(&self, key: StreamKey) -> Arc<RelayActor> {
        self.actors
            .entry(key.clone())
            .or_insert_with(|| {
                info!(stream = %key, "Creating relay actor");
                RelayActor::new(key.clone(), self.relay_config.clone(), self.upstream.clone())
            })
            .clone()
    }

    #[must_use]
    pub fn get(&self, key: &StreamKey) -> Option<Arc<RelayActor>> {
        self.actors.get(key).map(|a| Arc::clone(&a))
    }

    /// Reclaim an actor: stop its recurring tasks and drop it.
    pub fn remove(&self, key: &StreamKey) {
        if let Some((_, actor)) = self.actors.remove(key) {
            actor.shutdown();
        }
    }

    /// Stop every actor's recurring tasks and drop them all.
    pub fn shutdown_all(&self) {
        for entry in &self.actors {
            entry.value().shutdown();
        }
        self.actors.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_by_key() {
        let registry = RelayRegistry::new(&Config::default());
        let a = registry.get_or_create(StreamKey::from("s1"));
        let b = registry.get_or_create(StreamKey::from("s1"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_keys_distinct_actors() {
        let registry = RelayRegistry::new(&Config::default());
        let a = registry.get_or_create(StreamKey::from("s1"));
        let b = registry.get_or_create(StreamKey::from("s2"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_reclaims() {
        let registry = RelayRegistry::new(&Config::default());
        let key = StreamKey::from("s1");
        let _ = registry.get_or_create(key.clone());
        registry.remove(&key);
        assert!(registry.get(&key).is_none());
        assert!(registry.is_empty());
    }
}
