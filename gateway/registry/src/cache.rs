use crate::Registry;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use gateway_core::Service;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::{sync::watch, time::Instant};
use tracing::debug;

/// A consistent per-service snapshot source, consumed by the router in place
/// of direct registry lookups.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the current snapshot (all versions) of the named service.
    async fn get(&self, name: &str) -> Result<Vec<Service>>;

    /// Releases the cache. Later lookups read through to the registry.
    fn stop(&self);
}

/// A read-through snapshot cache. Entries expire after a fixed TTL and are
/// invalidated early when the registry reports a change to their service.
pub struct MemoryCache {
    registry: Arc<dyn Registry>,
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    stop: watch::Sender<bool>,
}

struct Entry {
    services: Vec<Service>,
    expires: Instant,
}

impl MemoryCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// Creates a cache over the registry. Must be called within a tokio
    /// runtime: the cache spawns a task that watches the registry and evicts
    /// entries for changed services.
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self::with_ttl(registry, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(registry: Arc<dyn Registry>, ttl: Duration) -> Self {
        let entries = Arc::new(Mutex::new(HashMap::new()));
        let (stop, stopped) = watch::channel(false);
        tokio::spawn(evict(registry.clone(), entries.clone(), stopped));
        Self {
            registry,
            ttl,
            entries,
            stop,
        }
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, name: &str) -> Result<Vec<Service>> {
        if !self.stopped() {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(name) {
                if entry.expires > Instant::now() {
                    return Ok(entry.services.clone());
                }
            }
        }

        let services = self.registry.get_service(name).await?;

        if !self.stopped() {
            self.entries.lock().insert(
                name.to_string(),
                Entry {
                    services: services.clone(),
                    expires: Instant::now() + self.ttl,
                },
            );
        }
        Ok(services)
    }

    fn stop(&self) {
        if self.stop.send_replace(true) {
            return;
        }
        self.entries.lock().clear();
    }
}

/// Evicts the entry of any service the registry reports a change for, so the
/// next lookup re-fetches. Watch failures degrade the cache to TTL-bounded
/// staleness rather than failing lookups.
async fn evict(
    registry: Arc<dyn Registry>,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        if *stopped.borrow() {
            return;
        }

        let mut events = match registry.watch().await {
            Ok(events) => events,
            Err(error) => {
                debug!(%error, "cache watch failed");
                tokio::select! {
                    _ = stopped.changed() => return,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => continue,
                }
            }
        };

        loop {
            tokio::select! {
                _ = stopped.changed() => return,
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        if let Some(service) = event.service {
                            entries.lock().remove(&service.name);
                        }
                    }
                    Some(Err(error)) => {
                        debug!(%error, "cache watch error");
                        break;
                    }
                    None => break,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRegistry;

    fn service(name: &str, version: &str) -> Service {
        Service {
            name: name.to_string(),
            version: version.to_string(),
            ..Service::default()
        }
    }

    #[tokio::test]
    async fn serves_cached_snapshot_within_ttl() {
        let registry = Arc::new(MemoryRegistry::new());
        let cache = MemoryCache::new(registry.clone());

        registry.register(service("foo", "1.0"));
        let snapshot = cache.get("foo").await.expect("foo registered");
        assert_eq!(snapshot.len(), 1);

        // A second lookup is served from the cached entry.
        let again = cache.get("foo").await.expect("cached");
        assert_eq!(again, snapshot);
    }

    #[tokio::test]
    async fn eviction_reflects_registry_changes() {
        let registry = Arc::new(MemoryRegistry::new());
        let cache = MemoryCache::new(registry.clone());

        registry.register(service("foo", "1.0"));
        assert_eq!(cache.get("foo").await.expect("registered").len(), 1);

        registry.register(service("foo", "2.0"));
        // The evict task runs concurrently; poll until it has caught up.
        for _ in 0..100 {
            if cache.get("foo").await.expect("registered").len() == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cache did not observe the new version");
    }

    #[tokio::test]
    async fn stop_clears_and_reads_through() {
        let registry = Arc::new(MemoryRegistry::new());
        let cache = MemoryCache::new(registry.clone());

        registry.register(service("foo", "1.0"));
        cache.get("foo").await.expect("registered");

        cache.stop();
        cache.stop();

        // Reads still succeed, straight from the registry.
        assert_eq!(cache.get("foo").await.expect("read-through").len(), 1);
    }
}
