use crate::{Action, Event, NotFound, Registry, WatchStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use gateway_core::Service;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// An in-process registry for tests and local development. Registrations are
/// broadcast to every open watch stream.
#[derive(Debug)]
pub struct MemoryRegistry {
    services: Mutex<HashMap<String, Vec<Service>>>,
    events: broadcast::Sender<Event>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            services: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any prior registration with the same
    /// name and version.
    pub fn register(&self, service: Service) {
        let mut services = self.services.lock();
        let versions = services.entry(service.name.clone()).or_default();
        let replaced = versions.iter().any(|s| s.version == service.version);
        versions.retain(|s| s.version != service.version);
        versions.push(service.clone());
        drop(services);

        let action = if replaced {
            Action::Update
        } else {
            Action::Create
        };
        let _ = self.events.send(Event {
            action,
            service: Some(service),
        });
    }

    /// Removes one registered version. Returns false when nothing matched.
    pub fn deregister(&self, name: &str, version: &str) -> bool {
        let mut services = self.services.lock();
        let Some(versions) = services.get_mut(name) else {
            return false;
        };
        let Some(at) = versions.iter().position(|s| s.version == version) else {
            return false;
        };
        let removed = versions.remove(at);
        if versions.is_empty() {
            services.remove(name);
        }
        drop(services);

        let _ = self.events.send(Event {
            action: Action::Delete,
            service: Some(removed),
        });
        true
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_services(&self) -> Result<Vec<Service>> {
        let services = self.services.lock();
        Ok(services.values().flatten().cloned().collect())
    }

    async fn get_service(&self, name: &str) -> Result<Vec<Service>> {
        let services = self.services.lock();
        match services.get(name) {
            Some(versions) => Ok(versions.clone()),
            None => Err(NotFound(name.to_string()).into()),
        }
    }

    async fn watch(&self) -> Result<WatchStream> {
        let events = BroadcastStream::new(self.events.subscribe())
            .map(|event| event.map_err(|e| anyhow!("watch stream lagged: {}", e)));
        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, version: &str) -> Service {
        Service {
            name: name.to_string(),
            version: version.to_string(),
            ..Service::default()
        }
    }

    #[tokio::test]
    async fn get_returns_registered_versions() {
        let registry = MemoryRegistry::new();
        registry.register(service("foo", "1.0"));
        registry.register(service("foo", "2.0"));

        let versions = registry.get_service("foo").await.expect("foo registered");
        assert_eq!(versions.len(), 2);

        let error = registry.get_service("bar").await.expect_err("bar unknown");
        assert!(error.downcast_ref::<NotFound>().is_some());
    }

    #[tokio::test]
    async fn deregister_removes_last_version() {
        let registry = MemoryRegistry::new();
        registry.register(service("foo", "1.0"));
        assert!(registry.deregister("foo", "1.0"));
        assert!(!registry.deregister("foo", "1.0"));
        registry.get_service("foo").await.expect_err("foo removed");
    }

    #[tokio::test]
    async fn watch_delivers_registrations() {
        let registry = MemoryRegistry::new();
        let mut watch = registry.watch().await.expect("watch should open");

        registry.register(service("foo", "1.0"));
        let event = watch
            .next()
            .await
            .expect("stream open")
            .expect("event should arrive");
        assert_eq!(event.action, Action::Create);
        assert_eq!(event.service.expect("service set").name, "foo");

        registry.deregister("foo", "1.0");
        let event = watch
            .next()
            .await
            .expect("stream open")
            .expect("event should arrive");
        assert_eq!(event.action, Action::Delete);
    }
}
