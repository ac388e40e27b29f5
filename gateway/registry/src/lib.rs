//! The service registry contract consumed by the router, an in-process
//! implementation of it, and the per-service snapshot cache layered over it.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
mod memory;

pub use self::{
    cache::{Cache, MemoryCache},
    memory::MemoryRegistry,
};

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use gateway_core::Service;
use std::pin::Pin;
use thiserror::Error;

/// The change applied by a watch event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// A single registry change event. The service field may be absent when the
/// backend emits a heartbeat or malformed result; consumers skip those.
#[derive(Clone, Debug)]
pub struct Event {
    pub action: Action,
    pub service: Option<Service>,
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// The external source of truth for service locations and metadata.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Enumerates all registered services.
    async fn list_services(&self) -> Result<Vec<Service>>;

    /// Returns every registered version of the named service.
    async fn get_service(&self, name: &str) -> Result<Vec<Service>>;

    /// Opens a stream of change events. The stream is stopped by dropping it.
    async fn watch(&self) -> Result<WatchStream>;
}

/// Returned by lookups for names with no registration.
#[derive(Clone, Debug, Error)]
#[error("service not found: {0}")]
pub struct NotFound(pub String);
