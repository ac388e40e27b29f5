//! Protocol adapters and the dispatching HTTP handler.
//!
//! The [`MetaHandler`] routes each inbound request and hands the exchange to
//! the adapter named by the resolved endpoint's handler tag. Adapters are
//! injected per slot; deployments bind only the protocols they serve.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod meta;
mod proxy;

pub use self::{meta::MetaHandler, proxy::ReverseProxy};

use anyhow::Result;
use async_trait::async_trait;
use gateway_core::Target;
use hyper::{Body, Request, Response};
use std::sync::Arc;

/// Serves one HTTP exchange against a resolved target.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    async fn serve(&self, target: Target, req: Request<Body>) -> Result<Response<Body>>;
}

/// The protocol adapters the dispatcher selects among, one slot per handler
/// family. Requests resolved to an unbound slot are answered with 501.
#[derive(Clone, Default)]
pub struct Handlers {
    pub rpc: Option<Arc<dyn ProtocolHandler>>,
    pub http: Option<Arc<dyn ProtocolHandler>>,
    pub web: Option<Arc<dyn ProtocolHandler>>,
    pub event: Option<Arc<dyn ProtocolHandler>>,
    pub api: Option<Arc<dyn ProtocolHandler>>,
}

impl Handlers {
    /// Binds the reverse proxy to every HTTP-shaped slot (`http`, `proxy`,
    /// and `web`).
    pub fn proxying() -> Self {
        let proxy: Arc<dyn ProtocolHandler> = Arc::new(ReverseProxy::new());
        Self {
            http: Some(proxy.clone()),
            web: Some(proxy),
            ..Self::default()
        }
    }
}
