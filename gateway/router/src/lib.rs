//! Dynamic request routing over registry-advertised endpoints.
//!
//! The router keeps an eventually-consistent index of `{service, endpoint}`
//! records. A watch stream on the registry applies low-latency updates; a
//! periodic sweep rebuilds the index as a safety net against missed events.
//! Requests are matched against the index by method, host, and path; misses
//! fall back to a URL-derived resolver.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
mod tasks;

use gateway_core::{Endpoint, Filter, Handler, Resolver, Route, Service, Target};
use gateway_registry::{Cache, MemoryCache, NotFound, Registry};
use http::request::Parts;
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

/// The handler tag applied when the fallback resolver synthesizes a target.
/// `Meta` defers to the handler each matched endpoint declares.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DefaultHandler {
    #[default]
    Meta,
    Rpc,
    Api,
    Http,
    Proxy,
    Web,
}

/// Routing failures, as reported to the dispatcher.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The router has been closed; no further requests are served.
    #[error("router closed")]
    Closed,

    /// No endpoint matched and the fallback could not produce a target.
    #[error("not found")]
    NotFound,

    /// A handler tag outside the recognized set.
    #[error("unknown handler")]
    UnknownHandler,

    /// A registry or resolver failure, surfaced with its original message.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Immutable router configuration.
#[derive(Clone)]
pub struct Options {
    pub registry: Arc<dyn Registry>,
    pub resolver: Arc<dyn Resolver>,
    pub handler: DefaultHandler,
    pub filters: Vec<Filter>,
    pub namespace: String,
}

impl Options {
    pub fn new(registry: Arc<dyn Registry>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            registry,
            resolver,
            handler: DefaultHandler::default(),
            filters: Vec::new(),
            namespace: String::new(),
        }
    }

    pub fn with_handler(mut self, handler: DefaultHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Routes HTTP requests to backend services using registry endpoint metadata.
///
/// Construction spawns the index maintenance tasks; [`Router::close`] signals
/// a shared exit flag that terminates them and stops the registry cache.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) opts: Options,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) index: index::Writer,
    reader: index::Reader,
    closed: watch::Sender<bool>,
    pub(crate) closed_rx: watch::Receiver<bool>,
}

impl Router {
    /// Creates a router with a fresh snapshot cache over the registry. Must
    /// be called within a tokio runtime.
    pub fn new(opts: Options) -> Self {
        let cache = Arc::new(MemoryCache::new(opts.registry.clone()));
        Self::with_cache(opts, cache)
    }

    pub fn with_cache(opts: Options, cache: Arc<dyn Cache>) -> Self {
        let (index, reader) = index::pair();
        let (closed, closed_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            opts,
            cache,
            index,
            reader,
            closed,
            closed_rx,
        });
        tokio::spawn(tasks::watch(inner.clone()));
        tokio::spawn(tasks::refresh(inner.clone()));
        Self { inner }
    }

    pub fn options(&self) -> &Options {
        &self.inner.opts
    }

    fn is_closed(&self) -> bool {
        *self.inner.closed_rx.borrow()
    }

    /// Signals the exit flag and stops the registry cache. Idempotent: later
    /// calls return without effect.
    pub fn close(&self) {
        if self.inner.closed.send_replace(true) {
            return;
        }
        self.inner.cache.stop();
    }

    /// Returns the first index entry whose descriptor matches the request,
    /// with configured filters applied to its service list.
    pub fn endpoint(&self, req: &Parts) -> Result<Target, RouteError> {
        if self.is_closed() {
            return Err(RouteError::Closed);
        }

        let target = self.inner.reader.matches(req).ok_or(RouteError::NotFound)?;
        Ok(apply_filters(&self.inner.opts.filters, req, target))
    }

    /// Routes a request: the endpoint matcher first, the URL-derived fallback
    /// second. A matcher miss is discarded; the fallback's own failure is the
    /// one reported.
    pub async fn route(&self, req: &Parts) -> Result<Target, RouteError> {
        if self.is_closed() {
            return Err(RouteError::Closed);
        }

        if let Ok(target) = self.endpoint(req) {
            return Ok(target);
        }

        let route = self
            .inner
            .opts
            .resolver
            .resolve(req)
            .map_err(RouteError::Upstream)?;

        let services = match self.inner.cache.get(&route.name).await {
            Ok(services) => services,
            Err(error) if error.downcast_ref::<NotFound>().is_some() => {
                debug!(service = %route.name, "resolved service is not registered");
                return Err(RouteError::NotFound);
            }
            Err(error) => return Err(RouteError::Upstream(error)),
        };

        let services = apply_service_filters(&self.inner.opts.filters, req, services);
        Ok(synthesize(self.inner.opts.handler, req, route, services))
    }
}

/// Builds the fallback target for the configured default handler. RPC-family
/// handlers address the resolved method; HTTP-family handlers pin the
/// synthesized endpoint to the request's own host, method, and path.
fn synthesize(handler: DefaultHandler, req: &Parts, route: Route, services: Vec<Service>) -> Target {
    match handler {
        DefaultHandler::Meta | DefaultHandler::Rpc | DefaultHandler::Api => {
            let handler = match handler {
                DefaultHandler::Api => Handler::Api,
                _ => Handler::Rpc,
            };
            Target {
                name: route.name,
                endpoint: Endpoint::new(route.method, handler),
                services,
            }
        }
        DefaultHandler::Http | DefaultHandler::Proxy | DefaultHandler::Web => {
            let handler = match handler {
                DefaultHandler::Proxy => Handler::Proxy,
                DefaultHandler::Web => Handler::Web,
                _ => Handler::Http,
            };
            Target {
                name: route.name,
                endpoint: Endpoint {
                    name: req.uri.to_string(),
                    handler,
                    host: request_host(req).map(str::to_string).into_iter().collect(),
                    method: vec![req.method.to_string()],
                    path: vec![req.uri.path().to_string()],
                },
                services,
            }
        }
    }
}

fn apply_filters(filters: &[Filter], req: &Parts, mut target: Target) -> Target {
    target.services = apply_service_filters(filters, req, target.services);
    target
}

fn apply_service_filters(
    filters: &[Filter],
    req: &Parts,
    mut services: Vec<Service>,
) -> Vec<Service> {
    for filter in filters {
        let narrow = filter.as_ref()(req);
        services = narrow(services);
    }
    services
}

/// The host a request addresses: the URI authority when present, otherwise
/// the Host header, byte-exact as received.
pub(crate) fn request_host(req: &Parts) -> Option<&str> {
    req.uri
        .authority()
        .map(|authority| authority.as_str())
        .or_else(|| {
            req.headers
                .get(http::header::HOST)
                .and_then(|host| host.to_str().ok())
        })
}

// === impl DefaultHandler ===

impl DefaultHandler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Rpc => "rpc",
            Self::Api => "api",
            Self::Http => "http",
            Self::Proxy => "proxy",
            Self::Web => "web",
        }
    }
}

impl FromStr for DefaultHandler {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, RouteError> {
        match s {
            "meta" => Ok(Self::Meta),
            "rpc" => Ok(Self::Rpc),
            "api" => Ok(Self::Api),
            "http" => Ok(Self::Http),
            "proxy" => Ok(Self::Proxy),
            "web" => Ok(Self::Web),
            _ => Err(RouteError::UnknownHandler),
        }
    }
}

impl fmt::Display for DefaultHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
