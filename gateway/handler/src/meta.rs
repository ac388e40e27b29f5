use crate::{Handlers, ProtocolHandler};
use futures::future;
use gateway_core::Handler;
use gateway_router::Router;
use hyper::{header, Body, Request, Response, StatusCode};
use serde::Serialize;
use std::{sync::Arc, task};
use thiserror::Error;
use tracing::{debug, warn};

/// The gateway's entry point: routes each request and dispatches the
/// exchange to the protocol adapter the resolved endpoint names.
#[derive(Clone)]
pub struct MetaHandler {
    router: Router,
    handlers: Handlers,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

/// The error shape returned to clients.
#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    err_msg: &'a str,
    data: &'a str,
}

impl MetaHandler {
    pub fn new(router: Router, handlers: Handlers) -> Self {
        Self { router, handlers }
    }

    fn select(&self, handler: Handler) -> Option<Arc<dyn ProtocolHandler>> {
        match handler {
            Handler::Web => self.handlers.web.clone(),
            Handler::Http | Handler::Proxy => self.handlers.http.clone(),
            Handler::Rpc => self.handlers.rpc.clone(),
            Handler::Event => self.handlers.event.clone(),
            Handler::Api => self.handlers.api.clone(),
        }
    }
}

impl hyper::service::Service<Request<Body>> for MetaHandler {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();

            let target = match this.router.route(&parts).await {
                Ok(target) => target,
                Err(error) => {
                    debug!(%error, path = %parts.uri.path(), "request did not route");
                    return error_response(StatusCode::NOT_FOUND, &error.to_string());
                }
            };

            let handler = match this.select(target.endpoint.handler) {
                Some(handler) => handler,
                None => {
                    warn!(handler = %target.endpoint.handler, "no adapter bound for handler");
                    return error_response(
                        StatusCode::NOT_IMPLEMENTED,
                        &format!("no adapter for handler: {}", target.endpoint.handler),
                    );
                }
            };

            match handler.serve(target, Request::from_parts(parts, body)).await {
                Ok(rsp) => Ok(rsp),
                Err(error) => {
                    warn!(%error, "handler failed");
                    error_response(StatusCode::BAD_GATEWAY, &error.to_string())
                }
            }
        })
    }
}

fn error_response(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    let body = serde_json::to_vec(&ErrorBody {
        code: status.as_u16(),
        err_msg: message,
        data: "",
    })?;
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .expect("error response must be valid"))
}
