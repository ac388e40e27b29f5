use crate::ProtocolHandler;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use gateway_core::{Node, Target};
use hyper::{client::HttpConnector, header, Body, Client, Request, Response, Uri};
use tracing::debug;

/// Forwards the exchange verbatim to a node of the resolved target.
///
/// Node selection is first-available; richer balancing belongs to a
/// downstream selector.
#[derive(Clone, Default)]
pub struct ReverseProxy {
    client: Client<HttpConnector>,
}

impl ReverseProxy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProtocolHandler for ReverseProxy {
    async fn serve(&self, target: Target, mut req: Request<Body>) -> Result<Response<Body>> {
        let node = first_node(&target)
            .ok_or_else(|| anyhow!("no nodes available for service {}", target.name))?;
        let uri = proxy_uri(&node.address, req.uri())?;
        debug!(%uri, service = %target.name, "proxying request");

        *req.uri_mut() = uri;
        // The client re-derives Host from the rewritten URI.
        req.headers_mut().remove(header::HOST);

        self.client
            .request(req)
            .await
            .context("upstream request failed")
    }
}

fn first_node(target: &Target) -> Option<&Node> {
    target
        .services
        .iter()
        .flat_map(|service| service.nodes.iter())
        .next()
}

/// Rebuilds the request URI against the node address, keeping the original
/// path and query.
fn proxy_uri(address: &str, orig: &Uri) -> Result<Uri> {
    let path_and_query = orig
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Uri::builder()
        .scheme("http")
        .authority(address)
        .path_and_query(path_and_query)
        .build()
        .with_context(|| format!("invalid upstream address {:?}", address))
}
