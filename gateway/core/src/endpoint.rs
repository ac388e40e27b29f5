use crate::Service;
use anyhow::{anyhow, bail, Error, Result};
use std::{collections::HashMap, fmt, str::FromStr};

/// Names the protocol adapter that serves a matched endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Handler {
    Rpc,
    Api,
    Http,
    Proxy,
    Web,
    Event,
}

/// A routing descriptor advertised by a backend service.
///
/// `method` and `host` are exact-match sets; `path` is a set of regular
/// expressions over the request path. An empty list leaves that dimension
/// unconstrained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub handler: Handler,
    pub host: Vec<String>,
    pub method: Vec<String>,
    pub path: Vec<String>,
}

impl Endpoint {
    /// An endpoint with no request constraints.
    pub fn new(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            handler,
            host: Vec::new(),
            method: Vec::new(),
            path: Vec::new(),
        }
    }
}

/// An endpoint pinned to the service snapshots that advertise it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub endpoint: Endpoint,
    pub services: Vec<Service>,
}

/// Decodes an endpoint descriptor from its advertised metadata.
///
/// Unrecognized keys are ignored. A descriptor without a name or without a
/// recognized handler tag fails to decode; callers drop it.
pub fn decode(metadata: &HashMap<String, String>) -> Result<Endpoint> {
    let name = metadata.get("endpoint").cloned().unwrap_or_default();
    if name.is_empty() {
        bail!("endpoint name required");
    }

    let handler = metadata
        .get("handler")
        .map(String::as_str)
        .unwrap_or("")
        .parse::<Handler>()?;

    Ok(Endpoint {
        name,
        handler,
        host: list(metadata.get("host")),
        method: list(metadata.get("method")),
        path: list(metadata.get("path")),
    })
}

/// Encodes a descriptor into the metadata map registrants advertise.
pub fn encode(endpoint: &Endpoint) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("endpoint".to_string(), endpoint.name.clone());
    metadata.insert("handler".to_string(), endpoint.handler.to_string());
    if !endpoint.host.is_empty() {
        metadata.insert("host".to_string(), endpoint.host.join(","));
    }
    if !endpoint.method.is_empty() {
        metadata.insert("method".to_string(), endpoint.method.join(","));
    }
    if !endpoint.path.is_empty() {
        metadata.insert("path".to_string(), endpoint.path.join(","));
    }
    metadata
}

fn list(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// === impl Handler ===

impl Handler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Api => "api",
            Self::Http => "http",
            Self::Proxy => "proxy",
            Self::Web => "web",
            Self::Event => "event",
        }
    }
}

impl FromStr for Handler {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rpc" => Ok(Self::Rpc),
            "api" => Ok(Self::Api),
            "http" => Ok(Self::Http),
            "proxy" => Ok(Self::Proxy),
            "web" => Ok(Self::Web),
            "event" => Ok(Self::Event),
            s => Err(anyhow!("unrecognized handler: {:?}", s)),
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
