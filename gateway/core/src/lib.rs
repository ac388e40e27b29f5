//! Core gateway types.
//!
//! A backend advertises one or more [`Endpoint`] descriptors through its
//! registry metadata; the router resolves each HTTP request to a [`Target`]
//! naming the endpoint and the service snapshots that advertise it.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoint;
mod filter;
mod resolver;

pub use self::{
    endpoint::{decode, encode, Endpoint, Handler, Target},
    filter::{filter_label, Filter, ServiceFilter},
    resolver::{PathResolver, Resolver, Route},
};

use std::collections::HashMap;

/// A reachable instance of a service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub address: String,
    pub metadata: HashMap<String, String>,
}

/// A named service as advertised by the registry. A lookup may return several
/// values per name, one per registered version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub version: String,
    pub metadata: HashMap<String, String>,
    pub endpoints: Vec<EndpointMeta>,
    pub nodes: Vec<Node>,
}

/// The raw registry-advertised form of an endpoint: a name plus the string
/// map its [`Endpoint`] descriptor is decoded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointMeta {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

impl EndpointMeta {
    /// Builds the advertised form of a descriptor.
    pub fn of(endpoint: &Endpoint) -> Self {
        Self {
            name: endpoint.name.clone(),
            metadata: encode(endpoint),
        }
    }
}
