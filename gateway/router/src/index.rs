use ahash::AHashSet as HashSet;
use gateway_core::{decode, Service, Target};
use http::request::Parts;
use parking_lot::RwLock;
use regex::Regex;
use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
};
use tracing::trace;

// Keyed `"<service>:<endpoint>"`. A BTreeMap keeps matcher iteration
// deterministic: first match in lexicographic key order wins.
type ByEndpoint = Arc<RwLock<BTreeMap<String, Target>>>;

/// Mutates the shared endpoint index. Held by the watcher and refresher.
#[derive(Clone, Debug, Default)]
pub(crate) struct Writer(ByEndpoint);

/// Supports request-time matching over the shared endpoint index.
#[derive(Clone, Debug, Default)]
pub(crate) struct Reader(ByEndpoint);

pub(crate) fn pair() -> (Writer, Reader) {
    let index = ByEndpoint::default();
    let writer = Writer(index.clone());
    let reader = Reader(index);
    (writer, reader)
}

// === impl Writer ===

impl Writer {
    /// Replaces the entries of every service named in `services` with entries
    /// built from the given snapshots. Entries of unrelated services are
    /// untouched; readers observe either the old set or the new set for a
    /// name, never a mix.
    pub(crate) fn store(&self, services: &[Service]) {
        let mut eps = BTreeMap::new();
        let mut names = HashSet::default();

        for service in services {
            names.insert(service.name.as_str());

            // A snapshot with no reachable nodes contributes no records; its
            // name still evicts whatever the index held for it.
            if service.nodes.is_empty() {
                continue;
            }

            for endpoint in &service.endpoints {
                let end = match decode(&endpoint.metadata) {
                    Ok(end) => end,
                    Err(error) => {
                        trace!(%error, endpoint = %endpoint.name, "endpoint validation failed");
                        continue;
                    }
                };

                let key = format!("{}:{}", service.name, endpoint.name);
                match eps.entry(key) {
                    Entry::Vacant(entry) => {
                        entry.insert(Target {
                            name: service.name.clone(),
                            endpoint: end,
                            services: vec![service.clone()],
                        });
                    }
                    Entry::Occupied(mut entry) => {
                        let target = entry.get_mut();
                        target.endpoint = end;
                        target.services.push(service.clone());
                    }
                }
            }
        }

        let mut index = self.0.write();
        index.retain(|_, target| !names.contains(target.name.as_str()));
        index.append(&mut eps);
    }
}

// === impl Reader ===

impl Reader {
    /// Returns the first entry whose method, host, and path gates all pass.
    pub(crate) fn matches(&self, req: &Parts) -> Option<Target> {
        let index = self.0.read();
        for target in index.values() {
            let endpoint = &target.endpoint;
            if !method_match(&endpoint.method, req.method.as_str()) {
                continue;
            }
            if !host_match(&endpoint.host, crate::request_host(req)) {
                continue;
            }
            if !path_match(&endpoint.path, req.uri.path()) {
                continue;
            }
            return Some(target.clone());
        }
        None
    }
}

fn method_match(methods: &[String], method: &str) -> bool {
    methods.is_empty() || methods.iter().any(|m| m == method)
}

fn host_match(hosts: &[String], host: Option<&str>) -> bool {
    hosts.is_empty() || host.map_or(false, |h| hosts.iter().any(|c| c == h))
}

// A pattern that fails to compile is treated as non-matching; the remaining
// patterns are still tried.
fn path_match(patterns: &[String], path: &str) -> bool {
    patterns.is_empty()
        || patterns
            .iter()
            .any(|p| Regex::new(p).map(|re| re.is_match(path)).unwrap_or(false))
}
