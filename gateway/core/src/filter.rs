use crate::{Node, Service};
use http::request::Parts;
use std::sync::Arc;

/// A transform that narrows a service list to the backends eligible for one
/// request. Filters never mutate their input; they produce fresh values.
pub type ServiceFilter = Box<dyn Fn(Vec<Service>) -> Vec<Service> + Send>;

/// Builds a [`ServiceFilter`] bound to a single request.
pub type Filter = Arc<dyn Fn(&Parts) -> ServiceFilter + Send + Sync>;

/// Keeps only services with at least one node labeled `key=value`, retaining
/// only the matching nodes within each kept service.
pub fn filter_label(key: impl Into<String>, value: impl Into<String>) -> Filter {
    let key = key.into();
    let value = value.into();
    Arc::new(move |_req: &Parts| -> ServiceFilter {
        let key = key.clone();
        let value = value.clone();
        Box::new(move |services: Vec<Service>| {
            services
                .into_iter()
                .filter_map(|service| {
                    let nodes = service
                        .nodes
                        .iter()
                        .filter(|node| node.metadata.get(&key) == Some(&value))
                        .cloned()
                        .collect::<Vec<Node>>();
                    if nodes.is_empty() {
                        return None;
                    }
                    Some(Service { nodes, ..service })
                })
                .collect()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use maplit::hashmap;

    fn request() -> Parts {
        Request::builder()
            .uri("/svc/call")
            .body(())
            .expect("request must build")
            .into_parts()
            .0
    }

    fn node(id: &str, region: &str) -> Node {
        Node {
            id: id.to_string(),
            address: format!("{}.example.com:8080", id),
            metadata: hashmap! { "region".to_string() => region.to_string() },
        }
    }

    #[test]
    fn keeps_only_labeled_nodes() {
        let services = vec![Service {
            name: "svc".to_string(),
            nodes: vec![node("n1", "us"), node("n2", "eu")],
            ..Service::default()
        }];

        let filter = filter_label("region", "us");
        let filtered = filter.as_ref()(&request())(services);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].nodes, vec![node("n1", "us")]);
    }

    #[test]
    fn drops_services_with_no_matching_nodes() {
        let services = vec![
            Service {
                name: "us-svc".to_string(),
                nodes: vec![node("n1", "us")],
                ..Service::default()
            },
            Service {
                name: "eu-svc".to_string(),
                nodes: vec![node("n2", "eu")],
                ..Service::default()
            },
        ];

        let filter = filter_label("region", "us");
        let filtered = filter.as_ref()(&request())(services);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "us-svc");
    }
}
