use anyhow::{anyhow, Result};
use http::request::Parts;

/// Maps a request to a service and method when no advertised endpoint
/// matches it.
pub trait Resolver: Send + Sync {
    fn resolve(&self, req: &Parts) -> Result<Route>;
}

/// A resolved service name and abstract method name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub method: String,
}

/// Derives the service from the first path segment and the method from the
/// following segments: `/foo/bar` resolves to service `foo`, method
/// `Foo.Bar`; `/foo/bar/baz` to service `foo`, method `Bar.Baz`.
#[derive(Clone, Debug, Default)]
pub struct PathResolver {
    namespace: Option<String>,
}

impl PathResolver {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
        }
    }
}

impl Resolver for PathResolver {
    fn resolve(&self, req: &Parts) -> Result<Route> {
        let mut segments = req.uri.path().split('/').filter(|s| !s.is_empty());
        let service = segments
            .next()
            .ok_or_else(|| anyhow!("no service in path {:?}", req.uri.path()))?;

        let name = match &self.namespace {
            Some(namespace) => format!("{}.{}", namespace, service),
            None => service.to_string(),
        };

        let method = match (segments.next(), segments.next()) {
            (Some(endpoint), Some(action)) => format!("{}.{}", title(endpoint), title(action)),
            (Some(endpoint), None) => format!("{}.{}", title(service), title(endpoint)),
            (None, _) => format!("{}.Call", title(service)),
        };

        Ok(Route { name, method })
    }
}

fn title(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn parts(uri: &str) -> Parts {
        Request::builder()
            .uri(uri)
            .body(())
            .expect("request must build")
            .into_parts()
            .0
    }

    #[test]
    fn resolves_two_segments() {
        let route = PathResolver::default()
            .resolve(&parts("/foo/bar"))
            .expect("path should resolve");
        assert_eq!(
            route,
            Route {
                name: "foo".to_string(),
                method: "Foo.Bar".to_string(),
            },
        );
    }

    #[test]
    fn resolves_three_segments() {
        let route = PathResolver::default()
            .resolve(&parts("/greeter/say/hello"))
            .expect("path should resolve");
        assert_eq!(
            route,
            Route {
                name: "greeter".to_string(),
                method: "Say.Hello".to_string(),
            },
        );
    }

    #[test]
    fn applies_namespace_prefix() {
        let route = PathResolver::new("com.example.api")
            .resolve(&parts("/foo"))
            .expect("path should resolve");
        assert_eq!(route.name, "com.example.api.foo");
        assert_eq!(route.method, "Foo.Call");
    }

    #[test]
    fn rejects_empty_path() {
        PathResolver::default()
            .resolve(&parts("/"))
            .expect_err("bare path must not resolve");
    }
}
