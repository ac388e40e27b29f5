use anyhow::{anyhow, Result};
use clap::Parser;
use gateway_core::{filter_label, PathResolver};
use gateway_handler::{Handlers, MetaHandler};
use gateway_registry::{MemoryCache, Registry};
use gateway_router::{DefaultHandler, Options, Router};
use hyper::{service::make_service_fn, Server};
use std::{convert::Infallible, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(name = "gateway", about = "A dynamic API gateway over a service registry")]
pub struct Args {
    #[clap(long, default_value = "gateway=info,warn", env = "GATEWAY_LOG")]
    log_level: String,

    #[clap(long, default_value = "plain")]
    log_format: LogFormat,

    /// Address the gateway listens on.
    #[clap(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Handler tag applied when the fallback resolver synthesizes a target.
    #[clap(long, default_value = "meta")]
    handler: DefaultHandler,

    /// Namespace prefix applied to resolved service names.
    #[clap(long, default_value = "")]
    namespace: String,

    /// Node label filters, `key=value`, applied in order to every request.
    #[clap(long = "filter-label")]
    filter_labels: Vec<LabelFilter>,

    /// Seconds a cached service snapshot stays fresh.
    #[clap(long, default_value = "60")]
    cache_ttl: u64,
}

impl Args {
    pub async fn parse_and_run(registry: Arc<dyn Registry>) -> Result<()> {
        Self::parse().run(registry).await
    }

    pub async fn run(self, registry: Arc<dyn Registry>) -> Result<()> {
        init_logging(&self.log_level, self.log_format)?;

        let resolver = Arc::new(PathResolver::new(self.namespace.clone()));
        let filters = self
            .filter_labels
            .iter()
            .map(|label| filter_label(label.key.as_str(), label.value.as_str()))
            .collect();
        let opts = Options::new(registry.clone(), resolver)
            .with_handler(self.handler)
            .with_filters(filters)
            .with_namespace(self.namespace);

        let cache = Arc::new(MemoryCache::with_ttl(
            registry,
            Duration::from_secs(self.cache_ttl),
        ));
        let router = Router::with_cache(opts, cache);

        let handler = MetaHandler::new(router.clone(), Handlers::proxying());
        let make_svc = make_service_fn(move |_conn| {
            let handler = handler.clone();
            async move { Ok::<_, Infallible>(handler) }
        });

        let (close_tx, close_rx) = oneshot::channel::<()>();
        let server = Server::try_bind(&self.addr)?
            .serve(make_svc)
            .with_graceful_shutdown(async move {
                let _ = close_rx.await;
            });

        info!(addr = %self.addr, handler = %self.handler, "gateway listening");

        tokio::pin!(server);
        tokio::select! {
            res = &mut server => res?,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                let _ = close_tx.send(());
                router.close();
                (&mut server).await?;
            }
        }

        router.close();
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct LabelFilter {
    key: String,
    value: String,
}

impl FromStr for LabelFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got {:?}", s))?;
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

#[derive(Copy, Clone, Debug)]
enum LogFormat {
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            s => Err(anyhow!("invalid log format: {:?}", s)),
        }
    }
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)?;
    match format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_filters_and_handler() {
        let args = Args::try_parse_from([
            "gateway",
            "--handler",
            "rpc",
            "--filter-label",
            "region=us",
            "--filter-label",
            "tier=edge",
        ])
        .expect("args must parse");

        assert_eq!(args.handler, DefaultHandler::Rpc);
        assert_eq!(args.filter_labels.len(), 2);
        assert_eq!(args.filter_labels[0].key, "region");
        assert_eq!(args.filter_labels[0].value, "us");
    }

    #[test]
    fn rejects_malformed_label_filter() {
        Args::try_parse_from(["gateway", "--filter-label", "region"])
            .expect_err("bare label must not parse");
    }

    #[test]
    fn rejects_unknown_handler_tag() {
        Args::try_parse_from(["gateway", "--handler", "carrier-pigeon"])
            .expect_err("unknown handler must not parse");
    }
}
