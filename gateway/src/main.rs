#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The in-process registry serves local development; deployments embed
    // their registry client through `gateway_runtime::Args::run`.
    let registry = Arc::new(gateway_registry::MemoryRegistry::new());
    gateway_runtime::Args::parse_and_run(registry).await
}
